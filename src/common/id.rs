//! Typed id wrappers for compile-time type safety.
//!
//! Two families live here:
//!
//! - [`Id<T, V>`] wraps a [`Uuid`] the way `common/id.rs` in the reference
//!   monorepo this crate grew out of does: `T` pins the entity, `V` pins the
//!   UUID generation strategy (defaults to v7 for natural chronological
//!   ordering). Used for ids the system itself mints as UUIDs (schedules,
//!   schedule records) and for opaque ids handed to us by external
//!   collaborators (`uid`, `canvasId`, `sandboxId`, `workflowExecutionId`).
//! - [`PrefixedId<T>`] wraps an opaque prefixed string (`wh_…`, `rec_…`,
//!   `of_…`) for the ids whose wire format is specified, not left to UUID's
//!   discretion.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;
use uuid::Uuid;

/// UUID version 7 marker (time-ordered UUIDs). Recommended for primary keys.
pub struct V7;

/// UUID version 4 marker (random UUIDs). Used for externally-sourced opaque ids.
pub struct V4;

/// A typed wrapper around `Uuid` that prevents mixing up id types at compile time.
#[repr(transparent)]
pub struct Id<T, V = V7>(Uuid, PhantomData<fn() -> (T, V)>);

impl<T> Id<T, V7> {
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::now_v7(), PhantomData)
    }
}

impl<T> Default for Id<T, V7> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Id<T, V4> {
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4(), PhantomData)
    }
}

impl<T> Default for Id<T, V4> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, V> Id<T, V> {
    #[inline]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid, PhantomData)
    }

    #[inline]
    pub fn into_uuid(self) -> Uuid {
        self.0
    }

    /// Parses an id from a string, e.g. a path segment or a JSON field.
    #[inline]
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?, PhantomData))
    }

    #[inline]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    #[inline]
    pub fn nil() -> Self {
        Self(Uuid::nil(), PhantomData)
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl<T, V> Clone for Id<T, V> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for Id<T, V> {}

impl<T, V> Debug for Id<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(&format!("Id<{}>", std::any::type_name::<T>()))
            .field(&self.0)
            .finish()
    }
}

impl<T, V> Display for Id<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<T, V> PartialEq for Id<T, V> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T, V> Eq for Id<T, V> {}

impl<T, V> PartialOrd for Id<T, V> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, V> Ord for Id<T, V> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T, V> Hash for Id<T, V> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T, V> AsRef<Uuid> for Id<T, V> {
    #[inline]
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl<T, V> From<Uuid> for Id<T, V> {
    #[inline]
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl<T, V> From<Id<T, V>> for Uuid {
    #[inline]
    fn from(id: Id<T, V>) -> Self {
        id.0
    }
}

impl<T, V> FromStr for Id<T, V> {
    type Err = uuid::Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<T, V> Serialize for Id<T, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T, V> Deserialize<'de> for Id<T, V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Uuid::deserialize(deserializer).map(Self::from_uuid)
    }
}

use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgHasArrayType, PgTypeInfo, PgValueRef, Postgres};
use sqlx::{Decode, Encode, Type};

impl<T, V> Type<Postgres> for Id<T, V> {
    fn type_info() -> PgTypeInfo {
        <Uuid as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <Uuid as Type<Postgres>>::compatible(ty)
    }
}

impl<T, V> PgHasArrayType for Id<T, V> {
    fn array_type_info() -> PgTypeInfo {
        <Uuid as PgHasArrayType>::array_type_info()
    }
}

impl<T, V> Encode<'_, Postgres> for Id<T, V> {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <Uuid as Encode<Postgres>>::encode_by_ref(&self.0, buf)
    }
}

impl<T, V> Decode<'_, Postgres> for Id<T, V> {
    fn decode(value: PgValueRef<'_>) -> Result<Self, BoxDynError> {
        <Uuid as Decode<Postgres>>::decode(value).map(Self::from_uuid)
    }
}

/// Associates a marker type with its external wire prefix (`wh_`, `rec_`, `of_`, ...).
pub trait IdPrefix {
    const PREFIX: &'static str;
}

/// An opaque, prefixed string id: `{PREFIX}{opaque body}`.
///
/// Unlike [`Id<T, V>`] this never claims to be a UUID — the body is whatever
/// the owning module generates (hex, cuid2, a content hash) and `PrefixedId`
/// only enforces the prefix and equality/ordering/serde/sqlx plumbing.
pub struct PrefixedId<T: IdPrefix>(String, PhantomData<fn() -> T>);

impl<T: IdPrefix> PrefixedId<T> {
    /// Wraps an already-prefixed string without validating the prefix.
    ///
    /// Use [`PrefixedId::parse`] for untrusted input (e.g. a path segment).
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into(), PhantomData)
    }

    /// Builds an id from `PREFIX` plus a body that doesn't yet carry it.
    pub fn with_body(body: impl AsRef<str>) -> Self {
        Self(format!("{}{}", T::PREFIX, body.as_ref()), PhantomData)
    }

    /// Parses and validates that `s` carries the expected prefix.
    pub fn parse(s: &str) -> Result<Self, InvalidIdPrefix> {
        if s.starts_with(T::PREFIX) {
            Ok(Self(s.to_owned(), PhantomData))
        } else {
            Err(InvalidIdPrefix {
                expected: T::PREFIX,
                got: s.to_owned(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The body after the prefix.
    pub fn body(&self) -> &str {
        self.0.strip_prefix(T::PREFIX).unwrap_or(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
#[error("expected id prefix {expected:?}, got {got:?}")]
pub struct InvalidIdPrefix {
    expected: &'static str,
    got: String,
}

impl<T: IdPrefix> Clone for PrefixedId<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone(), PhantomData)
    }
}

impl<T: IdPrefix> Debug for PrefixedId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(&format!("PrefixedId<{}>", std::any::type_name::<T>()))
            .field(&self.0)
            .finish()
    }
}

impl<T: IdPrefix> Display for PrefixedId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<T: IdPrefix> PartialEq for PrefixedId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: IdPrefix> Eq for PrefixedId<T> {}

impl<T: IdPrefix> Hash for PrefixedId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T: IdPrefix> Serialize for PrefixedId<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T: IdPrefix> Deserialize<'de> for PrefixedId<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s, PhantomData))
    }
}

impl<T: IdPrefix> Type<Postgres> for PrefixedId<T> {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <String as Type<Postgres>>::compatible(ty)
    }
}

impl<T: IdPrefix> Encode<'_, Postgres> for PrefixedId<T> {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <String as Encode<Postgres>>::encode_by_ref(&self.0, buf)
    }
}

impl<T: IdPrefix> Decode<'_, Postgres> for PrefixedId<T> {
    fn decode(value: PgValueRef<'_>) -> Result<Self, BoxDynError> {
        <String as Decode<Postgres>>::decode(value).map(|s| Self(s, PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct User;
    type UserId = Id<User>;

    #[test]
    fn new_creates_unique_ids() {
        let a = UserId::new();
        let b = UserId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn parse_and_display_roundtrip() {
        let id = UserId::new();
        let parsed = UserId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ordering_is_time_based_for_v7() {
        let a = UserId::new();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = UserId::new();
        assert!(a < b);
    }

    #[test]
    fn debug_includes_type_name() {
        let id = UserId::new();
        assert!(format!("{id:?}").contains("User"));
    }

    struct Webhook;
    impl IdPrefix for Webhook {
        const PREFIX: &'static str = "wh_";
    }
    type WebhookId = PrefixedId<Webhook>;

    #[test]
    fn prefixed_id_rejects_wrong_prefix() {
        assert!(WebhookId::parse("rec_abc").is_err());
        assert!(WebhookId::parse("wh_abc").is_ok());
    }

    #[test]
    fn prefixed_id_with_body_adds_prefix() {
        let id = WebhookId::with_body("deadbeef");
        assert_eq!(id.as_str(), "wh_deadbeef");
        assert_eq!(id.body(), "deadbeef");
    }
}
