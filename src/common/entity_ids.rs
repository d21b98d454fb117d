//! Marker types and id aliases for every entity in the data model (spec §3).
//!
//! Follows the `pub struct X; pub type XId = Id<X>;` convention: the marker
//! type only exists to make `Id<Schedule>` and `Id<Webhook>` different types
//! at compile time. Never construct a marker type, only name it.

use crate::common::id::{Id, IdPrefix, PrefixedId, V4};

/// A user known to the external auth/billing collaborator. We only ever
/// receive and compare this id, never mint one.
pub struct User;
pub type Uid = Id<User, V4>;

/// The canvas (workflow definition) owned by the external canvas editor.
pub struct Canvas;
pub type CanvasId = Id<Canvas, V4>;

/// A single run of the external workflow engine.
pub struct WorkflowExecution;
pub type WorkflowExecutionId = Id<WorkflowExecution, V4>;

/// A live or idle remote sandbox handle from the provider SDK.
pub struct Sandbox;
pub type SandboxId = Id<Sandbox, V4>;

/// A declarative recurring trigger (spec §3 `Schedule`).
pub struct Schedule;
pub type ScheduleId = Id<Schedule>;

/// One anticipated or triggered run of a [`Schedule`] (spec §3 `ScheduleRecord`).
pub struct ScheduleRecord;
pub type ScheduleRecordId = Id<ScheduleRecord>;

/// A public webhook trigger endpoint (spec §3 `Webhook`), wire id `wh_<32 hex>`.
pub struct Webhook;
impl IdPrefix for Webhook {
    const PREFIX: &'static str = "wh_";
}
pub type WebhookId = PrefixedId<Webhook>;

/// An audit row for one inbound trigger HTTP call (spec §3 `ApiCallRecord`),
/// wire id `rec_<cuid2>`.
pub struct ApiCallRecord;
impl IdPrefix for ApiCallRecord {
    const PREFIX: &'static str = "rec_";
}
pub type ApiCallRecordId = PrefixedId<ApiCallRecord>;

/// A content-addressed uploaded blob (spec §3 `StaticFile`), wire id
/// `of_<base64url(sha256(uid, body)[:16])>`.
pub struct StaticFile;
impl IdPrefix for StaticFile {
    const PREFIX: &'static str = "of_";
}
pub type FileKey = PrefixedId<StaticFile>;

impl WebhookId {
    /// Mints a fresh webhook id: `wh_` followed by 32 lowercase hex chars.
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand_bytes();
        Self::with_body(hex::encode(bytes))
    }
}

impl ApiCallRecordId {
    /// Mints a fresh audit-record id: `rec_` followed by a cuid2.
    pub fn generate() -> Self {
        Self::with_body(cuid2::create_id())
    }
}

impl FileKey {
    /// Derives the deterministic content-addressed key for an uploaded blob:
    /// `of_<base64url(sha256(uid || ":" || body))[:16 bytes]>` (spec §6).
    pub fn from_content(uid: &Uid, body: &[u8]) -> Self {
        use base64::Engine;
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(uid.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(body);
        let digest = hasher.finalize();
        let truncated = &digest[..16];
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(truncated);
        Self::with_body(encoded)
    }

    /// The storage key this file lives at: `openapi/{uid}/{fileKey}` (spec §6).
    pub fn storage_key(&self, uid: &Uid) -> String {
        format!("openapi/{}/{}", uid, self.as_str())
    }
}

fn rand_bytes() -> [u8; 16] {
    uuid::Uuid::new_v4().into_bytes()
}

#[cfg(test)]
mod generation_tests {
    use super::*;

    #[test]
    fn webhook_id_has_expected_shape() {
        let id = WebhookId::generate();
        assert!(id.as_str().starts_with("wh_"));
        assert_eq!(id.body().len(), 32);
        assert!(id.body().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn api_call_record_id_has_prefix() {
        let id = ApiCallRecordId::generate();
        assert!(id.as_str().starts_with("rec_"));
    }

    #[test]
    fn file_key_is_deterministic() {
        let uid = Uid::new();
        let a = FileKey::from_content(&uid, b"hello");
        let b = FileKey::from_content(&uid, b"hello");
        assert_eq!(a.as_str(), b.as_str());
        assert!(a.as_str().starts_with("of_"));
    }

    #[test]
    fn file_key_storage_key_matches_convention() {
        let uid = Uid::new();
        let key = FileKey::from_content(&uid, b"hello");
        assert_eq!(key.storage_key(&uid), format!("openapi/{uid}/{key}"));
    }
}
