//! Auth guard (spec §4.3): extract `Authorization: Bearer <key>` (fallback
//! `X-Refly-Api-Key`), validate, resolve to `uid`. Grounded in the reference
//! monorepo's `server/middleware/jwt_auth.rs` bearer-prefix extraction
//! pattern; API-key validation itself is an external collaborator (spec
//! §1 Non-goals).

use crate::common::entity_ids::Uid;
use crate::error::ControlPlaneError;
use async_trait::async_trait;
use axum::http::HeaderMap;

/// Resolves an opaque API key to a `uid`. The actual key store/validation
/// logic belongs to the external auth system (spec §1); this crate only
/// depends on the interface.
#[async_trait]
pub trait ApiKeyValidator: Send + Sync {
    async fn resolve(&self, api_key: &str) -> anyhow::Result<Option<Uid>>;
}

/// Extracts the raw key the same way `jwt_auth.rs` extracts a bearer token:
/// prefer `Authorization: Bearer <key>`, fall back to `X-Refly-Api-Key`.
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            let key = value.strip_prefix("Bearer ").unwrap_or(value);
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
    }
    headers
        .get("x-refly-api-key")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Runs the auth guard end to end (spec §4.3 "Auth").
pub async fn authenticate(
    headers: &HeaderMap,
    validator: &dyn ApiKeyValidator,
) -> Result<Uid, ControlPlaneError> {
    let key = extract_api_key(headers).ok_or(ControlPlaneError::AuthMissingKey)?;
    let uid = validator
        .resolve(&key)
        .await
        .map_err(ControlPlaneError::Internal)?
        .ok_or(ControlPlaneError::AuthUserNotFound)?;
    Ok(uid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extract_prefers_bearer_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer sk-123"),
        );
        assert_eq!(extract_api_key(&headers), Some("sk-123".to_string()));
    }

    #[test]
    fn extract_accepts_raw_authorization_without_bearer_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("sk-123"),
        );
        assert_eq!(extract_api_key(&headers), Some("sk-123".to_string()));
    }

    #[test]
    fn extract_falls_back_to_refly_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-refly-api-key", HeaderValue::from_static("sk-456"));
        assert_eq!(extract_api_key(&headers), Some("sk-456".to_string()));
    }

    #[test]
    fn extract_returns_none_without_any_credential() {
        let headers = HeaderMap::new();
        assert_eq!(extract_api_key(&headers), None);
    }
}
