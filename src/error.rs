//! Domain error taxonomy (spec §7), grounded in the `thiserror` style used
//! sparingly by `common/auth/errors.rs` in the reference monorepo this crate
//! grew out of — everywhere else plain `anyhow::Result` propagation is used
//! for plumbing, and `thiserror` is reserved for errors a caller branches on.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// The taxonomy from spec §7, organized by domain rather than by transport.
/// Each variant knows its own HTTP status; callers that need to branch on
/// the kind (e.g. the ingress gate retrying after a rate limit) match on this
/// directly instead of inspecting a status code.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("{0}")]
    RequestParams(String),

    #[error("Missing or invalid API key")]
    AuthMissingKey,

    #[error("User not found")]
    AuthUserNotFound,

    #[error("Invalid or expired token")]
    AuthInvalidToken,

    #[error("{0}")]
    NotFound(String),

    #[error("schedule_limit_exceeded")]
    ScheduleLimitExceeded,

    #[error("insufficient_credits")]
    InsufficientCredits,

    #[error("rate limit exceeded")]
    RateLimited {
        limit_rpm: u64,
        remaining_rpm: u64,
        limit_daily: u64,
        remaining_daily: u64,
    },

    #[error("Duplicate request")]
    Debounced,

    #[error("invalid_cron_expression: {0}")]
    InvalidCronExpression(String),

    #[error("sandbox is busy, please retry")]
    SandboxLockTimeout,

    #[error("sandbox creation failed: {0}")]
    SandboxCreation(String),

    #[error("sandbox connection failed: {0}")]
    SandboxConnection(String),

    #[error("sandbox lifecycle error: {0}")]
    SandboxLifecycle(String),

    #[error("sandbox execution failed: {0}")]
    SandboxExecutionFailed(String),

    #[error("unsupported sandbox language: {0}")]
    SandboxLanguageNotSupported(String),

    #[error("sandbox mount error: {0}")]
    SandboxMount(String),

    #[error("execute queue is overloaded")]
    QueueOverloaded,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ControlPlaneError {
    /// The stable machine-readable `error` code in the `{statusCode, message,
    /// error}` wire shape (spec §6/§7).
    pub fn code(&self) -> &'static str {
        match self {
            Self::RequestParams(_) => "REQUEST_PARAMS",
            Self::AuthMissingKey | Self::AuthInvalidToken => "UNAUTHORIZED",
            Self::AuthUserNotFound => "NOT_FOUND",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ScheduleLimitExceeded => "SCHEDULE_LIMIT_EXCEEDED",
            Self::InsufficientCredits => "INSUFFICIENT_CREDITS",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Debounced => "DUPLICATE_REQUEST",
            Self::InvalidCronExpression(_) => "INVALID_CRON_EXPRESSION",
            Self::SandboxLockTimeout => "SANDBOX_LOCK_TIMEOUT",
            Self::SandboxCreation(_) => "SANDBOX_CREATION_FAILED",
            Self::SandboxConnection(_) => "SANDBOX_CONNECTION_FAILED",
            Self::SandboxLifecycle(_) => "SANDBOX_LIFECYCLE_ERROR",
            Self::SandboxExecutionFailed(_) => "SANDBOX_EXECUTION_FAILED",
            Self::SandboxLanguageNotSupported(_) => "SANDBOX_LANGUAGE_NOT_SUPPORTED",
            Self::SandboxMount(_) => "SANDBOX_MOUNT_ERROR",
            Self::QueueOverloaded => "QUEUE_OVERLOADED",
            Self::Database(_) => "INTERNAL",
            Self::Redis(_) => "INTERNAL",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// The HTTP status this error maps to, exposed for callers (e.g. the API
    /// call tracker) that need it without triggering a full response build.
    pub fn http_status_code(&self) -> u16 {
        self.status().as_u16()
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::RequestParams(_) => StatusCode::BAD_REQUEST,
            Self::AuthMissingKey | Self::AuthInvalidToken => StatusCode::UNAUTHORIZED,
            Self::AuthUserNotFound => StatusCode::NOT_FOUND,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ScheduleLimitExceeded | Self::InsufficientCredits => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Debounced => StatusCode::CONFLICT,
            Self::InvalidCronExpression(_) => StatusCode::BAD_REQUEST,
            Self::SandboxLockTimeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::SandboxCreation(_)
            | Self::SandboxConnection(_)
            | Self::SandboxLifecycle(_)
            | Self::SandboxExecutionFailed(_)
            | Self::SandboxLanguageNotSupported(_)
            | Self::SandboxMount(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::QueueOverloaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Redis(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    #[serde(rename = "statusCode")]
    status_code: u16,
    message: String,
    error: &'static str,
}

impl IntoResponse for ControlPlaneError {
    fn into_response(self) -> Response {
        let status = self.status();
        if matches!(
            self,
            Self::Database(_) | Self::Redis(_) | Self::Internal(_)
        ) {
            tracing::error!(error = %self, "internal error");
        }
        let body = ErrorBody {
            status_code: status.as_u16(),
            message: self.to_string(),
            error: self.code(),
        };

        let mut response = (status, axum::Json(body)).into_response();
        if let Self::RateLimited {
            limit_rpm,
            remaining_rpm,
            limit_daily,
            remaining_daily,
        } = self
        {
            let status = crate::ingress::rate_limit::RateLimitStatus {
                limit_rpm,
                remaining_rpm,
                limit_daily,
                remaining_daily,
                allowed: false,
            };
            for (name, value) in crate::ingress::rate_limit::headers(&status).iter() {
                response.headers_mut().insert(name.clone(), value.clone());
            }
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, ControlPlaneError>;
