pub mod auth;
pub mod debounce;
pub mod rate_limit;
pub mod webhook_cache;

pub use auth::{authenticate, ApiKeyValidator};
pub use rate_limit::{RateLimitStatus, RateLimitWindows};
