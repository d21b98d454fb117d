//! Configuration surface (spec §6 "Config surface"), loaded the way the
//! reference monorepo's `config.rs` does: `dotenvy::dotenv()` then
//! `std::env::var(...).context(...)` per field, grouped into nested structs
//! per subsystem instead of one flat struct.

use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub log_format: LogFormat,
    pub scheduling: SchedulingConfig,
    pub sandbox: SandboxConfig,
    pub ingress: IngressConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Priority service + schedule-engine quota knobs (spec §4.1, §4.2, §6).
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    pub global_max_concurrent: u32,
    pub rate_limit_max: u32,
    pub rate_limit_duration: Duration,
    pub user_max_concurrent: u32,
    pub user_rate_limit_delay: Duration,
    pub user_concurrent_ttl: Duration,
    pub free_max_active_schedules: u32,
    pub paid_max_active_schedules: u32,
    pub default_priority: u8,
    pub high_load_threshold: u32,
    pub max_priority: u8,
    pub scan_interval: Duration,
    pub scan_lock_ttl: Duration,
}

/// Sandbox wrapper/pool/lock knobs (spec §4.5-4.7, §6).
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub wrapper_type: WrapperType,
    pub template_name: String,
    pub api_key: String,
    pub provider_base_url: String,
    pub sandbox_timeout: Duration,
    pub max_sandboxes: u32,
    pub auto_pause_delay: Duration,
    pub run_code_timeout: Duration,
    pub lock_wait_timeout: Duration,
    pub lock_poll_interval: Duration,
    pub lock_initial_ttl: Duration,
    pub lock_renewal_interval: Duration,
    pub max_queue_size: u32,
    pub code_size_threshold: usize,
    pub truncate_output: usize,
    pub kill_retry_max_attempts: u32,
    pub kill_retry_interval: Duration,
    pub lifecycle_retry_max_attempts: u32,
    pub lifecycle_retry_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperType {
    Executor,
    Interpreter,
}

/// Trigger ingress gate knobs (spec §4.3, §6).
#[derive(Debug, Clone)]
pub struct IngressConfig {
    pub openapi_rpm_limit: u64,
    pub openapi_rpm_ttl: Duration,
    pub openapi_daily_limit: u64,
    pub openapi_daily_ttl: Duration,
    pub webhook_rpm_limit: u64,
    pub webhook_rpm_ttl: Duration,
    pub webhook_daily_limit: u64,
    pub webhook_daily_ttl: Duration,
    pub debounce_ttl: Duration,
    pub webhook_config_cache_ttl: Duration,
}

impl AppConfig {
    /// Loads configuration the way the reference monorepo's `Config::from_env()`
    /// does: `.env` via `dotenvy`, required vars via `std::env::var().context(...)`,
    /// everything else defaulted to the spec's "typical values".
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);
        let log_format = match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            database_url,
            redis_url,
            port,
            log_format,
            scheduling: SchedulingConfig::defaults(),
            sandbox: SandboxConfig::from_env()?,
            ingress: IngressConfig::defaults(),
        })
    }
}

impl SchedulingConfig {
    fn defaults() -> Self {
        Self {
            global_max_concurrent: 200,
            rate_limit_max: 100,
            rate_limit_duration: Duration::from_secs(60),
            user_max_concurrent: 5,
            user_rate_limit_delay: Duration::from_millis(500),
            user_concurrent_ttl: Duration::from_secs(300),
            free_max_active_schedules: 1,
            paid_max_active_schedules: 20,
            default_priority: 10,
            high_load_threshold: 10,
            max_priority: 10,
            scan_interval: Duration::from_secs(60),
            scan_lock_ttl: Duration::from_secs(120),
        }
    }
}

impl SandboxConfig {
    fn from_env() -> Result<Self> {
        let api_key = std::env::var("SANDBOX_API_KEY").context("SANDBOX_API_KEY must be set")?;
        let wrapper_type = match std::env::var("SANDBOX_WRAPPER_TYPE").as_deref() {
            Ok("interpreter") => WrapperType::Interpreter,
            _ => WrapperType::Executor,
        };
        let provider_base_url = std::env::var("SANDBOX_PROVIDER_BASE_URL")
            .context("SANDBOX_PROVIDER_BASE_URL must be set")?;
        Ok(Self {
            wrapper_type,
            template_name: std::env::var("SANDBOX_TEMPLATE_NAME")
                .unwrap_or_else(|_| "refly-executor-slim".to_string()),
            api_key,
            provider_base_url,
            sandbox_timeout: Duration::from_secs(300),
            max_sandboxes: 50,
            auto_pause_delay: Duration::from_secs(60),
            run_code_timeout: Duration::from_secs(120),
            lock_wait_timeout: Duration::from_secs(30),
            lock_poll_interval: Duration::from_millis(100),
            lock_initial_ttl: Duration::from_secs(30),
            lock_renewal_interval: Duration::from_secs(10),
            max_queue_size: 1000,
            code_size_threshold: 8 * 1024,
            truncate_output: 10_000,
            kill_retry_max_attempts: 3,
            kill_retry_interval: Duration::from_secs(5),
            lifecycle_retry_max_attempts: 3,
            lifecycle_retry_interval: Duration::from_millis(500),
        })
    }
}

impl IngressConfig {
    /// `RateLimitWindows` for the `/v1/openapi/workflow/run` surface (spec §4.3).
    pub fn openapi_windows(&self) -> crate::ingress::RateLimitWindows {
        crate::ingress::RateLimitWindows {
            rpm_limit: self.openapi_rpm_limit,
            rpm_ttl: self.openapi_rpm_ttl,
            daily_limit: self.openapi_daily_limit,
            daily_ttl: self.openapi_daily_ttl,
        }
    }

    /// `RateLimitWindows` for the `/v1/openapi/webhook/{id}/run` surface (spec §4.3).
    pub fn webhook_windows(&self) -> crate::ingress::RateLimitWindows {
        crate::ingress::RateLimitWindows {
            rpm_limit: self.webhook_rpm_limit,
            rpm_ttl: self.webhook_rpm_ttl,
            daily_limit: self.webhook_daily_limit,
            daily_ttl: self.webhook_daily_ttl,
        }
    }

    fn defaults() -> Self {
        Self {
            openapi_rpm_limit: 100,
            openapi_rpm_ttl: Duration::from_secs(60),
            openapi_daily_limit: 10_000,
            openapi_daily_ttl: Duration::from_secs(86_400),
            webhook_rpm_limit: 100,
            webhook_rpm_ttl: Duration::from_secs(60),
            webhook_daily_limit: 10_000,
            webhook_daily_ttl: Duration::from_secs(86_400),
            debounce_ttl: Duration::from_secs(1),
            webhook_config_cache_ttl: Duration::from_secs(300),
        }
    }
}
