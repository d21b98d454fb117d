//! Background service tasks (spec `[AMBIENT] Graceful shutdown & service
//! runtime`): the schedule scanner and the three queue consumers, all bound
//! to one shared `tokio_util::sync::CancellationToken` and driven by
//! `main.rs`.

pub mod sandbox_kill;
pub mod sandbox_pause;
pub mod scalebox_execute;
pub mod schedule_execute;
pub mod schedule_scanner;
pub mod service_host;

pub use service_host::{run_until_shutdown, Service};
