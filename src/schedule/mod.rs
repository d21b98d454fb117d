pub mod cron;
pub mod engine;
pub mod model;
pub mod quota;

pub use engine::ScheduleEngine;
pub use model::{Schedule, ScheduleRecord, ScheduleRecordStatus};
