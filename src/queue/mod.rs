pub mod model;
pub mod store;

pub use model::{ExecuteScheduledWorkflowPayload, JobState, Priority, QueueName, QueuedJob};
pub use store::{EnqueueOptions, EnqueueResult, JobQueue, PostgresJobQueue};
