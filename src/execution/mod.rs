//! Execute lock discipline, the Scalebox execute pipeline, and the
//! execution-record projector (spec §4.6-4.8, components C6-C7).

pub mod lock;
pub mod pipeline;
pub mod projector;

pub use lock::ExecuteLockGuard;
pub use pipeline::{ExecuteRequest, ExecuteResponse, ScaleboxService};
pub use projector::ExecutionRecordProjector;
