//! API call tracking (spec §3 `ApiCallRecord`, component C8): redacted audit
//! rows for every inbound trigger HTTP call, immutable after creation.

pub mod model;
pub mod service;

pub use model::ApiCallRecord;
pub use service::ApiCallTracker;
