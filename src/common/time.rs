//! Small time helpers shared by the schedule engine and lock renewal timers.

use chrono::{DateTime, Utc};

/// The instant "now" as recorded by this process, exposed as a function so
/// call sites read as `now()` rather than `Utc::now()` scattered everywhere —
/// matches the teacher's convention of centralizing the one non-deterministic
/// clock read.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// `true` if `instant` is at or before `now`, i.e. "due".
pub fn is_due(instant: DateTime<Utc>) -> bool {
    instant <= now()
}
