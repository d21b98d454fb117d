pub mod entity_ids;
pub mod id;
pub mod redact;
pub mod time;

pub use entity_ids::*;
pub use id::{Id, IdPrefix, PrefixedId, V4, V7};
