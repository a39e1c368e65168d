pub mod dedup;
pub mod event_log;

pub use dedup::DedupStore;
pub use event_log::{Event, EventLog, EventStatus};
