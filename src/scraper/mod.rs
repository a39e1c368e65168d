pub mod orchestrator;
pub mod pagination;
pub mod recovery;
pub mod reply;


pub use orchestrator::{CrawlOrchestrator, CrawlReport};
pub use pagination::next_batch;
pub use recovery::retry_once_on_stale;
pub use reply::ReplyActor;
