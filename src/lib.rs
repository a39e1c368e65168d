pub mod browser;
pub mod config;
pub mod error;
pub mod parser;
pub mod scraper;
pub mod storage;
pub mod webhooks;

pub use browser::{BrowserManager, BrowserSession};
pub use config::Config;
pub use error::{CrawlError, Result};
pub use scraper::{CrawlOrchestrator, CrawlReport};
