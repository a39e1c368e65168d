use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::browser::locator::{KeyChord, Locator, WaitCondition, WindowHandle};
use crate::error::Result;

/// One live browser-automation session.
///
/// Elements are always addressed as `(locator, index)` and resolved inside each
/// call, so no element reference outlives a single operation. Callers recover
/// from a [`CrawlError::StaleElement`](crate::error::CrawlError::StaleElement)
/// by simply repeating the call.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn back(&self) -> Result<()>;

    async fn reload(&self) -> Result<()>;

    async fn page_source(&self) -> Result<String>;

    async fn current_url(&self) -> Result<String>;

    /// Number of elements currently matching `locator`.
    async fn count(&self, locator: &Locator) -> Result<usize>;

    /// Wait until at least one element matches and return how many do.
    async fn wait_for_all(&self, locator: &Locator, timeout: Duration) -> Result<usize>;

    /// Wait until the first element matching `locator` satisfies `condition`.
    async fn wait_for(
        &self,
        locator: &Locator,
        condition: WaitCondition,
        timeout: Duration,
    ) -> Result<()>;

    async fn text(&self, locator: &Locator, index: usize) -> Result<String>;

    async fn texts(&self, locator: &Locator) -> Result<Vec<String>>;

    async fn attribute(
        &self,
        locator: &Locator,
        index: usize,
        name: &str,
    ) -> Result<Option<String>>;

    async fn scroll_into_view(&self, locator: &Locator, index: usize) -> Result<()>;

    async fn click(&self, locator: &Locator, index: usize) -> Result<()>;

    /// Click through a script call, bypassing overlapping elements.
    async fn js_click(&self, locator: &Locator, index: usize) -> Result<()>;

    /// Focus the element and insert `text` at the caret.
    async fn type_text(&self, locator: &Locator, index: usize, text: &str) -> Result<()>;

    /// Dispatch a key chord to the focused element.
    async fn press(&self, chord: KeyChord) -> Result<()>;

    async fn scroll_by(&self, dy: i64) -> Result<()>;

    /// Scroll to the bottom until the document height stops growing.
    async fn scroll_to_end(&self, pause: Duration) -> Result<()>;

    async fn window_handles(&self) -> Result<Vec<WindowHandle>>;

    async fn current_window(&self) -> Result<WindowHandle>;

    async fn switch_to(&self, handle: &WindowHandle) -> Result<()>;

    /// Close the current tab. The caller must switch to another handle afterwards.
    async fn close_window(&self) -> Result<()>;

    /// Inject one cookie. Keys are the cookie-file keys (`name`, `value`, `domain`, ...).
    async fn add_cookie(&self, cookie: &Map<String, Value>) -> Result<()>;

    async fn quit(&self) -> Result<()>;
}
