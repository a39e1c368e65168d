use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, InsertTextParams,
};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::browser::locator::{KeyChord, Locator, WaitCondition, WindowHandle};
use crate::browser::session::BrowserSession;
use crate::error::{CrawlError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

// Shift modifier bit of Input.dispatchKeyEvent.
const MODIFIER_SHIFT: i64 = 8;

const IS_VISIBLE_FN: &str = "function() { \
    const r = this.getBoundingClientRect(); \
    const s = window.getComputedStyle(this); \
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }";

const IS_CLICKABLE_FN: &str = "function() { \
    const r = this.getBoundingClientRect(); \
    const s = window.getComputedStyle(this); \
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none' \
    && !this.disabled; }";

const SCROLL_CENTER_FN: &str =
    "function() { this.scrollIntoView({behavior: 'smooth', block: 'center'}); }";

const JS_CLICK_FN: &str = "function() { this.click(); }";

/// [`BrowserSession`] backed by a chromiumoxide browser.
///
/// The "current window" is the page all calls are routed to; switching tabs
/// swaps it for another page of the same browser.
pub struct ChromiumSession {
    browser: Mutex<Browser>,
    current: RwLock<Page>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumSession {
    pub fn new(browser: Browser, page: Page, handler_task: JoinHandle<()>) -> Self {
        Self {
            browser: Mutex::new(browser),
            current: RwLock::new(page),
            handler_task: Mutex::new(Some(handler_task)),
        }
    }

    async fn page(&self) -> Page {
        self.current.read().await.clone()
    }

    async fn resolve_all(&self, locator: &Locator) -> Result<Vec<Element>> {
        let page = self.page().await;
        let found = match locator {
            Locator::Css(selector) => page.find_elements(selector.as_str()).await,
            Locator::XPath(expression) => page.find_xpaths(expression.as_str()).await,
        };

        match found {
            Ok(elements) => Ok(elements),
            Err(CdpError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve(&self, locator: &Locator, index: usize) -> Result<Element> {
        let mut elements = self.resolve_all(locator).await?;
        if index >= elements.len() {
            return Err(CrawlError::ElementNotFound(format!(
                "{} #{} ({} matched)",
                locator,
                index,
                elements.len()
            )));
        }
        Ok(elements.swap_remove(index))
    }

    async fn eval_bool(element: &Element, function: &str) -> Result<bool> {
        let returns = element.call_js_fn(function, false).await?;
        Ok(returns.result.value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn condition_met(&self, locator: &Locator, condition: WaitCondition) -> Result<bool> {
        let elements = self.resolve_all(locator).await?;
        let Some(first) = elements.first() else {
            return Ok(false);
        };

        match condition {
            WaitCondition::Present => Ok(true),
            WaitCondition::Visible => Self::eval_bool(first, IS_VISIBLE_FN).await,
            WaitCondition::Clickable => Self::eval_bool(first, IS_CLICKABLE_FN).await,
        }
    }

    async fn scroll_height(&self) -> Result<u64> {
        let page = self.page().await;
        let height: u64 = page.evaluate("document.body.scrollHeight").await?.into_value()?;
        Ok(height)
    }

    async fn dispatch_key(&self, kind: DispatchKeyEventType, modifiers: i64) -> Result<()> {
        let params = DispatchKeyEventParams::builder()
            .r#type(kind)
            .modifiers(modifiers)
            .key("Enter")
            .code("Enter")
            .text("\r")
            .windows_virtual_key_code(13)
            .native_virtual_key_code(13)
            .build()
            .map_err(|e| CrawlError::BrowserError(format!("Failed to build key event: {}", e)))?;

        self.page().await.execute(params).await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        info!("Navigating to {}", url);
        self.page()
            .await
            .goto(url)
            .await
            .map_err(|e| {
                CrawlError::BrowserError(format!("Failed to navigate to {}: {}", url, e))
            })?;
        Ok(())
    }

    async fn back(&self) -> Result<()> {
        self.page().await.evaluate("window.history.back()").await?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.page().await.reload().await?;
        Ok(())
    }

    async fn page_source(&self) -> Result<String> {
        Ok(self.page().await.content().await?)
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page().await.url().await?.unwrap_or_default())
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        Ok(self.resolve_all(locator).await?.len())
    }

    async fn wait_for_all(&self, locator: &Locator, limit: Duration) -> Result<usize> {
        let poll = async {
            loop {
                match self.count(locator).await {
                    Ok(n) if n > 0 => return n,
                    Ok(_) => {}
                    Err(e) => debug!("Polling {} failed: {}", locator, e),
                }
                sleep(POLL_INTERVAL).await;
            }
        };

        timeout(limit, poll).await.map_err(|_| CrawlError::Timeout {
            what: locator.to_string(),
            timeout: limit,
        })
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        condition: WaitCondition,
        limit: Duration,
    ) -> Result<()> {
        let poll = async {
            loop {
                match self.condition_met(locator, condition).await {
                    Ok(true) => return,
                    Ok(false) => {}
                    Err(e) => debug!("Polling {} for {:?} failed: {}", locator, condition, e),
                }
                sleep(POLL_INTERVAL).await;
            }
        };

        timeout(limit, poll).await.map_err(|_| CrawlError::Timeout {
            what: format!("{} to be {:?}", locator, condition).to_lowercase(),
            timeout: limit,
        })
    }

    async fn text(&self, locator: &Locator, index: usize) -> Result<String> {
        let element = self.resolve(locator, index).await?;
        Ok(element.inner_text().await?.unwrap_or_default().trim().to_string())
    }

    async fn texts(&self, locator: &Locator) -> Result<Vec<String>> {
        let mut texts = Vec::new();
        for element in self.resolve_all(locator).await? {
            texts.push(element.inner_text().await?.unwrap_or_default().trim().to_string());
        }
        Ok(texts)
    }

    async fn attribute(
        &self,
        locator: &Locator,
        index: usize,
        name: &str,
    ) -> Result<Option<String>> {
        let element = self.resolve(locator, index).await?;
        Ok(element.attribute(name).await?)
    }

    async fn scroll_into_view(&self, locator: &Locator, index: usize) -> Result<()> {
        let element = self.resolve(locator, index).await?;
        element.call_js_fn(SCROLL_CENTER_FN, false).await?;
        Ok(())
    }

    async fn click(&self, locator: &Locator, index: usize) -> Result<()> {
        let element = self.resolve(locator, index).await?;
        element.click().await?;
        Ok(())
    }

    async fn js_click(&self, locator: &Locator, index: usize) -> Result<()> {
        let element = self.resolve(locator, index).await?;
        element.call_js_fn(JS_CLICK_FN, false).await?;
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, index: usize, text: &str) -> Result<()> {
        let element = self.resolve(locator, index).await?;
        element.focus().await?;
        // insertText handles characters that have no key definition.
        self.page().await.execute(InsertTextParams::new(text)).await?;
        Ok(())
    }

    async fn press(&self, chord: KeyChord) -> Result<()> {
        let modifiers = match chord {
            KeyChord::Enter => 0,
            KeyChord::ShiftEnter => MODIFIER_SHIFT,
        };
        self.dispatch_key(DispatchKeyEventType::KeyDown, modifiers).await?;
        self.dispatch_key(DispatchKeyEventType::KeyUp, modifiers).await
    }

    async fn scroll_by(&self, dy: i64) -> Result<()> {
        self.page()
            .await
            .evaluate(format!("window.scrollBy(0, {});", dy))
            .await?;
        Ok(())
    }

    async fn scroll_to_end(&self, pause: Duration) -> Result<()> {
        let mut last_height = self.scroll_height().await?;

        loop {
            self.page()
                .await
                .evaluate("window.scrollTo(0, document.body.scrollHeight);")
                .await?;
            sleep(pause).await;

            let new_height = self.scroll_height().await?;

            // nudge so sticky elements stop overlapping the last rows
            self.scroll_by(-50).await?;
            sleep(Duration::from_millis(200)).await;
            self.scroll_by(50).await?;
            sleep(Duration::from_millis(200)).await;

            if new_height == last_height {
                break;
            }
            last_height = new_height;
        }

        debug!("Scrolled to end of document at height {}", last_height);
        Ok(())
    }

    async fn window_handles(&self) -> Result<Vec<WindowHandle>> {
        let browser = self.browser.lock().await;
        let pages = browser.pages().await?;
        Ok(pages
            .iter()
            .map(|page| WindowHandle(page.target_id().inner().clone()))
            .collect())
    }

    async fn current_window(&self) -> Result<WindowHandle> {
        Ok(WindowHandle(self.page().await.target_id().inner().clone()))
    }

    async fn switch_to(&self, handle: &WindowHandle) -> Result<()> {
        let pages = self.browser.lock().await.pages().await?;
        let page = pages
            .into_iter()
            .find(|page| page.target_id().inner() == &handle.0)
            .ok_or_else(|| CrawlError::BrowserError(format!("No window with handle {}", handle)))?;

        page.bring_to_front().await?;
        *self.current.write().await = page;
        debug!("Switched to window {}", handle);
        Ok(())
    }

    async fn close_window(&self) -> Result<()> {
        let page = self.page().await;
        page.close().await?;
        Ok(())
    }

    async fn add_cookie(&self, cookie: &Map<String, Value>) -> Result<()> {
        let field = |key: &str| cookie.get(key).and_then(Value::as_str);

        let missing = |key: &str| CrawlError::ParseError(format!("cookie without {}", key));
        let name = field("name").ok_or_else(|| missing("name"))?;
        let value = field("value").ok_or_else(|| missing("value"))?;

        let mut builder = CookieParam::builder().name(name).value(value);
        match field("domain") {
            Some(domain) => builder = builder.domain(domain),
            None => builder = builder.url(self.current_url().await?),
        }
        if let Some(path) = field("path") {
            builder = builder.path(path);
        }
        if let Some(secure) = cookie.get("secure").and_then(Value::as_bool) {
            builder = builder.secure(secure);
        }
        if let Some(http_only) = cookie.get("httpOnly").and_then(Value::as_bool) {
            builder = builder.http_only(http_only);
        }

        let param = builder
            .build()
            .map_err(|e| CrawlError::BrowserError(format!("Invalid cookie {}: {}", name, e)))?;

        self.page().await.set_cookie(param).await?;
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        info!("Closing browser session");
        let mut browser = self.browser.lock().await;

        if let Err(e) = browser.close().await {
            warn!("Browser close command failed: {}", e);
        }
        browser
            .wait()
            .await
            .map_err(|e| {
                CrawlError::BrowserError(format!("Failed waiting for browser exit: {}", e))
            })?;

        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }
}
