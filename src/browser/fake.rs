//! Scripted in-memory catalog site for driving the pipeline in tests.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::browser::locator::{KeyChord, Locator, WaitCondition, WindowHandle};
use crate::browser::session::BrowserSession;
use crate::config::Selectors;
use crate::error::{CrawlError, Result};

pub(crate) const BASE_URL: &str = "https://shop.test/";

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeItem {
    pub image: Option<String>,
    pub texts: HashMap<Locator, String>,
    pub breadcrumbs: Vec<String>,
    pub phone: Option<String>,
    pub has_chat: bool,
}

impl FakeItem {
    /// An item whose detail page has every field.
    pub fn complete(n: usize) -> Self {
        let selectors = Selectors::default();
        let mut texts = HashMap::new();
        texts.insert(selectors.product_name, format!("Product {}", n));
        texts.insert(selectors.seller_name, format!("Seller {}", n));
        texts.insert(selectors.location, "استان فارس - شهر کازرون".to_string());
        texts.insert(selectors.price, format!("{}000 Toman", n));
        texts.insert(selectors.description, format!("Description of product {}", n));

        Self {
            image: Some(format!("https://cdn.shop.test/{}.jpg", n)),
            texts,
            breadcrumbs: vec!["Livestock".to_string(), "Cattle".to_string()],
            phone: None,
            has_chat: true,
        }
    }

    pub fn without(mut self, locator: &Locator) -> Self {
        self.texts.remove(locator);
        self
    }

    pub fn with_text(mut self, locator: &Locator, text: &str) -> Self {
        self.texts.insert(locator.clone(), text.to_string());
        self
    }

    pub fn with_breadcrumbs(mut self, crumbs: Vec<&str>) -> Self {
        self.breadcrumbs = crumbs.into_iter().map(String::from).collect();
        self
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }

    pub fn without_image(mut self) -> Self {
        self.image = None;
        self
    }

    pub fn without_chat(mut self) -> Self {
        self.has_chat = false;
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeCategory {
    pub name: String,
    pub items: Vec<FakeItem>,
    /// Item count returned by successive listing queries; the last one repeats.
    pub reveal: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeCatalog {
    pub categories: Vec<FakeCategory>,
    pub source: String,
    pub opens_new_tab: bool,
    pub has_newest_filter: bool,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self {
            categories: Vec::new(),
            source: "<html><body>catalog</body></html>".to_string(),
            opens_new_tab: false,
            has_newest_filter: true,
        }
    }

    pub fn category(mut self, name: &str, items: Vec<FakeItem>, reveal: Vec<usize>) -> Self {
        self.categories.push(FakeCategory {
            name: name.to_string(),
            items,
            reveal,
        });
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn opening_new_tabs(mut self) -> Self {
        self.opens_new_tab = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum View {
    Blank,
    Home,
    Listing(usize),
    Detail(usize, usize),
}

#[derive(Debug, Clone)]
pub(crate) struct Tab {
    pub handle: WindowHandle,
    pub view: View,
    pub history: Vec<View>,
}

#[derive(Debug)]
pub(crate) struct FakeState {
    pub catalog: FakeCatalog,
    pub selectors: Selectors,
    pub tabs: Vec<Tab>,
    pub current: usize,
    next_handle: usize,
    /// Listing queries issued per category.
    pub listing_queries: HashMap<usize, usize>,
    /// `(locator, index)` clicks that fail as stale this many more times.
    pub stale_clicks: HashMap<(String, usize), u32>,
    pub failing_cookies: HashSet<String>,
    /// Upcoming `close_window` / `switch_to` calls that fail.
    pub failing_closes: u32,
    pub failing_switches: u32,
    pub phone_revealed: bool,
    pub chat_open: bool,
    pub navigations: Vec<String>,
    pub clicks: Vec<String>,
    pub typed: Vec<String>,
    pub chords: Vec<KeyChord>,
    pub cookies: Vec<String>,
    pub opened_details: Vec<(usize, usize)>,
    pub reloads: usize,
    pub scrolls: usize,
    pub closed_windows: usize,
    pub quit: bool,
}

pub(crate) struct FakeSession {
    state: Mutex<FakeState>,
}

impl FakeSession {
    pub fn new(catalog: FakeCatalog) -> Self {
        Self {
            state: Mutex::new(FakeState {
                catalog,
                selectors: Selectors::default(),
                tabs: vec![Tab {
                    handle: WindowHandle("tab-0".to_string()),
                    view: View::Blank,
                    history: Vec::new(),
                }],
                current: 0,
                next_handle: 1,
                listing_queries: HashMap::new(),
                stale_clicks: HashMap::new(),
                failing_cookies: HashSet::new(),
                failing_closes: 0,
                failing_switches: 0,
                phone_revealed: false,
                chat_open: false,
                navigations: Vec::new(),
                clicks: Vec::new(),
                typed: Vec::new(),
                chords: Vec::new(),
                cookies: Vec::new(),
                opened_details: Vec::new(),
                reloads: 0,
                scrolls: 0,
                closed_windows: 0,
                quit: false,
            }),
        }
    }

    /// A session already showing the detail page of item `item` in `category`.
    pub fn on_detail(catalog: FakeCatalog, category: usize, item: usize) -> Self {
        let session = Self::new(catalog);
        session.state().tabs[0].view = View::Detail(category, item);
        session
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn fail_click_as_stale(&self, locator: &Locator, index: usize, times: u32) {
        self.state().stale_clicks.insert((locator.to_string(), index), times);
    }

    pub fn fail_closes(&self, times: u32) {
        self.state().failing_closes = times;
    }

    pub fn fail_switches(&self, times: u32) {
        self.state().failing_switches = times;
    }

    pub fn fail_cookie(&self, name: &str) {
        self.state().failing_cookies.insert(name.to_string());
    }
}

impl FakeState {
    fn view(&self) -> View {
        self.tabs[self.current].view
    }

    fn go(&mut self, view: View) {
        let tab = &mut self.tabs[self.current];
        let previous = tab.view;
        tab.history.push(previous);
        tab.view = view;
        self.phone_revealed = false;
        self.chat_open = false;
    }

    fn revealed(&self, category: usize) -> usize {
        let cat = &self.catalog.categories[category];
        let queries = self.listing_queries.get(&category).copied().unwrap_or(0);
        if queries == 0 || cat.reveal.is_empty() {
            return 0;
        }
        let step = (queries - 1).min(cat.reveal.len() - 1);
        cat.reveal[step].min(cat.items.len())
    }

    fn item(&self, category: usize, item: usize) -> &FakeItem {
        &self.catalog.categories[category].items[item]
    }

    /// 1-based position encoded in a templated locator, if it matches.
    fn position_in(template: &Locator, locator: &Locator, upto: usize) -> Option<usize> {
        (1..=upto).find(|p| &template.at(*p) == locator)
    }

    fn count(&self, locator: &Locator) -> usize {
        let s = &self.selectors;
        match self.view() {
            View::Blank => 0,
            View::Home => {
                let categories = self.catalog.categories.len();
                if locator == &s.category_cards {
                    categories
                } else if Self::position_in(&s.category_name, locator, categories).is_some() {
                    1
                } else {
                    0
                }
            }
            View::Listing(c) => {
                let revealed = self.revealed(c);
                if locator == &s.listing_items {
                    revealed
                } else if locator == &s.newest_filter {
                    usize::from(self.catalog.has_newest_filter)
                } else if let Some(p) = Self::position_in(&s.listing_image, locator, revealed) {
                    usize::from(self.item(c, p - 1).image.is_some())
                } else {
                    0
                }
            }
            View::Detail(c, i) => {
                let item = self.item(c, i);
                if locator == &s.breadcrumbs {
                    item.breadcrumbs.len()
                } else if locator == &s.phone_button {
                    usize::from(item.phone.is_some())
                } else if locator == &s.phone_number {
                    usize::from(item.phone.is_some() && self.phone_revealed)
                } else if locator == &s.chat_button {
                    usize::from(item.has_chat)
                } else if locator == &s.chat_box {
                    usize::from(self.chat_open)
                } else {
                    usize::from(item.texts.contains_key(locator))
                }
            }
        }
    }

    fn require(&self, locator: &Locator, index: usize) -> Result<()> {
        let n = self.count(locator);
        if index < n {
            Ok(())
        } else {
            Err(CrawlError::ElementNotFound(format!("{} #{} ({} matched)", locator, index, n)))
        }
    }

    fn text(&self, locator: &Locator, index: usize) -> Result<String> {
        self.require(locator, index)?;
        let s = &self.selectors;
        match self.view() {
            View::Home => {
                let categories = self.catalog.categories.len();
                let p = Self::position_in(&s.category_name, locator, categories)
                    .ok_or_else(|| CrawlError::ElementNotFound(locator.to_string()))?;
                Ok(self.catalog.categories[p - 1].name.clone())
            }
            View::Detail(c, i) => {
                let item = self.item(c, i);
                if locator == &s.phone_number {
                    return Ok(item.phone.clone().unwrap_or_default());
                }
                if locator == &s.breadcrumbs {
                    return Ok(item.breadcrumbs[index].clone());
                }
                item.texts
                    .get(locator)
                    .cloned()
                    .ok_or_else(|| CrawlError::ElementNotFound(locator.to_string()))
            }
            _ => Err(CrawlError::ElementNotFound(locator.to_string())),
        }
    }

    fn url(&self) -> String {
        match self.view() {
            View::Blank => "about:blank".to_string(),
            View::Home => BASE_URL.to_string(),
            View::Listing(c) => format!("{}category/{}", BASE_URL, c),
            View::Detail(c, i) => format!("{}item/{}/{}", BASE_URL, c, i),
        }
    }
}

fn timeout_error(locator: &Locator) -> CrawlError {
    CrawlError::Timeout {
        what: locator.to_string(),
        timeout: Duration::ZERO,
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state();
        state.navigations.push(url.to_string());
        let current = state.current;
        state.tabs[current].history.clear();
        state.tabs[current].view = View::Home;
        Ok(())
    }

    async fn back(&self) -> Result<()> {
        let mut state = self.state();
        let current = state.current;
        if let Some(previous) = state.tabs[current].history.pop() {
            state.tabs[current].view = previous;
        }
        state.chat_open = false;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.state().reloads += 1;
        Ok(())
    }

    async fn page_source(&self) -> Result<String> {
        let state = self.state();
        match state.view() {
            View::Home => Ok(state.catalog.source.clone()),
            _ => Ok("<html><body></body></html>".to_string()),
        }
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state().url())
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        Ok(self.state().count(locator))
    }

    async fn wait_for_all(&self, locator: &Locator, _timeout: Duration) -> Result<usize> {
        let mut state = self.state();
        if let View::Listing(c) = state.view() {
            if locator == &state.selectors.listing_items {
                *state.listing_queries.entry(c).or_insert(0) += 1;
            }
        }
        match state.count(locator) {
            0 => Err(timeout_error(locator)),
            n => Ok(n),
        }
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        _condition: WaitCondition,
        _timeout: Duration,
    ) -> Result<()> {
        match self.state().count(locator) {
            0 => Err(timeout_error(locator)),
            _ => Ok(()),
        }
    }

    async fn text(&self, locator: &Locator, index: usize) -> Result<String> {
        self.state().text(locator, index)
    }

    async fn texts(&self, locator: &Locator) -> Result<Vec<String>> {
        let state = self.state();
        (0..state.count(locator)).map(|i| state.text(locator, i)).collect()
    }

    async fn attribute(
        &self,
        locator: &Locator,
        index: usize,
        name: &str,
    ) -> Result<Option<String>> {
        let state = self.state();
        state.require(locator, index)?;
        if name != "src" {
            return Ok(None);
        }
        match state.view() {
            View::Listing(c) => {
                let revealed = state.revealed(c);
                let p = FakeState::position_in(&state.selectors.listing_image, locator, revealed)
                    .ok_or_else(|| CrawlError::ElementNotFound(locator.to_string()))?;
                Ok(state.item(c, p - 1).image.clone())
            }
            _ => Ok(None),
        }
    }

    async fn scroll_into_view(&self, locator: &Locator, index: usize) -> Result<()> {
        let mut state = self.state();
        state.require(locator, index)?;
        state.scrolls += 1;
        Ok(())
    }

    async fn click(&self, locator: &Locator, index: usize) -> Result<()> {
        let mut state = self.state();

        let key = (locator.to_string(), index);
        if let Some(remaining) = state.stale_clicks.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CrawlError::StaleElement(format!("{} #{}", locator, index)));
            }
        }

        state.require(locator, index)?;
        state.clicks.push(format!("{} #{}", locator, index));

        let s = state.selectors.clone();
        match state.view() {
            View::Home if locator == &s.category_cards => state.go(View::Listing(index)),
            View::Listing(c) if locator == &s.listing_items => {
                state.opened_details.push((c, index));
                if state.catalog.opens_new_tab {
                    let handle = WindowHandle(format!("tab-{}", state.next_handle));
                    state.next_handle += 1;
                    state.tabs.push(Tab {
                        handle,
                        view: View::Detail(c, index),
                        history: Vec::new(),
                    });
                } else {
                    state.go(View::Detail(c, index));
                }
            }
            View::Detail(..) if locator == &s.phone_button => state.phone_revealed = true,
            _ => {}
        }
        Ok(())
    }

    async fn js_click(&self, locator: &Locator, index: usize) -> Result<()> {
        let mut state = self.state();
        state.require(locator, index)?;
        state.clicks.push(format!("js {} #{}", locator, index));
        if locator == &state.selectors.chat_button {
            state.chat_open = true;
        }
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, index: usize, text: &str) -> Result<()> {
        let mut state = self.state();
        state.require(locator, index)?;
        state.typed.push(text.to_string());
        Ok(())
    }

    async fn press(&self, chord: KeyChord) -> Result<()> {
        self.state().chords.push(chord);
        Ok(())
    }

    async fn scroll_by(&self, _dy: i64) -> Result<()> {
        self.state().scrolls += 1;
        Ok(())
    }

    async fn scroll_to_end(&self, _pause: Duration) -> Result<()> {
        self.state().scrolls += 1;
        Ok(())
    }

    async fn window_handles(&self) -> Result<Vec<WindowHandle>> {
        Ok(self.state().tabs.iter().map(|t| t.handle.clone()).collect())
    }

    async fn current_window(&self) -> Result<WindowHandle> {
        let state = self.state();
        Ok(state.tabs[state.current].handle.clone())
    }

    async fn switch_to(&self, handle: &WindowHandle) -> Result<()> {
        let mut state = self.state();
        if state.failing_switches > 0 {
            state.failing_switches -= 1;
            return Err(CrawlError::BrowserError(format!("Target {} is gone", handle)));
        }
        let index = state
            .tabs
            .iter()
            .position(|t| &t.handle == handle)
            .ok_or_else(|| {
                CrawlError::BrowserError(format!("No window with handle {}", handle))
            })?;
        state.current = index;
        Ok(())
    }

    async fn close_window(&self) -> Result<()> {
        let mut state = self.state();
        if state.failing_closes > 0 {
            state.failing_closes -= 1;
            return Err(CrawlError::BrowserError("Target.closeTarget failed".to_string()));
        }
        if state.tabs.len() == 1 {
            return Err(CrawlError::BrowserError("refusing to close the last tab".to_string()));
        }
        let current = state.current;
        state.tabs.remove(current);
        state.current = 0;
        state.closed_windows += 1;
        Ok(())
    }

    async fn add_cookie(&self, cookie: &Map<String, Value>) -> Result<()> {
        let mut state = self.state();
        let name = cookie
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| CrawlError::ParseError("cookie without name".to_string()))?
            .to_string();
        if state.failing_cookies.contains(&name) {
            return Err(CrawlError::BrowserError(format!("Invalid cookie {}", name)));
        }
        state.cookies.push(name);
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        self.state().quit = true;
        Ok(())
    }
}
