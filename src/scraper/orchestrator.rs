use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::{load_cookies, BrowserSession, WaitCondition, WindowHandle};
use crate::config::Config;
use crate::error::{CrawlError, Result};
use crate::parser::{Fingerprint, ProductExtractor};
use crate::scraper::pagination::next_batch;
use crate::scraper::recovery::retry_once_on_stale;
use crate::scraper::reply::ReplyActor;
use crate::storage::{DedupStore, Event, EventLog, EventStatus};
use crate::webhooks::InferenceProvider;

/// Counters for one crawl, returned by [`CrawlOrchestrator::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub categories_visited: usize,
    pub categories_abandoned: usize,
    pub items_seen: usize,
    pub items_processed: usize,
    pub items_failed: usize,
    pub duplicates_skipped: usize,
    pub empty_generations: usize,
    pub replies_sent: usize,
}

/// How the detail page of an item was opened.
enum DetailTab {
    /// A new tab; the listing lives on in `listing`.
    New { listing: WindowHandle },
    /// The listing tab itself navigated.
    Same,
}

/// Walks categories and their listings, one item at a time.
///
/// Categories and items are addressed by position and re-resolved on every
/// interaction. An item's fingerprint is claimed and persisted before its
/// detail page is opened, so an item that fails later in the pipeline is not
/// retried on the next run.
pub struct CrawlOrchestrator {
    session: Arc<dyn BrowserSession>,
    config: Config,
    gateway: Arc<dyn InferenceProvider>,
    extractor: ProductExtractor,
    replies: ReplyActor,
    dedup: DedupStore,
    log: EventLog,
    report: CrawlReport,
}

impl CrawlOrchestrator {
    pub fn new(
        session: Arc<dyn BrowserSession>,
        config: Config,
        gateway: Arc<dyn InferenceProvider>,
        dedup: DedupStore,
        log: EventLog,
    ) -> Self {
        let extractor = ProductExtractor::new(
            session.clone(),
            config.selectors.clone(),
            config.timing.clone(),
            config.behavior.clone(),
            log.clone(),
        );
        let replies = ReplyActor::new(
            session.clone(),
            config.selectors.clone(),
            config.timing.clone(),
            log.clone(),
        );

        Self {
            session,
            config,
            gateway,
            extractor,
            replies,
            dedup,
            log,
            report: CrawlReport::default(),
        }
    }

    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    /// Crawl every category once.
    ///
    /// Only a blocked landing page (or failing to reach it) is an error;
    /// everything else degrades to a log entry and a counter.
    pub async fn run(&mut self) -> Result<CrawlReport> {
        self.report = CrawlReport::default();
        self.open_site().await?;

        let categories = match self
            .session
            .wait_for_all(&self.config.selectors.category_cards, self.config.timing.category_wait)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                self.log.record(Event::new("find_categories", EventStatus::Error).message(e));
                0
            }
        };
        info!("Found {} categories", categories);

        for index in 0..categories {
            if let Err(e) = self.crawl_category(index).await {
                if e.is_fatal() {
                    return Err(e);
                }
                self.report.categories_abandoned += 1;
                self.log.record(
                    Event::new("process_category", EventStatus::Fail)
                        .field("category_index", index)
                        .message(e),
                );
            }
        }

        let mut finished = Event::new("crawl_finished", EventStatus::Success);
        if let Value::Object(counters) = serde_json::to_value(&self.report).unwrap_or_default() {
            finished.fields.extend(counters);
        }
        self.log.record(finished);

        Ok(self.report.clone())
    }

    async fn open_site(&self) -> Result<()> {
        let url = self.config.site.base_url.clone();
        self.session.navigate(&url).await?;
        self.check_forbidden(&url).await?;

        if let Some(ref cookie_file) = self.config.site.cookie_file {
            if let Err(e) = load_cookies(self.session.as_ref(), cookie_file, &self.log).await {
                self.log.record(Event::new("load_cookies", EventStatus::Error).message(e));
            }
        }

        self.log.record(Event::new("start_browser", EventStatus::Success).field("url", &url));
        Ok(())
    }

    async fn check_forbidden(&self, url: &str) -> Result<()> {
        let source = self.session.page_source().await?.to_lowercase();
        let blocked = self
            .config
            .site
            .forbidden_markers
            .iter()
            .map(|m| m.trim().to_lowercase())
            .any(|m| !m.is_empty() && source.contains(&m));

        if blocked {
            self.log.record(Event::new("check_forbidden", EventStatus::Error).field("url", url));
            return Err(CrawlError::Forbidden(url.to_string()));
        }

        self.log.record(Event::new("check_forbidden", EventStatus::Success).field("url", url));
        Ok(())
    }

    async fn crawl_category(&mut self, index: usize) -> Result<()> {
        let name = self
            .session
            .text(&self.config.selectors.category_name.at(index + 1), 0)
            .await
            .unwrap_or_else(|e| {
                debug!("No name for category {}: {}", index, e);
                format!("#{}", index + 1)
            });
        info!("Processing category: {}", name);

        let session = &self.session;
        let cards = &self.config.selectors.category_cards;
        let pause = self.config.timing.category_scroll_pause;
        retry_once_on_stale("open_category", || async move {
            session.scroll_into_view(cards, index).await?;
            sleep(pause).await;
            session.click(cards, index).await
        })
        .await?;
        sleep(self.config.timing.after_category_click).await;

        self.report.categories_visited += 1;
        self.log.record(Event::new("open_category", EventStatus::Success).field("category", &name));

        if self.config.behavior.filter_newest {
            self.filter_newest().await;
        }

        self.paginate(&name).await;

        self.session.back().await?;
        sleep(self.config.timing.after_back).await;
        Ok(())
    }

    async fn filter_newest(&self) {
        let button = &self.config.selectors.newest_filter;
        let clicked = async {
            self.session
                .wait_for(button, WaitCondition::Clickable, self.config.timing.filter_wait)
                .await?;
            self.session.click(button, 0).await
        }
        .await;

        match clicked {
            Ok(()) => {
                sleep(self.config.timing.after_filter).await;
                self.log.record(Event::new("click_new_product_button", EventStatus::Success));
            }
            Err(e) => {
                self.log.record(
                    Event::new("click_new_product_button", EventStatus::Fail).message(e),
                );
            }
        }
    }

    async fn paginate(&mut self, category: &str) {
        let items = self.config.selectors.listing_items.clone();
        let mut previous = 0;

        loop {
            sleep(self.config.timing.before_listing_query).await;

            let listed = self.session.wait_for_all(&items, self.config.timing.listing_wait).await;
            let current = match listed {
                Ok(count) => count,
                Err(e) => {
                    debug!("Listing query in {} ended pagination: {}", category, e);
                    break;
                }
            };

            let Some(batch) = next_batch(previous, current) else {
                debug!("Listing in {} stopped growing at {} items", category, current);
                break;
            };
            info!("Category {}: processing items {}..{}", category, batch.start, batch.end);

            for index in batch {
                self.report.items_seen += 1;
                if let Err(e) = self.process_item(index).await {
                    self.report.items_failed += 1;
                    self.log.record(
                        Event::new("process_item", EventStatus::Fail)
                            .field("category", category)
                            .field("item_index", index)
                            .message(e),
                    );
                }
            }
            previous = current;

            if let Err(e) = self.grow_listing().await {
                warn!("Failed to scroll listing in {}: {}", category, e);
            }
        }
    }

    async fn grow_listing(&self) -> Result<()> {
        if self.config.behavior.preload_listing {
            self.session.scroll_to_end(self.config.timing.scroll_to_end_pause).await?;
        }
        self.session.scroll_by(self.config.behavior.scroll_step).await?;
        sleep(self.config.timing.after_grow_scroll).await;
        Ok(())
    }

    async fn process_item(&mut self, index: usize) -> Result<()> {
        let fingerprint = self.fingerprint(index).await?;

        match fingerprint {
            Some(ref fp) if self.dedup.contains(fp) => {
                self.report.duplicates_skipped += 1;
                self.log.record(
                    Event::new("skip_duplicate", EventStatus::Skipped)
                        .field("fingerprint", fp.as_str()),
                );
                return Ok(());
            }
            Some(ref fp) => {
                self.dedup.claim(fp);
                if let Err(e) = self.dedup.flush() {
                    self.log.record(
                        Event::new("save_processed", EventStatus::Error)
                            .field("path", self.dedup.path().display().to_string())
                            .message(e),
                    );
                }
            }
            None => {
                self.log.record(
                    Event::new("get_fingerprint", EventStatus::Warning)
                        .field("item_index", index)
                        .message("item has no image source; processing without dedup"),
                );
            }
        }

        let tab = self.open_detail(index).await?;

        let record = self.extractor.extract().await;
        match self.gateway.submit(&record, self.config.gateway.max_retries).await {
            Some(text) if self.config.behavior.send_replies => {
                if self.replies.reply(&text).await {
                    self.report.replies_sent += 1;
                }
            }
            Some(_) => {
                self.log.record(
                    Event::new("send_message", EventStatus::Skipped)
                        .field("product_name", &record.product_name)
                        .message("replies disabled"),
                );
            }
            None => {
                self.report.empty_generations += 1;
                self.log.record(
                    Event::new("send_message", EventStatus::Skipped)
                        .field("product_name", &record.product_name)
                        .message("no generated text"),
                );
            }
        }
        self.report.items_processed += 1;

        self.close_detail(tab).await
    }

    /// Image source of the item at `index`, re-resolved once if it went stale.
    async fn fingerprint(&self, index: usize) -> Result<Option<Fingerprint>> {
        let session = &self.session;
        let items = &self.config.selectors.listing_items;
        let image = self.config.selectors.listing_image.at(index + 1);
        let image = &image;
        let pause = self.config.timing.after_item_scroll;

        let source = retry_once_on_stale("resolve_item", || async move {
            session.scroll_into_view(items, index).await?;
            sleep(pause).await;
            session.attribute(image, 0, "src").await
        })
        .await?;

        Ok(source.and_then(Fingerprint::new))
    }

    async fn open_detail(&self, index: usize) -> Result<DetailTab> {
        let items = &self.config.selectors.listing_items;
        let listing = self.session.current_window().await?;
        let listing_url = self.session.current_url().await?;
        let before = self.session.window_handles().await?;

        retry_once_on_stale("open_item", || self.session.click(items, index)).await?;
        sleep(self.config.timing.after_item_click).await;

        let after = self.session.window_handles().await?;
        if let Some(handle) = after.iter().filter(|h| !before.contains(h)).last() {
            if let Err(e) = self.session.switch_to(handle).await {
                // the unreachable tab is left open; stay on the listing
                self.session.switch_to(&listing).await?;
                return Err(e);
            }
            self.log.record(
                Event::new("switch_to_new_tab", EventStatus::Success)
                    .field("tab_index", after.len() - 1),
            );
            return Ok(DetailTab::New { listing });
        }

        if self.session.current_url().await? == listing_url {
            return Err(CrawlError::BrowserError(format!(
                "clicking item {} opened neither a tab nor a page",
                index
            )));
        }

        self.log.record(
            Event::new("switch_to_new_tab", EventStatus::Skipped).message("no new tab"),
        );
        Ok(DetailTab::Same)
    }

    async fn close_detail(&self, tab: DetailTab) -> Result<()> {
        match tab {
            DetailTab::New { listing } => {
                let closed = self.session.close_window().await;
                self.session.switch_to(&listing).await?;
                let event = match closed {
                    Ok(()) => Event::new("close_product_tab", EventStatus::Success),
                    // the tab leaks; later items still find their tabs by handle
                    Err(e) => Event::new("close_product_tab", EventStatus::Error).message(e),
                };
                self.log.record(event);
            }
            DetailTab::Same => {
                self.session.back().await?;
                sleep(self.config.timing.after_back).await;
                self.log.record(Event::new("return_to_listing", EventStatus::Success));
            }
        }
        Ok(())
    }
}
