use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::browser::{BrowserSession, Locator, WaitCondition};
use crate::config::{BehaviorConfig, PhonePolicy, Selectors, Timing};
use crate::error::Result;
use crate::parser::location::parse_location;
use crate::parser::ProductRecord;
use crate::storage::{Event, EventLog, EventStatus};

/// Reads a [`ProductRecord`] off the detail page the session is showing.
///
/// Each field has its own bounded wait. A field that does not show up in
/// time stays empty and an event is logged; extraction itself never fails.
pub struct ProductExtractor {
    session: Arc<dyn BrowserSession>,
    selectors: Selectors,
    timing: Timing,
    behavior: BehaviorConfig,
    log: EventLog,
}

impl ProductExtractor {
    pub fn new(
        session: Arc<dyn BrowserSession>,
        selectors: Selectors,
        timing: Timing,
        behavior: BehaviorConfig,
        log: EventLog,
    ) -> Self {
        Self {
            session,
            selectors,
            timing,
            behavior,
            log,
        }
    }

    pub async fn extract(&self) -> ProductRecord {
        sleep(self.timing.detail_settle).await;

        let mut record = ProductRecord::default();

        let title = self
            .wait_text(&self.selectors.product_name, WaitCondition::Present, self.timing.title_wait)
            .await;
        record.product_name = self.keep("get_product_name", "product_name", title);

        let seller = self
            .wait_text(&self.selectors.seller_name, WaitCondition::Visible, self.timing.field_wait)
            .await;
        record.seller_name = self.keep("get_seller_name", "seller_name", seller);

        if let Some((state, city)) = self.location().await {
            record.state = state;
            record.city = city;
        }

        let price = self
            .wait_text(&self.selectors.price, WaitCondition::Present, self.timing.price_wait)
            .await;
        record.price = self.keep("get_price", "price", price);

        let link = self.session.current_url().await;
        record.link = self.keep("get_link", "link", link);

        record.phone = self.phone().await;

        let description = self.description().await;
        record.description = self.keep("get_description", "description", description);

        if let Some((category, sub_category)) = self.categories().await {
            record.category = category;
            record.sub_category = sub_category;
        }

        debug!("Extracted record for {:?}", record.product_name);
        record
    }

    async fn wait_text(
        &self,
        locator: &Locator,
        condition: WaitCondition,
        wait: Duration,
    ) -> Result<String> {
        self.session.wait_for(locator, condition, wait).await?;
        self.session.text(locator, 0).await
    }

    /// Log the outcome of one field and fall back to an empty value.
    fn keep(&self, action: &str, key: &str, outcome: Result<String>) -> String {
        match outcome {
            Ok(value) => {
                self.log.record(Event::new(action, EventStatus::Success).field(key, &value));
                value
            }
            Err(e) => {
                self.log.record(
                    Event::new(action, EventStatus::Skipped).field("field", key).message(e),
                );
                String::new()
            }
        }
    }

    async fn location(&self) -> Option<(String, String)> {
        let raw = self
            .wait_text(&self.selectors.location, WaitCondition::Present, self.timing.field_wait)
            .await;

        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                self.log.record(Event::new("get_location", EventStatus::Skipped).message(e));
                return None;
            }
        };

        match parse_location(&raw, &self.behavior.state_prefix, &self.behavior.city_prefix) {
            Some((state, city)) => {
                self.log.record(
                    Event::new("get_location", EventStatus::Success)
                        .field("state", &state)
                        .field("city", &city),
                );
                Some((state, city))
            }
            None => {
                self.log.record(
                    Event::new("get_location", EventStatus::Skipped)
                        .field("raw", &raw)
                        .message("location has no single state/city separator"),
                );
                None
            }
        }
    }

    async fn phone(&self) -> String {
        match self.behavior.phone {
            PhonePolicy::Placeholder { ref value } => value.clone(),
            PhonePolicy::Reveal => {
                let revealed = self.reveal_phone().await;
                self.keep("get_phone_number", "phone", revealed)
            }
        }
    }

    async fn reveal_phone(&self) -> Result<String> {
        let button = &self.selectors.phone_button;
        self.session.wait_for(button, WaitCondition::Clickable, self.timing.field_wait).await?;
        self.session.click(button, 0).await?;
        self.log.record(Event::new("click_phone_button", EventStatus::Success));

        self.wait_text(&self.selectors.phone_number, WaitCondition::Present, self.timing.field_wait)
            .await
    }

    async fn description(&self) -> Result<String> {
        let locator = &self.selectors.description;
        self.session.wait_for(locator, WaitCondition::Present, self.timing.field_wait).await?;
        self.session.scroll_into_view(locator, 0).await?;
        self.session.text(locator, 0).await
    }

    async fn categories(&self) -> Option<(String, String)> {
        match self.session.texts(&self.selectors.breadcrumbs).await {
            Ok(crumbs) if crumbs.len() >= 2 => {
                let category = crumbs[0].clone();
                let sub_category = crumbs[1].clone();
                self.log.record(
                    Event::new("get_category_and_sub_category", EventStatus::Success)
                        .field("category", &category)
                        .field("sub_category", &sub_category),
                );
                Some((category, sub_category))
            }
            Ok(crumbs) => {
                self.log.record(
                    Event::new("get_category_and_sub_category", EventStatus::Skipped)
                        .field("found", crumbs.len())
                        .message("fewer than two breadcrumbs"),
                );
                None
            }
            Err(e) => {
                self.log.record(
                    Event::new("get_category_and_sub_category", EventStatus::Fail).message(e),
                );
                None
            }
        }
    }
}
