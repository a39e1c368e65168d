use std::sync::Arc;
use tokio::time::sleep;

use crate::browser::{BrowserSession, KeyChord, WaitCondition};
use crate::config::{Selectors, Timing};
use crate::error::Result;
use crate::storage::{Event, EventLog, EventStatus};

/// Posts generated text into the seller chat of the current detail page.
pub struct ReplyActor {
    session: Arc<dyn BrowserSession>,
    selectors: Selectors,
    timing: Timing,
    log: EventLog,
}

impl ReplyActor {
    pub fn new(
        session: Arc<dyn BrowserSession>,
        selectors: Selectors,
        timing: Timing,
        log: EventLog,
    ) -> Self {
        Self {
            session,
            selectors,
            timing,
            log,
        }
    }

    /// Open the chat, type `text` and submit it. Failures are logged, never raised.
    pub async fn reply(&self, text: &str) -> bool {
        match self.send(text).await {
            Ok(()) => {
                self.log.record(Event::new("send_message", EventStatus::Success));
                true
            }
            Err(e) => {
                self.log.record(Event::new("send_message", EventStatus::Fail).message(e));
                false
            }
        }
    }

    async fn send(&self, text: &str) -> Result<()> {
        let button = &self.selectors.chat_button;
        self.session.wait_for(button, WaitCondition::Clickable, self.timing.chat_wait).await?;
        self.session.scroll_into_view(button, 0).await?;
        self.session.js_click(button, 0).await?;
        sleep(self.timing.after_chat_open).await;
        self.log.record(Event::new("click_chat_button", EventStatus::Success));

        let chat_box = &self.selectors.chat_box;
        self.session.wait_for(chat_box, WaitCondition::Present, self.timing.chat_wait).await?;
        self.session.click(chat_box, 0).await?;
        self.log.record(Event::new("click_chat_box", EventStatus::Success));

        let lines: Vec<&str> = text.split('\n').collect();
        for (i, line) in lines.iter().enumerate() {
            self.session.type_text(chat_box, 0, line).await?;
            if i + 1 < lines.len() {
                self.session.press(KeyChord::ShiftEnter).await?;
            }
        }
        self.session.press(KeyChord::Enter).await?;

        sleep(self.timing.after_send).await;
        Ok(())
    }
}
