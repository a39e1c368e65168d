use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::error::{CrawlError, Result};
use crate::parser::ProductRecord;
use crate::storage::{Event, EventLog, EventStatus};
use crate::webhooks::{InferenceProvider, RateLimiter, SubmitOutcome};

/// HTTP client for the text-generation workflow endpoint.
pub struct InferenceWebhook {
    client: Client,
    endpoint: String,
    limiter: Arc<RateLimiter>,
    log: EventLog,
}

impl InferenceWebhook {
    pub fn new(
        config: &GatewayConfig,
        limiter: Arc<RateLimiter>,
        log: EventLog,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                CrawlError::NetworkError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            limiter,
            log,
        })
    }

    async fn attempt(&self, record: &ProductRecord) -> SubmitOutcome {
        let response = match self.client.post(&self.endpoint).json(record).send().await {
            Ok(response) => response,
            Err(e) => return SubmitOutcome::TransportFault(e.to_string()),
        };

        let status = response.status();
        if status != StatusCode::OK {
            return SubmitOutcome::HttpError(status.as_u16());
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                debug!("Unreadable inference response: {}", e);
                return SubmitOutcome::EmptyOutput;
            }
        };

        match body.get("output").and_then(Value::as_str) {
            Some(output) if !output.trim().is_empty() => {
                SubmitOutcome::Success(output.to_string())
            }
            _ => SubmitOutcome::EmptyOutput,
        }
    }
}

#[async_trait::async_trait]
impl InferenceProvider for InferenceWebhook {
    async fn submit(&self, record: &ProductRecord, max_retries: u32) -> Option<String> {
        let attempts = max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let permit = self.limiter.acquire().await;
            if !permit.waited().is_zero() {
                self.log.record(
                    Event::new("rate_limit", EventStatus::Warning)
                        .field("wait_ms", permit.waited().as_millis() as u64)
                        .message("waiting"),
                );
            }

            match self.attempt(record).await {
                SubmitOutcome::Success(text) => {
                    permit.mark_success();
                    self.log.record(
                        Event::new("send_to_api", EventStatus::Success).field("attempt", attempt),
                    );
                    return Some(text);
                }
                outcome if outcome.is_retryable() => {
                    let status = match outcome {
                        SubmitOutcome::TransportFault(_) => EventStatus::Exception,
                        _ => EventStatus::Warning,
                    };
                    self.log.record(
                        Event::new("send_to_api", status)
                            .field("attempt", attempt)
                            .message(&outcome),
                    );
                }
                outcome => {
                    let mut event = Event::new("send_to_api", EventStatus::Fail)
                        .field("attempt", attempt)
                        .message(&outcome);
                    if let SubmitOutcome::HttpError(code) = outcome {
                        event = event.field("http_status", code);
                    }
                    self.log.record(event);
                    return None;
                }
            }
        }

        self.log.record(
            Event::new("send_to_api", EventStatus::Fail)
                .field("attempts", attempts)
                .message("no output after retries"),
        );
        None
    }
}
