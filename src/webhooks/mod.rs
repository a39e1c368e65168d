pub mod inference;
pub mod rate_limit;

pub use inference::InferenceWebhook;
pub use rate_limit::RateLimiter;

use std::fmt;

use crate::parser::ProductRecord;

/// Result of a single dispatch to the inference endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// 200 with a non-empty `output` string.
    Success(String),
    /// 200 whose body is not JSON or has no usable `output`.
    EmptyOutput,
    /// Any other status. Not retried.
    HttpError(u16),
    /// The request never produced a response.
    TransportFault(String),
}

impl SubmitOutcome {
    /// Whether another attempt may produce a different result.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitOutcome::EmptyOutput | SubmitOutcome::TransportFault(_))
    }
}

impl fmt::Display for SubmitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitOutcome::Success(_) => f.write_str("output received"),
            SubmitOutcome::EmptyOutput => f.write_str("empty_output"),
            SubmitOutcome::HttpError(code) => write!(f, "http status {}", code),
            SubmitOutcome::TransportFault(reason) => write!(f, "transport fault: {}", reason),
        }
    }
}

/// Turns a product record into generated reply text.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Up to `max_retries + 1` attempts; `None` when none produced text.
    async fn submit(&self, record: &ProductRecord, max_retries: u32) -> Option<String>;
}
