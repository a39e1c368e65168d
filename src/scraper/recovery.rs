use std::future::Future;
use tracing::debug;

use crate::error::{RecoveryStrategy, Result};

/// Run `op`, and run it once more if the first error asks for a retry
/// (a stale element).
///
/// `op` must resolve its elements afresh on every call, which every
/// [`BrowserSession`](crate::browser::BrowserSession) method does. Any other
/// error, or a second stale failure, is returned unchanged.
pub async fn retry_once_on_stale<T, F, Fut>(what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Err(e) if e.recovery_strategy() == RecoveryStrategy::RetryOnce => {
            debug!("Stale element during {}, re-resolving: {}", what, e);
            op().await
        }
        other => other,
    }
}
