use anyhow::{bail, Context};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use catalog_outreach::browser::{BrowserManager, BrowserSession};
use catalog_outreach::config::{resolve_config_path, ConfigManager, FileConfigManager};
use catalog_outreach::storage::{DedupStore, Event, EventLog, EventStatus};
use catalog_outreach::webhooks::{InferenceWebhook, RateLimiter};
use catalog_outreach::CrawlOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_manager = FileConfigManager::new(resolve_config_path());
    let config = config_manager.load_config().await.context("loading configuration")?;

    tracing::info!("Starting catalog crawl of {}", config.site.base_url);

    let log = EventLog::new(config.storage.event_log.clone());
    let dedup = DedupStore::open(&config.storage.dedup_file);
    let limiter = Arc::new(RateLimiter::new(config.gateway.min_interval));
    let gateway = Arc::new(InferenceWebhook::new(&config.gateway, limiter, log.clone())?);

    let session: Arc<dyn BrowserSession> = Arc::new(
        BrowserManager::new(config.browser.clone())
            .launch()
            .await
            .context("launching browser")?,
    );

    let mut orchestrator =
        CrawlOrchestrator::new(session.clone(), config, gateway, dedup, log.clone());
    let outcome = AssertUnwindSafe(orchestrator.run()).catch_unwind().await;

    // the browser goes away on every exit path
    if let Err(e) = session.quit().await {
        tracing::warn!("Failed to shut the browser down cleanly: {}", e);
    }

    match outcome {
        Ok(Ok(report)) => {
            tracing::info!(
                "Crawl finished: {} processed, {} duplicates, {} replies",
                report.items_processed,
                report.duplicates_skipped,
                report.replies_sent
            );
            Ok(())
        }
        Ok(Err(e)) if e.is_fatal() => {
            log.record(Event::new("crawl", EventStatus::Error).message(&e).field("aborted", true));
            Err(anyhow::Error::new(e).context("crawl aborted"))
        }
        Ok(Err(e)) => {
            log.record(Event::new("crawl", EventStatus::Error).message(&e));
            Err(anyhow::Error::new(e).context("crawl stopped early"))
        }
        Err(_) => {
            log.record(Event::new("crawl", EventStatus::Exception).message("pipeline panicked"));
            bail!("crawl pipeline panicked")
        }
    }
}
