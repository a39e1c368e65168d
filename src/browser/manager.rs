use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::browser::chromium::ChromiumSession;
use crate::config::BrowserSettings;
use crate::error::{CrawlError, Result};

/// Launches the chromium instance the crawl runs in.
pub struct BrowserManager {
    settings: BrowserSettings,
}

impl BrowserManager {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn browser_config(&self, user_data_dir: &PathBuf) -> Result<BrowserConfig> {
        let (width, height) = self.settings.window_size;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(width, height)
            .user_data_dir(user_data_dir)
            .args(vec![
                "--disable-dev-shm-usage",
                "--disable-extensions",
                "--disable-plugins",
                "--disable-blink-features=AutomationControlled", // hide automation
                "--no-first-run",
                "--disable-default-apps",
            ]);

        if self.settings.headless {
            builder = builder.args(vec![
                "--use-gl=swiftshader",
                "--disable-software-rasterizer",
                "--disable-gpu-compositing",
                "--disable-accelerated-2d-canvas",
                "--disable-accelerated-video-decode",
            ]);
        } else {
            builder = builder.with_head();
        }

        if let Some(ref executable) = self.settings.executable {
            builder = builder.chrome_executable(executable);
        }

        builder
            .build()
            .map_err(|e| {
                CrawlError::BrowserError(format!("Failed to create browser config: {}", e))
            })
    }

    /// Launch the browser, retrying a few times, and open the first tab.
    pub async fn launch(&self) -> Result<ChromiumSession> {
        info!(
            "Launching browser (headless: {}, window: {:?})",
            self.settings.headless, self.settings.window_size
        );

        // unique user data dir avoids singleton lock clashes with other runs
        let user_data_dir = std::env::temp_dir().join(format!(
            "catalog-outreach-{}-{}",
            std::process::id(),
            Uuid::new_v4()
        ));
        std::fs::create_dir_all(&user_data_dir)?;

        let browser_config = self.browser_config(&user_data_dir)?;
        let attempts = self.settings.launch_attempts.max(1);

        let mut last_error = None;
        for attempt in 1..=attempts {
            match Browser::launch(browser_config.clone()).await {
                Ok((browser, mut handler)) => {
                    info!("Browser launched successfully on attempt {}", attempt);

                    let handler_task = tokio::spawn(async move {
                        while let Some(event) = handler.next().await {
                            if let Err(e) = event {
                                // filter out common websocket deserialization noise
                                let message = e.to_string();
                                if message.contains("data did not match any variant")
                                    || message.contains("untagged enum Message")
                                {
                                    debug!("Ignoring WebSocket deserialization error: {}", e);
                                } else {
                                    warn!("Browser handler error: {}", e);
                                }
                            }
                        }
                        debug!("Browser handler task ended");
                    });

                    let page = match tokio::time::timeout(
                        Duration::from_secs(10),
                        browser.new_page("about:blank"),
                    )
                    .await
                    {
                        Ok(Ok(page)) => page,
                        Ok(Err(e)) => {
                            handler_task.abort();
                            return Err(CrawlError::BrowserError(format!(
                                "Failed to create new page: {}",
                                e
                            )));
                        }
                        Err(_) => {
                            handler_task.abort();
                            return Err(CrawlError::BrowserError(
                                "Timeout creating new page".to_string(),
                            ));
                        }
                    };

                    return Ok(ChromiumSession::new(browser, page, handler_task));
                }
                Err(e) => {
                    error!("Browser launch attempt {} failed: {}", attempt, e);
                    last_error = Some(e.to_string());
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        }

        Err(CrawlError::BrowserError(format!(
            "Failed to launch browser after {} attempts: {}",
            attempts,
            last_error.unwrap_or_default()
        )))
    }
}
