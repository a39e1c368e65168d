use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::Locator;
use crate::error::{CrawlError, Result};

pub const CONFIG_ENV_VAR: &str = "CATALOG_OUTREACH_CONFIG";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub site: SiteConfig,
    pub browser: BrowserSettings,
    pub selectors: Selectors,
    pub timing: Timing,
    pub gateway: GatewayConfig,
    pub storage: StorageConfig,
    pub behavior: BehaviorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    pub base_url: String,
    /// Lowercase fragments of a blocked page's source.
    pub forbidden_markers: Vec<String>,
    pub cookie_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub launch_attempts: u32,
    pub executable: Option<PathBuf>,
}

/// Every locator the crawl touches. `{position}` marks a 1-based slot.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Selectors {
    pub category_cards: Locator,
    pub category_name: Locator,
    pub newest_filter: Locator,
    pub listing_items: Locator,
    pub listing_image: Locator,
    pub product_name: Locator,
    pub seller_name: Locator,
    pub location: Locator,
    pub price: Locator,
    pub description: Locator,
    pub breadcrumbs: Locator,
    pub phone_button: Locator,
    pub phone_number: Locator,
    pub chat_button: Locator,
    pub chat_box: Locator,
}

/// Bounded waits (`*_wait`) and fixed settle pauses.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Timing {
    #[serde(with = "humantime_serde")]
    pub category_wait: Duration,
    #[serde(with = "humantime_serde")]
    pub listing_wait: Duration,
    #[serde(with = "humantime_serde")]
    pub filter_wait: Duration,
    #[serde(with = "humantime_serde")]
    pub title_wait: Duration,
    #[serde(with = "humantime_serde")]
    pub field_wait: Duration,
    #[serde(with = "humantime_serde")]
    pub price_wait: Duration,
    #[serde(with = "humantime_serde")]
    pub chat_wait: Duration,
    #[serde(with = "humantime_serde")]
    pub category_scroll_pause: Duration,
    #[serde(with = "humantime_serde")]
    pub after_category_click: Duration,
    #[serde(with = "humantime_serde")]
    pub after_filter: Duration,
    #[serde(with = "humantime_serde")]
    pub before_listing_query: Duration,
    #[serde(with = "humantime_serde")]
    pub after_item_scroll: Duration,
    #[serde(with = "humantime_serde")]
    pub after_item_click: Duration,
    #[serde(with = "humantime_serde")]
    pub detail_settle: Duration,
    #[serde(with = "humantime_serde")]
    pub after_grow_scroll: Duration,
    #[serde(with = "humantime_serde")]
    pub after_back: Duration,
    #[serde(with = "humantime_serde")]
    pub after_chat_open: Duration,
    #[serde(with = "humantime_serde")]
    pub after_send: Duration,
    #[serde(with = "humantime_serde")]
    pub scroll_to_end_pause: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub endpoint: String,
    #[serde(with = "humantime_serde")]
    pub min_interval: Duration,
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub dedup_file: PathBuf,
    pub event_log: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BehaviorConfig {
    pub filter_newest: bool,
    /// `false` runs the whole pipeline but never messages a seller.
    pub send_replies: bool,
    /// Scroll the listing to its end before each growth check.
    pub preload_listing: bool,
    pub scroll_step: i64,
    pub state_prefix: String,
    pub city_prefix: String,
    pub phone: PhonePolicy,
}

/// Where the phone field comes from.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PhonePolicy {
    /// Fixed value; the contact-reveal flow is not exercised.
    Placeholder { value: String },
    /// Click the contact button and read the revealed number.
    Reveal,
}

impl Default for Selectors {
    fn default() -> Self {
        const CARDS: &str =
            "//div[contains(@class,'categories-container')]/div[contains(@class,'category-card')]";
        const DETAIL: &str =
            "//*[@id='main']/div[1]/div/div[2]/section/div/div/div[1]/div[2]/div/div";

        Self {
            category_cards: Locator::xpath(CARDS),
            category_name: Locator::xpath(format!("({})[{{position}}]//p", CARDS)),
            newest_filter: Locator::xpath("//*[@id='main']/div/div/section/div[1]/ul/li[3]/button"),
            listing_items: Locator::xpath(
                "//div[contains(@class,'items-wrapper')]\
                 //div[contains(@class,'product-row-wrapper')]",
            ),
            listing_image: Locator::xpath(
                "//*[@id='article-list']/div/div[{position}]/div/div/div[1]/div[1]/img",
            ),
            product_name: Locator::xpath("//*[@class='main-contents']//h1"),
            seller_name: Locator::xpath(format!("{}/ul/li[1]/span[2]", DETAIL)),
            location: Locator::xpath(format!("{}/ul/li[2]/span[2]", DETAIL)),
            price: Locator::xpath(format!("{}/div/div/div[2]/p[2]", DETAIL)),
            description: Locator::xpath("//div[contains(@class, 'product-description')]//p"),
            breadcrumbs: Locator::xpath("//a[contains(@href,'/product-list/category/')]//span"),
            phone_button: Locator::xpath(
                "//button[contains(@class, 'main-button') and contains(text(), 'شماره تماس')]",
            ),
            phone_number: Locator::xpath("//a[@class='phone-number']/p"),
            chat_button: Locator::xpath("//button[contains(text(),'چت با فروشنده')]"),
            chat_box: Locator::xpath("//textarea[@id='msg_text']"),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            category_wait: Duration::from_secs(15),
            listing_wait: Duration::from_secs(15),
            filter_wait: Duration::from_secs(10),
            title_wait: Duration::from_secs(2),
            field_wait: Duration::from_secs(10),
            price_wait: Duration::from_secs(5),
            chat_wait: Duration::from_secs(10),
            category_scroll_pause: Duration::from_millis(300),
            after_category_click: Duration::from_secs(2),
            after_filter: Duration::from_secs(3),
            before_listing_query: Duration::from_secs(5),
            after_item_scroll: Duration::from_millis(500),
            after_item_click: Duration::from_secs(1),
            detail_settle: Duration::from_secs(2),
            after_grow_scroll: Duration::from_secs(1),
            after_back: Duration::from_secs(1),
            after_chat_open: Duration::from_secs(2),
            after_send: Duration::from_secs(1),
            scroll_to_end_pause: Duration::from_millis(1500),
        }
    }
}

impl Timing {
    /// Short waits and no pauses, for driving the pipeline against fakes.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        let wait = Duration::from_millis(50);
        Self {
            category_wait: wait,
            listing_wait: wait,
            filter_wait: wait,
            title_wait: wait,
            field_wait: wait,
            price_wait: wait,
            chat_wait: wait,
            category_scroll_pause: Duration::ZERO,
            after_category_click: Duration::ZERO,
            after_filter: Duration::ZERO,
            before_listing_query: Duration::ZERO,
            after_item_scroll: Duration::ZERO,
            after_item_click: Duration::ZERO,
            detail_settle: Duration::ZERO,
            after_grow_scroll: Duration::ZERO,
            after_back: Duration::ZERO,
            after_chat_open: Duration::ZERO,
            after_send: Duration::ZERO,
            scroll_to_end_pause: Duration::ZERO,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: SiteConfig {
                base_url: "https://www.buskool.com/".to_string(),
                forbidden_markers: vec!["error 403".to_string(), "forbidden".to_string()],
                cookie_file: Some(PathBuf::from("cookies.json")),
            },
            browser: BrowserSettings {
                headless: false,
                window_size: (1280, 1024),
                launch_attempts: 3,
                executable: None,
            },
            selectors: Selectors::default(),
            timing: Timing::default(),
            gateway: GatewayConfig {
                endpoint: "http://127.0.0.1:5678/webhook/product".to_string(),
                min_interval: Duration::from_secs(1),
                max_retries: 1,
                request_timeout: Duration::from_secs(60),
            },
            storage: StorageConfig {
                dedup_file: PathBuf::from("processed_products.json"),
                event_log: PathBuf::from("response_log.jsonl"),
            },
            behavior: BehaviorConfig {
                filter_newest: true,
                send_replies: true,
                preload_listing: false,
                scroll_step: 300,
                state_prefix: "استان".to_string(),
                city_prefix: "شهر".to_string(),
                phone: PhonePolicy::Placeholder {
                    value: "090000000000".to_string(),
                },
            },
        }
    }
}

/// Config file location: first CLI argument, then the environment, then `config.toml`.
pub fn resolve_config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

#[async_trait::async_trait]
pub trait ConfigManager {
    async fn load_config(&self) -> Result<Config>;
    async fn save_config(&self, config: &Config) -> Result<()>;
    fn validate_config(&self, config: &Config) -> Result<()>;
}

pub struct FileConfigManager {
    config_path: PathBuf,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }
}

#[async_trait::async_trait]
impl ConfigManager for FileConfigManager {
    async fn load_config(&self) -> Result<Config> {
        info!("Loading configuration from {:?}", self.config_path);

        // check if config file exists, create default if not
        if !self.config_path.exists() {
            warn!(
                "Configuration file not found, creating default config at {:?}",
                self.config_path
            );
            self.create_default_config().await?;
        }

        let config_content = fs::read_to_string(&self.config_path)
            .map_err(|e| CrawlError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&config_content)
            .map_err(|e| CrawlError::ConfigError(format!("Failed to parse TOML config: {}", e)))?;

        self.validate_config(&config)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        info!("Saving configuration to {:?}", self.config_path);

        let toml_content = toml::to_string_pretty(config)
            .map_err(|e| CrawlError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_path, toml_content)
            .map_err(|e| CrawlError::ConfigError(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully");
        Ok(())
    }

    fn validate_config(&self, config: &Config) -> Result<()> {
        debug!("Validating configuration");

        if !Self::is_http_url(&config.site.base_url) {
            return Err(CrawlError::ConfigError(
                "site.base_url must start with http:// or https://".to_string(),
            ));
        }
        if config.site.forbidden_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(CrawlError::ConfigError(
                "site.forbidden_markers cannot be empty".to_string(),
            ));
        }

        if config.browser.launch_attempts == 0 {
            return Err(CrawlError::ConfigError(
                "browser.launch_attempts must be greater than 0".to_string(),
            ));
        }
        let (width, height) = config.browser.window_size;
        if width == 0 || height == 0 {
            return Err(CrawlError::ConfigError("browser.window_size must be non-zero".to_string()));
        }

        let templates = [
            ("category_name", &config.selectors.category_name),
            ("listing_image", &config.selectors.listing_image),
        ];
        for (name, locator) in templates {
            if !locator.is_template() {
                return Err(CrawlError::ConfigError(format!(
                    "selectors.{} must contain a {{position}} placeholder",
                    name
                )));
            }
        }

        if !Self::is_http_url(&config.gateway.endpoint) {
            return Err(CrawlError::ConfigError(
                "gateway.endpoint must start with http:// or https://".to_string(),
            ));
        }
        if config.gateway.max_retries > 10 {
            return Err(CrawlError::ConfigError("gateway.max_retries cannot exceed 10".to_string()));
        }
        let interval = config.gateway.min_interval;
        if interval.is_zero() || interval > Duration::from_secs(60) {
            return Err(CrawlError::ConfigError(
                "gateway.min_interval must be between 1ms and 60s".to_string(),
            ));
        }
        if config.gateway.request_timeout.is_zero() {
            return Err(CrawlError::ConfigError(
                "gateway.request_timeout must be greater than 0".to_string(),
            ));
        }

        if config.behavior.scroll_step <= 0 {
            return Err(CrawlError::ConfigError(
                "behavior.scroll_step must be positive".to_string(),
            ));
        }
        if let PhonePolicy::Placeholder { ref value } = config.behavior.phone {
            if value.trim().is_empty() {
                return Err(CrawlError::ConfigError(
                    "behavior.phone placeholder cannot be empty".to_string(),
                ));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

impl FileConfigManager {
    /// Create a default configuration file
    async fn create_default_config(&self) -> Result<()> {
        let toml_content = toml::to_string_pretty(&Config::default())
            .map_err(|e| {
                CrawlError::ConfigError(format!("Failed to serialize default config: {}", e))
            })?;

        if let Some(parent) = self.config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| {
                    CrawlError::ConfigError(format!("Failed to create config directory: {}", e))
                })?;
        }

        fs::write(&self.config_path, toml_content)
            .map_err(|e| {
                CrawlError::ConfigError(format!("Failed to write default config: {}", e))
            })?;

        info!("Default configuration file created at {:?}", self.config_path);
        Ok(())
    }

    fn is_http_url(url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }
}
