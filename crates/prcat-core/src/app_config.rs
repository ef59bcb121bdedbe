use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://www.pricerunner.com/cl/1/Mobile-Phones";
pub const DEFAULT_SITE_ORIGIN: &str = "https://www.pricerunner.com";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Page cap applied when `parsing.max_pages` is unset (`0`).
pub const SAFETY_MAX_PAGES: u32 = 50;

/// Root of the YAML crawl configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub parser: ParserConfig,
    pub currency: CurrencyConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub base_url: String,
    pub browser: BrowserConfig,
    pub parsing: ParsingConfig,
    pub selectors: SelectorsConfig,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            browser: BrowserConfig::default(),
            parsing: ParsingConfig::default(),
            selectors: SelectorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Per-operation navigation timeout in milliseconds.
    pub timeout: u64,
    pub viewport: ViewportConfig,
    pub user_agent: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            timeout: 30_000,
            viewport: ViewportConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Pacing and termination knobs for the crawl loop. All delays are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    /// `0` means "no configured cap"; [`SAFETY_MAX_PAGES`] still applies.
    pub max_pages: u32,
    pub delay_between_requests: u64,
    pub scroll_delay: u64,
    pub max_scrolls: u32,
    /// Cards per full listing page; fewer means the last page was reached.
    pub expected_per_page: usize,
    pub settle_delay_ms: u64,
    pub probe_delay_ms: u64,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            max_pages: 0,
            delay_between_requests: 2_000,
            scroll_delay: 500,
            max_scrolls: 20,
            expected_per_page: 48,
            settle_delay_ms: 1_000,
            probe_delay_ms: 500,
        }
    }
}

impl ParsingConfig {
    /// The loop bound: the configured cap, or [`SAFETY_MAX_PAGES`] when unset.
    #[must_use]
    pub fn effective_max_pages(&self) -> u32 {
        if self.max_pages == 0 {
            SAFETY_MAX_PAGES
        } else {
            self.max_pages
        }
    }
}

/// Named CSS selector bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorsConfig {
    pub product_cards: String,
    pub price: String,
    pub main_image: String,
    pub additional_images: String,
    pub feature_tables: String,
    pub offer_count: Option<String>,
}

impl Default for SelectorsConfig {
    fn default() -> Self {
        Self {
            product_cards: "a[href*='/pl/'][title]".to_string(),
            price: "span.pr-1fcg5be".to_string(),
            main_image: "picture source[type='image/webp']".to_string(),
            additional_images: "button[aria-label*='image'] img".to_string(),
            feature_tables: "table.pr-1regpt0-Table-table".to_string(),
            offer_count: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyConfig {
    pub gbp_to_eur: f64,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self { gbp_to_eur: 1.15 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Json,
    Database,
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageKind::Json => write!(f, "json"),
            StorageKind::Database => write!(f, "database"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: StorageKind,
    pub output_dir: PathBuf,
    pub images_dir: PathBuf,
    pub database: DatabaseConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Json,
            output_dir: PathBuf::from("./output"),
            images_dir: PathBuf::from("./output/images"),
            database: DatabaseConfig::default(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the discrete fields.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "prcat".to_string(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    /// Connection URL, built from the discrete fields when `url` is unset.
    ///
    /// User and password are percent-encoded.
    #[must_use]
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let base = format!("postgres://{}:{}/{}", self.host, self.port, self.database);
        let Ok(mut url) = url::Url::parse(&base) else {
            return base;
        };
        if url.set_username(&self.user).is_err() {
            return base;
        }
        if !self.password.is_empty() && url.set_password(Some(&self.password)).is_err() {
            return base;
        }
        url.into()
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "[redacted]"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[redacted]")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}
