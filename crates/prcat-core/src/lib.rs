pub mod app_config;
pub mod config;
pub mod products;
pub mod sink;

pub use app_config::{
    BrowserConfig, CrawlConfig, CurrencyConfig, DatabaseConfig, LoggingConfig, ParserConfig,
    ParsingConfig, SelectorsConfig, StorageConfig, StorageKind, ViewportConfig,
};
pub use config::{build_config, load_config};
pub use products::{BasicProduct, ImageInfo, PriceInfo, Product, ProductStats, DEFAULT_CATEGORY};
pub use sink::{ProductSink, SinkError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    FileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    FileParse(#[source] serde_yaml::Error),

    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("invalid configuration: {0}")]
    Validation(String),
}
