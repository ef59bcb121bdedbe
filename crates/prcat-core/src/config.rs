use std::path::Path;

use crate::app_config::{CrawlConfig, StorageKind, DEFAULT_SITE_ORIGIN};
use crate::ConfigError;

/// Load the crawl configuration from a YAML file, then apply environment
/// overrides and create the output directories.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed, an override is
/// invalid, validation fails, or a directory cannot be created.
pub fn load_config(path: &Path) -> Result<CrawlConfig, ConfigError> {
    dotenvy::dotenv().ok();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    let config = build_config(&content, |key| std::env::var(key))?;
    ensure_directories(&config)?;
    Ok(config)
}

/// Parse YAML and apply overrides from the provided env-var lookup function.
///
/// Decoupled from the process environment so tests can pass a `HashMap` lookup.
///
/// # Errors
///
/// Returns `ConfigError` on parse, override, or validation failure.
pub fn build_config<F>(yaml: &str, lookup: F) -> Result<CrawlConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let mut config: CrawlConfig = if yaml.trim().is_empty() {
        CrawlConfig::default()
    } else {
        serde_yaml::from_str(yaml).map_err(ConfigError::FileParse)?
    };

    apply_env_overrides(&mut config, lookup)?;
    validate(&config)?;
    Ok(config)
}

fn apply_env_overrides<F>(config: &mut CrawlConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    if let Ok(base_url) = lookup("PRCAT_BASE_URL") {
        config.parser.base_url = base_url;
    }
    if let Ok(raw) = lookup("PRCAT_MAX_PAGES") {
        config.parser.parsing.max_pages = raw
            .parse::<u32>()
            .map_err(|e| invalid("PRCAT_MAX_PAGES", e.to_string()))?;
    }
    if let Ok(raw) = lookup("PRCAT_HEADLESS") {
        config.parser.browser.headless = parse_bool(&raw)
            .ok_or_else(|| invalid("PRCAT_HEADLESS", format!("expected a boolean, got {raw:?}")))?;
    }
    if let Ok(raw) = lookup("PRCAT_STORAGE_TYPE") {
        config.storage.kind = parse_storage_kind(&raw)
            .ok_or_else(|| invalid("PRCAT_STORAGE_TYPE", format!("unknown storage type {raw:?}")))?;
    }
    if let Ok(dir) = lookup("PRCAT_OUTPUT_DIR") {
        config.storage.output_dir = dir.into();
    }
    if let Ok(dir) = lookup("PRCAT_IMAGES_DIR") {
        config.storage.images_dir = dir.into();
    }
    if let Ok(url) = lookup("DATABASE_URL") {
        config.storage.database.url = Some(url);
    }
    if let Ok(level) = lookup("PRCAT_LOG_LEVEL") {
        config.logging.level = level;
    }
    Ok(())
}

fn validate(config: &CrawlConfig) -> Result<(), ConfigError> {
    let base_url = config.parser.base_url.trim();
    if base_url.is_empty() {
        return Err(ConfigError::Validation(
            "parser.base_url must be non-empty".to_string(),
        ));
    }
    if let Err(e) = url::Url::parse(base_url) {
        return Err(ConfigError::Validation(format!(
            "parser.base_url {base_url:?} is not a valid URL: {e}"
        )));
    }
    if config.parser.selectors.product_cards.trim().is_empty() {
        return Err(ConfigError::Validation(
            "parser.selectors.product_cards must be non-empty".to_string(),
        ));
    }
    let rate = config.currency.gbp_to_eur;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "currency.gbp_to_eur must be a positive number, got {rate}"
        )));
    }
    Ok(())
}

fn ensure_directories(config: &CrawlConfig) -> Result<(), ConfigError> {
    let mut dirs = vec![config.storage.images_dir.as_path()];
    if config.storage.kind == StorageKind::Json {
        dirs.push(config.storage.output_dir.as_path());
    }
    for dir in dirs {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::FileIo {
            path: dir.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_storage_kind(raw: &str) -> Option<StorageKind> {
    match raw.trim() {
        "json" => Some(StorageKind::Json),
        "database" => Some(StorageKind::Database),
        _ => None,
    }
}

impl CrawlConfig {
    /// Scheme + host of the configured base URL, used to absolutize relative
    /// links. Falls back to the default site origin when the URL has no host.
    #[must_use]
    pub fn site_origin(&self) -> String {
        url::Url::parse(&self.parser.base_url)
            .ok()
            .filter(|u| u.has_host())
            .map_or_else(
                || DEFAULT_SITE_ORIGIN.to_string(),
                |u| u.origin().ascii_serialization(),
            )
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
