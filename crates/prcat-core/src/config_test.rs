use std::collections::HashMap;
use std::env::VarError;

use super::*;
use crate::app_config::{DatabaseConfig, SelectorsConfig, SAFETY_MAX_PAGES};

fn lookup_from_map<'a>(
    map: &'a HashMap<&'a str, &'a str>,
) -> impl Fn(&str) -> Result<String, VarError> + 'a {
    move |key| {
        map.get(key)
            .map(|v| (*v).to_string())
            .ok_or(VarError::NotPresent)
    }
}

const SAMPLE_YAML: &str = r#"
parser:
  base_url: "https://www.pricerunner.com/cl/1/Mobile-Phones"
  browser:
    headless: false
    timeout: 45000
    viewport:
      width: 1280
      height: 800
  parsing:
    max_pages: 3
    delay_between_requests: 1500
    scroll_delay: 250
    max_scrolls: 15
  selectors:
    product_cards: "a.pr-card"
    price: "span.price"
    feature_tables: "table.specs"
currency:
  gbp_to_eur: 1.17
storage:
  type: database
  output_dir: "./data"
  images_dir: "./data/images"
  database:
    host: db
    port: 5433
    user: crawler
    password: secret
    database: catalog
logging:
  level: debug
"#;

#[test]
fn empty_yaml_yields_defaults() {
    let map = HashMap::new();
    let cfg = build_config("", lookup_from_map(&map)).unwrap();
    assert_eq!(cfg, CrawlConfig::default());
    assert_eq!(cfg.parser.parsing.expected_per_page, 48);
    assert_eq!(cfg.parser.parsing.effective_max_pages(), SAFETY_MAX_PAGES);
    assert_eq!(cfg.storage.kind, StorageKind::Json);
    assert!((cfg.currency.gbp_to_eur - 1.15).abs() < f64::EPSILON);
}

#[test]
fn parses_full_yaml() {
    let map = HashMap::new();
    let cfg = build_config(SAMPLE_YAML, lookup_from_map(&map)).unwrap();
    assert!(!cfg.parser.browser.headless);
    assert_eq!(cfg.parser.browser.timeout, 45_000);
    assert_eq!(cfg.parser.browser.viewport.width, 1280);
    assert_eq!(cfg.parser.parsing.max_pages, 3);
    assert_eq!(cfg.parser.parsing.effective_max_pages(), 3);
    assert_eq!(cfg.parser.parsing.scroll_delay, 250);
    // Unspecified fields keep their defaults.
    assert_eq!(cfg.parser.parsing.settle_delay_ms, 1_000);
    assert_eq!(cfg.parser.selectors.product_cards, "a.pr-card");
    assert_eq!(
        cfg.parser.selectors.main_image,
        SelectorsConfig::default().main_image
    );
    assert_eq!(cfg.storage.kind, StorageKind::Database);
    assert_eq!(
        cfg.storage.database.connection_url(),
        "postgres://crawler:secret@db:5433/catalog"
    );
    assert_eq!(cfg.logging.level, "debug");
}

#[test]
fn env_overrides_win_over_file() {
    let mut map = HashMap::new();
    map.insert("PRCAT_MAX_PAGES", "7");
    map.insert("PRCAT_STORAGE_TYPE", "json");
    map.insert("PRCAT_HEADLESS", "true");
    map.insert("DATABASE_URL", "postgres://u@h/d");
    map.insert("PRCAT_LOG_LEVEL", "warn");
    let cfg = build_config(SAMPLE_YAML, lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.parser.parsing.max_pages, 7);
    assert_eq!(cfg.storage.kind, StorageKind::Json);
    assert!(cfg.parser.browser.headless);
    assert_eq!(cfg.storage.database.connection_url(), "postgres://u@h/d");
    assert_eq!(cfg.logging.level, "warn");
}

#[test]
fn invalid_max_pages_override_is_rejected() {
    let mut map = HashMap::new();
    map.insert("PRCAT_MAX_PAGES", "lots");
    let result = build_config("", lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "PRCAT_MAX_PAGES"),
        "expected InvalidEnvVar(PRCAT_MAX_PAGES), got: {result:?}"
    );
}

#[test]
fn unknown_storage_type_override_is_rejected() {
    let mut map = HashMap::new();
    map.insert("PRCAT_STORAGE_TYPE", "redis");
    let result = build_config("", lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "PRCAT_STORAGE_TYPE"),
        "expected InvalidEnvVar(PRCAT_STORAGE_TYPE), got: {result:?}"
    );
}

#[test]
fn unknown_storage_type_in_file_is_a_parse_error() {
    let map = HashMap::new();
    let result = build_config("storage:\n  type: redis\n", lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::FileParse(_))), "got: {result:?}");
}

#[test]
fn invalid_base_url_fails_validation() {
    let mut map = HashMap::new();
    map.insert("PRCAT_BASE_URL", "not a url");
    let result = build_config("", lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::Validation(_))), "got: {result:?}");
}

#[test]
fn non_positive_rate_fails_validation() {
    let map = HashMap::new();
    let result = build_config("currency:\n  gbp_to_eur: 0\n", lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::Validation(_))), "got: {result:?}");
}

#[test]
fn site_origin_strips_path_and_query() {
    let mut map = HashMap::new();
    map.insert("PRCAT_BASE_URL", "https://shop.example.co.uk/cl/1/Phones?sort=price");
    let cfg = build_config("", lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.site_origin(), "https://shop.example.co.uk");
}

#[test]
fn database_connection_url_without_password() {
    let db = DatabaseConfig::default();
    assert_eq!(db.connection_url(), "postgres://postgres@localhost:5432/prcat");
}

#[test]
fn database_connection_url_encodes_credentials() {
    let db = DatabaseConfig {
        user: "crawler@team".to_string(),
        password: "p@ss/w:rd".to_string(),
        host: "db".to_string(),
        ..Default::default()
    };
    assert_eq!(
        db.connection_url(),
        "postgres://crawler%40team:p%40ss%2Fw%3Ard@db:5432/prcat"
    );
}

#[test]
fn database_debug_redacts_secrets() {
    let db = DatabaseConfig {
        url: Some("postgres://u:hunter2@h/d".to_string()),
        password: "hunter2".to_string(),
        ..Default::default()
    };
    let rendered = format!("{db:?}");
    assert!(!rendered.contains("hunter2"), "secret leaked: {rendered}");
}

#[test]
fn load_config_creates_output_directories() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let images = dir.path().join("out/img");
    let yaml = format!(
        "storage:\n  output_dir: {:?}\n  images_dir: {:?}\n",
        out.display().to_string(),
        images.display().to_string()
    );
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, yaml).unwrap();

    let cfg = load_config(&path).unwrap();
    assert_eq!(cfg.storage.output_dir, out);
    assert!(out.is_dir());
    assert!(images.is_dir());
}

#[test]
fn load_config_reports_missing_file() {
    let result = load_config(Path::new("/definitely/not/here/config.yaml"));
    assert!(matches!(result, Err(ConfigError::FileIo { .. })), "got: {result:?}");
}
