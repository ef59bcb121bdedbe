//! Offline extraction from a saved detail page.

use std::path::Path;

use anyhow::Context;
use prcat_core::{BasicProduct, CrawlConfig, Product};
use prcat_scraper::listing::product_id_from_href;
use prcat_scraper::origin::absolutize;
use prcat_scraper::{DetailExtractor, HtmlPage, Page};

/// Run the detail extractors over `html` without downloading anything.
///
/// The id comes from `url` when it carries one, else `fallback_id`. The
/// title is the first `h1` on the page.
pub(crate) async fn inspect_html(
    config: &CrawlConfig,
    html: String,
    url: Option<&str>,
    fallback_id: &str,
) -> Product {
    let page = HtmlPage::from_html(html);
    let url = url.map(|u| absolutize(u, &config.site_origin()));

    let id = url
        .as_deref()
        .and_then(product_id_from_href)
        .unwrap_or(fallback_id)
        .to_string();
    let title = first_heading(&page).await.unwrap_or_default();

    let stub = BasicProduct {
        id,
        title,
        url: url.unwrap_or_default(),
    };
    DetailExtractor::new(config, None)
        .extract_loaded(&page, &stub)
        .await
}

async fn first_heading(page: &HtmlPage) -> Option<String> {
    let headings = page.query_all("h1").await.ok()?;
    let text = page.text(*headings.first()?).await.ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Read `file` and extract a product from it.
///
/// # Errors
///
/// Returns an error if the file cannot be read as UTF-8.
pub(crate) async fn inspect_file(
    config: &CrawlConfig,
    file: &Path,
    url: Option<&str>,
) -> anyhow::Result<Product> {
    let html = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let fallback_id = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    Ok(inspect_html(config, html, url, fallback_id).await)
}
