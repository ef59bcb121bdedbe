//! Listing-page card extraction.

use std::sync::LazyLock;

use prcat_core::BasicProduct;
use regex::Regex;

use crate::origin::absolutize;
use crate::page::{Page, PageError};

static PRODUCT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/pl/(\d+-\d+)/").expect("valid regex"));

/// The `<digits>-<digits>` id embedded in a product link, if any.
#[must_use]
pub fn product_id_from_href(href: &str) -> Option<&str> {
    PRODUCT_ID_RE
        .captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Read every card matching `card_selector` into a [`BasicProduct`].
///
/// Cards without a `title`, without an `href`, or whose link carries no
/// product id are skipped. Relative links are joined with `origin`. Document
/// order is preserved and in-page duplicates are kept.
///
/// # Errors
///
/// Returns [`PageError`] only if the card query itself fails; per-card read
/// failures skip the card.
pub async fn extract_stubs(
    page: &dyn Page,
    card_selector: &str,
    origin: &str,
) -> Result<Vec<BasicProduct>, PageError> {
    let cards = page.query_all(card_selector).await?;
    let mut stubs = Vec::with_capacity(cards.len());

    for card in cards {
        let title = match page.attribute(card, "title").await {
            Ok(Some(t)) if !t.trim().is_empty() => t,
            _ => continue,
        };
        let href = match page.attribute(card, "href").await {
            Ok(Some(h)) if !h.is_empty() => h,
            _ => continue,
        };
        let Some(id) = product_id_from_href(&href) else {
            tracing::debug!(href, "card link has no product id; skipping");
            continue;
        };

        stubs.push(BasicProduct {
            id: id.to_string(),
            title,
            url: absolutize(&href, origin),
        });
    }

    Ok(stubs)
}
