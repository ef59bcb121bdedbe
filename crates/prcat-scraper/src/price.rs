//! Price extraction: ordered strategies, first hit wins.

use std::sync::LazyLock;

use prcat_core::PriceInfo;
use regex::Regex;

use crate::page::{NodeHandle, Page};

/// Marker text of the paragraph preceding the current lowest price.
pub const LOWEST_PRICE_MARKER: &str = "Lowest Price Now";

/// Structural fallback: the price span inside the second offer column.
pub const STRUCTURAL_PRICE_SELECTOR: &str =
    "div.pr-1ymxntz div.pr-i5pc8s:nth-child(2) span.pr-1fcg5be";

static PRICE_NOISE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[£€\s,]").expect("valid regex"));

/// Convert displayed GBP text to EUR. Currency symbols, whitespace and
/// thousands separators are stripped; anything unparsable converts to `0.0`.
#[must_use]
pub fn convert_gbp_to_eur(price_text: &str, rate: f64) -> f64 {
    PRICE_NOISE_RE
        .replace_all(price_text, "")
        .parse::<f64>()
        .map_or(0.0, |gbp| gbp * rate)
}

async fn non_empty_text(page: &dyn Page, node: NodeHandle) -> Option<String> {
    let text = page.text(node).await.ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// The second element carrying the price class.
async fn second_price_span(page: &dyn Page, price_selector: &str) -> Option<String> {
    let spans = page.query_all(price_selector).await.ok()?;
    non_empty_text(page, *spans.get(1)?).await
}

/// A price-class element whose earlier siblings include the
/// "Lowest Price Now" paragraph.
async fn after_lowest_price_marker(page: &dyn Page, price_selector: &str) -> Option<String> {
    let spans = page.query_all(price_selector).await.ok()?;
    for span in spans {
        let Ok(siblings) = page.preceding_siblings(span).await else {
            continue;
        };
        let follows_marker = siblings
            .iter()
            .any(|s| s.tag == "P" && s.text.contains(LOWEST_PRICE_MARKER));
        if follows_marker {
            if let Some(text) = non_empty_text(page, span).await {
                return Some(text);
            }
        }
    }
    None
}

async fn structural_path(page: &dyn Page) -> Option<String> {
    let found = page.query_all(STRUCTURAL_PRICE_SELECTOR).await.ok()?;
    non_empty_text(page, *found.first()?).await
}

/// Find the displayed price and convert it. `None` when no strategy finds
/// price text; that is not an error.
pub async fn extract_price(
    page: &dyn Page,
    price_selector: &str,
    offer_count_selector: Option<&str>,
    rate: f64,
) -> Option<PriceInfo> {
    let price_text = if let Some(text) = second_price_span(page, price_selector).await {
        tracing::debug!(price = %text, "price from second price span");
        text
    } else if let Some(text) = after_lowest_price_marker(page, price_selector).await {
        tracing::debug!(price = %text, "price from lowest-price marker");
        text
    } else if let Some(text) = structural_path(page).await {
        tracing::debug!(price = %text, "price from structural path");
        text
    } else {
        tracing::debug!("no price found");
        return None;
    };

    let offer_count = match offer_count_selector {
        Some(selector) => match page.query_all(selector).await {
            Ok(found) => match found.first() {
                Some(node) => non_empty_text(page, *node).await.unwrap_or_default(),
                None => String::new(),
            },
            Err(_) => String::new(),
        },
        None => String::new(),
    };

    Some(PriceInfo {
        price_eur: convert_gbp_to_eur(&price_text, rate),
        price_gbp: price_text,
        offer_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_site::HtmlPage;

    const PRICE: &str = "span.pr-1fcg5be";

    #[test]
    fn converts_pounds_at_rate() {
        assert!((convert_gbp_to_eur("£100.00", 1.15) - 115.0).abs() < 1e-9);
        assert!((convert_gbp_to_eur("£1,049.99", 1.0) - 1049.99).abs() < 1e-9);
        assert!((convert_gbp_to_eur(" £ 12 ", 2.0) - 24.0).abs() < 1e-9);
    }

    #[test]
    fn unparsable_price_converts_to_zero() {
        assert!(convert_gbp_to_eur("Call for price", 1.15).abs() < f64::EPSILON);
        assert!(convert_gbp_to_eur("", 1.15).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn second_span_wins() {
        let page = HtmlPage::from_html(
            r#"<div><span class="pr-1fcg5be">£90.00</span><span class="pr-1fcg5be">£100.00</span></div>"#,
        );
        let price = extract_price(&page, PRICE, None, 1.15).await.unwrap();
        assert_eq!(price.price_gbp, "£100.00");
        assert!((price.price_eur - 115.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn falls_back_to_lowest_price_marker() {
        let page = HtmlPage::from_html(
            r#"<div><p>Lowest Price Now</p><span class="pr-1fcg5be"> £55.50 </span></div>"#,
        );
        let price = extract_price(&page, PRICE, None, 1.0).await.unwrap();
        assert_eq!(price.price_gbp, "£55.50");
        assert!((price.price_eur - 55.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn marker_must_precede_the_span() {
        let page = HtmlPage::from_html(
            r#"<div><span class="pr-1fcg5be">£55.50</span><p>Lowest Price Now</p></div>"#,
        );
        assert!(extract_price(&page, PRICE, None, 1.0).await.is_none());
    }

    #[tokio::test]
    async fn falls_back_to_structural_path() {
        let page = HtmlPage::from_html(
            r#"<div class="pr-1ymxntz">
                 <div class="pr-i5pc8s"><em>first</em></div>
                 <div class="pr-i5pc8s"><span class="pr-1fcg5be">£20</span></div>
               </div>"#,
        );
        let price = extract_price(&page, PRICE, None, 1.5).await.unwrap();
        assert_eq!(price.price_gbp, "£20");
        assert!((price.price_eur - 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_price_text_means_no_price() {
        let page = HtmlPage::from_html("<div><p>nothing to see</p></div>");
        assert!(extract_price(&page, PRICE, None, 1.15).await.is_none());
    }

    #[tokio::test]
    async fn offer_count_is_read_when_configured() {
        let page = HtmlPage::from_html(
            r#"<div><span class="pr-1fcg5be">x</span><span class="pr-1fcg5be">£10</span>
               <span class="offers"> 14 offers </span></div>"#,
        );
        let price = extract_price(&page, PRICE, Some("span.offers"), 1.0)
            .await
            .unwrap();
        assert_eq!(price.offer_count, "14 offers");
    }
}
