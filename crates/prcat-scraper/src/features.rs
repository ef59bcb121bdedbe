//! Product feature tables: header rows set a sticky category, data rows become
//! `"<category>: <name>" -> value` entries.

use std::collections::BTreeMap;

use prcat_core::DEFAULT_CATEGORY;

use crate::page::{NodeHandle, Page};

/// Table selectors tried after the configured one.
pub const TABLE_FALLBACKS: [&str; 3] = [
    "table.pr-1regpt0-Table-table",
    "div[class*='Table'] table",
    "table",
];

const CATEGORY_LABEL_SELECTOR: &str = "div.pr-f8aw3g";

const PLACEHOLDER_LABELS: [&str; 9] = [",", " ", "-", "–", "—", "N/A", "n/a", "TBD", "tbd"];

/// Features and category labels extracted from one or more tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    pub features: BTreeMap<String, String>,
    /// Distinct header labels, in first-seen order.
    pub categories: Vec<String>,
}

impl FeatureSet {
    /// Fold `other` into `self`; later values win on key collisions.
    pub fn merge(&mut self, other: FeatureSet) {
        self.features.extend(other.features);
        for category in other.categories {
            if !self.categories.contains(&category) {
                self.categories.push(category);
            }
        }
    }
}

/// A header label is usable if it is 2 to 50 characters and not a placeholder.
#[must_use]
pub fn is_valid_category(label: &str) -> bool {
    let len = label.chars().count();
    (2..=50).contains(&len) && !PLACEHOLDER_LABELS.contains(&label)
}

/// A data row is kept if both parts are present and differ, the name has at
/// least two characters, and the name is not a "compare" control.
#[must_use]
pub fn is_valid_feature(name: &str, value: &str) -> bool {
    !name.is_empty()
        && !value.is_empty()
        && name != value
        && name.chars().count() >= 2
        && !name.to_lowercase().contains("compare")
}

/// Storage key for a feature under `category`.
#[must_use]
pub fn feature_key(category: &str, name: &str) -> String {
    if category.is_empty() || category == DEFAULT_CATEGORY {
        name.to_string()
    } else {
        format!("{category}: {name}")
    }
}

async fn trimmed_text(page: &dyn Page, node: NodeHandle) -> Option<String> {
    page.text(node)
        .await
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

async fn is_header_row(page: &dyn Page, row: NodeHandle) -> bool {
    if page.parent_tag(row).await.ok().flatten().as_deref() == Some("THEAD") {
        return true;
    }
    if page
        .query_within(row, "th")
        .await
        .is_ok_and(|ths| !ths.is_empty())
    {
        return true;
    }

    let class = page.attribute(row, "class").await.ok().flatten().unwrap_or_default();
    if class.contains("heading") || class.contains("header") {
        return true;
    }
    let kind = page.attribute(row, "data-kind").await.ok().flatten();
    if matches!(kind.as_deref(), Some("heading" | "header")) {
        return true;
    }

    let Ok(cells) = page.query_within(row, "td, th").await else {
        return false;
    };
    for cell in cells {
        if page.attribute(cell, "data-kind").await.ok().flatten().as_deref() == Some("heading") {
            return true;
        }
    }
    false
}

async fn header_label(page: &dyn Page, row: NodeHandle) -> Option<String> {
    for selector in [CATEGORY_LABEL_SELECTOR, "th", "td, th"] {
        let Ok(found) = page.query_within(row, selector).await else {
            continue;
        };
        let Some(&first) = found.first() else {
            continue;
        };
        if let Some(label) = trimmed_text(page, first).await {
            if is_valid_category(&label) {
                return Some(label);
            }
        }
    }
    None
}

async fn data_row(page: &dyn Page, row: NodeHandle) -> Option<(String, String)> {
    let cells = page.query_within(row, "td").await.ok()?;
    if cells.len() < 2 {
        return None;
    }
    let name = page.text(cells[0]).await.ok()?.trim().to_string();
    let value = page.text(cells[1]).await.ok()?.trim().to_string();
    is_valid_feature(&name, &value).then_some((name, value))
}

/// Parse one table. The category starts as [`DEFAULT_CATEGORY`] and changes
/// at each header row with a valid label.
pub async fn parse_table(page: &dyn Page, table: NodeHandle) -> FeatureSet {
    let mut set = FeatureSet::default();
    let Ok(rows) = page.query_within(table, "tr").await else {
        return set;
    };

    let mut category = DEFAULT_CATEGORY.to_string();
    for row in rows {
        if is_header_row(page, row).await {
            if let Some(label) = header_label(page, row).await {
                if !set.categories.contains(&label) {
                    set.categories.push(label.clone());
                }
                category = label;
            }
            continue;
        }

        if let Some((name, value)) = data_row(page, row).await {
            set.features.insert(feature_key(&category, &name), value);
        }
    }
    set
}

/// Tables matched by the first selector in the chain that finds any.
pub async fn find_tables(page: &dyn Page, configured: &str) -> Vec<NodeHandle> {
    for selector in std::iter::once(configured).chain(TABLE_FALLBACKS) {
        if let Ok(tables) = page.query_all(selector).await {
            if !tables.is_empty() {
                tracing::debug!(selector, tables = tables.len(), "feature tables found");
                return tables;
            }
        }
    }
    Vec::new()
}

/// Parse every feature table on the page and merge the results.
pub async fn extract_features(page: &dyn Page, configured: &str) -> FeatureSet {
    let mut merged = FeatureSet::default();
    for table in find_tables(page, configured).await {
        merged.merge(parse_table(page, table).await);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_site::HtmlPage;

    const TABLES: &str = "table.pr-1regpt0-Table-table";

    #[test]
    fn category_validation() {
        assert!(is_valid_category("Display"));
        assert!(!is_valid_category("X"));
        assert!(!is_valid_category("N/A"));
        assert!(!is_valid_category("tbd"));
        assert!(!is_valid_category(&"a".repeat(51)));
        assert!(is_valid_category(&"a".repeat(50)));
    }

    #[test]
    fn feature_validation() {
        assert!(is_valid_feature("Weight", "200g"));
        assert!(!is_valid_feature("", "200g"));
        assert!(!is_valid_feature("Weight", ""));
        assert!(!is_valid_feature("Yes", "Yes"));
        assert!(!is_valid_feature("W", "200g"));
        assert!(!is_valid_feature("Compare prices", "3"));
    }

    #[test]
    fn default_category_keys_are_unprefixed() {
        assert_eq!(feature_key(DEFAULT_CATEGORY, "Weight"), "Weight");
        assert_eq!(feature_key("Display", "Size"), "Display: Size");
    }

    #[tokio::test]
    async fn header_row_prefixes_following_rows() {
        let page = HtmlPage::from_html(
            r#"<table class="pr-1regpt0-Table-table">
                 <thead><tr><td>Display</td></tr></thead>
                 <tbody>
                   <tr><td>Size</td><td>6.1"</td></tr>
                   <tr><td>Weight</td><td>200g</td></tr>
                 </tbody>
               </table>"#,
        );
        let set = extract_features(&page, TABLES).await;
        let expected: BTreeMap<String, String> = [
            ("Display: Size".to_string(), "6.1\"".to_string()),
            ("Display: Weight".to_string(), "200g".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.features, expected);
        assert_eq!(set.categories, vec!["Display".to_string()]);
    }

    #[tokio::test]
    async fn rows_without_header_are_unprefixed() {
        let page = HtmlPage::from_html(
            r#"<table><tr><td>Size</td><td>6.1"</td></tr><tr><td>Weight</td><td>200g</td></tr></table>"#,
        );
        let set = extract_features(&page, TABLES).await;
        assert_eq!(set.features.get("Size").map(String::as_str), Some("6.1\""));
        assert_eq!(set.features.get("Weight").map(String::as_str), Some("200g"));
        assert!(set.categories.is_empty());
    }

    #[tokio::test]
    async fn header_detection_variants() {
        let page = HtmlPage::from_html(
            r#"<table class="pr-1regpt0-Table-table">
                 <tr><th>Battery</th></tr>
                 <tr><td>Capacity</td><td>4000 mAh</td></tr>
                 <tr class="row-heading"><td>Camera</td></tr>
                 <tr><td>Main</td><td>48 MP</td></tr>
                 <tr data-kind="header"><td>Memory</td></tr>
                 <tr><td>RAM</td><td>8 GB</td></tr>
                 <tr><td data-kind="heading"><div class="pr-f8aw3g">Network</div></td><td>ignored</td></tr>
                 <tr><td>5G</td><td>Yes</td></tr>
               </table>"#,
        );
        let set = extract_features(&page, TABLES).await;
        assert_eq!(set.features.get("Battery: Capacity").map(String::as_str), Some("4000 mAh"));
        assert_eq!(set.features.get("Camera: Main").map(String::as_str), Some("48 MP"));
        assert_eq!(set.features.get("Memory: RAM").map(String::as_str), Some("8 GB"));
        assert_eq!(set.features.get("Network: 5G").map(String::as_str), Some("Yes"));
        assert_eq!(set.features.len(), 4);
        assert_eq!(set.categories, vec!["Battery", "Camera", "Memory", "Network"]);
    }

    #[tokio::test]
    async fn invalid_header_label_keeps_previous_category() {
        let page = HtmlPage::from_html(
            r#"<table>
                 <tr><th>Display</th></tr>
                 <tr><td>Size</td><td>6.1"</td></tr>
                 <tr><th>-</th></tr>
                 <tr><td>Type</td><td>OLED</td></tr>
               </table>"#,
        );
        let set = extract_features(&page, TABLES).await;
        assert_eq!(set.features.get("Display: Type").map(String::as_str), Some("OLED"));
    }

    #[tokio::test]
    async fn category_resets_per_table_and_later_tables_win() {
        let page = HtmlPage::from_html(
            r#"<table class="pr-1regpt0-Table-table">
                 <tr><th>Display</th></tr>
                 <tr><td>Size</td><td>6.1"</td></tr>
                 <tr><td>Colour</td><td>Black</td></tr>
               </table>
               <table class="pr-1regpt0-Table-table">
                 <tr><td>Colour</td><td>Blue</td></tr>
                 <tr><th>Display</th></tr>
                 <tr><td>Size</td><td>6.7"</td></tr>
               </table>"#,
        );
        let set = extract_features(&page, TABLES).await;
        assert_eq!(set.features.get("Colour").map(String::as_str), Some("Blue"));
        assert_eq!(set.features.get("Display: Colour").map(String::as_str), Some("Black"));
        assert_eq!(set.features.get("Display: Size").map(String::as_str), Some("6.7\""));
        assert_eq!(set.categories, vec!["Display"]);
    }

    #[tokio::test]
    async fn configured_selector_takes_precedence() {
        let page = HtmlPage::from_html(
            r#"<table class="specs"><tr><td>Weight</td><td>200g</td></tr></table>
               <table class="pr-1regpt0-Table-table"><tr><td>Height</td><td>15cm</td></tr></table>"#,
        );
        let set = extract_features(&page, "table.specs").await;
        assert_eq!(set.features.len(), 1);
        assert!(set.features.contains_key("Weight"));
    }
}
