use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category label used for feature rows that appear before any header row.
pub const DEFAULT_CATEGORY: &str = "General";

/// A product card found on a listing page. Lives for one listing cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicProduct {
    /// Listing identifier in `<digits>-<digits>` form, taken from the `/pl/` path.
    pub id: String,
    pub title: String,
    /// Absolute detail-page URL.
    pub url: String,
}

/// Raw and converted price of a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceInfo {
    /// Price text as displayed, e.g. `"£1,049.00"`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub price_gbp: String,
    /// `price_gbp` converted at the configured rate; `0.0` when unparsable.
    #[serde(default)]
    pub price_eur: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub offer_count: String,
}

/// A remote image paired with the path it was stored under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub local: String,
}

/// A fully extracted product record.
///
/// Created once per detail visit. A stored record with the same `id` is
/// replaced wholesale, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_local: String,
    #[serde(
        default,
        rename = "price_info",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<PriceInfo>,
    /// Feature name to value. Names are prefixed `"<category>: "` unless the
    /// category is [`DEFAULT_CATEGORY`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(
        default,
        rename = "additional_images",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub extra_images: Vec<ImageInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Start a record from a listing stub, stamped with `now`.
    #[must_use]
    pub fn from_stub(stub: &BasicProduct, now: DateTime<Utc>) -> Self {
        Self {
            id: stub.id.clone(),
            title: stub.title.clone(),
            url: stub.url.clone(),
            image_url: String::new(),
            image_local: String::new(),
            price: None,
            features: BTreeMap::new(),
            categories: Vec::new(),
            extra_images: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if a price was found and converted to a positive amount.
    #[must_use]
    pub fn has_price(&self) -> bool {
        self.price.as_ref().is_some_and(|p| p.price_eur > 0.0)
    }

    #[must_use]
    pub fn has_image(&self) -> bool {
        !self.image_url.is_empty()
    }

    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }
}

/// Aggregate counts over a batch of products, used for run summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProductStats {
    pub total: usize,
    pub with_price: usize,
    pub with_image: usize,
    pub with_features: usize,
}

impl ProductStats {
    #[must_use]
    pub fn from_products(products: &[Product]) -> Self {
        products.iter().fold(Self::default(), |mut acc, p| {
            acc.total += 1;
            acc.with_price += usize::from(p.has_price());
            acc.with_image += usize::from(p.has_image());
            acc.with_features += usize::from(p.feature_count() > 0);
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub() -> BasicProduct {
        BasicProduct {
            id: "3201234-1234567".to_string(),
            title: "Acme Phone 12".to_string(),
            url: "https://www.pricerunner.com/pl/3201234-1234567/Mobile-Phones/Acme-Phone-12"
                .to_string(),
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn from_stub_copies_identity_and_stamps_both_times() {
        let product = Product::from_stub(&stub(), fixed_now());
        assert_eq!(product.id, "3201234-1234567");
        assert_eq!(product.title, "Acme Phone 12");
        assert_eq!(product.created_at, product.updated_at);
        assert!(product.price.is_none());
        assert!(!product.has_price());
        assert!(!product.has_image());
        assert_eq!(product.feature_count(), 0);
    }

    #[test]
    fn empty_optional_fields_are_omitted_from_json() {
        let product = Product::from_stub(&stub(), fixed_now());
        let value = serde_json::to_value(&product).unwrap();
        let obj = value.as_object().unwrap();
        for absent in [
            "image_url",
            "image_local",
            "price_info",
            "features",
            "categories",
            "additional_images",
        ] {
            assert!(!obj.contains_key(absent), "{absent} should be omitted");
        }
        assert_eq!(obj["id"], "3201234-1234567");
        assert!(obj.contains_key("created_at"));
    }

    #[test]
    fn populated_record_uses_wire_field_names() {
        let mut product = Product::from_stub(&stub(), fixed_now());
        product.price = Some(PriceInfo {
            price_gbp: "£100.00".to_string(),
            price_eur: 115.0,
            offer_count: String::new(),
        });
        product.extra_images.push(ImageInfo {
            url: "https://img.example/a.jpg".to_string(),
            local: "output/images/x_extra_1.jpg".to_string(),
        });
        product
            .features
            .insert("Display: Size".to_string(), "6.1\"".to_string());

        let value = serde_json::to_value(&product).unwrap();
        assert_eq!(value["price_info"]["price_gbp"], "£100.00");
        assert_eq!(value["price_info"]["price_eur"], 115.0);
        assert!(value["price_info"].get("offer_count").is_none());
        assert_eq!(value["additional_images"][0]["local"], "output/images/x_extra_1.jpg");
        assert_eq!(value["features"]["Display: Size"], "6.1\"");

        let back: Product = serde_json::from_value(value).unwrap();
        assert_eq!(back, product);
    }

    #[test]
    fn has_price_requires_positive_eur() {
        let mut product = Product::from_stub(&stub(), fixed_now());
        product.price = Some(PriceInfo {
            price_gbp: "call for price".to_string(),
            price_eur: 0.0,
            offer_count: String::new(),
        });
        assert!(!product.has_price());
        product.price = Some(PriceInfo {
            price_eur: 12.5,
            ..PriceInfo::default()
        });
        assert!(product.has_price());
    }

    #[test]
    fn stats_count_each_attribute() {
        let bare = Product::from_stub(&stub(), fixed_now());
        let mut rich = bare.clone();
        rich.image_url = "https://img.example/main.jpg".to_string();
        rich.features.insert("Weight".to_string(), "200g".to_string());
        rich.price = Some(PriceInfo {
            price_eur: 10.0,
            ..PriceInfo::default()
        });

        let stats = ProductStats::from_products(&[bare, rich]);
        assert_eq!(
            stats,
            ProductStats {
                total: 2,
                with_price: 1,
                with_image: 1,
                with_features: 1,
            }
        );
    }
}
