//! Database operations for the `products` table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use prcat_core::{ImageInfo, PriceInfo, Product};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};

use crate::DbError;

/// A row from the `products` table.
///
/// `price_eur` is selected as `float8`; the column itself is `NUMERIC(10,2)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: String,
    pub title: String,
    pub url: String,
    pub image_url: Option<String>,
    pub image_local: Option<String>,
    pub price_gbp: Option<String>,
    pub price_eur: Option<f64>,
    pub offer_count: Option<String>,
    pub features: Json<BTreeMap<String, String>>,
    pub categories: Vec<String>,
    pub additional_images: Json<Vec<ImageInfo>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        let price = if row.price_gbp.is_some() || row.price_eur.is_some() {
            Some(PriceInfo {
                price_gbp: row.price_gbp.unwrap_or_default(),
                price_eur: row.price_eur.unwrap_or_default(),
                offer_count: row.offer_count.unwrap_or_default(),
            })
        } else {
            None
        };

        Self {
            id: row.id,
            title: row.title,
            url: row.url,
            image_url: row.image_url.unwrap_or_default(),
            image_local: row.image_local.unwrap_or_default(),
            price,
            features: row.features.0,
            categories: row.categories,
            extra_images: row.additional_images.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

/// Upserts one product row keyed by `id`.
///
/// Conflicts replace every column except `created_at`, which keeps the value
/// from the first insert, and refresh `updated_at`.
///
/// `price_eur` is bound as `f64` and cast to `NUMERIC(10,2)` by the database
/// engine; a non-positive amount is stored as `NULL`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_product<'e, E>(executor: E, product: &Product) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let price = product.price.as_ref();
    let price_eur = price.map(|p| p.price_eur).filter(|eur| *eur > 0.0);

    sqlx::query(
        "INSERT INTO products \
             (id, title, url, image_url, image_local, price_gbp, price_eur, offer_count, \
              features, categories, additional_images, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7::numeric(10,2), $8, \
                 $9, $10, $11, $12, $13) \
         ON CONFLICT (id) DO UPDATE SET \
             title             = EXCLUDED.title, \
             url               = EXCLUDED.url, \
             image_url         = EXCLUDED.image_url, \
             image_local       = EXCLUDED.image_local, \
             price_gbp         = EXCLUDED.price_gbp, \
             price_eur         = EXCLUDED.price_eur, \
             offer_count       = EXCLUDED.offer_count, \
             features          = EXCLUDED.features, \
             categories        = EXCLUDED.categories, \
             additional_images = EXCLUDED.additional_images, \
             updated_at        = NOW()",
    )
    .bind(&product.id)
    .bind(&product.title)
    .bind(&product.url)
    .bind(non_empty(&product.image_url))
    .bind(non_empty(&product.image_local))
    .bind(price.and_then(|p| non_empty(&p.price_gbp)))
    .bind(price_eur)
    .bind(price.and_then(|p| non_empty(&p.offer_count)))
    .bind(Json(&product.features))
    .bind(&product.categories)
    .bind(Json(&product.extra_images))
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Upserts a batch of products.
///
/// All upserts run inside a single transaction; if any operation fails
/// the entire batch is rolled back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn upsert_products(pool: &PgPool, products: &[Product]) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    for product in products {
        upsert_product(&mut *tx, product).await?;
    }
    tx.commit().await?;
    Ok(products.len())
}

/// Ids of every stored product, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_product_ids(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let ids = sqlx::query_scalar::<_, String>("SELECT id FROM products ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// Returns the stored product with `id`, if one exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product(pool: &PgPool, id: &str) -> Result<Option<Product>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(
        "SELECT id, title, url, image_url, image_local, price_gbp, \
                price_eur::float8 AS price_eur, offer_count, features, categories, \
                additional_images, created_at, updated_at \
         FROM products \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Product::from))
}
