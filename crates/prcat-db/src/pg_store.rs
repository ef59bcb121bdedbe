use async_trait::async_trait;
use prcat_core::{Product, ProductSink, SinkError};
use sqlx::PgPool;

use crate::products::{get_product, list_product_ids, upsert_products};
use crate::DbError;

/// [`ProductSink`] backed by the Postgres `products` table.
#[derive(Debug, Clone)]
pub struct PgProductSink {
    pool: PgPool,
}

impl PgProductSink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Read one stored product back.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the query fails.
    pub async fn get_product(&self, id: &str) -> Result<Option<Product>, DbError> {
        get_product(&self.pool, id).await
    }

    fn ensure_open(&self) -> Result<(), SinkError> {
        if self.pool.is_closed() {
            return Err(SinkError::Closed);
        }
        Ok(())
    }
}

fn backend(e: DbError) -> SinkError {
    SinkError::Backend(e.to_string())
}

#[async_trait]
impl ProductSink for PgProductSink {
    async fn save_products(&self, products: &[Product], page: u32) -> Result<(), SinkError> {
        self.ensure_open()?;
        let saved = upsert_products(&self.pool, products).await.map_err(backend)?;
        tracing::debug!(page, saved, "page products upserted");
        Ok(())
    }

    async fn save_final_data(&self, products: &[Product]) -> Result<(), SinkError> {
        self.ensure_open()?;
        let saved = upsert_products(&self.pool, products).await.map_err(backend)?;
        tracing::info!(saved, "final products upserted");
        Ok(())
    }

    async fn existing_ids(&self) -> Result<Vec<String>, SinkError> {
        self.ensure_open()?;
        list_product_ids(&self.pool).await.map_err(backend)
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.pool.close().await;
        Ok(())
    }
}
