use async_trait::async_trait;
use thiserror::Error;

use crate::products::Product;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error for {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("sink is closed")]
    Closed,
}

/// Destination for extracted products.
///
/// Writes are upserts keyed by [`Product::id`]: persisting the same id twice
/// leaves one record carrying the latest values.
#[async_trait]
pub trait ProductSink: Send + Sync {
    /// Persist one listing page's worth of records.
    async fn save_products(&self, products: &[Product], page: u32) -> Result<(), SinkError>;

    /// Persist the consolidated set accumulated over a whole run.
    async fn save_final_data(&self, products: &[Product]) -> Result<(), SinkError>;

    /// Ids of every product the sink already holds.
    async fn existing_ids(&self) -> Result<Vec<String>, SinkError>;

    async fn close(&self) -> Result<(), SinkError>;
}
