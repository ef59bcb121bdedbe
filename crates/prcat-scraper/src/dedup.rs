use std::collections::HashSet;

use prcat_core::{BasicProduct, ProductSink};

/// Drop stubs whose id the sink already holds.
///
/// Fails open: if the sink cannot list its ids, every stub is returned and a
/// warning is logged.
pub async fn filter_new(sink: &dyn ProductSink, stubs: Vec<BasicProduct>) -> Vec<BasicProduct> {
    let existing: HashSet<String> = match sink.existing_ids().await {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => {
            tracing::warn!(error = %e, "could not list existing products; processing all stubs");
            return stubs;
        }
    };

    stubs
        .into_iter()
        .filter(|stub| !existing.contains(&stub.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use prcat_core::{Product, SinkError};

    use super::*;

    struct FixedIds(Result<Vec<String>, ()>);

    #[async_trait]
    impl ProductSink for FixedIds {
        async fn save_products(&self, _: &[Product], _: u32) -> Result<(), SinkError> {
            Ok(())
        }
        async fn save_final_data(&self, _: &[Product]) -> Result<(), SinkError> {
            Ok(())
        }
        async fn existing_ids(&self) -> Result<Vec<String>, SinkError> {
            self.0
                .clone()
                .map_err(|()| SinkError::Backend("unavailable".to_string()))
        }
        async fn close(&self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn stub(id: &str) -> BasicProduct {
        BasicProduct {
            id: id.to_string(),
            title: format!("Product {id}"),
            url: format!("https://www.pricerunner.com/pl/{id}/x"),
        }
    }

    #[tokio::test]
    async fn known_ids_are_removed_in_order() {
        let sink = FixedIds(Ok(vec!["2-2".to_string()]));
        let kept = filter_new(&sink, vec![stub("1-1"), stub("2-2"), stub("3-3")]).await;
        let ids: Vec<&str> = kept.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1-1", "3-3"]);
    }

    #[tokio::test]
    async fn sink_failure_keeps_everything() {
        let sink = FixedIds(Err(()));
        let kept = filter_new(&sink, vec![stub("1-1"), stub("2-2")]).await;
        assert_eq!(kept.len(), 2);
    }
}
