//! File-backed product storage: one pretty-printed JSON array per listing
//! page plus a consolidated file for the whole run.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use prcat_core::{Product, ProductSink, SinkError};
use serde::Deserialize;

pub const FINAL_FILE_NAME: &str = "all_products_detailed.json";

#[must_use]
pub fn page_file_name(page: u32) -> String {
    format!("products_page_{page}_detailed.json")
}

/// Page number encoded in a page file name.
fn page_number(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix("products_page_")?
        .strip_suffix("_detailed.json")?
        .parse()
        .ok()
}

#[derive(Deserialize)]
struct StoredId {
    id: String,
}

#[derive(Debug, Clone)]
pub struct JsonFileSink {
    output_dir: PathBuf,
}

impl JsonFileSink {
    /// Creates the output directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the directory cannot be created.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|source| SinkError::Io {
            path: output_dir.display().to_string(),
            source,
        })?;
        Ok(Self { output_dir })
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Upsert `products` into the JSON array stored in `file_name`.
    ///
    /// Records already in the file are kept; an incoming record replaces the
    /// stored one with the same id in place. The merged array is written to a
    /// `temp_` sibling first and renamed over the target, so readers never
    /// see a partial file. Returns the number of records now in the file.
    async fn write_products(&self, file_name: &str, products: &[Product]) -> Result<usize, SinkError> {
        let target = self.output_dir.join(file_name);
        let stored = match tokio::fs::try_exists(&target).await {
            Ok(true) => self.read_file::<Product>(file_name).await.unwrap_or_default(),
            Ok(false) => Vec::new(),
            Err(source) => return Err(io_error(&target, source)),
        };
        let merged = merge_by_id(stored, products.iter().cloned());

        let body = serde_json::to_vec_pretty(&merged).map_err(|source| SinkError::Json {
            context: file_name.to_string(),
            source,
        })?;

        let temp = self.output_dir.join(format!("temp_{file_name}"));
        tokio::fs::write(&temp, body)
            .await
            .map_err(|source| io_error(&temp, source))?;
        tokio::fs::rename(&temp, &target)
            .await
            .map_err(|source| io_error(&target, source))?;

        tracing::debug!(
            path = %target.display(),
            saved = products.len(),
            stored = merged.len(),
            "products written"
        );
        Ok(merged.len())
    }

    /// Names of the readable `*.json` files in the output directory, sorted,
    /// excluding in-flight `temp` files.
    async fn json_files(&self) -> Result<Vec<String>, SinkError> {
        let mut entries = tokio::fs::read_dir(&self.output_dir)
            .await
            .map_err(|source| io_error(&self.output_dir, source))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| io_error(&self.output_dir, source))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.ends_with(".json") && !name.contains("temp") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read_file<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<Vec<T>> {
        let path = self.output_dir.join(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(items) => Some(items),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unparsable file");
                None
            }
        }
    }

    /// Every stored product, one record per id.
    ///
    /// Page files are applied in ascending page order, then the consolidated
    /// file; a later record replaces an earlier one with the same id while
    /// keeping its first-seen position.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the output directory cannot be listed.
    pub async fn load_products(&self) -> Result<Vec<Product>, SinkError> {
        let names = self.json_files().await?;

        let mut pages: Vec<(u32, &str)> = names
            .iter()
            .filter_map(|name| page_number(name).map(|n| (n, name.as_str())))
            .collect();
        pages.sort_unstable_by_key(|(n, _)| *n);

        let mut ordered: Vec<&str> = pages.into_iter().map(|(_, name)| name).collect();
        if names.iter().any(|n| n == FINAL_FILE_NAME) {
            ordered.push(FINAL_FILE_NAME);
        }

        let mut products: Vec<Product> = Vec::new();
        for name in ordered {
            let Some(batch) = self.read_file::<Product>(name).await else {
                continue;
            };
            products = merge_by_id(products, batch);
        }
        Ok(products)
    }
}

/// Apply `incoming` on top of `base`: a record with a known id replaces the
/// earlier one at its first-seen position, new ids are appended.
fn merge_by_id(base: Vec<Product>, incoming: impl IntoIterator<Item = Product>) -> Vec<Product> {
    let mut products = Vec::with_capacity(base.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for product in base.into_iter().chain(incoming) {
        if let Some(&i) = index.get(&product.id) {
            products[i] = product;
        } else {
            index.insert(product.id.clone(), products.len());
            products.push(product);
        }
    }
    products
}

fn io_error(path: &Path, source: std::io::Error) -> SinkError {
    SinkError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl ProductSink for JsonFileSink {
    async fn save_products(&self, products: &[Product], page: u32) -> Result<(), SinkError> {
        self.write_products(&page_file_name(page), products)
            .await
            .map(|_| ())
    }

    async fn save_final_data(&self, products: &[Product]) -> Result<(), SinkError> {
        let stored = self.write_products(FINAL_FILE_NAME, products).await?;
        tracing::info!(
            path = %self.output_dir.join(FINAL_FILE_NAME).display(),
            count = products.len(),
            stored,
            "final data saved"
        );
        Ok(())
    }

    /// Ids found in any stored JSON file, in file-name order, without repeats.
    async fn existing_ids(&self) -> Result<Vec<String>, SinkError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for name in self.json_files().await? {
            let Some(stored) = self.read_file::<StoredId>(&name).await else {
                continue;
            };
            for StoredId { id } in stored {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use prcat_core::{BasicProduct, PriceInfo};

    use super::*;

    fn product(id: &str, title: &str) -> Product {
        let stub = BasicProduct {
            id: id.to_string(),
            title: title.to_string(),
            url: format!("https://www.pricerunner.com/pl/{id}/x"),
        };
        Product::from_stub(&stub, Utc::now())
    }

    #[test]
    fn page_file_names_round_trip() {
        assert_eq!(page_file_name(3), "products_page_3_detailed.json");
        assert_eq!(page_number("products_page_12_detailed.json"), Some(12));
        assert_eq!(page_number(FINAL_FILE_NAME), None);
    }

    #[tokio::test]
    async fn page_and_final_files_are_pretty_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path()).unwrap();

        sink.save_products(&[product("1-1", "One")], 1).await.unwrap();
        sink.save_final_data(&[product("1-1", "One"), product("2-2", "Two")])
            .await
            .unwrap();

        let page = std::fs::read_to_string(dir.path().join("products_page_1_detailed.json")).unwrap();
        assert!(page.starts_with("[\n"));
        let all: Vec<Product> = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(FINAL_FILE_NAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(all.len(), 2);
        assert!(!dir.path().join(format!("temp_{FINAL_FILE_NAME}")).exists());
    }

    #[tokio::test]
    async fn existing_ids_skip_temp_and_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path()).unwrap();

        sink.save_products(&[product("1-1", "One"), product("2-2", "Two")], 1)
            .await
            .unwrap();
        sink.save_final_data(&[product("2-2", "Two"), product("3-3", "Three")])
            .await
            .unwrap();
        std::fs::write(dir.path().join("temp_products.json"), r#"[{"id":"9-9"}]"#).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), r#"[{"id":"8-8"}]"#).unwrap();

        let mut ids = sink.existing_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["1-1", "2-2", "3-3"]);
    }

    #[tokio::test]
    async fn saving_the_same_id_twice_leaves_one_latest_record() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path()).unwrap();

        sink.save_products(&[product("1-1", "Old title")], 1).await.unwrap();
        let mut updated = product("1-1", "New title");
        updated.price = Some(PriceInfo {
            price_gbp: "£10.00".to_string(),
            price_eur: 11.5,
            offer_count: String::new(),
        });
        sink.save_products(&[updated.clone(), product("2-2", "Two")], 2)
            .await
            .unwrap();

        let stored = sink.load_products().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0], updated);
        assert_eq!(stored[1].id, "2-2");
    }

    #[tokio::test]
    async fn consolidated_file_wins_over_page_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path()).unwrap();

        sink.save_products(&[product("1-1", "Page copy")], 10).await.unwrap();
        sink.save_products(&[product("1-1", "Earlier page")], 2).await.unwrap();
        sink.save_final_data(&[product("1-1", "Final copy")]).await.unwrap();

        let stored = sink.load_products().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Final copy");
    }

    #[tokio::test]
    async fn repeated_runs_keep_every_saved_id() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path()).unwrap();

        let first_run = [product("1-1", "One"), product("2-2", "Two")];
        sink.save_products(&first_run, 1).await.unwrap();
        sink.save_final_data(&first_run).await.unwrap();

        let second_run = [product("3-3", "Three")];
        sink.save_products(&second_run, 1).await.unwrap();
        sink.save_final_data(&second_run).await.unwrap();

        let mut ids = sink.existing_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["1-1", "2-2", "3-3"]);

        let stored = sink.load_products().await.unwrap();
        let stored_ids: Vec<&str> = stored.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(stored_ids, vec!["1-1", "2-2", "3-3"]);

        let page: Vec<Product> = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(page_file_name(1))).unwrap(),
        )
        .unwrap();
        assert_eq!(page.len(), 3);
    }

    #[tokio::test]
    async fn resaving_an_id_updates_it_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path()).unwrap();

        sink.save_final_data(&[product("1-1", "One"), product("2-2", "Two")])
            .await
            .unwrap();
        sink.save_final_data(&[
            product("1-1", "First draft"),
            product("4-4", "Four"),
            product("1-1", "One, updated"),
        ])
        .await
        .unwrap();

        let all: Vec<Product> = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(FINAL_FILE_NAME)).unwrap(),
        )
        .unwrap();
        let titles: Vec<(&str, &str)> = all
            .iter()
            .map(|p| (p.id.as_str(), p.title.as_str()))
            .collect();
        assert_eq!(
            titles,
            vec![("1-1", "One, updated"), ("2-2", "Two"), ("4-4", "Four")]
        );
    }

    #[tokio::test]
    async fn empty_directory_has_no_ids() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("nested/out")).unwrap();
        assert!(sink.existing_ids().await.unwrap().is_empty());
        assert!(sink.load_products().await.unwrap().is_empty());
    }
}
