//! Detail-page extraction: one visit produces one [`Product`].

use chrono::Utc;
use prcat_core::{BasicProduct, CrawlConfig, ImageInfo, Product, SelectorsConfig};

use crate::downloader::ImageDownloader;
use crate::error::ScraperError;
use crate::features::{extract_features, TABLE_FALLBACKS};
use crate::images::{find_additional_images, find_main_image};
use crate::origin::absolutize;
use crate::page::Page;
use crate::price::extract_price;
use crate::scroll::{prepare_detail, ScrollSettings};

pub struct DetailExtractor {
    selectors: SelectorsConfig,
    gbp_to_eur: f64,
    scroll: ScrollSettings,
    origin: String,
    downloader: Option<ImageDownloader>,
}

impl DetailExtractor {
    /// Without a downloader, image URLs are recorded but nothing is fetched.
    #[must_use]
    pub fn new(config: &CrawlConfig, downloader: Option<ImageDownloader>) -> Self {
        Self {
            selectors: config.parser.selectors.clone(),
            gbp_to_eur: config.currency.gbp_to_eur,
            scroll: ScrollSettings::from(&config.parser.parsing),
            origin: config.site_origin(),
            downloader,
        }
    }

    /// Navigate to the stub's detail page and extract a full record.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Page`] if navigation fails. Extraction itself
    /// never fails: missing parts are left empty.
    pub async fn extract(
        &self,
        page: &dyn Page,
        stub: &BasicProduct,
    ) -> Result<Product, ScraperError> {
        let status = page.goto(&stub.url).await?;
        if status >= 400 {
            tracing::debug!(id = %stub.id, status, "detail page answered with an error status");
        }
        if !self.scroll.probe_delay.is_zero() {
            tokio::time::sleep(self.scroll.probe_delay).await;
        }

        let table_selectors: Vec<&str> = std::iter::once(self.selectors.feature_tables.as_str())
            .chain(TABLE_FALLBACKS)
            .collect();
        prepare_detail(page, &table_selectors, &self.scroll).await;

        Ok(self.extract_loaded(page, stub).await)
    }

    /// Extract from a page that is already showing the detail document.
    pub async fn extract_loaded(&self, page: &dyn Page, stub: &BasicProduct) -> Product {
        let mut product = Product::from_stub(stub, Utc::now());

        product.price = extract_price(
            page,
            &self.selectors.price,
            self.selectors.offer_count.as_deref(),
            self.gbp_to_eur,
        )
        .await;

        if let Some(url) = find_main_image(page, &self.selectors.main_image).await {
            let url = absolutize(&url, &self.origin);
            if let Some(local) = self.store_image(&url, &stub.id).await {
                product.image_local = local;
            }
            product.image_url = url;
        } else {
            tracing::debug!(id = %stub.id, "main image not found");
        }

        for (position, url) in
            find_additional_images(page, &self.selectors.additional_images).await
        {
            let url = absolutize(&url, &self.origin);
            let name = format!("{}_extra_{position}", stub.id);
            let local = self.store_image(&url, &name).await;
            if self.downloader.is_some() && local.is_none() {
                continue;
            }
            product.extra_images.push(ImageInfo {
                url,
                local: local.unwrap_or_default(),
            });
        }

        let features = extract_features(page, &self.selectors.feature_tables).await;
        product.features = features.features;
        product.categories = features.categories;

        product
    }

    async fn store_image(&self, url: &str, name: &str) -> Option<String> {
        let downloader = self.downloader.as_ref()?;
        match downloader.download(url, name).await {
            Ok(path) => Some(path.display().to_string()),
            Err(e) => {
                tracing::warn!(url, error = %e, "image download failed");
                None
            }
        }
    }
}
