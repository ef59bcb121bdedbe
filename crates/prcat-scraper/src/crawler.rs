//! The page-by-page crawl loop.

use std::sync::Arc;
use std::time::Duration;

use prcat_core::{BasicProduct, CrawlConfig, Product, ProductSink, ProductStats};
use tokio_util::sync::CancellationToken;

use crate::dedup::filter_new;
use crate::detail::DetailExtractor;
use crate::downloader::ImageDownloader;
use crate::error::ScraperError;
use crate::listing::extract_stubs;
use crate::origin::listing_url;
use crate::page::{Browser, Page};
use crate::scroll::{load_until_stable, ScrollSettings};

/// How long a listing page may take to show its first card.
pub const CARD_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The listing answered 404.
    NotFound,
    /// The listing had no usable cards.
    EmptyPage,
    /// A short page signalled the end of the listing.
    LastPage,
    /// The configured or safety page cap was reached.
    PageCap,
    Cancelled,
}

#[derive(Debug)]
pub struct CrawlOutcome {
    pub products: Vec<Product>,
    pub pages_processed: u32,
    pub stop_reason: StopReason,
}

/// Whether another listing page should be fetched after `page`.
///
/// A page with fewer than `expected_per_page` cards is the last one, and a
/// positive `max_pages` caps the page number.
#[must_use]
pub fn has_next_page(stub_count: usize, page: u32, expected_per_page: usize, max_pages: u32) -> bool {
    if stub_count < expected_per_page {
        return false;
    }
    !(max_pages > 0 && page >= max_pages)
}

enum Listing {
    NotFound,
    Stubs(Vec<BasicProduct>),
}

pub struct Crawler {
    browser: Arc<dyn Browser>,
    sink: Arc<dyn ProductSink>,
    detail: DetailExtractor,
    base_url: String,
    origin: String,
    card_selector: String,
    max_pages: u32,
    page_cap: u32,
    expected_per_page: usize,
    request_delay: Duration,
    scroll: ScrollSettings,
}

impl Crawler {
    #[must_use]
    pub fn new(
        config: &CrawlConfig,
        browser: Arc<dyn Browser>,
        sink: Arc<dyn ProductSink>,
        downloader: Option<ImageDownloader>,
    ) -> Self {
        let parsing = &config.parser.parsing;
        Self {
            browser,
            sink,
            detail: DetailExtractor::new(config, downloader),
            base_url: config.parser.base_url.clone(),
            origin: config.site_origin(),
            card_selector: config.parser.selectors.product_cards.clone(),
            max_pages: parsing.max_pages,
            page_cap: parsing.effective_max_pages(),
            expected_per_page: parsing.expected_per_page,
            request_delay: Duration::from_millis(parsing.delay_between_requests),
            scroll: ScrollSettings::from(parsing),
        }
    }

    /// Crawl listing pages until a stop condition, persisting each page's
    /// new products and finally the whole set.
    ///
    /// Cancellation is honoured at the top of each page and before each
    /// detail visit; products gathered so far are still persisted.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::Page`] if a listing page cannot be loaded (other
    ///   than a 404, which ends the crawl normally).
    /// - [`ScraperError::Sink`] if the final consolidated write fails.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<CrawlOutcome, ScraperError> {
        let mut all_products: Vec<Product> = Vec::new();
        let mut pages_processed = 0u32;
        let mut page_number = 1u32;

        let stop_reason = loop {
            if page_number > self.page_cap {
                break StopReason::PageCap;
            }
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            tracing::info!(page = page_number, "processing listing page");
            let stubs = match self.fetch_listing(page_number).await {
                Ok(Listing::NotFound) => {
                    tracing::info!(page = page_number, "listing page not found; stopping");
                    break StopReason::NotFound;
                }
                Ok(Listing::Stubs(stubs)) if stubs.is_empty() => {
                    tracing::info!(page = page_number, "no products on listing page; stopping");
                    break StopReason::EmptyPage;
                }
                Ok(Listing::Stubs(stubs)) => stubs,
                Err(e) => {
                    tracing::error!(page = page_number, error = %e, "listing page failed; aborting crawl");
                    self.save_final(&all_products).await.ok();
                    return Err(e);
                }
            };
            pages_processed += 1;

            let stub_count = stubs.len();
            let fresh = filter_new(self.sink.as_ref(), stubs).await;
            tracing::info!(
                page = page_number,
                stubs = stub_count,
                new = fresh.len(),
                "listing page read"
            );

            let (products, cancelled) = self.visit_details(&fresh, cancel).await;
            if !products.is_empty() {
                if let Err(e) = self.sink.save_products(&products, page_number).await {
                    tracing::warn!(page = page_number, error = %e, "failed to save page products");
                }
            }
            tracing::info!(page = page_number, products = products.len(), "listing page completed");
            all_products.extend(products);

            if cancelled {
                break StopReason::Cancelled;
            }
            if !has_next_page(stub_count, page_number, self.expected_per_page, self.max_pages) {
                break if stub_count < self.expected_per_page {
                    StopReason::LastPage
                } else {
                    StopReason::PageCap
                };
            }

            page_number += 1;
            if pause_or_cancel(self.request_delay, cancel).await {
                break StopReason::Cancelled;
            }
        };

        self.save_final(&all_products).await?;

        let stats = ProductStats::from_products(&all_products);
        tracing::info!(
            pages = pages_processed,
            total = stats.total,
            with_price = stats.with_price,
            with_image = stats.with_image,
            with_features = stats.with_features,
            stop_reason = ?stop_reason,
            "crawl finished"
        );

        Ok(CrawlOutcome {
            products: all_products,
            pages_processed,
            stop_reason,
        })
    }

    async fn save_final(&self, products: &[Product]) -> Result<(), ScraperError> {
        if products.is_empty() {
            return Ok(());
        }
        self.sink.save_final_data(products).await.map_err(|e| {
            tracing::error!(error = %e, "failed to save final data");
            ScraperError::from(e)
        })
    }

    async fn fetch_listing(&self, page_number: u32) -> Result<Listing, ScraperError> {
        let page = self.browser.new_page().await?;
        let result = self.read_listing(page.as_ref(), page_number).await;
        close_page(page.as_ref()).await;
        result
    }

    async fn read_listing(&self, page: &dyn Page, page_number: u32) -> Result<Listing, ScraperError> {
        let url = listing_url(&self.base_url, page_number);
        tracing::debug!(url, "loading listing page");

        let status = page.goto(&url).await?;
        if status == 404 {
            return Ok(Listing::NotFound);
        }

        if !page.wait_for(&self.card_selector, CARD_WAIT_TIMEOUT).await? {
            tracing::debug!(url, "no product cards appeared");
            return Ok(Listing::Stubs(Vec::new()));
        }

        load_until_stable(page, &self.scroll).await;
        let stubs = extract_stubs(page, &self.card_selector, &self.origin).await?;
        Ok(Listing::Stubs(stubs))
    }

    /// Visit each stub's detail page in order. Failed visits are skipped.
    /// The flag is `true` when cancellation cut the batch short.
    async fn visit_details(
        &self,
        stubs: &[BasicProduct],
        cancel: &CancellationToken,
    ) -> (Vec<Product>, bool) {
        let mut products = Vec::with_capacity(stubs.len());
        let total = stubs.len();

        for (i, stub) in stubs.iter().enumerate() {
            if cancel.is_cancelled() {
                return (products, true);
            }
            tracing::info!(index = i + 1, total, id = %stub.id, title = %stub.title, "processing product");

            match self.visit_detail(stub).await {
                Ok(product) => {
                    tracing::debug!(
                        id = %product.id,
                        price = product.price.as_ref().map_or(0.0, |p| p.price_eur),
                        image = product.has_image(),
                        features = product.feature_count(),
                        extra_images = product.extra_images.len(),
                        "product extracted"
                    );
                    products.push(product);
                }
                Err(e) => {
                    tracing::warn!(id = %stub.id, error = %e, "failed to extract product; skipping");
                }
            }

            if i + 1 < total && pause_or_cancel(self.request_delay, cancel).await {
                return (products, true);
            }
        }
        (products, false)
    }

    async fn visit_detail(&self, stub: &BasicProduct) -> Result<Product, ScraperError> {
        let page = self.browser.new_page().await?;
        let result = self.detail.extract(page.as_ref(), stub).await;
        close_page(page.as_ref()).await;
        result
    }
}

async fn close_page(page: &dyn Page) {
    if let Err(e) = page.close().await {
        tracing::debug!(error = %e, "failed to close page");
    }
}

/// Sleep for `delay` unless cancelled first. Returns `true` on cancellation.
async fn pause_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return cancel.is_cancelled();
    }
    tokio::select! {
        () = cancel.cancelled() => true,
        () = tokio::time::sleep(delay) => false,
    }
}
