//! One crawl run: browser, storage and image downloader wired to the
//! crawler, all released afterwards.

use std::sync::Arc;

use prcat_core::CrawlConfig;
use prcat_scraper::{
    Browser, ChromiumBrowser, CrawlOutcome, Crawler, ImageDownloader, RunControl,
    DEFAULT_DOWNLOAD_TIMEOUT,
};

/// Exit status after a forced interrupt (128 + SIGINT).
pub(crate) const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    /// Ask the active run to stop after the current product.
    Stop,
    /// Leave immediately.
    ForceExit,
}

/// Response to the `received`-th Ctrl-C of this process.
pub(crate) fn interrupt_action(received: u32) -> Interrupt {
    if received <= 1 {
        Interrupt::Stop
    } else {
        Interrupt::ForceExit
    }
}

/// Request a cooperative stop of the active run on the first Ctrl-C and
/// exit the process on the next one.
pub(crate) fn stop_on_ctrl_c(control: RunControl) {
    tokio::spawn(async move {
        let mut received = 0u32;
        while tokio::signal::ctrl_c().await.is_ok() {
            received = received.saturating_add(1);
            match interrupt_action(received) {
                Interrupt::Stop => {
                    if control.request_stop() {
                        tracing::info!("stop requested; finishing the current product (Ctrl-C again to quit)");
                    } else {
                        tracing::info!("interrupt received with no active run");
                    }
                }
                Interrupt::ForceExit => {
                    tracing::warn!("second interrupt; exiting without waiting for the crawl");
                    std::process::exit(FORCED_EXIT_CODE);
                }
            }
        }
    });
}

/// Run a single crawl under `control`.
///
/// # Errors
///
/// Returns an error if a crawl is already active, if storage, the browser or
/// the image directory cannot be set up, or if the crawl itself fails.
pub(crate) async fn run_crawl(
    config: &CrawlConfig,
    control: &RunControl,
) -> anyhow::Result<CrawlOutcome> {
    let guard = control.try_start()?;

    let sink = prcat_db::open_sink(config).await?;
    let downloader = ImageDownloader::new(
        &config.storage.images_dir,
        &config.site_origin(),
        DEFAULT_DOWNLOAD_TIMEOUT,
    )?;
    let browser: Arc<dyn Browser> = match ChromiumBrowser::launch(&config.parser.browser).await {
        Ok(browser) => Arc::new(browser),
        Err(e) => {
            sink.close().await.ok();
            return Err(e.into());
        }
    };

    tracing::info!(base_url = %config.parser.base_url, storage = %config.storage.kind, "crawl starting");
    let crawler = Crawler::new(config, Arc::clone(&browser), Arc::clone(&sink), Some(downloader));
    let result = crawler.run(guard.token()).await;

    if let Err(e) = browser.close().await {
        tracing::warn!(error = %e, "failed to close browser");
    }
    if let Err(e) = sink.close().await {
        tracing::warn!(error = %e, "failed to close storage");
    }
    drop(guard);

    Ok(result?)
}
