pub mod chromium;
pub mod crawler;
pub mod dedup;
pub mod detail;
pub mod downloader;
pub mod error;
pub mod features;
pub mod images;
pub mod listing;
pub mod origin;
pub mod page;
pub mod price;
pub mod run_state;
pub mod scroll;
pub mod static_site;

pub use chromium::ChromiumBrowser;
pub use crawler::{has_next_page, CrawlOutcome, Crawler, StopReason};
pub use detail::DetailExtractor;
pub use downloader::{ImageDownloader, DEFAULT_DOWNLOAD_TIMEOUT};
pub use error::ScraperError;
pub use page::{Browser, NodeHandle, Page, PageError, Sibling};
pub use run_state::{RunControl, RunGuard, RunState};
pub use static_site::{HtmlPage, StaticDocument, StaticSite};
