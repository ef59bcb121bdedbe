//! The navigable-page capability the extractors run against.
//!
//! Backends: [`crate::ChromiumBrowser`] drives a real Chrome over CDP;
//! [`crate::StaticSite`] serves fixed HTML documents for tests and offline
//! inspection.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    #[error("invalid selector \"{selector}\": {reason}")]
    Selector { selector: String, reason: String },

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("element handle {0} is not valid on this page")]
    StaleHandle(usize),

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("{0}")]
    Unsupported(String),
}

/// Opaque reference to an element on one page. Only valid for the page
/// that returned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub usize);

/// An element sibling as seen from another element: upper-case tag name and
/// text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sibling {
    pub tag: String,
    pub text: String,
}

/// One short-lived browsing context. Closed by the caller after extraction.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and return the HTTP status of the main document.
    async fn goto(&self, url: &str) -> Result<u16, PageError>;

    /// Wait up to `timeout` for `selector` to match. `Ok(false)` on timeout.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool, PageError>;

    /// All elements matching `selector`, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<NodeHandle>, PageError>;

    /// Descendants of `scope` matching `selector`, in document order.
    async fn query_within(
        &self,
        scope: NodeHandle,
        selector: &str,
    ) -> Result<Vec<NodeHandle>, PageError>;

    async fn attribute(&self, node: NodeHandle, name: &str) -> Result<Option<String>, PageError>;

    /// Rendered text of the element.
    async fn text(&self, node: NodeHandle) -> Result<String, PageError>;

    /// Upper-case tag name of the parent element, if any.
    async fn parent_tag(&self, node: NodeHandle) -> Result<Option<String>, PageError>;

    /// Element siblings before `node`, nearest first.
    async fn preceding_siblings(&self, node: NodeHandle) -> Result<Vec<Sibling>, PageError>;

    /// Current `document.body.scrollHeight`.
    async fn document_height(&self) -> Result<u64, PageError>;

    async fn scroll_by(&self, dy: i64) -> Result<(), PageError>;

    async fn scroll_to(&self, y: u64) -> Result<(), PageError>;

    async fn close(&self) -> Result<(), PageError>;
}

/// A browser session that hands out isolated pages.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn Page>, PageError>;

    async fn close(&self) -> Result<(), PageError>;
}
