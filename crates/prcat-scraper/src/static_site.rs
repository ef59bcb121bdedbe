//! In-memory page backend over fixed HTML documents.
//!
//! Elements are addressed by their pre-order position in the document tree,
//! so handles stay valid across re-parses of the same HTML. Scroll heights
//! are scripted per document.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::page::{Browser, NodeHandle, Page, PageError, Sibling};

/// One document served by a [`StaticSite`].
#[derive(Debug, Clone)]
pub struct StaticDocument {
    html: String,
    status: u16,
    heights: Vec<u64>,
    unreachable: bool,
}

impl StaticDocument {
    #[must_use]
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            status: 200,
            heights: Vec::new(),
            unreachable: false,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Successive values returned by `document_height`; the last one repeats.
    #[must_use]
    pub fn with_heights(mut self, heights: Vec<u64>) -> Self {
        self.heights = heights;
        self
    }

    /// Navigation to this document fails at the transport level.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new("")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollEvent {
    By(i64),
    To(u64),
}

#[derive(Debug, Default)]
struct SiteLog {
    opened: usize,
    closed: usize,
    visits: Vec<String>,
}

/// A fake browser serving [`StaticDocument`]s keyed by exact URL. Unknown
/// URLs answer 404 with an empty body.
#[derive(Debug, Clone, Default)]
pub struct StaticSite {
    documents: Arc<HashMap<String, StaticDocument>>,
    log: Arc<Mutex<SiteLog>>,
}

impl StaticSite {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_document(mut self, url: impl Into<String>, document: StaticDocument) -> Self {
        Arc::make_mut(&mut self.documents).insert(url.into(), document);
        self
    }

    #[must_use]
    pub fn pages_opened(&self) -> usize {
        lock(&self.log).opened
    }

    #[must_use]
    pub fn pages_closed(&self) -> usize {
        lock(&self.log).closed
    }

    /// URLs navigated to, in order.
    #[must_use]
    pub fn visits(&self) -> Vec<String> {
        lock(&self.log).visits.clone()
    }
}

#[async_trait]
impl Browser for StaticSite {
    async fn new_page(&self) -> Result<Box<dyn Page>, PageError> {
        lock(&self.log).opened += 1;
        Ok(Box::new(HtmlPage {
            site: Some(self.clone()),
            state: Mutex::new(PageState::default()),
        }))
    }

    async fn close(&self) -> Result<(), PageError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PageState {
    html: String,
    heights: Vec<u64>,
    height_reads: usize,
    scrolls: Vec<ScrollEvent>,
}

/// A single page over static HTML. Either handed out by a [`StaticSite`] or
/// built directly from a saved document with [`HtmlPage::from_html`].
#[derive(Debug)]
pub struct HtmlPage {
    site: Option<StaticSite>,
    state: Mutex<PageState>,
}

impl HtmlPage {
    /// A page already showing `html`. `goto` keeps the document and answers 200.
    #[must_use]
    pub fn from_html(html: impl Into<String>) -> Self {
        Self {
            site: None,
            state: Mutex::new(PageState {
                html: html.into(),
                ..PageState::default()
            }),
        }
    }

    #[must_use]
    pub fn with_heights(self, heights: Vec<u64>) -> Self {
        lock(&self.state).heights = heights;
        self
    }

    /// Scroll commands received so far.
    #[must_use]
    pub fn scroll_log(&self) -> Vec<ScrollEvent> {
        lock(&self.state).scrolls.clone()
    }

    #[must_use]
    pub fn height_reads(&self) -> usize {
        lock(&self.state).height_reads
    }

    fn with_document<T>(
        &self,
        f: impl FnOnce(&Html) -> Result<T, PageError>,
    ) -> Result<T, PageError> {
        let html = lock(&self.state).html.clone();
        let document = Html::parse_document(&html);
        f(&document)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn parse_selector(selector: &str) -> Result<Selector, PageError> {
    Selector::parse(selector).map_err(|e| PageError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn element_at(document: &Html, node: NodeHandle) -> Result<ElementRef<'_>, PageError> {
    document
        .tree
        .root()
        .descendants()
        .nth(node.0)
        .and_then(ElementRef::wrap)
        .ok_or(PageError::StaleHandle(node.0))
}

fn select_all(document: &Html, selector: &Selector) -> Vec<NodeHandle> {
    document
        .tree
        .root()
        .descendants()
        .enumerate()
        .filter_map(|(i, node)| {
            ElementRef::wrap(node)
                .filter(|el| selector.matches(el))
                .map(|_| NodeHandle(i))
        })
        .collect()
}

#[async_trait]
impl Page for HtmlPage {
    async fn goto(&self, url: &str) -> Result<u16, PageError> {
        let Some(site) = &self.site else {
            return Ok(200);
        };
        lock(&site.log).visits.push(url.to_string());

        let (html, status, heights) = match site.documents.get(url) {
            Some(doc) if doc.unreachable => {
                return Err(PageError::Navigation {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            Some(doc) => (doc.html.clone(), doc.status, doc.heights.clone()),
            None => (String::new(), 404, Vec::new()),
        };

        let mut state = lock(&self.state);
        *state = PageState {
            html,
            heights,
            ..PageState::default()
        };
        Ok(status)
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<bool, PageError> {
        let selector = parse_selector(selector)?;
        self.with_document(|doc| Ok(doc.select(&selector).next().is_some()))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<NodeHandle>, PageError> {
        let selector = parse_selector(selector)?;
        self.with_document(|doc| Ok(select_all(doc, &selector)))
    }

    async fn query_within(
        &self,
        scope: NodeHandle,
        selector: &str,
    ) -> Result<Vec<NodeHandle>, PageError> {
        let selector = parse_selector(selector)?;
        self.with_document(|doc| {
            let root = element_at(doc, scope)?;
            // Pre-order: a subtree occupies the ordinals right after its root.
            Ok(root
                .descendants()
                .enumerate()
                .skip(1)
                .filter_map(|(i, node)| {
                    ElementRef::wrap(node)
                        .filter(|el| selector.matches(el))
                        .map(|_| NodeHandle(scope.0 + i))
                })
                .collect())
        })
    }

    async fn attribute(&self, node: NodeHandle, name: &str) -> Result<Option<String>, PageError> {
        self.with_document(|doc| Ok(element_at(doc, node)?.value().attr(name).map(str::to_owned)))
    }

    async fn text(&self, node: NodeHandle) -> Result<String, PageError> {
        self.with_document(|doc| Ok(element_at(doc, node)?.text().collect()))
    }

    async fn parent_tag(&self, node: NodeHandle) -> Result<Option<String>, PageError> {
        self.with_document(|doc| {
            Ok(element_at(doc, node)?
                .parent()
                .and_then(ElementRef::wrap)
                .map(|p| p.value().name().to_ascii_uppercase()))
        })
    }

    async fn preceding_siblings(&self, node: NodeHandle) -> Result<Vec<Sibling>, PageError> {
        self.with_document(|doc| {
            Ok(element_at(doc, node)?
                .prev_siblings()
                .filter_map(ElementRef::wrap)
                .map(|s| Sibling {
                    tag: s.value().name().to_ascii_uppercase(),
                    text: s.text().collect(),
                })
                .collect())
        })
    }

    async fn document_height(&self) -> Result<u64, PageError> {
        let mut state = lock(&self.state);
        let height = state
            .heights
            .get(state.height_reads)
            .or_else(|| state.heights.last())
            .copied()
            .unwrap_or(0);
        state.height_reads += 1;
        Ok(height)
    }

    async fn scroll_by(&self, dy: i64) -> Result<(), PageError> {
        lock(&self.state).scrolls.push(ScrollEvent::By(dy));
        Ok(())
    }

    async fn scroll_to(&self, y: u64) -> Result<(), PageError> {
        lock(&self.state).scrolls.push(ScrollEvent::To(y));
        Ok(())
    }

    async fn close(&self) -> Result<(), PageError> {
        if let Some(site) = &self.site {
            lock(&site.log).closed += 1;
        }
        Ok(())
    }
}
