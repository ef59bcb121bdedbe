//! Chrome backend over the DevTools protocol.
//!
//! Each page lives in its own browser context, disposed when the page is
//! closed. Element handles index into a per-page registry.

#[cfg(feature = "browser")]
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
#[cfg(feature = "browser")]
use std::time::Duration;

#[cfg(feature = "browser")]
use async_trait::async_trait;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
#[cfg(feature = "browser")]
use chromiumoxide::error::CdpError;
#[cfg(feature = "browser")]
use chromiumoxide::handler::viewport::Viewport;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser as CdpBrowser, BrowserConfig as CdpBrowserConfig, Element};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tokio::sync::Mutex;

use prcat_core::BrowserConfig;

#[cfg(not(feature = "browser"))]
use crate::page::Page;
use crate::page::{Browser, PageError};
#[cfg(feature = "browser")]
use crate::page::{NodeHandle, Page, Sibling};

#[cfg(feature = "browser")]
const NAVIGATION_STATUS_SCRIPT: &str = r"(() => {
    const entry = performance.getEntriesByType('navigation')[0];
    return entry && entry.responseStatus ? entry.responseStatus : 0;
})()";

#[cfg(feature = "browser")]
const PARENT_TAG_FN: &str =
    "function() { return this.parentElement ? this.parentElement.tagName : ''; }";

#[cfg(feature = "browser")]
const PRECEDING_SIBLINGS_FN: &str = r"function() {
    const out = [];
    let s = this.previousElementSibling;
    while (s) {
        out.push([s.tagName, s.textContent || '']);
        s = s.previousElementSibling;
    }
    return JSON.stringify(out);
}";

#[cfg(feature = "browser")]
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A launched Chrome session.
#[cfg(feature = "browser")]
pub struct ChromiumBrowser {
    browser: Arc<Mutex<CdpBrowser>>,
    handler: tokio::task::JoinHandle<()>,
    timeout: Duration,
    user_agent: String,
}

#[cfg(feature = "browser")]
impl ChromiumBrowser {
    /// Launch Chrome with the configured viewport and headless mode.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::Launch`] if no Chrome executable is found or the
    /// process fails to start.
    pub async fn launch(config: &BrowserConfig) -> Result<Self, PageError> {
        tracing::info!(headless = config.headless, "launching browser");

        let mut builder = CdpBrowserConfig::builder()
            .window_size(config.viewport.width, config.viewport.height)
            .viewport(Viewport {
                width: config.viewport.width,
                height: config.viewport.height,
                ..Viewport::default()
            })
            .request_timeout(Duration::from_millis(config.timeout));

        // with_head means NOT headless
        if !config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-gpu");

        let cdp_config = builder.build().map_err(PageError::Launch)?;

        let (browser, mut handler) = CdpBrowser::launch(cdp_config)
            .await
            .map_err(|e| PageError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            handler,
            timeout: Duration::from_millis(config.timeout),
            user_agent: config.user_agent.clone(),
        })
    }
}

#[cfg(feature = "browser")]
fn cdp(e: CdpError) -> PageError {
    PageError::Script(e.to_string())
}

/// Return `result`, running `cleanup` first when it is an error.
#[cfg(feature = "browser")]
async fn release_on_error<T, F, Fut>(
    result: Result<T, PageError>,
    cleanup: F,
) -> Result<T, PageError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    if result.is_err() {
        cleanup().await;
    }
    result
}

#[cfg(feature = "browser")]
async fn open_target(
    browser: &CdpBrowser,
    context_id: &BrowserContextId,
) -> Result<chromiumoxide::Page, PageError> {
    let target = CreateTargetParams::builder()
        .url("about:blank")
        .browser_context_id(context_id.clone())
        .build()
        .map_err(PageError::Launch)?;
    browser.new_page(target).await.map_err(cdp)
}

#[cfg(feature = "browser")]
async fn dispose_context(browser: &CdpBrowser, context_id: &BrowserContextId) {
    if let Err(e) = browser
        .execute(DisposeBrowserContextParams::new(context_id.clone()))
        .await
    {
        tracing::warn!(error = %e, "failed to dispose browser context");
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl Browser for ChromiumBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>, PageError> {
        let browser = self.browser.lock().await;
        let context_id = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(cdp)?
            .result
            .browser_context_id;

        let (cdp_browser, context) = (&*browser, &context_id);
        let opened = open_target(cdp_browser, context).await;
        let page = release_on_error(opened, || async move {
            dispose_context(cdp_browser, context).await;
        })
        .await?;
        drop(browser);

        let user_agent = page
            .execute(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .map(|_| ())
            .map_err(cdp);
        let (opened_page, shared) = (&page, &self.browser);
        release_on_error(user_agent, || async move {
            if let Err(e) = opened_page.clone().close().await {
                tracing::warn!(error = %e, "failed to close page");
            }
            dispose_context(&*shared.lock().await, context).await;
        })
        .await?;

        Ok(Box::new(ChromiumPage {
            page,
            browser: Arc::clone(&self.browser),
            context_id,
            elements: StdMutex::new(Vec::new()),
            timeout: self.timeout,
        }))
    }

    async fn close(&self) -> Result<(), PageError> {
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await.map(|_| ()).map_err(cdp);
        self.handler.abort();
        closed
    }
}

#[cfg(feature = "browser")]
struct ChromiumPage {
    page: chromiumoxide::Page,
    browser: Arc<Mutex<CdpBrowser>>,
    context_id: BrowserContextId,
    elements: StdMutex<Vec<Arc<Element>>>,
    timeout: Duration,
}

#[cfg(feature = "browser")]
impl ChromiumPage {
    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, PageError>
    where
        F: std::future::Future<Output = Result<T, CdpError>> + Send,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| PageError::Timeout {
                operation: operation.to_string(),
                millis: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(cdp)
    }

    fn register(&self, found: Vec<Element>) -> Vec<NodeHandle> {
        let mut elements = self.elements.lock().unwrap_or_else(PoisonError::into_inner);
        found
            .into_iter()
            .map(|el| {
                elements.push(Arc::new(el));
                NodeHandle(elements.len() - 1)
            })
            .collect()
    }

    fn element(&self, node: NodeHandle) -> Result<Arc<Element>, PageError> {
        self.elements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node.0)
            .cloned()
            .ok_or(PageError::StaleHandle(node.0))
    }

    async fn call_string_fn(&self, node: NodeHandle, function: &str) -> Result<String, PageError> {
        let element = self.element(node)?;
        let returns = self
            .bounded("element script", element.call_js_fn(function, false))
            .await?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default())
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T, PageError> {
        let result = self
            .bounded("evaluate", self.page.evaluate(script.to_string()))
            .await?;
        result
            .into_value::<T>()
            .map_err(|e| PageError::Script(e.to_string()))
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl Page for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<u16, PageError> {
        tokio::time::timeout(self.timeout, self.page.goto(url))
            .await
            .map_err(|_| PageError::Timeout {
                operation: format!("navigation to {url}"),
                millis: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(|e| PageError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        self.elements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.evaluate::<u16>(NAVIGATION_STATUS_SCRIPT).await
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool, PageError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let found = self
                .bounded("wait for selector", self.page.find_elements(selector))
                .await
                .map(|els| !els.is_empty())
                .unwrap_or(false);
            if found {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<NodeHandle>, PageError> {
        let found = self
            .bounded("query", self.page.find_elements(selector))
            .await
            .unwrap_or_default();
        Ok(self.register(found))
    }

    async fn query_within(
        &self,
        scope: NodeHandle,
        selector: &str,
    ) -> Result<Vec<NodeHandle>, PageError> {
        let element = self.element(scope)?;
        let found = self
            .bounded("query", element.find_elements(selector))
            .await
            .unwrap_or_default();
        Ok(self.register(found))
    }

    async fn attribute(&self, node: NodeHandle, name: &str) -> Result<Option<String>, PageError> {
        let element = self.element(node)?;
        self.bounded("attribute", element.attribute(name)).await
    }

    async fn text(&self, node: NodeHandle) -> Result<String, PageError> {
        let element = self.element(node)?;
        Ok(self
            .bounded("text", element.inner_text())
            .await?
            .unwrap_or_default())
    }

    async fn parent_tag(&self, node: NodeHandle) -> Result<Option<String>, PageError> {
        let tag = self.call_string_fn(node, PARENT_TAG_FN).await?;
        Ok(Some(tag).filter(|t| !t.is_empty()))
    }

    async fn preceding_siblings(&self, node: NodeHandle) -> Result<Vec<Sibling>, PageError> {
        let raw = self.call_string_fn(node, PRECEDING_SIBLINGS_FN).await?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let pairs: Vec<(String, String)> =
            serde_json::from_str(&raw).map_err(|e| PageError::Script(e.to_string()))?;
        Ok(pairs
            .into_iter()
            .map(|(tag, text)| Sibling { tag, text })
            .collect())
    }

    async fn document_height(&self) -> Result<u64, PageError> {
        self.evaluate::<u64>("document.body.scrollHeight").await
    }

    async fn scroll_by(&self, dy: i64) -> Result<(), PageError> {
        self.evaluate::<serde_json::Value>(&format!("window.scrollBy(0, {dy})"))
            .await
            .map(|_| ())
    }

    async fn scroll_to(&self, y: u64) -> Result<(), PageError> {
        self.evaluate::<serde_json::Value>(&format!("window.scrollTo(0, {y})"))
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<(), PageError> {
        let closed = self.page.clone().close().await.map_err(cdp);
        let disposed = self
            .browser
            .lock()
            .await
            .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
            .await
            .map(|_| ())
            .map_err(cdp);
        closed.and(disposed)
    }
}

/// Placeholder used when the crate is built without the `browser` feature.
#[cfg(not(feature = "browser"))]
pub struct ChromiumBrowser;

#[cfg(not(feature = "browser"))]
const NOT_COMPILED: &str =
    "Browser support not compiled. Rebuild with: cargo build --features browser";

#[cfg(not(feature = "browser"))]
impl ChromiumBrowser {
    /// # Errors
    ///
    /// Always returns [`PageError::Unsupported`].
    #[allow(clippy::unused_async)]
    pub async fn launch(_config: &BrowserConfig) -> Result<Self, PageError> {
        Err(PageError::Unsupported(NOT_COMPILED.to_string()))
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait::async_trait]
impl Browser for ChromiumBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>, PageError> {
        Err(PageError::Unsupported(NOT_COMPILED.to_string()))
    }

    async fn close(&self) -> Result<(), PageError> {
        Ok(())
    }
}
