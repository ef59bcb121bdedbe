//! Scroll-driven loading of lazily rendered content.

use std::time::Duration;

use prcat_core::ParsingConfig;

use crate::page::Page;

/// Pixels scrolled per convergence step.
pub const SCROLL_STEP: i64 = 500;

/// Consecutive unchanged height reads that count as converged.
pub const STABLE_READS: u32 = 3;

/// Fewer feature tables than this after the first full scroll triggers the
/// probe sequence on detail pages.
const MIN_TABLES_BEFORE_PROBE: usize = 2;

const PROBE_FRACTIONS: [f64; 3] = [0.75, 0.5, 0.25];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollSettings {
    pub scroll_delay: Duration,
    pub max_scrolls: u32,
    pub settle_delay: Duration,
    pub probe_delay: Duration,
}

impl From<&ParsingConfig> for ScrollSettings {
    fn from(parsing: &ParsingConfig) -> Self {
        Self {
            scroll_delay: Duration::from_millis(parsing.scroll_delay),
            max_scrolls: parsing.max_scrolls,
            settle_delay: Duration::from_millis(parsing.settle_delay_ms),
            probe_delay: Duration::from_millis(parsing.probe_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollReport {
    pub iterations: u32,
    pub final_height: u64,
    pub converged: bool,
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Scroll down in fixed steps until the document height has been unchanged
/// for [`STABLE_READS`] consecutive reads or `max_scrolls` is reached, then
/// return to the top and settle.
///
/// Scroll and height-read failures end the loop early; they are never fatal.
pub async fn load_until_stable(page: &dyn Page, settings: &ScrollSettings) -> ScrollReport {
    let mut last_height = 0u64;
    let mut stable = 0u32;
    let mut iterations = 0u32;
    let mut converged = false;

    while iterations < settings.max_scrolls {
        iterations += 1;
        if let Err(e) = page.scroll_by(SCROLL_STEP).await {
            tracing::debug!(error = %e, "scroll failed; stopping convergence loop");
            break;
        }
        pause(settings.scroll_delay).await;

        let height = match page.document_height().await {
            Ok(h) => h,
            Err(e) => {
                tracing::debug!(error = %e, "height read failed; stopping convergence loop");
                break;
            }
        };

        if height == last_height {
            stable += 1;
            if stable >= STABLE_READS {
                converged = true;
                break;
            }
        } else {
            stable = 0;
            last_height = height;
        }
    }

    if let Err(e) = page.scroll_to(0).await {
        tracing::debug!(error = %e, "scroll to top failed");
    }
    pause(settings.settle_delay).await;

    tracing::debug!(iterations, height = last_height, converged, "listing scroll finished");
    ScrollReport {
        iterations,
        final_height: last_height,
        converged,
    }
}

/// Position a detail page so its lazily loaded feature tables are rendered.
///
/// Scrolls to the bottom and counts tables; with fewer than two, probes at
/// 75%, 50% and 25% of the height and returns to the bottom. Finishes at the
/// middle of the document. Returns the final table count.
pub async fn prepare_detail(
    page: &dyn Page,
    table_selectors: &[&str],
    settings: &ScrollSettings,
) -> usize {
    scroll_to_fraction(page, 1.0).await;
    pause(settings.settle_delay).await;

    let tables = count_tables(page, table_selectors).await;
    tracing::debug!(tables, "tables after full scroll");

    if tables < MIN_TABLES_BEFORE_PROBE {
        for fraction in PROBE_FRACTIONS {
            scroll_to_fraction(page, fraction).await;
            pause(settings.probe_delay).await;
        }
        scroll_to_fraction(page, 1.0).await;
        pause(settings.settle_delay).await;
    }

    scroll_to_fraction(page, 0.5).await;
    pause(settings.probe_delay).await;

    let tables = count_tables(page, table_selectors).await;
    tracing::debug!(tables, "tables loaded");
    tables
}

async fn scroll_to_fraction(page: &dyn Page, fraction: f64) {
    let height = match page.document_height().await {
        Ok(h) => h,
        Err(e) => {
            tracing::debug!(error = %e, "height read failed");
            return;
        }
    };
    if let Err(e) = page.scroll_to(fraction_of(height, fraction)).await {
        tracing::debug!(error = %e, "scroll failed");
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn fraction_of(height: u64, fraction: f64) -> u64 {
    (height as f64 * fraction) as u64
}

/// Table count under the primary (first) selector, or the largest count any
/// fallback selector finds when the primary finds none.
pub async fn count_tables(page: &dyn Page, table_selectors: &[&str]) -> usize {
    let Some((primary, fallbacks)) = table_selectors.split_first() else {
        return 0;
    };
    let primary_count = query_count(page, primary).await;
    if primary_count > 0 {
        return primary_count;
    }

    let mut best = 0;
    for selector in fallbacks {
        best = best.max(query_count(page, selector).await);
    }
    best
}

async fn query_count(page: &dyn Page, selector: &str) -> usize {
    page.query_all(selector).await.map_or(0, |found| found.len())
}
