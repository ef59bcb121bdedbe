//! Main and additional image discovery on detail pages.

use crate::page::{NodeHandle, Page};

/// Main-image selectors tried after the configured one.
pub const MAIN_IMAGE_FALLBACKS: [&str; 3] = [
    "picture.pr-lpjxdi source[type='image/jpeg']",
    "img[itemprop='image']",
    "div.pr-15dcama img",
];

/// At most this many thumbnails are collected as additional images.
pub const MAX_EXTRA_IMAGES: usize = 3;

/// The URL of the last candidate in a `srcset` list (usually the largest).
#[must_use]
pub fn last_srcset_candidate(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .next_back()
        .and_then(|candidate| candidate.split_whitespace().next())
}

/// Thumbnail URL rewritten to the large rendition.
#[must_use]
pub fn enlarge_thumbnail(src: &str) -> String {
    src.replace("/dim/dim/", "/504x504/")
}

async fn attr(page: &dyn Page, node: NodeHandle, name: &str) -> Option<String> {
    page.attribute(node, name)
        .await
        .ok()
        .flatten()
        .filter(|v| !v.trim().is_empty())
}

/// Resolve the main image URL from the first selector that yields one.
///
/// `source` selectors read `srcset` only; others prefer `srcset` and fall
/// back to a `src` that is not a `data:` URI.
pub async fn find_main_image(page: &dyn Page, configured: &str) -> Option<String> {
    let selectors = std::iter::once(configured).chain(MAIN_IMAGE_FALLBACKS);
    for selector in selectors {
        let Ok(found) = page.query_all(selector).await else {
            continue;
        };
        let Some(&node) = found.first() else {
            continue;
        };

        if let Some(srcset) = attr(page, node, "srcset").await {
            if let Some(url) = last_srcset_candidate(&srcset) {
                return Some(url.to_string());
            }
        }
        if selector.contains("source") {
            continue;
        }
        if let Some(src) = attr(page, node, "src").await {
            if !src.starts_with("data:") {
                return Some(src);
            }
        }
    }
    None
}

/// Additional image URLs: the first [`MAX_EXTRA_IMAGES`] thumbnails,
/// enlarged, each paired with its 1-based thumbnail position. Thumbnails
/// without a usable `src` are skipped but still use up a position.
pub async fn find_additional_images(page: &dyn Page, selector: &str) -> Vec<(usize, String)> {
    let Ok(thumbnails) = page.query_all(selector).await else {
        return Vec::new();
    };

    let mut images = Vec::new();
    for (i, thumb) in thumbnails.into_iter().take(MAX_EXTRA_IMAGES).enumerate() {
        let Some(src) = attr(page, thumb, "src").await else {
            continue;
        };
        if src.starts_with("data:") {
            continue;
        }
        images.push((i + 1, enlarge_thumbnail(&src)));
    }
    images
}
