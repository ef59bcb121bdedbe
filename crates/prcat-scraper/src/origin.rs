//! URL origin helpers shared by the stub extractor and the image downloader.

/// Extracts the scheme+host origin from a URL.
///
/// Given `"https://www.pricerunner.com/cl/1/Mobile-Phones?page=2"`, returns
/// `"https://www.pricerunner.com"`.
#[must_use]
pub fn extract_origin(url: &str) -> String {
    reqwest::Url::parse(url).map_or_else(
        |e| {
            tracing::warn!(
                url,
                error = %e,
                "could not parse URL; falling back to string split for origin extraction"
            );
            url.trim_end_matches('/')
                .splitn(4, '/')
                .take(3)
                .collect::<Vec<_>>()
                .join("/")
        },
        |u| u.origin().ascii_serialization(),
    )
}

/// Makes a link absolute: `//host/x` gets `https:`, `/x` gets `origin`,
/// anything else is returned unchanged.
#[must_use]
pub fn absolutize(href: &str, origin: &str) -> String {
    if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else if href.starts_with('/') {
        format!("{}{href}", origin.trim_end_matches('/'))
    } else {
        href.to_string()
    }
}

/// Listing URL for page `page`: the base URL with a `page=<n>` query pair.
#[must_use]
pub fn listing_url(base_url: &str, page: u32) -> String {
    match reqwest::Url::parse(base_url) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("page", &page.to_string());
            url.to_string()
        }
        Err(_) => format!("{base_url}?page={page}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_drops_path_and_query() {
        assert_eq!(
            extract_origin("https://www.pricerunner.com/cl/1/Mobile-Phones?page=2"),
            "https://www.pricerunner.com"
        );
    }

    #[test]
    fn origin_falls_back_to_split_on_garbage() {
        assert_eq!(extract_origin("nonsense"), "nonsense");
    }

    #[test]
    fn absolutize_handles_each_form() {
        let origin = "https://www.pricerunner.com";
        assert_eq!(
            absolutize("//images.example/p.jpg", origin),
            "https://images.example/p.jpg"
        );
        assert_eq!(
            absolutize("/pl/1-2/x", origin),
            "https://www.pricerunner.com/pl/1-2/x"
        );
        assert_eq!(
            absolutize("https://cdn.example/a.png", origin),
            "https://cdn.example/a.png"
        );
    }

    #[test]
    fn listing_url_appends_page_pair() {
        assert_eq!(
            listing_url("https://www.pricerunner.com/cl/1/Mobile-Phones", 3),
            "https://www.pricerunner.com/cl/1/Mobile-Phones?page=3"
        );
        assert_eq!(
            listing_url("https://shop.test/list?sort=price", 2),
            "https://shop.test/list?sort=price&page=2"
        );
    }
}
