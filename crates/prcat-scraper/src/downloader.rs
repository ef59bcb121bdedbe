//! Idempotent image fetcher writing under deterministic filenames.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use tokio::io::AsyncWriteExt;

use crate::error::ScraperError;
use crate::origin::absolutize;

const IMAGE_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

const VALID_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "webp", "avif", "svg", "bmp"];

static EXTENSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.([a-zA-Z0-9]+)(?:\?|$)").expect("valid regex"));

static UNSAFE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\-]").expect("valid regex"));

/// File extension for an image URL: the lowercase suffix of the last path
/// segment when it is a known image type, else `jpg`.
#[must_use]
pub fn image_extension(url: &str) -> String {
    EXTENSION_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
        .filter(|ext| VALID_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| "jpg".to_string())
}

/// Replace everything but word characters and `-` with `_`.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    UNSAFE_NAME_RE.replace_all(name, "_").into_owned()
}

pub struct ImageDownloader {
    client: Client,
    images_dir: PathBuf,
    origin: String,
}

impl ImageDownloader {
    /// Creates the downloader and its target directory.
    ///
    /// `origin` absolutizes root-relative image URLs and is sent as `Referer`.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Io`] if the directory cannot be created, or
    /// [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn new(
        images_dir: impl Into<PathBuf>,
        origin: &str,
        timeout: Duration,
    ) -> Result<Self, ScraperError> {
        let images_dir = images_dir.into();
        std::fs::create_dir_all(&images_dir).map_err(|e| ScraperError::Io {
            path: images_dir.display().to_string(),
            source: e,
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            images_dir,
            origin: origin.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Where an image for `name` from `url` is stored.
    #[must_use]
    pub fn target_path(&self, url: &str, name: &str) -> PathBuf {
        self.images_dir
            .join(format!("{}.{}", sanitize_filename(name), image_extension(url)))
    }

    /// Fetch `url` into `<images_dir>/<sanitized name>.<ext>` and return the
    /// path. An existing file at that path is returned without a request.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::Http`] on transport failure.
    /// - [`ScraperError::UnexpectedStatus`] for any status other than 200.
    /// - [`ScraperError::Io`] if the file cannot be written; the partial file
    ///   is removed.
    pub async fn download(&self, url: &str, name: &str) -> Result<PathBuf, ScraperError> {
        let url = absolutize(url, &self.origin);
        let target = self.target_path(&url, name);

        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            tracing::debug!(path = %target.display(), "image already stored");
            return Ok(target);
        }

        let mut response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, IMAGE_USER_AGENT)
            .header(reqwest::header::ACCEPT, IMAGE_ACCEPT)
            .header(reqwest::header::REFERER, format!("{}/", self.origin))
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ScraperError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let io_err = |e: std::io::Error| ScraperError::Io {
            path: target.display().to_string(),
            source: e,
        };
        let mut file = tokio::fs::File::create(&target).await.map_err(io_err)?;

        let written: Result<(), ScraperError> = async {
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await.map_err(io_err)?;
            }
            file.flush().await.map_err(io_err)?;
            Ok(())
        }
        .await;

        if let Err(e) = written {
            drop(file);
            if let Err(remove_err) = tokio::fs::remove_file(&target).await {
                tracing::warn!(
                    path = %target.display(),
                    error = %remove_err,
                    "failed to remove partial image"
                );
            }
            return Err(e);
        }

        tracing::debug!(url, path = %target.display(), "image stored");
        Ok(target)
    }
}
