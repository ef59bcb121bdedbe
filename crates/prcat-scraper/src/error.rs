use thiserror::Error;

use crate::page::PageError;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error(transparent)]
    Page(#[from] PageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Sink(#[from] prcat_core::SinkError),

    #[error("a crawl is already {0}")]
    AlreadyRunning(crate::run_state::RunState),
}
