//! Daemon-level errors.

use thiserror::Error;

/// Everything that can stop the daemon or the CLI.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] splitd_core::Error),

    #[error(transparent)]
    Link(#[from] splitd_link::LinkError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to install {signal} handler: {source}")]
    Signal {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for the daemon crate.
pub type Result<T> = std::result::Result<T, Error>;
