use std::time::Duration;

use thiserror::Error;

/// Classified upstream failure. The fetcher decides retry, deferral or
/// session deactivation from the variant alone.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited by upstream, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("upstream rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("post has no category slug")]
    MissingCategory,
}
