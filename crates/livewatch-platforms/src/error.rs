//! Fetch errors shared by every platform adapter.

use thiserror::Error;

/// Why a single status fetch produced no snapshot.
///
/// Always non-fatal: the tracker records a failed query and the target is
/// retried on the next scan cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Connection, TLS, or body-read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request exceeded the adapter's timeout.
    #[error("request timed out")]
    Timeout,

    /// The platform answered with a non-2xx status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The body could not be decoded into the expected shape.
    #[error("undecodable payload: {0}")]
    Decode(String),

    /// The API envelope carried a non-success code.
    #[error("{platform} API error {code}: {message}")]
    Api {
        platform: &'static str,
        code: i64,
        message: String,
    },

    /// Neither a liveness signal nor any title text was found on the page.
    #[error("no live status signal found in page")]
    NoSignal,

    /// The fetch was abandoned because shutdown was requested.
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Creates a decode error from any error type.
    pub fn decode<E: std::fmt::Display>(err: E) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}
