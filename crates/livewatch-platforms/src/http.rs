//! HTTP plumbing shared by the adapters.
//!
//! Platforms reject requests that do not look like a desktop browser, so every
//! client carries a real browser user agent and every request is raced against
//! the scheduler's cancellation token.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::FetchError;

/// Chrome on Windows.
pub const WINDOWS_CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Chrome on macOS.
pub const MAC_CHROME_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// `Accept` header a browser sends for a top-level navigation.
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Starts a client with the adapter's timeout and user agent.
pub fn client_builder(timeout: Duration, user_agent: &str) -> ClientBuilder {
    Client::builder().timeout(timeout).user_agent(user_agent)
}

/// Finishes a client, mapping construction failures into `FetchError`.
pub fn build(builder: ClientBuilder) -> Result<Client, FetchError> {
    builder
        .build()
        .map_err(|e| FetchError::Client(e.to_string()))
}

/// Sends a request and rejects non-2xx responses.
async fn send(request: RequestBuilder, cancel: &CancellationToken) -> Result<Response, FetchError> {
    let response = tokio::select! {
        biased;

        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        result = request.send() => result?,
    };

    let status = response.status();
    trace!(url = %response.url(), status = status.as_u16(), "Response received");
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    Ok(response)
}

/// Fetches a page body as text.
pub async fn get_text(
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> Result<String, FetchError> {
    let response = send(request, cancel).await?;
    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        body = response.text() => Ok(body?),
    }
}

/// Fetches and decodes a JSON envelope.
pub async fn get_json<T: DeserializeOwned>(
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> Result<T, FetchError> {
    let body = get_text(request, cancel).await?;
    serde_json::from_str(&body).map_err(FetchError::decode)
}
