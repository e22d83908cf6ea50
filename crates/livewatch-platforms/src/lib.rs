//! livewatch platforms - per-platform live status adapters
//!
//! Every supported platform has one adapter that turns a room id into a
//! [`StatusSnapshot`]. Adapters hold nothing but an HTTP client, so they are
//! safe to call repeatedly and concurrently for different rooms.
//!
//! ```text
//!                  ┌──────────────┐
//!   room_id ──────►│ StatusSource │──────► StatusSnapshot | FetchError
//!                  └──────┬───────┘
//!          ┌──────────────┴───────────────┐
//!   structured API                 markup scraping
//!   bilibili, douyu                douyin, kuaishou, cc163, weibo
//!   typed JSON envelope            extract::run_chain over the page
//! ```

pub mod bilibili;
pub mod cc163;
pub mod douyin;
pub mod douyu;
pub mod error;
pub mod extract;
pub mod http;
pub mod kuaishou;
pub mod weibo;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use livewatch_core::{Platform, StatusSnapshot};

pub use bilibili::Bilibili;
pub use cc163::Cc163;
pub use douyin::Douyin;
pub use douyu::Douyu;
pub use error::FetchError;
pub use kuaishou::Kuaishou;
pub use weibo::Weibo;

/// Fetches the current status of one room on one platform.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// The platform this source serves.
    fn platform(&self) -> Platform;

    /// Fetches a room's status.
    ///
    /// Returns [`FetchError::Cancelled`] as soon as `cancel` fires.
    async fn fetch(
        &self,
        room_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StatusSnapshot, FetchError>;
}

// ============================================================================
// Adapter registry
// ============================================================================

/// The closed set of built-in adapters, one per [`Platform`].
#[derive(Debug, Clone)]
pub enum Adapter {
    Bilibili(Bilibili),
    Douyin(Douyin),
    Kuaishou(Kuaishou),
    Douyu(Douyu),
    Cc163(Cc163),
    Weibo(Weibo),
}

impl Adapter {
    /// Builds the adapter for `platform`.
    pub fn for_platform(platform: Platform) -> Result<Self, FetchError> {
        Ok(match platform {
            Platform::Bilibili => Adapter::Bilibili(Bilibili::new()?),
            Platform::Douyin => Adapter::Douyin(Douyin::new()?),
            Platform::Kuaishou => Adapter::Kuaishou(Kuaishou::new()?),
            Platform::Douyu => Adapter::Douyu(Douyu::new()?),
            Platform::Cc163 => Adapter::Cc163(Cc163::new()?),
            Platform::Weibo => Adapter::Weibo(Weibo::new()?),
        })
    }

    fn source(&self) -> &dyn StatusSource {
        match self {
            Adapter::Bilibili(a) => a,
            Adapter::Douyin(a) => a,
            Adapter::Kuaishou(a) => a,
            Adapter::Douyu(a) => a,
            Adapter::Cc163(a) => a,
            Adapter::Weibo(a) => a,
        }
    }
}

#[async_trait]
impl StatusSource for Adapter {
    fn platform(&self) -> Platform {
        self.source().platform()
    }

    async fn fetch(
        &self,
        room_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StatusSnapshot, FetchError> {
        self.source().fetch(room_id, cancel).await
    }
}

/// Canonical room URL for `platform`, used when no snapshot is available yet.
pub fn room_url(platform: Platform, room_id: &str) -> String {
    match platform {
        Platform::Bilibili => bilibili::room_url(room_id),
        Platform::Douyin => douyin::room_url(room_id),
        Platform::Kuaishou => kuaishou::room_url(room_id),
        Platform::Douyu => douyu::room_url(room_id),
        Platform::Cc163 => cc163::room_url(room_id),
        Platform::Weibo => weibo::room_url(room_id),
    }
}
