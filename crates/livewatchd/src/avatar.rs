//! Local avatar cache.
//!
//! Once at startup and then daily, every target with a configured avatar URL
//! gets its image downloaded into the avatar directory as
//! `{target}_{md5(url)[..8]}{ext}`. A target refreshed within the last day
//! whose file still exists is left alone.
//!
//! Failures are per target: one bad URL never stops the pass.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use livewatch_core::{non_empty, Target};
use livewatch_platforms::http::MAC_CHROME_UA;

use crate::store::StoreError;
use crate::tracker::LivenessTracker;

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
/// Pause between downloads.
pub const DOWNLOAD_PAUSE: Duration = Duration::from_millis(100);

const KNOWN_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("download failed: {0}")]
    Http(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("failed to write {path}: {reason}")]
    Io { path: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("avatar refresh cancelled")]
    Cancelled,
}

/// Counts for one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvatarReport {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

// ============================================================================
// File naming
// ============================================================================

/// Cache file name for a target's avatar URL.
pub fn file_name(target_id: &str, url: &str) -> String {
    let digest = format!("{:x}", md5::compute(url.as_bytes()));
    let short: String = digest.chars().take(8).collect();
    format!("{target_id}_{short}{}", extension(url))
}

/// Image extension taken from the URL path, `.jpg` when unknown.
pub fn extension(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    let Some(dot) = last_segment.rfind('.') else {
        return ".jpg";
    };
    let ext = last_segment.get(dot..).unwrap_or_default().to_ascii_lowercase();
    KNOWN_EXTENSIONS
        .iter()
        .find(|known| **known == ext)
        .copied()
        .unwrap_or(".jpg")
}

// ============================================================================
// AvatarCache
// ============================================================================

pub struct AvatarCache {
    dir: PathBuf,
    client: Client,
    targets: Vec<Target>,
    tracker: Arc<LivenessTracker>,
}

impl AvatarCache {
    pub fn new(
        dir: impl Into<PathBuf>,
        targets: &[Target],
        tracker: Arc<LivenessTracker>,
    ) -> Result<Self, AvatarError> {
        let client = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .user_agent(MAC_CHROME_UA)
            .build()
            .map_err(|e| AvatarError::Client(e.to_string()))?;
        Ok(Self::with_client(dir, targets, tracker, client))
    }

    /// Uses a caller-built HTTP client.
    pub fn with_client(
        dir: impl Into<PathBuf>,
        targets: &[Target],
        tracker: Arc<LivenessTracker>,
        client: Client,
    ) -> Self {
        Self {
            dir: dir.into(),
            client,
            targets: targets.to_vec(),
            tracker,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Points each target at its previously downloaded avatar.
    ///
    /// Only a file that still exists in the avatar directory is adopted.
    /// Returns how many targets got one.
    pub async fn load_local(&self) -> usize {
        let store = self.tracker.store();
        let mut loaded = 0;
        for target in &self.targets {
            let info = match store.avatar_info(&target.id).await {
                Ok(Some(info)) => info,
                Ok(None) => continue,
                Err(e) => {
                    warn!(target_id = %target.id, error = %e, "Failed to read avatar record");
                    continue;
                }
            };
            let Some(local) = non_empty(info.local.as_deref()) else {
                continue;
            };
            if !tokio::fs::try_exists(self.dir.join(local)).await.unwrap_or(false) {
                debug!(target_id = %target.id, file = local, "Cached avatar file is gone");
                continue;
            }
            self.tracker.set_avatar_local(&target.id, local.to_string()).await;
            loaded += 1;
        }
        loaded
    }

    /// Runs a refresh now and then every [`REFRESH_INTERVAL`] until cancelled.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = interval(REFRESH_INTERVAL);
            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Avatar cache shutting down");
                        break;
                    }

                    _ = tick.tick() => {
                        self.refresh_all(&cancel).await;
                    }
                }
            }
        })
    }

    /// One pass over every target with a configured avatar.
    pub async fn refresh_all(&self, cancel: &CancellationToken) -> AvatarReport {
        info!(dir = %self.dir.display(), "Avatar refresh started");
        let mut report = AvatarReport::default();

        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(dir = %self.dir.display(), error = %e, "Failed to create avatar directory");
            report.failed = self
                .targets
                .iter()
                .filter(|t| configured_url(t).is_some())
                .count();
            return report;
        }

        for target in &self.targets {
            let Some(url) = configured_url(target) else {
                continue;
            };
            if cancel.is_cancelled() {
                break;
            }

            match self.refresh_one(target, url, cancel).await {
                Ok(false) => report.skipped += 1,
                Ok(true) => {
                    report.updated += 1;
                    tokio::select! {
                        biased;

                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(DOWNLOAD_PAUSE) => {}
                    }
                }
                Err(AvatarError::Cancelled) => break,
                Err(e) => {
                    warn!(target_id = %target.id, url, error = %e, "Avatar refresh failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            "Avatar refresh finished"
        );
        report
    }

    /// Refreshes one target. Returns false when the cached copy is current.
    async fn refresh_one(
        &self,
        target: &Target,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, AvatarError> {
        let store = self.tracker.store();
        if let Some(info) = store.avatar_info(&target.id).await? {
            let fresh = info
                .updated
                .and_then(|at| (Utc::now() - at).to_std().ok())
                .is_some_and(|age| age < REFRESH_INTERVAL);
            let same_url = info.url.as_deref() == Some(url);
            let local = non_empty(info.local.as_deref());
            if let (true, true, Some(local)) = (fresh, same_url, local) {
                if tokio::fs::try_exists(self.dir.join(local)).await.unwrap_or(false) {
                    debug!(target_id = %target.id, "Avatar is current");
                    return Ok(false);
                }
            }
        }

        let local = self.download(&target.id.to_string(), url, cancel).await?;
        store.update_avatar(&target.id, url, &local, Utc::now()).await?;
        self.tracker.set_avatar_local(&target.id, local.clone()).await;
        debug!(target_id = %target.id, file = %local, "Avatar cached");
        Ok(true)
    }

    async fn download(
        &self,
        target_id: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AvatarError> {
        let name = file_name(target_id, url);
        let path = self.dir.join(&name);

        let bytes = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(AvatarError::Cancelled),
            result = fetch_bytes(&self.client, url) => result?,
        };

        let partial = self.dir.join(format!("{name}.part"));
        let io_err = |e: std::io::Error| AvatarError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        tokio::fs::write(&partial, &bytes).await.map_err(io_err)?;
        tokio::fs::rename(&partial, &path).await.map_err(io_err)?;
        Ok(name)
    }
}

fn configured_url(target: &Target) -> Option<&str> {
    non_empty(target.avatar.as_deref())
}

async fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>, AvatarError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AvatarError::Http(e.to_string()))?;
    if response.status() != StatusCode::OK {
        return Err(AvatarError::Status(response.status().as_u16()));
    }
    let body = response
        .bytes()
        .await
        .map_err(|e| AvatarError::Http(e.to_string()))?;
    Ok(body.to_vec())
}

impl std::fmt::Debug for AvatarCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarCache")
            .field("dir", &self.dir)
            .field("targets", &self.targets.len())
            .finish_non_exhaustive()
    }
}
