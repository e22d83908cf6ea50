//! Point-in-time status produced by one adapter fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Platform;

/// What a platform reported about one room at fetch time.
///
/// Transient: consumed by the liveness tracker, never persisted verbatim.
/// Optional fields are `None` when the adapter could not discover them;
/// an empty `title` means the same thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub platform: Platform,
    pub room_id: String,
    pub is_live: bool,
    pub title: String,
    pub viewer_count: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub avatar: Option<String>,
    /// Canonical room URL for this platform.
    pub room_url: String,
}

impl StatusSnapshot {
    /// Creates an offline snapshot with no discovered fields.
    pub fn new(
        platform: Platform,
        room_id: impl Into<String>,
        room_url: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            room_id: room_id.into(),
            is_live: false,
            title: String::new(),
            viewer_count: None,
            start_time: None,
            name: None,
            avatar: None,
            room_url: room_url.into(),
        }
    }
}

/// Returns the value only if it carries text.
///
/// Adapters frequently see `""` for missing fields; callers treat that the
/// same as absent.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
