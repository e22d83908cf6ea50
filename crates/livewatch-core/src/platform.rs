//! Streaming platforms known to livewatch.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// A third-party live-streaming platform.
///
/// The set is closed: every variant has exactly one hand-written adapter in
/// `livewatch-platforms`. Serialized in lowercase (`"bilibili"`, `"cc163"`, ...)
/// to match the configuration file and the persisted session rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Bilibili,
    Douyin,
    Kuaishou,
    Douyu,
    Cc163,
    Weibo,
}

impl Platform {
    /// Every supported platform, in a stable order.
    pub const ALL: [Platform; 6] = [
        Platform::Bilibili,
        Platform::Douyin,
        Platform::Kuaishou,
        Platform::Douyu,
        Platform::Cc163,
        Platform::Weibo,
    ];

    /// Returns the wire/config identifier of the platform.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Bilibili => "bilibili",
            Platform::Douyin => "douyin",
            Platform::Kuaishou => "kuaishou",
            Platform::Douyu => "douyu",
            Platform::Cc163 => "cc163",
            Platform::Weibo => "weibo",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::UnknownPlatform(s.to_string()))
    }
}
