//! Monitored targets: one account on one platform.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{DomainError, DomainResult, Platform};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identity key of a configured target (e.g. "alice").
///
/// Chosen by whoever writes the configuration; stable across restarts because
/// session history and cached status rows are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for TargetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Target
// ============================================================================

/// A monitored account, as declared in configuration.
///
/// Immutable at runtime: the roster is loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub platform: Platform,
    /// Platform-specific room or channel identifier.
    pub room_id: String,
    /// Known avatar URL, used by the avatar cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Known public URL; preferred over the URL an adapter derives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_url: Option<String>,
}

impl Target {
    pub fn new(
        id: impl Into<TargetId>,
        name: impl Into<String>,
        platform: Platform,
        room_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            platform,
            room_id: room_id.into(),
            avatar: None,
            live_url: None,
        }
    }

    /// Checks the fields every adapter and store operation relies on.
    pub fn validate(&self) -> DomainResult<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(self.invalid("id", "must not be empty"));
        }
        if self.room_id.trim().is_empty() {
            return Err(self.invalid("room_id", "must not be empty"));
        }
        Ok(())
    }

    fn invalid(&self, field: &str, reason: &str) -> DomainError {
        DomainError::InvalidTarget {
            target: self.id.to_string(),
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}
