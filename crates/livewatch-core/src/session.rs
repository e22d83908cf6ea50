//! Broadcast sessions and their aggregate statistics.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Platform, TargetId};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identifier of a persisted session row.
///
/// Assigned by the session store when the session is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(i64);

impl SessionId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SessionId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Live Session
// ============================================================================

/// One contiguous broadcast of a target.
///
/// Open while `end_time` is `None`. A target has at most one open session at
/// any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSession {
    pub id: SessionId,
    pub target_id: TargetId,
    pub platform: Platform,
    pub room_id: String,
    /// Title at the moment the session was opened.
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl LiveSession {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Length of a closed session; `None` while the session is open.
    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Length of a closed session in whole seconds.
    pub fn duration_secs(&self) -> Option<i64> {
        self.duration().map(|d| d.num_seconds())
    }

    pub fn to_view(&self) -> SessionView {
        SessionView::from(self)
    }
}

/// Read-only projection of a session for clients (JSON output, CLI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: SessionId,
    pub target_id: TargetId,
    pub platform: Platform,
    pub room_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds; present once the session is closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

impl From<&LiveSession> for SessionView {
    fn from(session: &LiveSession) -> Self {
        Self {
            id: session.id,
            target_id: session.target_id.clone(),
            platform: session.platform,
            room_id: session.room_id.clone(),
            title: session.title.clone(),
            start_time: session.start_time,
            end_time: session.end_time,
            duration: session.duration_secs(),
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Aggregate broadcast statistics for one target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetStats {
    pub target_id: TargetId,
    /// All sessions, open ones included.
    pub total_sessions: u32,
    /// Sum of closed session durations, in seconds.
    pub total_duration: i64,
    /// `total_duration / total_sessions`, in seconds.
    pub avg_duration: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_live_time: Option<DateTime<Utc>>,
    /// Sessions started within the last 7 days.
    pub week_sessions: u32,
    /// Sessions started within the last calendar month.
    pub month_sessions: u32,
}

impl TargetStats {
    /// Folds a target's session history into statistics as of `now`.
    pub fn from_sessions(
        target_id: TargetId,
        sessions: &[LiveSession],
        now: DateTime<Utc>,
    ) -> Self {
        let week_ago = now - Duration::days(7);
        let month_ago = now.checked_sub_months(Months::new(1)).unwrap_or(week_ago);

        let mut stats = TargetStats {
            target_id,
            ..Default::default()
        };

        for session in sessions {
            stats.total_sessions += 1;
            stats.total_duration += session.duration_secs().unwrap_or(0);
            if session.start_time >= week_ago {
                stats.week_sessions += 1;
            }
            if session.start_time >= month_ago {
                stats.month_sessions += 1;
            }
            if stats.last_live_time.map_or(true, |t| session.start_time > t) {
                stats.last_live_time = Some(session.start_time);
            }
        }

        if stats.total_sessions > 0 {
            stats.avg_duration = stats.total_duration / i64::from(stats.total_sessions);
        }

        stats
    }
}
