//! Per-target liveness state and the session state machine.
//!
//! [`TrackedState`] holds everything known about one target. It is owned by
//! the daemon's liveness tracker, which is the only code that mutates it; this
//! module provides the pure transition rules the tracker applies.
//!
//! # Transitions
//!
//! ```text
//!              fetch ok, live (session opened)
//!   ┌─────────┐ ─────────────────────────────▶ ┌──────────────────┐
//!   │ Offline │                                │ Live { session } │
//!   └─────────┘ ◀───────────────────────────── └──────────────────┘
//!              fetch ok, offline (session closed)
//!
//!   fetch failed: state unchanged, failure counter +1
//! ```
//!
//! A transition only commits once the session store has carried out the
//! matching write ([`SessionCommit`]); a failed write leaves the state where it
//! was so the next scan retries the transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::non_empty;
use crate::{LiveSession, Platform, SessionId, StatusSnapshot, Target, TargetId};

/// Consecutive failures are logged on the first occurrence and then every
/// this many failures.
pub const FAILURE_LOG_EVERY: u32 = 10;

/// Returns true if the `count`-th consecutive failure should be logged.
#[must_use]
pub fn should_log_failure(count: u32) -> bool {
    count == 1 || (count > 0 && count % FAILURE_LOG_EVERY == 0)
}

// ============================================================================
// Liveness
// ============================================================================

/// Whether a target is broadcasting.
///
/// `Live` carries the open session, so a live target without a session (or an
/// offline one with a session) cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Liveness {
    #[default]
    Offline,
    Live { session: SessionId },
}

impl Liveness {
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Liveness::Live { .. })
    }

    pub fn open_session(&self) -> Option<SessionId> {
        match self {
            Liveness::Live { session } => Some(*session),
            Liveness::Offline => None,
        }
    }
}

/// Session write required before a successful fetch can be committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    /// No session bookkeeping needed (live→live or offline→offline).
    Keep,
    /// Target went live: a new session must be opened.
    Open,
    /// Target went offline: this session must be closed.
    Close(SessionId),
}

/// What actually happened when the [`SessionChange`] was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommit {
    Kept,
    Opened(SessionId),
    Closed,
    /// The store write failed; liveness stays as it was.
    Failed,
}

/// Liveness change produced by a committed fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    WentLive(SessionId),
    WentOffline(SessionId),
}

// ============================================================================
// Persisted status
// ============================================================================

/// Latest-status values written to the store after every query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub is_live: bool,
    pub title: String,
    pub viewer_count: i64,
    pub failed: bool,
}

/// Latest-status row as read back from the store on startup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CachedStatus {
    pub last_query_time: Option<DateTime<Utc>>,
    pub last_query_failed: bool,
    pub is_live: bool,
    pub title: String,
    pub viewer_count: i64,
}

// ============================================================================
// Tracked State
// ============================================================================

/// Everything known about one target.
///
/// Display fields (`title`, `viewer_count`, `avatar`, `name`, `room_url`) are
/// sticky: a fetch that does not report a value leaves the previous one in
/// place. `start_time` is only ever set while the target is live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedState {
    pub id: TargetId,
    pub name: String,
    pub platform: Platform,
    pub room_id: String,
    #[serde(flatten)]
    pub liveness: Liveness,
    pub title: String,
    pub viewer_count: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub avatar: Option<String>,
    /// Path of the locally cached avatar image, if downloaded.
    pub avatar_local: Option<String>,
    pub room_url: Option<String>,
    pub last_query_time: Option<DateTime<Utc>>,
    pub last_query_failed: bool,
    pub consecutive_failures: u32,
}

impl TrackedState {
    /// Creates the initial, offline state for a configured target.
    pub fn new(target: &Target) -> Self {
        Self {
            id: target.id.clone(),
            name: target.name.clone(),
            platform: target.platform,
            room_id: target.room_id.clone(),
            liveness: Liveness::Offline,
            title: String::new(),
            viewer_count: 0,
            start_time: None,
            avatar: target.avatar.clone(),
            avatar_local: None,
            room_url: target.live_url.clone(),
            last_query_time: None,
            last_query_failed: false,
            consecutive_failures: 0,
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.liveness.is_live()
    }

    pub fn open_session(&self) -> Option<SessionId> {
        self.liveness.open_session()
    }

    // ------------------------------------------------------------------------
    // Restore
    // ------------------------------------------------------------------------

    /// Adopts a session left open by a previous run.
    ///
    /// Title and start time come from the session record, not from a fetch.
    pub fn adopt_session(&mut self, session: &LiveSession) {
        self.liveness = Liveness::Live {
            session: session.id,
        };
        self.title = session.title.clone();
        self.start_time = Some(session.start_time);
    }

    /// Restores bookkeeping from the cached latest-status row.
    ///
    /// Liveness is never taken from the cache; only an open session makes a
    /// target live. Cached title and viewers fill in display fields for
    /// targets without one.
    pub fn restore_cached(&mut self, cached: &CachedStatus) {
        self.last_query_time = cached.last_query_time;
        self.last_query_failed = cached.last_query_failed;
        if !self.is_live() {
            self.title = cached.title.clone();
            self.viewer_count = cached.viewer_count;
        }
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Returns the session write a fetch reporting `is_live` requires.
    pub fn session_change(&self, is_live: bool) -> SessionChange {
        match (self.liveness, is_live) {
            (Liveness::Offline, true) => SessionChange::Open,
            (Liveness::Live { session }, false) => SessionChange::Close(session),
            _ => SessionChange::Keep,
        }
    }

    /// Records a failed fetch. Returns the new consecutive-failure count.
    ///
    /// Liveness and the open session are left untouched.
    pub fn record_failure(&mut self, at: DateTime<Utc>) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_query_failed = true;
        self.last_query_time = Some(at);
        self.consecutive_failures
    }

    /// Records a successful fetch whose session write has been carried out.
    pub fn record_success(
        &mut self,
        snapshot: &StatusSnapshot,
        commit: SessionCommit,
        at: DateTime<Utc>,
    ) -> Transition {
        self.consecutive_failures = 0;
        self.last_query_failed = false;
        self.last_query_time = Some(at);
        self.merge_display_fields(snapshot);

        let transition = match commit {
            SessionCommit::Opened(session) => {
                self.liveness = Liveness::Live { session };
                Transition::WentLive(session)
            }
            SessionCommit::Closed => match self.liveness.open_session() {
                Some(session) => {
                    self.liveness = Liveness::Offline;
                    Transition::WentOffline(session)
                }
                None => Transition::Unchanged,
            },
            SessionCommit::Kept | SessionCommit::Failed => Transition::Unchanged,
        };

        if self.is_live() {
            if let Some(start) = snapshot.start_time {
                self.start_time = Some(start);
            } else if self.start_time.is_none() {
                self.start_time = Some(at);
            }
        } else {
            self.start_time = None;
        }

        transition
    }

    /// Values to persist in the latest-status row.
    pub fn query_outcome(&self) -> QueryOutcome {
        QueryOutcome {
            is_live: self.is_live(),
            title: self.title.clone(),
            viewer_count: self.viewer_count,
            failed: self.last_query_failed,
        }
    }

    fn merge_display_fields(&mut self, snapshot: &StatusSnapshot) {
        if let Some(title) = non_empty(Some(snapshot.title.as_str())) {
            self.title = title.to_string();
        }
        if let Some(viewers) = snapshot.viewer_count {
            self.viewer_count = viewers;
        }
        if let Some(name) = non_empty(snapshot.name.as_deref()) {
            self.name = name.to_string();
        }
        if let Some(avatar) = non_empty(snapshot.avatar.as_deref()) {
            self.avatar = Some(avatar.to_string());
        }
        // A configured public URL always wins over the adapter's.
        if self.room_url.is_none() {
            if let Some(url) = non_empty(Some(snapshot.room_url.as_str())) {
                self.room_url = Some(url.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn target() -> Target {
        Target::new("alice", "Alice", Platform::Douyu, "9999")
    }

    fn snapshot(is_live: bool, title: &str) -> StatusSnapshot {
        let mut s = StatusSnapshot::new(Platform::Douyu, "9999", "https://www.douyu.com/9999");
        s.is_live = is_live;
        s.title = title.to_string();
        s
    }

    #[test]
    fn test_should_log_failure() {
        let logged: Vec<u32> = (1..=31).filter(|c| should_log_failure(*c)).collect();
        assert_eq!(logged, vec![1, 10, 20, 30]);
        assert!(!should_log_failure(0));
    }

    #[test]
    fn test_new_state_is_offline() {
        let state = TrackedState::new(&target());
        assert!(!state.is_live());
        assert_eq!(state.open_session(), None);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_session_change_table() {
        let mut state = TrackedState::new(&target());
        assert_eq!(state.session_change(false), SessionChange::Keep);
        assert_eq!(state.session_change(true), SessionChange::Open);

        state.liveness = Liveness::Live {
            session: SessionId::new(7),
        };
        assert_eq!(state.session_change(true), SessionChange::Keep);
        assert_eq!(
            state.session_change(false),
            SessionChange::Close(SessionId::new(7))
        );
    }

    #[test]
    fn test_going_live_then_offline() {
        let mut state = TrackedState::new(&target());
        let t0 = Utc::now();

        let opened = SessionCommit::Opened(SessionId::new(1));
        let t = state.record_success(&snapshot(true, "A"), opened, t0);
        assert_eq!(t, Transition::WentLive(SessionId::new(1)));
        assert!(state.is_live());
        assert_eq!(state.title, "A");
        assert_eq!(state.start_time, Some(t0));

        let t1 = t0 + Duration::minutes(90);
        let t = state.record_success(&snapshot(false, ""), SessionCommit::Closed, t1);
        assert_eq!(t, Transition::WentOffline(SessionId::new(1)));
        assert!(!state.is_live());
        assert_eq!(state.start_time, None);
        assert_eq!(state.last_query_time, Some(t1));
        // Sticky title survives the empty offline result
        assert_eq!(state.title, "A");
    }

    #[test]
    fn test_repeated_live_results_keep_session() {
        let mut state = TrackedState::new(&target());
        let now = Utc::now();
        state.record_success(&snapshot(true, "A"), SessionCommit::Opened(SessionId::new(3)), now);

        for _ in 0..3 {
            assert_eq!(state.session_change(true), SessionChange::Keep);
            let t = state.record_success(&snapshot(true, "B"), SessionCommit::Kept, now);
            assert_eq!(t, Transition::Unchanged);
        }
        assert_eq!(state.open_session(), Some(SessionId::new(3)));
        assert_eq!(state.title, "B");
    }

    #[test]
    fn test_failures_leave_liveness_alone() {
        let mut state = TrackedState::new(&target());
        let now = Utc::now();
        state.record_success(&snapshot(true, "A"), SessionCommit::Opened(SessionId::new(5)), now);

        assert_eq!(state.record_failure(now), 1);
        assert_eq!(state.record_failure(now), 2);
        assert_eq!(state.record_failure(now), 3);

        assert_eq!(state.consecutive_failures, 3);
        assert!(state.last_query_failed);
        assert_eq!(state.open_session(), Some(SessionId::new(5)));

        state.record_success(&snapshot(true, ""), SessionCommit::Kept, now);
        assert_eq!(state.consecutive_failures, 0);
        assert!(!state.last_query_failed);
    }

    #[test]
    fn test_failed_session_write_defers_transition() {
        let mut state = TrackedState::new(&target());
        let t = state.record_success(&snapshot(true, "A"), SessionCommit::Failed, Utc::now());
        assert_eq!(t, Transition::Unchanged);
        assert!(!state.is_live());
        assert_eq!(state.start_time, None);
        // Display fields still update
        assert_eq!(state.title, "A");
        assert_eq!(state.session_change(true), SessionChange::Open);
    }

    #[test]
    fn test_empty_fields_never_erase_known_values() {
        let mut t = target();
        t.avatar = Some("https://img/a.png".to_string());
        let mut state = TrackedState::new(&t);
        let now = Utc::now();

        let mut full = snapshot(false, "Title");
        full.name = Some("Alice Live".to_string());
        full.viewer_count = Some(42);
        state.record_success(&full, SessionCommit::Kept, now);

        let mut empty = snapshot(false, "   ");
        empty.name = Some(String::new());
        empty.avatar = Some(String::new());
        state.record_success(&empty, SessionCommit::Kept, now);

        assert_eq!(state.title, "Title");
        assert_eq!(state.name, "Alice Live");
        assert_eq!(state.avatar.as_deref(), Some("https://img/a.png"));
        assert_eq!(state.viewer_count, 42);
    }

    #[test]
    fn test_configured_url_wins() {
        let mut t = target();
        t.live_url = Some("https://example.com/alice".to_string());
        let mut state = TrackedState::new(&t);
        state.record_success(&snapshot(false, ""), SessionCommit::Kept, Utc::now());
        assert_eq!(state.room_url.as_deref(), Some("https://example.com/alice"));

        let mut state = TrackedState::new(&target());
        state.record_success(&snapshot(false, ""), SessionCommit::Kept, Utc::now());
        assert_eq!(state.room_url.as_deref(), Some("https://www.douyu.com/9999"));
    }

    #[test]
    fn test_adopt_session_restores_live() {
        let start = Utc::now() - Duration::hours(2);
        let session = LiveSession {
            id: SessionId::new(11),
            target_id: TargetId::new("alice"),
            platform: Platform::Douyu,
            room_id: "9999".to_string(),
            title: "Late night".to_string(),
            start_time: start,
            end_time: None,
        };
        let mut state = TrackedState::new(&target());
        state.adopt_session(&session);
        state.restore_cached(&CachedStatus {
            is_live: true,
            title: "stale cached title".to_string(),
            ..Default::default()
        });

        assert_eq!(state.open_session(), Some(SessionId::new(11)));
        assert_eq!(state.title, "Late night");
        assert_eq!(state.start_time, Some(start));
    }

    #[test]
    fn test_cached_live_flag_alone_does_not_make_target_live() {
        let mut state = TrackedState::new(&target());
        state.restore_cached(&CachedStatus {
            is_live: true,
            title: "cached".to_string(),
            viewer_count: 10,
            last_query_failed: true,
            ..Default::default()
        });
        assert!(!state.is_live());
        assert_eq!(state.title, "cached");
        assert_eq!(state.viewer_count, 10);
        assert!(state.last_query_failed);
        assert_eq!(state.avatar_local, None);
    }

    #[test]
    fn test_offline_start_time_is_ignored() {
        let mut state = TrackedState::new(&target());
        let mut s = snapshot(false, "");
        s.start_time = Some(Utc::now() - Duration::days(1));
        state.record_success(&s, SessionCommit::Kept, Utc::now());
        assert_eq!(state.start_time, None);
    }

    #[test]
    fn test_serialized_view_flattens_liveness() {
        let mut state = TrackedState::new(&target());
        let opened = SessionCommit::Opened(SessionId::new(2));
        state.record_success(&snapshot(true, "A"), opened, Utc::now());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "live");
        assert_eq!(json["session"], 2);
    }
}
