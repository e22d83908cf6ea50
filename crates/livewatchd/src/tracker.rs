//! Liveness tracker - owns the in-memory state of every target.
//!
//! All mutation goes through [`LivenessTracker::apply`] and the avatar hook;
//! readers get copies from [`LivenessTracker::snapshot`]. One `RwLock` guards
//! the whole map and is never held across an `.await`.
//!
//! A successful fetch is committed in three steps:
//!
//! ```text
//!   read lock ──► session_change(is_live)
//!                      │
//!                      ▼
//!   (no lock)   start_session / end_session ──► SessionCommit
//!                      │
//!                      ▼
//!   write lock ──► record_success(snapshot, commit) ──► Transition
//!                      │
//!                      ▼
//!   (no lock)   record_query_outcome
//! ```
//!
//! A platform processes its targets sequentially, so no other fetch for the
//! same target can interleave between the steps.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use livewatch_core::{
    non_empty, should_log_failure, QueryOutcome, SessionChange, SessionCommit, StatusSnapshot,
    Target, TargetId, TrackedState, Transition,
};
use livewatch_platforms::FetchError;

use crate::store::SessionStore;

/// Result of applying one fetch outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Succeeded { transition: Transition },
    /// `logged` is true when this failure produced a warning line.
    Failed { consecutive: u32, logged: bool },
    /// The fetch was abandoned during shutdown; nothing was recorded.
    Cancelled,
    /// The target is not part of the configured roster.
    UnknownTarget,
}

/// Summary of [`LivenessTracker::restore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub adopted_sessions: usize,
    pub cached_rows: usize,
    pub errors: usize,
}

pub struct LivenessTracker {
    states: RwLock<HashMap<TargetId, TrackedState>>,
    /// Configured order, used for snapshots.
    order: Vec<TargetId>,
    store: Arc<dyn SessionStore>,
}

impl LivenessTracker {
    /// Creates a tracker with every target offline.
    pub fn new(targets: &[Target], store: Arc<dyn SessionStore>) -> Self {
        let states = targets
            .iter()
            .map(|t| (t.id.clone(), TrackedState::new(t)))
            .collect();
        Self {
            states: RwLock::new(states),
            order: targets.iter().map(|t| t.id.clone()).collect(),
            store,
        }
    }

    /// Rebuilds state from the store after a restart.
    ///
    /// A target with an open session starts live with that session adopted.
    /// Store errors are logged and leave the target at its initial state.
    pub async fn restore(&self) -> RestoreReport {
        let mut report = RestoreReport::default();

        for id in &self.order {
            let open = match self.store.open_session(id).await {
                Ok(open) => open,
                Err(e) => {
                    warn!(target_id = %id, error = %e, "Failed to read open session");
                    report.errors += 1;
                    None
                }
            };
            let cached = match self.store.cached_status(id).await {
                Ok(cached) => cached,
                Err(e) => {
                    warn!(target_id = %id, error = %e, "Failed to read cached status");
                    report.errors += 1;
                    None
                }
            };

            let mut states = self.states.write().await;
            let Some(state) = states.get_mut(id) else {
                continue;
            };
            if let Some(session) = &open {
                state.adopt_session(session);
                report.adopted_sessions += 1;
                info!(target_id = %id, session = %session.id, "Resumed open session");
            }
            if let Some(cached) = &cached {
                state.restore_cached(cached);
                report.cached_rows += 1;
            }
        }

        report
    }

    /// Applies one fetch outcome for `target`.
    pub async fn apply(
        &self,
        target: &Target,
        result: Result<StatusSnapshot, FetchError>,
    ) -> ApplyOutcome {
        match result {
            Err(FetchError::Cancelled) => ApplyOutcome::Cancelled,
            Err(error) => self.apply_failure(target, &error).await,
            Ok(snapshot) => self.apply_success(target, &snapshot).await,
        }
    }

    async fn apply_failure(&self, target: &Target, error: &FetchError) -> ApplyOutcome {
        let now = Utc::now();
        let (consecutive, outcome) = {
            let mut states = self.states.write().await;
            let Some(state) = states.get_mut(&target.id) else {
                return ApplyOutcome::UnknownTarget;
            };
            let consecutive = state.record_failure(now);
            (consecutive, state.query_outcome())
        };

        let logged = should_log_failure(consecutive);
        if logged {
            warn!(
                target_id = %target.id,
                platform = %target.platform,
                consecutive,
                error = %error,
                "Status fetch failed"
            );
        }

        self.persist_outcome(&target.id, &outcome, now).await;
        ApplyOutcome::Failed { consecutive, logged }
    }

    async fn apply_success(&self, target: &Target, snapshot: &StatusSnapshot) -> ApplyOutcome {
        let now = Utc::now();
        let (change, session_title) = {
            let states = self.states.read().await;
            let Some(state) = states.get(&target.id) else {
                return ApplyOutcome::UnknownTarget;
            };
            let title = non_empty(Some(snapshot.title.as_str())).unwrap_or(state.title.as_str());
            (state.session_change(snapshot.is_live), title.to_string())
        };

        let commit = match change {
            SessionChange::Keep => SessionCommit::Kept,
            SessionChange::Open => {
                match self.store.start_session(target, &session_title, now).await {
                    Ok(session) => SessionCommit::Opened(session),
                    Err(e) => {
                        warn!(
                            target_id = %target.id,
                            error = %e,
                            "Failed to open session; will retry"
                        );
                        SessionCommit::Failed
                    }
                }
            }
            SessionChange::Close(session) => match self.store.end_session(session, now).await {
                Ok(()) => SessionCommit::Closed,
                Err(e) => {
                    warn!(
                        target_id = %target.id,
                        session = %session,
                        error = %e,
                        "Failed to close session; will retry"
                    );
                    SessionCommit::Failed
                }
            },
        };

        let (transition, outcome) = {
            let mut states = self.states.write().await;
            let Some(state) = states.get_mut(&target.id) else {
                return ApplyOutcome::UnknownTarget;
            };
            let transition = state.record_success(snapshot, commit, now);
            (transition, state.query_outcome())
        };

        match transition {
            Transition::WentLive(session) => info!(
                target_id = %target.id,
                platform = %target.platform,
                session = %session,
                title = %outcome.title,
                "Target went live"
            ),
            Transition::WentOffline(session) => info!(
                target_id = %target.id,
                platform = %target.platform,
                session = %session,
                "Target went offline"
            ),
            Transition::Unchanged => debug!(
                target_id = %target.id,
                live = outcome.is_live,
                viewers = outcome.viewer_count,
                "Status refreshed"
            ),
        }

        self.persist_outcome(&target.id, &outcome, now).await;
        ApplyOutcome::Succeeded { transition }
    }

    async fn persist_outcome(&self, id: &TargetId, outcome: &QueryOutcome, at: DateTime<Utc>) {
        if let Err(e) = self.store.record_query_outcome(id, outcome, at).await {
            warn!(target_id = %id, error = %e, "Failed to persist query outcome");
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Copies of every target's state, in configured order.
    pub async fn snapshot(&self) -> Vec<TrackedState> {
        let states = self.states.read().await;
        self.order
            .iter()
            .filter_map(|id| states.get(id).cloned())
            .collect()
    }

    pub async fn get(&self, id: &TargetId) -> Option<TrackedState> {
        self.states.read().await.get(id).cloned()
    }

    /// Records the cached avatar file for a target. Returns false for unknown ids.
    pub async fn set_avatar_local(&self, id: &TargetId, local: String) -> bool {
        let mut states = self.states.write().await;
        match states.get_mut(id) {
            Some(state) => {
                state.avatar_local = Some(local);
                true
            }
            None => false,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }
}

impl std::fmt::Debug for LivenessTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessTracker")
            .field("targets", &self.order.len())
            .finish_non_exhaustive()
    }
}
