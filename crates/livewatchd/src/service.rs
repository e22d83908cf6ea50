//! Read-only query surface over the tracker and the store.

use std::sync::Arc;

use thiserror::Error;

use livewatch_core::{SessionView, Target, TargetId, TargetStats, TrackedState};

use crate::store::StoreError;
use crate::tracker::LivenessTracker;

/// History length used when the caller does not ask for one.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown target '{0}'")]
    UnknownTarget(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct StatusService {
    tracker: Arc<LivenessTracker>,
    targets: Arc<[Target]>,
}

impl StatusService {
    pub fn new(tracker: Arc<LivenessTracker>, targets: &[Target]) -> Self {
        Self {
            tracker,
            targets: Arc::from(targets),
        }
    }

    /// Current state of every target, in configured order.
    pub async fn list_targets(&self) -> Vec<TrackedState> {
        self.tracker.snapshot().await
    }

    pub async fn target(&self, id: &str) -> Result<TrackedState, QueryError> {
        self.tracker
            .get(&TargetId::new(id))
            .await
            .ok_or_else(|| QueryError::UnknownTarget(id.to_string()))
    }

    /// Sessions newest first. A zero `limit` means [`DEFAULT_HISTORY_LIMIT`].
    pub async fn history(&self, id: &str, limit: usize) -> Result<Vec<SessionView>, QueryError> {
        let target = self.lookup(id)?;
        let limit = if limit == 0 { DEFAULT_HISTORY_LIMIT } else { limit };
        let sessions = self.tracker.store().history(&target.id, limit).await?;
        Ok(sessions.iter().map(|s| s.to_view()).collect())
    }

    pub async fn stats(&self, id: &str) -> Result<TargetStats, QueryError> {
        let target = self.lookup(id)?;
        Ok(self.tracker.store().stats(&target.id).await?)
    }

    fn lookup(&self, id: &str) -> Result<&Target, QueryError> {
        self.targets
            .iter()
            .find(|t| t.id.as_str() == id)
            .ok_or_else(|| QueryError::UnknownTarget(id.to_string()))
    }
}
