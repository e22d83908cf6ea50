//! Session and status persistence.
//!
//! The daemon writes two kinds of records:
//! - **sessions**: one row per broadcast, open while `end_time` is NULL
//! - **target status**: one row per target holding the latest query outcome
//!   and avatar cache bookkeeping
//!
//! Every write is durable before the call returns, so a crash between a
//! transition and the next scan leaves at most one dangling open session,
//! which [`SessionStore::open_session`] hands back on restart.
//!
//! ```text
//!   LivenessTracker ──┐                 ┌──► sessions
//!   Scheduler ────────┼──► SessionStore ┤
//!   AvatarCache ──────┘   (SqliteStore) └──► target_status
//! ```

mod sqlite;

pub use sqlite::{Db, SqliteStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use livewatch_core::{
    CachedStatus, LiveSession, QueryOutcome, SessionId, Target, TargetId, TargetStats,
};

/// Errors from the persistence layer.
///
/// Never fatal to the scan loop: the caller logs and the write is lost for
/// that cycle.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create data directory {path}: {reason}")]
    DataDir { path: String, reason: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed {column} in stored row: {value}")]
    Corrupt { column: &'static str, value: String },

    #[error("storage task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Avatar cache bookkeeping for one target.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AvatarInfo {
    /// Remote URL the cached file was downloaded from.
    pub url: Option<String>,
    /// File name of the cached copy inside the avatar directory.
    pub local: Option<String>,
    pub updated: Option<DateTime<Utc>>,
}

/// Durable record of sessions and per-target query status.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Opens a session for `target` starting at `at`.
    ///
    /// If the target already has an open session, that session's id is
    /// returned instead of inserting a second one.
    async fn start_session(
        &self,
        target: &Target,
        title: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<SessionId>;

    /// Closes a session. Closing an already-closed session is a no-op.
    async fn end_session(&self, id: SessionId, at: DateTime<Utc>) -> StoreResult<()>;

    /// The target's open session, if any.
    async fn open_session(&self, target_id: &TargetId) -> StoreResult<Option<LiveSession>>;

    /// Upserts the latest-status row.
    async fn record_query_outcome(
        &self,
        target_id: &TargetId,
        outcome: &QueryOutcome,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn last_query_time(&self, target_id: &TargetId) -> StoreResult<Option<DateTime<Utc>>>;

    /// Up to `limit` sessions, newest first.
    async fn history(&self, target_id: &TargetId, limit: usize) -> StoreResult<Vec<LiveSession>>;

    async fn stats(&self, target_id: &TargetId) -> StoreResult<TargetStats>;

    /// The latest-status row as written by previous runs.
    async fn cached_status(&self, target_id: &TargetId) -> StoreResult<Option<CachedStatus>>;

    async fn avatar_info(&self, target_id: &TargetId) -> StoreResult<Option<AvatarInfo>>;

    async fn update_avatar(
        &self,
        target_id: &TargetId,
        url: &str,
        local: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;
}
