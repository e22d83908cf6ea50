//! Shared fakes for the daemon integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use livewatch_core::{
    CachedStatus, LiveSession, Platform, QueryOutcome, SessionId, StatusSnapshot, Target, TargetId,
    TargetStats,
};
use livewatch_platforms::{FetchError, StatusSource};
use livewatchd::store::{AvatarInfo, SessionStore, StoreError, StoreResult};

// ============================================================================
// Targets and snapshots
// ============================================================================

pub fn target(id: &str, platform: Platform, room_id: &str) -> Target {
    Target::new(id, id.to_uppercase(), platform, room_id)
}

pub fn live(target: &Target, title: &str) -> StatusSnapshot {
    let mut snapshot = StatusSnapshot::new(target.platform, target.room_id.clone(), "");
    snapshot.is_live = true;
    snapshot.title = title.to_string();
    snapshot
}

pub fn offline(target: &Target) -> StatusSnapshot {
    StatusSnapshot::new(target.platform, target.room_id.clone(), "")
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Default)]
struct Tables {
    sessions: Vec<LiveSession>,
    status: HashMap<TargetId, CachedStatus>,
    avatars: HashMap<TargetId, AvatarInfo>,
    next_id: i64,
}

/// In-memory [`SessionStore`] with switchable write failures.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_start: AtomicBool,
    fail_end: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_start_session(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn fail_end_session(&self, fail: bool) {
        self.fail_end.store(fail, Ordering::SeqCst);
    }

    pub fn sessions_for(&self, id: &str) -> Vec<LiveSession> {
        let tables = self.tables.lock().unwrap();
        tables
            .sessions
            .iter()
            .filter(|s| s.target_id.as_str() == id)
            .cloned()
            .collect()
    }

    pub fn status_for(&self, id: &str) -> Option<CachedStatus> {
        self.tables.lock().unwrap().status.get(&TargetId::new(id)).cloned()
    }

    /// Pretends `id` was queried at `at`.
    pub fn mark_queried(&self, id: &str, at: DateTime<Utc>) {
        let mut tables = self.tables.lock().unwrap();
        let row = tables.status.entry(TargetId::new(id)).or_default();
        row.last_query_time = Some(at);
    }

    fn injected() -> StoreError {
        StoreError::Task("injected failure".to_string())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn start_session(
        &self,
        target: &Target,
        title: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<SessionId> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        let mut tables = self.tables.lock().unwrap();
        if let Some(open) = tables
            .sessions
            .iter()
            .find(|s| s.target_id == target.id && s.is_open())
        {
            return Ok(open.id);
        }
        tables.next_id += 1;
        let id = SessionId::new(tables.next_id);
        tables.sessions.push(LiveSession {
            id,
            target_id: target.id.clone(),
            platform: target.platform,
            room_id: target.room_id.clone(),
            title: title.to_string(),
            start_time: at,
            end_time: None,
        });
        Ok(id)
    }

    async fn end_session(&self, id: SessionId, at: DateTime<Utc>) -> StoreResult<()> {
        if self.fail_end.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        let mut tables = self.tables.lock().unwrap();
        if let Some(session) = tables.sessions.iter_mut().find(|s| s.id == id && s.is_open()) {
            session.end_time = Some(at);
        }
        Ok(())
    }

    async fn open_session(&self, target_id: &TargetId) -> StoreResult<Option<LiveSession>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .sessions
            .iter()
            .find(|s| &s.target_id == target_id && s.is_open())
            .cloned())
    }

    async fn record_query_outcome(
        &self,
        target_id: &TargetId,
        outcome: &QueryOutcome,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let row = tables.status.entry(target_id.clone()).or_default();
        row.last_query_time = Some(at);
        row.last_query_failed = outcome.failed;
        row.is_live = outcome.is_live;
        row.title = outcome.title.clone();
        row.viewer_count = outcome.viewer_count;
        Ok(())
    }

    async fn last_query_time(&self, target_id: &TargetId) -> StoreResult<Option<DateTime<Utc>>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.status.get(target_id).and_then(|row| row.last_query_time))
    }

    async fn history(&self, target_id: &TargetId, limit: usize) -> StoreResult<Vec<LiveSession>> {
        let mut sessions = self.sessions_for(target_id.as_str());
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn stats(&self, target_id: &TargetId) -> StoreResult<TargetStats> {
        let sessions = self.sessions_for(target_id.as_str());
        Ok(TargetStats::from_sessions(target_id.clone(), &sessions, Utc::now()))
    }

    async fn cached_status(&self, target_id: &TargetId) -> StoreResult<Option<CachedStatus>> {
        Ok(self.status_for(target_id.as_str()))
    }

    async fn avatar_info(&self, target_id: &TargetId) -> StoreResult<Option<AvatarInfo>> {
        Ok(self.tables.lock().unwrap().avatars.get(target_id).cloned())
    }

    async fn update_avatar(
        &self,
        target_id: &TargetId,
        url: &str,
        local: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.avatars.insert(
            target_id.clone(),
            AvatarInfo {
                url: Some(url.to_string()),
                local: Some(local.to_string()),
                updated: Some(at),
            },
        );
        Ok(())
    }
}

// ============================================================================
// FakeSource
// ============================================================================

/// One completed (or abandoned) fetch.
#[derive(Debug, Clone)]
pub struct FetchCall {
    pub room_id: String,
    pub started: tokio::time::Instant,
    pub finished: tokio::time::Instant,
}

/// Scripted [`StatusSource`] with a fixed per-fetch latency.
///
/// Rooms without a scripted response come back offline.
pub struct FakeSource {
    platform: Platform,
    latency: Duration,
    responses: Mutex<HashMap<String, Result<StatusSnapshot, FetchError>>>,
    calls: Mutex<Vec<FetchCall>>,
}

impl FakeSource {
    pub fn new(platform: Platform, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            platform,
            latency,
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn respond(&self, room_id: &str, result: Result<StatusSnapshot, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(room_id.to_string(), result);
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_rooms(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.room_id).collect()
    }
}

#[async_trait]
impl StatusSource for FakeSource {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(
        &self,
        room_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StatusSnapshot, FetchError> {
        let started = tokio::time::Instant::now();
        let cancelled = tokio::select! {
            biased;

            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(self.latency) => false,
        };
        self.calls.lock().unwrap().push(FetchCall {
            room_id: room_id.to_string(),
            started,
            finished: tokio::time::Instant::now(),
        });
        if cancelled {
            return Err(FetchError::Cancelled);
        }

        let scripted = self.responses.lock().unwrap().get(room_id).cloned();
        scripted.unwrap_or_else(|| Ok(StatusSnapshot::new(self.platform, room_id, "")))
    }
}
