//! SQLite implementation of [`SessionStore`].
//!
//! [`Db`] is a synchronous handle that opens one connection per operation;
//! [`SqliteStore`] moves each call onto the blocking pool so the scan tasks
//! never stall the runtime on disk I/O.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text with millisecond
//! precision (`2026-03-01T20:00:00.000Z`), so lexical order is time order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use tracing::debug;

use livewatch_core::{
    CachedStatus, LiveSession, Platform, QueryOutcome, SessionId, Target, TargetId, TargetStats,
};

use super::{AvatarInfo, SessionStore, StoreError, StoreResult};

const SESSION_COLUMNS: &str = "id, target_id, platform, room_id, title, start_time, end_time";

// ============================================================================
// Db
// ============================================================================

/// Synchronous SQLite handle.
#[derive(Debug)]
pub struct Db {
    path: PathBuf,
}

impl Db {
    /// Opens (creating if needed) the database at `path` and migrates it.
    pub fn new(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let db = Self { path: path.into() };
        db.init_schema()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn start_session(
        &self,
        target: &Target,
        title: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<SessionId> {
        self.with_connection(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM sessions WHERE target_id = ?1 AND end_time IS NULL \
                     ORDER BY start_time DESC LIMIT 1",
                    params![target.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            let id = match existing {
                Some(id) => {
                    debug!(target_id = %target.id, session = id, "Adopting open session");
                    id
                }
                None => {
                    tx.execute(
                        "INSERT INTO sessions (target_id, platform, room_id, title, start_time) \
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            target.id.as_str(),
                            target.platform.as_str(),
                            target.room_id,
                            title,
                            format_ts(at)
                        ],
                    )?;
                    tx.last_insert_rowid()
                }
            };

            tx.commit()?;
            Ok(SessionId::new(id))
        })
    }

    pub fn end_session(&self, id: SessionId, at: DateTime<Utc>) -> StoreResult<()> {
        self.with_connection(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET end_time = ?1 WHERE id = ?2 AND end_time IS NULL",
                params![format_ts(at), id.get()],
            )?;
            if changed == 0 {
                debug!(session = %id, "Session already closed");
            }
            Ok(())
        })
    }

    pub fn open_session(&self, target_id: &TargetId) -> StoreResult<Option<LiveSession>> {
        self.with_connection(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions \
                         WHERE target_id = ?1 AND end_time IS NULL \
                         ORDER BY start_time DESC LIMIT 1"
                    ),
                    params![target_id.as_str()],
                    SessionRow::read,
                )
                .optional()?;
            row.map(SessionRow::into_session).transpose()
        })
    }

    /// Sessions for a target, newest first. `None` returns all of them.
    pub fn sessions(
        &self,
        target_id: &TargetId,
        limit: Option<usize>,
    ) -> StoreResult<Vec<LiveSession>> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));

        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE target_id = ?1 \
                 ORDER BY start_time DESC, id DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![target_id.as_str(), limit], SessionRow::read)?;

            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row?.into_session()?);
            }
            Ok(sessions)
        })
    }

    pub fn record_query_outcome(
        &self,
        target_id: &TargetId,
        outcome: &QueryOutcome,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO target_status \
                    (target_id, last_query_time, last_query_failed, is_live, title, viewer_count) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(target_id) DO UPDATE SET \
                    last_query_time = excluded.last_query_time, \
                    last_query_failed = excluded.last_query_failed, \
                    is_live = excluded.is_live, \
                    title = excluded.title, \
                    viewer_count = excluded.viewer_count",
                params![
                    target_id.as_str(),
                    format_ts(at),
                    outcome.failed,
                    outcome.is_live,
                    outcome.title,
                    outcome.viewer_count
                ],
            )?;
            Ok(())
        })
    }

    pub fn last_query_time(&self, target_id: &TargetId) -> StoreResult<Option<DateTime<Utc>>> {
        self.with_connection(|conn| {
            let raw: Option<Option<String>> = conn
                .query_row(
                    "SELECT last_query_time FROM target_status WHERE target_id = ?1",
                    params![target_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            raw.flatten().map(|v| parse_ts("last_query_time", v)).transpose()
        })
    }

    pub fn cached_status(&self, target_id: &TargetId) -> StoreResult<Option<CachedStatus>> {
        self.with_connection(|conn| {
            let row = conn
                .query_row(
                    "SELECT last_query_time, last_query_failed, is_live, title, viewer_count \
                     FROM target_status WHERE target_id = ?1",
                    params![target_id.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?,
                            row.get::<_, Option<i64>>(1)?,
                            row.get::<_, Option<i64>>(2)?,
                            row.get::<_, Option<String>>(3)?,
                            row.get::<_, Option<i64>>(4)?,
                        ))
                    },
                )
                .optional()?;

            let Some((last_query, failed, is_live, title, viewers)) = row else {
                return Ok(None);
            };

            Ok(Some(CachedStatus {
                last_query_time: last_query.map(|v| parse_ts("last_query_time", v)).transpose()?,
                last_query_failed: failed.unwrap_or(0) != 0,
                is_live: is_live.unwrap_or(0) != 0,
                title: title.unwrap_or_default(),
                viewer_count: viewers.unwrap_or(0),
            }))
        })
    }

    pub fn avatar_info(&self, target_id: &TargetId) -> StoreResult<Option<AvatarInfo>> {
        self.with_connection(|conn| {
            let row = conn
                .query_row(
                    "SELECT avatar_url, avatar_local, avatar_updated \
                     FROM target_status WHERE target_id = ?1",
                    params![target_id.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(url, local, updated)| {
                Ok(AvatarInfo {
                    url,
                    local,
                    updated: updated.map(|v| parse_ts("avatar_updated", v)).transpose()?,
                })
            })
            .transpose()
        })
    }

    pub fn update_avatar(
        &self,
        target_id: &TargetId,
        url: &str,
        local: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO target_status (target_id, avatar_url, avatar_local, avatar_updated) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(target_id) DO UPDATE SET \
                    avatar_url = excluded.avatar_url, \
                    avatar_local = excluded.avatar_local, \
                    avatar_updated = excluded.avatar_updated",
                params![target_id.as_str(), url, local, format_ts(at)],
            )?;
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Connection management
    // ------------------------------------------------------------------------

    fn init_schema(&self) -> StoreResult<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    target_id TEXT NOT NULL,
                    platform TEXT NOT NULL,
                    room_id TEXT NOT NULL,
                    title TEXT,
                    start_time TEXT NOT NULL,
                    end_time TEXT
                 );
                 CREATE INDEX IF NOT EXISTS idx_sessions_target_start
                    ON sessions(target_id, start_time);
                 CREATE TABLE IF NOT EXISTS target_status (
                    target_id TEXT PRIMARY KEY,
                    last_query_time TEXT,
                    is_live INTEGER DEFAULT 0,
                    title TEXT,
                    viewer_count INTEGER DEFAULT 0
                 );
                 COMMIT;",
            )?;
            ensure_status_columns(conn)
        })
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> StoreResult<Connection> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| StoreError::DataDir {
                path: parent.display().to_string(),
                reason: err.to_string(),
            })?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        Ok(conn)
    }
}

/// Adds columns that databases created by older versions lack.
fn ensure_status_columns(conn: &Connection) -> StoreResult<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(target_status)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }

    let additions = [
        ("last_query_failed", "INTEGER NOT NULL DEFAULT 0"),
        ("avatar_url", "TEXT"),
        ("avatar_local", "TEXT"),
        ("avatar_updated", "TEXT"),
    ];
    for (name, decl) in additions {
        if !columns.iter().any(|c| c == name) {
            conn.execute(&format!("ALTER TABLE target_status ADD COLUMN {name} {decl}"), [])?;
        }
    }
    Ok(())
}

// ============================================================================
// Row mapping
// ============================================================================

struct SessionRow {
    id: i64,
    target_id: String,
    platform: String,
    room_id: String,
    title: Option<String>,
    start_time: String,
    end_time: Option<String>,
}

impl SessionRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            target_id: row.get(1)?,
            platform: row.get(2)?,
            room_id: row.get(3)?,
            title: row.get(4)?,
            start_time: row.get(5)?,
            end_time: row.get(6)?,
        })
    }

    fn into_session(self) -> StoreResult<LiveSession> {
        let platform: Platform = self.platform.parse().map_err(|_| StoreError::Corrupt {
            column: "platform",
            value: self.platform.clone(),
        })?;

        Ok(LiveSession {
            id: SessionId::new(self.id),
            target_id: TargetId::new(self.target_id),
            platform,
            room_id: self.room_id,
            title: self.title.unwrap_or_default(),
            start_time: parse_ts("start_time", self.start_time)?,
            end_time: self.end_time.map(|v| parse_ts("end_time", v)).transpose()?,
        })
    }
}

pub(crate) fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(column: &'static str, value: String) -> StoreResult<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(&value) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => Err(StoreError::Corrupt { column, value }),
    }
}

// ============================================================================
// SqliteStore
// ============================================================================

/// [`SessionStore`] backed by a SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Arc<Db>,
}

impl SqliteStore {
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Ok(Self {
            db: Arc::new(Db::new(path)?),
        })
    }

    pub fn path(&self) -> &Path {
        self.db.path()
    }

    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Db) -> StoreResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn start_session(
        &self,
        target: &Target,
        title: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<SessionId> {
        let target = target.clone();
        let title = title.to_string();
        self.blocking(move |db| db.start_session(&target, &title, at)).await
    }

    async fn end_session(&self, id: SessionId, at: DateTime<Utc>) -> StoreResult<()> {
        self.blocking(move |db| db.end_session(id, at)).await
    }

    async fn open_session(&self, target_id: &TargetId) -> StoreResult<Option<LiveSession>> {
        let target_id = target_id.clone();
        self.blocking(move |db| db.open_session(&target_id)).await
    }

    async fn record_query_outcome(
        &self,
        target_id: &TargetId,
        outcome: &QueryOutcome,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let target_id = target_id.clone();
        let outcome = outcome.clone();
        self.blocking(move |db| db.record_query_outcome(&target_id, &outcome, at))
            .await
    }

    async fn last_query_time(&self, target_id: &TargetId) -> StoreResult<Option<DateTime<Utc>>> {
        let target_id = target_id.clone();
        self.blocking(move |db| db.last_query_time(&target_id)).await
    }

    async fn history(&self, target_id: &TargetId, limit: usize) -> StoreResult<Vec<LiveSession>> {
        let target_id = target_id.clone();
        self.blocking(move |db| db.sessions(&target_id, Some(limit))).await
    }

    async fn stats(&self, target_id: &TargetId) -> StoreResult<TargetStats> {
        let target_id = target_id.clone();
        self.blocking(move |db| {
            let sessions = db.sessions(&target_id, None)?;
            Ok(TargetStats::from_sessions(target_id, &sessions, Utc::now()))
        })
        .await
    }

    async fn cached_status(&self, target_id: &TargetId) -> StoreResult<Option<CachedStatus>> {
        let target_id = target_id.clone();
        self.blocking(move |db| db.cached_status(&target_id)).await
    }

    async fn avatar_info(&self, target_id: &TargetId) -> StoreResult<Option<AvatarInfo>> {
        let target_id = target_id.clone();
        self.blocking(move |db| db.avatar_info(&target_id)).await
    }

    async fn update_avatar(
        &self,
        target_id: &TargetId,
        url: &str,
        local: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let target_id = target_id.clone();
        let url = url.to_string();
        let local = local.to_string();
        self.blocking(move |db| db.update_avatar(&target_id, &url, &local, at))
            .await
    }
}
