//! SQLite-backed lifecycle store.
//!
//! All queries are parameterized. `start` is a single
//! `INSERT .. ON CONFLICT DO UPDATE` so the unique session id is enforced by
//! the primary key rather than by a read-then-write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

use super::{LiveSession, SessionStatus, SessionStore};
use crate::error::{RelayError, Result};

const RETURNING_COLUMNS: &str =
    "session_id, teacher_id, status, started_at, ended_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct LiveSessionRow {
    session_id: String,
    teacher_id: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LiveSessionRow> for LiveSession {
    type Error = RelayError;

    fn try_from(row: LiveSessionRow) -> Result<Self> {
        Ok(LiveSession {
            status: row.status.parse::<SessionStatus>()?,
            session_id: row.session_id,
            teacher_id: row.teacher_id,
            started_at: row.started_at,
            ended_at: row.ended_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Connects, creating the database file if needed, and applies migrations.
    ///
    /// In-memory URLs are limited to one pooled connection, since every
    /// SQLite connection to `:memory:` opens a separate database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let max_connections = if in_memory { 1 } else { max_connections.max(1) };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool).await?;
        tracing::info!(max_connections, in_memory, "Connected to live-session database");
        Ok(store)
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn start(&self, session_id: &str, teacher_id: &str) -> Result<LiveSession> {
        let now = Utc::now();
        let sql = format!(
            r#"
            INSERT INTO live_sessions
                (session_id, teacher_id, status, started_at, ended_at, created_at, updated_at)
            VALUES (?, ?, 'live', ?, NULL, ?, ?)
            ON CONFLICT (session_id) DO UPDATE SET
                teacher_id = excluded.teacher_id,
                status = 'live',
                started_at = excluded.started_at,
                updated_at = excluded.updated_at
            RETURNING {RETURNING_COLUMNS}
            "#
        );

        let row: LiveSessionRow = sqlx::query_as(&sql)
            .bind(session_id)
            .bind(teacher_id)
            .bind(now)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        tracing::info!(teacher_id = %teacher_id, "Live session started");
        row.try_into()
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn end(&self, session_id: &str) -> Result<LiveSession> {
        let now = Utc::now();
        let sql = format!(
            r#"
            UPDATE live_sessions
            SET status = 'finished', ended_at = ?, updated_at = ?
            WHERE session_id = ?
            RETURNING {RETURNING_COLUMNS}
            "#
        );

        let row: Option<LiveSessionRow> = sqlx::query_as(&sql)
            .bind(now)
            .bind(now)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        let row = row.ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))?;
        tracing::info!("Live session ended");
        row.try_into()
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn get(&self, session_id: &str) -> Result<Option<LiveSession>> {
        let sql = format!("SELECT {RETURNING_COLUMNS} FROM live_sessions WHERE session_id = ?");

        let row: Option<LiveSessionRow> = sqlx::query_as(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(LiveSession::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::store_contract;

    async fn memory_store() -> SqliteSessionStore {
        SqliteSessionStore::connect("sqlite::memory:", 4).await.unwrap()
    }

    #[tokio::test]
    async fn test_restart_overwrites_teacher() {
        store_contract::restart_overwrites_teacher(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_end_unknown_is_not_found() {
        store_contract::end_unknown_is_not_found(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_end_after_start_finishes() {
        store_contract::end_after_start_finishes(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_start_after_end_reenters_live() {
        store_contract::start_after_end_reenters_live(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_repeated_end_converges() {
        store_contract::repeated_end_converges(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_single_row_per_session_id() {
        let store = memory_store().await;
        store.start("class-9", "t1").await.unwrap();
        store.start("class-9", "t2").await.unwrap();
        store.end("class-9").await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM live_sessions WHERE session_id = ?")
            .bind("class-9")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_corrupt_status_is_reported() {
        let store = memory_store().await;
        store.start("class-10", "t1").await.unwrap();
        // Bypass the CHECK constraint the way a hand-edited database would
        sqlx::query("PRAGMA ignore_check_constraints = ON")
            .execute(&store.pool)
            .await
            .unwrap();
        sqlx::query("UPDATE live_sessions SET status = 'paused' WHERE session_id = ?")
            .bind("class-10")
            .execute(&store.pool)
            .await
            .unwrap();

        let err = store.get("class-10").await.unwrap_err();
        assert!(matches!(err, RelayError::CorruptRecord(_)));
    }
}
