//! Persisted lifecycle of live sessions.
//!
//! One record per external session id, moved between `scheduled`, `live`
//! and `finished` by the `start` and `end` endpoints. `start` is an
//! unconditional upsert: it re-enters `live` from `finished` and leaves a
//! previous `ended_at` untouched. Concurrent writers race and the last one
//! wins.

mod memory;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::{RelayError, Result};

pub use memory::InMemorySessionStore;
pub use sqlite::SqliteSessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Scheduled,
    Live,
    Finished,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Live => "live",
            SessionStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scheduled" => Ok(SessionStatus::Scheduled),
            "live" => Ok(SessionStatus::Live),
            "finished" => Ok(SessionStatus::Finished),
            other => Err(RelayError::CorruptRecord(format!("unknown session status {other:?}"))),
        }
    }
}

/// Lifecycle record of one live session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSession {
    pub session_id: String,
    pub teacher_id: String,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage for live-session lifecycle records, keyed by external session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates the record as `live`, or overwrites teacher, status and
    /// `started_at` of an existing one.
    async fn start(&self, session_id: &str, teacher_id: &str) -> Result<LiveSession>;

    /// Marks an existing record `finished`. Fails with
    /// [`RelayError::SessionNotFound`] and creates nothing if the id is unknown.
    async fn end(&self, session_id: &str) -> Result<LiveSession>;

    async fn get(&self, session_id: &str) -> Result<Option<LiveSession>>;
}

/// Opens the store selected by the database configuration.
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn SessionStore>> {
    match &config.url {
        Some(url) => {
            let store = SqliteSessionStore::connect(url, config.max_connections).await?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, live-session records are kept in memory only");
            Ok(Arc::new(InMemorySessionStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [SessionStatus::Scheduled, SessionStatus::Live, SessionStatus::Finished] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("paused".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let now = Utc::now();
        let session = LiveSession {
            session_id: "s-1".to_string(),
            teacher_id: "t-1".to_string(),
            status: SessionStatus::Live,
            started_at: Some(now),
            ended_at: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["sessionId"], "s-1");
        assert_eq!(json["teacherId"], "t-1");
        assert_eq!(json["status"], "live");
        assert!(json["endedAt"].is_null());
        assert!(json["startedAt"].is_string());
    }

    #[tokio::test]
    async fn test_open_store_without_url_uses_memory() {
        let store = open_store(&DatabaseConfig {
            url: None,
            max_connections: 1,
        })
        .await
        .unwrap();
        assert!(store.get("anything").await.unwrap().is_none());
    }
}
