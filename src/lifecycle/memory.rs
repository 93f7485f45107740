use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{LiveSession, SessionStatus, SessionStore};
use crate::error::{RelayError, Result};

/// Process-local store used when no database is configured.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, LiveSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn start(&self, session_id: &str, teacher_id: &str) -> Result<LiveSession> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;

        let session = sessions
            .entry(session_id.to_string())
            .and_modify(|s| {
                s.teacher_id = teacher_id.to_string();
                s.status = SessionStatus::Live;
                s.started_at = Some(now);
                s.updated_at = now;
            })
            .or_insert_with(|| LiveSession {
                session_id: session_id.to_string(),
                teacher_id: teacher_id.to_string(),
                status: SessionStatus::Live,
                started_at: Some(now),
                ended_at: None,
                created_at: now,
                updated_at: now,
            });

        tracing::info!(session_id = %session_id, teacher_id = %teacher_id, "Live session started");
        Ok(session.clone())
    }

    async fn end(&self, session_id: &str) -> Result<LiveSession> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;

        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))?;
        session.status = SessionStatus::Finished;
        session.ended_at = Some(now);
        session.updated_at = now;

        tracing::info!(session_id = %session_id, "Live session ended");
        Ok(session.clone())
    }

    async fn get(&self, session_id: &str) -> Result<Option<LiveSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::store_contract;

    #[tokio::test]
    async fn test_restart_overwrites_teacher() {
        store_contract::restart_overwrites_teacher(&InMemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_end_unknown_is_not_found() {
        store_contract::end_unknown_is_not_found(&InMemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_end_after_start_finishes() {
        store_contract::end_after_start_finishes(&InMemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_start_after_end_reenters_live() {
        store_contract::start_after_end_reenters_live(&InMemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_repeated_end_converges() {
        store_contract::repeated_end_converges(&InMemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let store = InMemorySessionStore::new();
        store.start("a", "t1").await.unwrap();
        store.start("b", "t2").await.unwrap();
        store.end("a").await.unwrap();

        assert_eq!(store.get("a").await.unwrap().unwrap().status, SessionStatus::Finished);
        assert_eq!(store.get("b").await.unwrap().unwrap().status, SessionStatus::Live);
    }
}
