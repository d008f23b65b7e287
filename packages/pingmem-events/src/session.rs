//! SessionManager: session lifecycle as a projection over
//! `SESSION_STARTED/ENDED/PAUSED/RESUMED` events.

use crate::error::{EventStoreError, Result};
use crate::event_store::{EventStore, EventType};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Ended,
    Archived,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartSessionConfig {
    pub name: String,
    pub project_dir: Option<String>,
    pub parent_session_id: Option<String>,
    pub default_channel: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub name: String,
    pub project_dir: Option<String>,
    pub parent_session_id: Option<String>,
    pub default_channel: Option<String>,
    pub metadata: serde_json::Value,
    pub status: SessionStatus,
}

/// Sessions lifecycle manager on top of the event log.
/// `maxActiveSessions` bounds the number of sessions in `Active`
/// status at any one time.
pub struct SessionManager {
    store: Arc<EventStore>,
    max_active_sessions: usize,
    active_count: Mutex<HashMap<String, SessionStatus>>,
}

impl SessionManager {
    pub fn new(store: Arc<EventStore>, max_active_sessions: usize) -> Self {
        Self {
            store,
            max_active_sessions,
            active_count: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_cap(store: Arc<EventStore>) -> Self {
        Self::new(store, 10)
    }

    fn count_active(statuses: &HashMap<String, SessionStatus>) -> usize {
        statuses.values().filter(|s| **s == SessionStatus::Active).count()
    }

    pub async fn start_session(&self, config: StartSessionConfig) -> Result<Session> {
        let mut statuses = self.active_count.lock().await;
        if Self::count_active(&statuses) >= self.max_active_sessions {
            return Err(EventStoreError::limit_exceeded(format!(
                "active session cap of {} reached",
                self.max_active_sessions
            )));
        }

        let session_id = Uuid::now_v7().to_string();
        let payload = json!({
            "name": config.name,
            "projectDir": config.project_dir,
            "parentSessionId": config.parent_session_id,
            "defaultChannel": config.default_channel,
            "metadata": config.metadata,
        });
        self.store
            .create_event(&session_id, EventType::SessionStarted, payload, None, None)
            .await?;

        statuses.insert(session_id.clone(), SessionStatus::Active);

        Ok(Session {
            session_id,
            name: config.name,
            project_dir: config.project_dir,
            parent_session_id: config.parent_session_id,
            default_channel: config.default_channel,
            metadata: config.metadata,
            status: SessionStatus::Active,
        })
    }

    async fn transition(&self, session_id: &str, event_type: EventType, status: SessionStatus) -> Result<()> {
        let mut statuses = self.active_count.lock().await;
        if statuses.get(session_id) == Some(&SessionStatus::Ended) {
            return Err(EventStoreError::invalid_argument(format!(
                "session {session_id} already ended"
            )));
        }

        self.store
            .create_event(session_id, event_type, json!({}), None, None)
            .await?;
        statuses.insert(session_id.to_string(), status);
        Ok(())
    }

    /// `ended` is terminal: once set, no further transition is
    /// accepted for this session id.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        self.transition(session_id, EventType::SessionEnded, SessionStatus::Ended).await
    }

    pub async fn pause_session(&self, session_id: &str) -> Result<()> {
        self.transition(session_id, EventType::SessionPaused, SessionStatus::Paused).await
    }

    pub async fn resume_session(&self, session_id: &str) -> Result<()> {
        self.transition(session_id, EventType::SessionResumed, SessionStatus::Active).await
    }

    /// Folds the session's event log into its current aggregate,
    /// rather than relying on the in-process status cache.
    pub async fn hydrate(&self, session_id: &str) -> Result<Option<Session>> {
        let events = self.store.get_by_session(session_id).await?;
        let Some(first) = events.iter().find(|e| e.event_type == EventType::SessionStarted) else {
            return Ok(None);
        };

        let name = first.payload.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let project_dir = first.payload.get("projectDir").and_then(|v| v.as_str()).map(String::from);
        let parent_session_id = first.payload.get("parentSessionId").and_then(|v| v.as_str()).map(String::from);
        let default_channel = first.payload.get("defaultChannel").and_then(|v| v.as_str()).map(String::from);
        let metadata = first.payload.get("metadata").cloned().unwrap_or(serde_json::Value::Null);

        let mut status = SessionStatus::Active;
        for event in &events {
            status = match event.event_type {
                EventType::SessionStarted | EventType::SessionResumed => SessionStatus::Active,
                EventType::SessionPaused => SessionStatus::Paused,
                EventType::SessionEnded => SessionStatus::Ended,
                _ => status,
            };
        }

        Ok(Some(Session {
            session_id: session_id.to_string(),
            name,
            project_dir,
            parent_session_id,
            default_channel,
            metadata,
            status,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager_with_cap(cap: usize) -> SessionManager {
        let store = Arc::new(EventStore::connect_in_memory().await.unwrap());
        SessionManager::new(store, cap)
    }

    #[tokio::test]
    async fn start_session_emits_session_started_and_hydrates() {
        let manager = manager_with_cap(10).await;
        let session = manager
            .start_session(StartSessionConfig { name: "demo".to_string(), ..Default::default() })
            .await
            .unwrap();

        let hydrated = manager.hydrate(&session.session_id).await.unwrap().unwrap();
        assert_eq!(hydrated.name, "demo");
        assert_eq!(hydrated.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn exceeding_active_cap_fails_limit_exceeded() {
        let manager = manager_with_cap(1).await;
        manager
            .start_session(StartSessionConfig { name: "one".to_string(), ..Default::default() })
            .await
            .unwrap();

        let err = manager
            .start_session(StartSessionConfig { name: "two".to_string(), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, EventStoreError::LimitExceeded(_)));
    }

    #[tokio::test]
    async fn ended_session_is_terminal() {
        let manager = manager_with_cap(10).await;
        let session = manager
            .start_session(StartSessionConfig { name: "demo".to_string(), ..Default::default() })
            .await
            .unwrap();

        manager.end_session(&session.session_id).await.unwrap();
        let err = manager.resume_session(&session.session_id).await.unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidArgument(_)));

        let hydrated = manager.hydrate(&session.session_id).await.unwrap().unwrap();
        assert_eq!(hydrated.status, SessionStatus::Ended);
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips_to_active() {
        let manager = manager_with_cap(10).await;
        let session = manager
            .start_session(StartSessionConfig { name: "demo".to_string(), ..Default::default() })
            .await
            .unwrap();

        manager.pause_session(&session.session_id).await.unwrap();
        assert_eq!(manager.hydrate(&session.session_id).await.unwrap().unwrap().status, SessionStatus::Paused);

        manager.resume_session(&session.session_id).await.unwrap();
        assert_eq!(manager.hydrate(&session.session_id).await.unwrap().unwrap().status, SessionStatus::Active);
    }
}
