//! EventStore: an append-only log keyed by `eventId` with a
//! per-session index, plus checkpoints over that log.

use crate::error::{EventStoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

/// Closed set of event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    SessionStarted,
    SessionEnded,
    SessionPaused,
    SessionResumed,
    MemorySaved,
    MemoryUpdated,
    MemoryDeleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SessionStarted => "SESSION_STARTED",
            EventType::SessionEnded => "SESSION_ENDED",
            EventType::SessionPaused => "SESSION_PAUSED",
            EventType::SessionResumed => "SESSION_RESUMED",
            EventType::MemorySaved => "MEMORY_SAVED",
            EventType::MemoryUpdated => "MEMORY_UPDATED",
            EventType::MemoryDeleted => "MEMORY_DELETED",
        }
    }
}

impl FromStr for EventType {
    type Err = EventStoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SESSION_STARTED" => Ok(EventType::SessionStarted),
            "SESSION_ENDED" => Ok(EventType::SessionEnded),
            "SESSION_PAUSED" => Ok(EventType::SessionPaused),
            "SESSION_RESUMED" => Ok(EventType::SessionResumed),
            "MEMORY_SAVED" => Ok(EventType::MemorySaved),
            "MEMORY_UPDATED" => Ok(EventType::MemoryUpdated),
            "MEMORY_DELETED" => Ok(EventType::MemoryDeleted),
            other => Err(EventStoreError::invalid_argument(format!("unknown event type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub caused_by: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub last_event_id: String,
    pub memory_count: i64,
    pub description: Option<String>,
}

fn row_to_event(row: &SqliteRow) -> Result<Event> {
    let event_type_str: String = row.try_get("event_type")?;
    let payload_str: String = row.try_get("payload")?;
    let metadata_str: String = row.try_get("metadata")?;
    let timestamp_str: String = row.try_get("timestamp")?;

    Ok(Event {
        event_id: row.try_get("event_id")?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
            .map_err(|e| EventStoreError::parse(e.to_string()))?
            .with_timezone(&Utc),
        session_id: row.try_get("session_id")?,
        event_type: EventType::from_str(&event_type_str)?,
        payload: serde_json::from_str(&payload_str).map_err(|e| EventStoreError::parse(e.to_string()))?,
        caused_by: row.try_get("caused_by")?,
        metadata: serde_json::from_str(&metadata_str).map_err(|e| EventStoreError::parse(e.to_string()))?,
    })
}

fn row_to_checkpoint(row: &SqliteRow) -> Result<Checkpoint> {
    let timestamp_str: String = row.try_get("timestamp")?;
    Ok(Checkpoint {
        checkpoint_id: row.try_get("checkpoint_id")?,
        session_id: row.try_get("session_id")?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
            .map_err(|e| EventStoreError::parse(e.to_string()))?
            .with_timezone(&Utc),
        last_event_id: row.try_get("last_event_id")?,
        memory_count: row.try_get("memory_count")?,
        description: row.try_get("description")?,
    })
}

#[derive(Debug, Clone)]
pub struct EventStoreConfig {
    pub database_url: String,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
        }
    }
}

/// Append-only event log. All mutations go through prepared
/// statements; WAL keeps concurrent readers unblocked by a writer.
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    pub async fn connect(config: &EventStoreConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&config.database_url)
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn connect_in_memory() -> Result<Self> {
        Self::connect(&EventStoreConfig::default()).await
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await.ok();
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS events (
                event_id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                session_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                caused_by TEXT REFERENCES events(event_id),
                metadata TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_session_ts ON events(session_id, timestamp)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_ts ON events(timestamp)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type)")
            .execute(pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                checkpoint_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                last_event_id TEXT NOT NULL REFERENCES events(event_id),
                memory_count INTEGER NOT NULL,
                description TEXT
            )",
        )
        .execute(pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_checkpoints_session_ts ON checkpoints(session_id, timestamp)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Fails with `Conflict` on duplicate `eventId`. `causedBy`, if
    /// set, must reference an existing event.
    pub async fn append(&self, event: &Event) -> Result<()> {
        if let Some(caused_by) = &event.caused_by {
            let exists: Option<(String,)> = sqlx::query_as("SELECT event_id FROM events WHERE event_id = ?1")
                .bind(caused_by)
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_none() {
                return Err(EventStoreError::invalid_argument(format!(
                    "causedBy event not found: {caused_by}"
                )));
            }
        }

        let existing: Option<(String,)> = sqlx::query_as("SELECT event_id FROM events WHERE event_id = ?1")
            .bind(&event.event_id)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(EventStoreError::conflict(format!("duplicate event id: {}", event.event_id)));
        }

        sqlx::query(
            "INSERT INTO events (event_id, timestamp, session_id, event_type, payload, caused_by, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&event.event_id)
        .bind(event.timestamp.to_rfc3339())
        .bind(&event.session_id)
        .bind(event.event_type.as_str())
        .bind(serde_json::to_string(&event.payload).map_err(|e| EventStoreError::parse(e.to_string()))?)
        .bind(&event.caused_by)
        .bind(serde_json::to_string(&event.metadata).map_err(|e| EventStoreError::parse(e.to_string()))?)
        .execute(&self.pool)
        .await?;

        tracing::debug!(event_id = %event.event_id, session_id = %event.session_id, event_type = event.event_type.as_str(), "appended event");
        Ok(())
    }

    /// Atomic: either every event is inserted, or none are.
    pub async fn append_batch(&self, events: &[Event]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for event in events {
            if let Some(caused_by) = &event.caused_by {
                let exists: Option<(String,)> = sqlx::query_as("SELECT event_id FROM events WHERE event_id = ?1")
                    .bind(caused_by)
                    .fetch_optional(&mut *tx)
                    .await?;
                if exists.is_none() {
                    return Err(EventStoreError::invalid_argument(format!(
                        "causedBy event not found: {caused_by}"
                    )));
                }
            }

            let existing: Option<(String,)> = sqlx::query_as("SELECT event_id FROM events WHERE event_id = ?1")
                .bind(&event.event_id)
                .fetch_optional(&mut *tx)
                .await?;
            if existing.is_some() {
                return Err(EventStoreError::conflict(format!("duplicate event id: {}", event.event_id)));
            }

            sqlx::query(
                "INSERT INTO events (event_id, timestamp, session_id, event_type, payload, caused_by, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&event.event_id)
            .bind(event.timestamp.to_rfc3339())
            .bind(&event.session_id)
            .bind(event.event_type.as_str())
            .bind(serde_json::to_string(&event.payload).map_err(|e| EventStoreError::parse(e.to_string()))?)
            .bind(&event.caused_by)
            .bind(serde_json::to_string(&event.metadata).map_err(|e| EventStoreError::parse(e.to_string()))?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Generates a UUIDv7, stamps the current wall-clock timestamp,
    /// appends, and returns the stored event.
    pub async fn create_event(
        &self,
        session_id: &str,
        event_type: EventType,
        payload: serde_json::Value,
        metadata: Option<serde_json::Value>,
        caused_by: Option<String>,
    ) -> Result<Event> {
        let event = Event {
            event_id: Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            event_type,
            payload,
            caused_by,
            metadata: metadata.unwrap_or(serde_json::Value::Object(Default::default())),
        };
        self.append(&event).await?;
        Ok(event)
    }

    pub async fn get_by_id(&self, event_id: &str) -> Result<Option<Event>> {
        let row = sqlx::query("SELECT * FROM events WHERE event_id = ?1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_event(&r)).transpose()
    }

    /// Strictly non-decreasing by `timestamp`, tie-broken by
    /// `eventId` (UUIDv7 embeds millisecond time, so this is total).
    pub async fn get_by_session(&self, session_id: &str) -> Result<Vec<Event>> {
        let rows = sqlx::query("SELECT * FROM events WHERE session_id = ?1 ORDER BY timestamp ASC, event_id ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_event).collect()
    }

    pub async fn get_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE timestamp >= ?1 AND timestamp <= ?2 ORDER BY timestamp ASC, event_id ASC",
        )
        .bind(start.to_rfc3339())
        .bind(end.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_event).collect()
    }

    /// Fails with `NotFound` if the session has no events.
    /// `lastEventId` is the latest event of that session.
    pub async fn create_checkpoint(
        &self,
        session_id: &str,
        memory_count: i64,
        description: Option<String>,
    ) -> Result<Checkpoint> {
        let latest = sqlx::query("SELECT * FROM events WHERE session_id = ?1 ORDER BY timestamp DESC, event_id DESC LIMIT 1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = latest else {
            return Err(EventStoreError::not_found(format!("no events for session {session_id}")));
        };
        let last_event = row_to_event(&row)?;

        let checkpoint = Checkpoint {
            checkpoint_id: Uuid::now_v7().to_string(),
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            last_event_id: last_event.event_id,
            memory_count,
            description,
        };

        sqlx::query(
            "INSERT INTO checkpoints (checkpoint_id, session_id, timestamp, last_event_id, memory_count, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&checkpoint.checkpoint_id)
        .bind(checkpoint.timestamp.to_rfc3339())
        .bind(&checkpoint.session_id)
        .bind(&checkpoint.last_event_id)
        .bind(checkpoint.memory_count)
        .bind(&checkpoint.description)
        .execute(&self.pool)
        .await?;

        Ok(checkpoint)
    }

    pub async fn get_checkpoint(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query("SELECT * FROM checkpoints WHERE checkpoint_id = ?1")
            .bind(checkpoint_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_checkpoint(&r)).transpose()
    }

    pub async fn get_checkpoints_by_session(&self, session_id: &str) -> Result<Vec<Checkpoint>> {
        let rows = sqlx::query("SELECT * FROM checkpoints WHERE session_id = ?1 ORDER BY timestamp DESC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_checkpoint).collect()
    }

    /// Test-only: wipes every event and checkpoint. Never exposed on
    /// any production code path.
    #[cfg(any(test, feature = "test-utils"))]
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints").execute(&self.pool).await?;
        sqlx::query("DELETE FROM events").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn append_then_get_by_id_round_trips() {
        let store = EventStore::connect_in_memory().await.unwrap();
        let event = store
            .create_event("s1", EventType::SessionStarted, json!({"name": "a"}), None, None)
            .await
            .unwrap();

        let fetched = store.get_by_id(&event.event_id).await.unwrap().unwrap();
        assert_eq!(fetched.event_id, event.event_id);
        assert_eq!(fetched.session_id, "s1");
    }

    #[tokio::test]
    async fn append_rejects_duplicate_event_id() {
        let store = EventStore::connect_in_memory().await.unwrap();
        let event = store
            .create_event("s1", EventType::SessionStarted, json!({}), None, None)
            .await
            .unwrap();

        let err = store.append(&event).await.unwrap_err();
        assert!(matches!(err, EventStoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn append_rejects_dangling_caused_by() {
        let store = EventStore::connect_in_memory().await.unwrap();
        let event = Event {
            event_id: Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            session_id: "s1".to_string(),
            event_type: EventType::MemorySaved,
            payload: json!({}),
            caused_by: Some("nonexistent".to_string()),
            metadata: json!({}),
        };
        let err = store.append(&event).await.unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn session_events_then_checkpoint_references_latest_event() {
        let store = EventStore::connect_in_memory().await.unwrap();
        let e1 = store
            .create_event("s1", EventType::SessionStarted, json!({}), None, None)
            .await
            .unwrap();
        let e2 = store
            .create_event("s1", EventType::MemorySaved, json!({"key": "k"}), None, None)
            .await
            .unwrap();

        let checkpoint = store.create_checkpoint("s1", 1, None).await.unwrap();

        let events = store.get_by_session("s1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, e1.event_id);
        assert_eq!(events[1].event_id, e2.event_id);

        let checkpoints = store.get_checkpoints_by_session("s1").await.unwrap();
        assert_eq!(checkpoints[0].last_event_id, e2.event_id);
        assert_eq!(checkpoint.last_event_id, e2.event_id);
    }

    #[tokio::test]
    async fn checkpoint_without_events_fails_not_found() {
        let store = EventStore::connect_in_memory().await.unwrap();
        let err = store.create_checkpoint("empty-session", 0, None).await.unwrap_err();
        assert!(matches!(err, EventStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn append_batch_is_all_or_nothing() {
        let store = EventStore::connect_in_memory().await.unwrap();
        let e1 = store
            .create_event("s1", EventType::SessionStarted, json!({}), None, None)
            .await
            .unwrap();

        let dup = Event {
            event_id: e1.event_id.clone(),
            timestamp: Utc::now(),
            session_id: "s1".to_string(),
            event_type: EventType::SessionEnded,
            payload: json!({}),
            caused_by: None,
            metadata: json!({}),
        };
        let fresh = Event {
            event_id: Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            session_id: "s1".to_string(),
            event_type: EventType::SessionEnded,
            payload: json!({}),
            caused_by: None,
            metadata: json!({}),
        };

        let err = store.append_batch(&[fresh.clone(), dup]).await.unwrap_err();
        assert!(matches!(err, EventStoreError::Conflict(_)));

        assert!(store.get_by_id(&fresh.event_id).await.unwrap().is_none());
    }
}
