//! MemoryManager: a per-session `(key -> memory)` projection
//! derived from `MEMORY_SAVED / MEMORY_UPDATED / MEMORY_DELETED` events.

use crate::error::Result;
use crate::event_store::{Event, EventStore, EventType};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryOptions {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub key: String,
    pub value: serde_json::Value,
    pub options: MemoryOptions,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// `MEMORY_SAVED` inserts, `MEMORY_UPDATED` overwrites value/opts on
/// the same key, `MEMORY_DELETED` tombstones. The latest event by
/// timestamp (eventId tiebreak) wins — `getBySession` already returns
/// that order, so a left-to-right fold is sufficient.
fn fold(events: &[Event]) -> HashMap<String, Memory> {
    let mut projection: HashMap<String, Memory> = HashMap::new();

    for event in events {
        let Some(key) = event.payload.get("key").and_then(|v| v.as_str()) else {
            continue;
        };

        match event.event_type {
            EventType::MemorySaved | EventType::MemoryUpdated => {
                let value = event.payload.get("value").cloned().unwrap_or(serde_json::Value::Null);
                let options: MemoryOptions = event
                    .payload
                    .get("options")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                projection.insert(
                    key.to_string(),
                    Memory { key: key.to_string(), value, options, updated_at: event.timestamp },
                );
            }
            EventType::MemoryDeleted => {
                projection.remove(key);
            }
            _ => {}
        }
    }

    projection
}

/// A per-session derived projection over the event log. `hydrate()`
/// replays the full event log; in-memory state between hydrations is
/// just a cache.
pub struct MemoryManager {
    store: Arc<EventStore>,
    session_id: String,
    projection: RwLock<HashMap<String, Memory>>,
}

impl MemoryManager {
    pub fn new(store: Arc<EventStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            projection: RwLock::new(HashMap::new()),
        }
    }

    /// Reads all events for the session in order and folds them into
    /// the `(key -> memory)` projection.
    pub async fn hydrate(&self) -> Result<()> {
        let events = self.store.get_by_session(&self.session_id).await?;
        let folded = fold(&events);
        *self.projection.write().await = folded;
        Ok(())
    }

    pub async fn save(&self, key: &str, value: serde_json::Value, opts: MemoryOptions) -> Result<Memory> {
        let existing = self.projection.read().await.contains_key(key);
        let event_type = if existing { EventType::MemoryUpdated } else { EventType::MemorySaved };

        let event = self
            .store
            .create_event(
                &self.session_id,
                event_type,
                json!({ "key": key, "value": value, "options": opts }),
                None,
                None,
            )
            .await?;

        let memory = Memory { key: key.to_string(), value: event.payload["value"].clone(), options: opts, updated_at: event.timestamp };
        self.projection.write().await.insert(key.to_string(), memory.clone());
        Ok(memory)
    }

    pub async fn save_or_update(&self, key: &str, value: serde_json::Value, opts: MemoryOptions) -> Result<Memory> {
        self.save(key, value, opts).await
    }

    pub async fn get(&self, key: &str) -> Option<Memory> {
        self.projection.read().await.get(key).cloned()
    }

    /// Substring match over keys, case-insensitive, sorted by key.
    pub async fn recall(&self, query: &str) -> Vec<Memory> {
        let needle = query.to_lowercase();
        let mut matches: Vec<Memory> = self
            .projection
            .read()
            .await
            .values()
            .filter(|m| m.key.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.key.cmp(&b.key));
        matches
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store
            .create_event(&self.session_id, EventType::MemoryDeleted, json!({ "key": key }), None, None)
            .await?;
        self.projection.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager() -> MemoryManager {
        let store = Arc::new(EventStore::connect_in_memory().await.unwrap());
        store
            .create_event("s1", EventType::SessionStarted, json!({}), None, None)
            .await
            .unwrap();
        MemoryManager::new(store, "s1")
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let mgr = manager().await;
        mgr.save("k", json!("v"), MemoryOptions::default()).await.unwrap();
        let got = mgr.get("k").await.unwrap();
        assert_eq!(got.value, json!("v"));
    }

    #[tokio::test]
    async fn saving_twice_emits_updated_and_overwrites_value() {
        let mgr = manager().await;
        mgr.save("k", json!("v1"), MemoryOptions::default()).await.unwrap();
        mgr.save("k", json!("v2"), MemoryOptions::default()).await.unwrap();

        let got = mgr.get("k").await.unwrap();
        assert_eq!(got.value, json!("v2"));
    }

    #[tokio::test]
    async fn delete_tombstones_the_key() {
        let mgr = manager().await;
        mgr.save("k", json!("v"), MemoryOptions::default()).await.unwrap();
        mgr.delete("k").await.unwrap();
        assert!(mgr.get("k").await.is_none());
    }

    #[tokio::test]
    async fn hydrate_replays_full_event_log_into_projection() {
        let mgr = manager().await;
        mgr.save("a", json!(1), MemoryOptions::default()).await.unwrap();
        mgr.save("b", json!(2), MemoryOptions::default()).await.unwrap();
        mgr.delete("a").await.unwrap();

        // fresh manager with an empty in-process projection
        let fresh = MemoryManager::new(mgr.store.clone(), "s1");
        fresh.hydrate().await.unwrap();

        assert!(fresh.get("a").await.is_none());
        assert_eq!(fresh.get("b").await.unwrap().value, json!(2));
    }

    #[tokio::test]
    async fn recall_matches_case_insensitive_substring() {
        let mgr = manager().await;
        mgr.save("user.name", json!("alice"), MemoryOptions::default()).await.unwrap();
        mgr.save("user.email", json!("a@example.com"), MemoryOptions::default()).await.unwrap();
        mgr.save("project.root", json!("/tmp"), MemoryOptions::default()).await.unwrap();

        let found = mgr.recall("USER.").await;
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].key, "user.email");
    }
}
