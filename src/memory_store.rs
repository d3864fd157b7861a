//! In-process reference store backed by a shared map.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::session::Record;
use crate::store::SessionStore;

/// Map-backed [`SessionStore`] with lazy expiration.
///
/// Records are held as JSON snapshot strings keyed by identifier. An entry
/// whose embedded metadata has expired is dropped when a lookup or an
/// enumeration observes it; there is no background sweep. Clones share the
/// underlying map.
///
/// Intended for development and tests: state is lost on process exit and
/// never shared across processes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn decode(id: &str, snapshot: &str) -> StoreResult<Record> {
        serde_json::from_str(snapshot).map_err(|e| StoreError::Decode(format!("session {id}: {e}")))
    }

    fn encode(record: &Record) -> StoreResult<String> {
        serde_json::to_string(record).map_err(|e| StoreError::Encode(e.to_string()))
    }

    fn expired(record: &Record) -> bool {
        matches!(record.cookie.expires(), Some(expires) if expires <= OffsetDateTime::now_utc())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, id: &str) -> StoreResult<Option<Record>> {
        let mut sessions = self.sessions.write().await;
        let Some(snapshot) = sessions.get(id) else {
            trace!(id, "session not in memory store");
            return Ok(None);
        };
        let record = Self::decode(id, snapshot)?;
        if Self::expired(&record) {
            debug!(id, "dropping expired session");
            sessions.remove(id);
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn save(&self, id: &str, record: &Record) -> StoreResult<()> {
        let snapshot = Self::encode(record)?;
        self.sessions.write().await.insert(id.to_owned(), snapshot);
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    fn implements_touch(&self) -> bool {
        true
    }

    /// Overwrites only the embedded cookie metadata of the stored snapshot;
    /// content stays as previously saved. Touching an absent entry is a
    /// no-op.
    async fn touch(&self, id: &str, record: &Record) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        let Some(snapshot) = sessions.get(id) else {
            return Ok(());
        };
        let mut stored = Self::decode(id, snapshot)?;
        stored.cookie = record.cookie.clone();
        let snapshot = Self::encode(&stored)?;
        sessions.insert(id.to_owned(), snapshot);
        Ok(())
    }

    async fn all(&self) -> StoreResult<HashMap<String, Record>> {
        let mut sessions = self.sessions.write().await;
        let mut live = HashMap::new();
        let mut dead = Vec::new();
        for (id, snapshot) in sessions.iter() {
            let record = Self::decode(id, snapshot)?;
            if Self::expired(&record) {
                dead.push(id.clone());
            } else {
                live.insert(id.clone(), record);
            }
        }
        for id in dead {
            sessions.remove(&id);
        }
        Ok(live)
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.all().await?.len())
    }

    async fn clear(&self) -> StoreResult<()> {
        self.sessions.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::{CookieConfig, SessionCookie};
    use time::Duration;

    fn record(max_age: Option<Duration>) -> Record {
        let mut config = CookieConfig::new();
        if let Some(max_age) = max_age {
            config = config.with_max_age(max_age);
        }
        Record {
            cookie: SessionCookie::new(&config),
            data: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let store = MemoryStore::new();
        let mut saved = record(Some(Duration::hours(1)));
        saved
            .data
            .insert("views".to_owned(), serde_json::json!(2));

        store.save("abc", &saved).await.unwrap();
        let loaded = store.load("abc").await.unwrap().unwrap();
        assert_eq!(loaded, saved);

        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_on_load() {
        let store = MemoryStore::new();
        store
            .save("stale", &record(Some(Duration::milliseconds(-1))))
            .await
            .unwrap();

        assert!(store.load("stale").await.unwrap().is_none());
        // Gone for good, not merely hidden.
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn touch_rewrites_only_metadata() {
        let store = MemoryStore::new();
        let mut saved = record(Some(Duration::hours(1)));
        saved
            .data
            .insert("views".to_owned(), serde_json::json!(1));
        store.save("abc", &saved).await.unwrap();

        // A touch carrying different content must not rewrite it.
        let mut touched = record(Some(Duration::hours(2)));
        touched
            .data
            .insert("views".to_owned(), serde_json::json!(99));
        store.touch("abc", &touched).await.unwrap();

        let loaded = store.load("abc").await.unwrap().unwrap();
        assert_eq!(loaded.data.get("views"), Some(&serde_json::json!(1)));
        assert_eq!(loaded.cookie, touched.cookie);
    }

    #[tokio::test]
    async fn touch_on_absent_entry_is_a_noop() {
        let store = MemoryStore::new();
        store
            .touch("missing", &record(Some(Duration::hours(1))))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_is_unconditional() {
        let store = MemoryStore::new();
        store.save("abc", &record(None)).await.unwrap();
        store.delete("abc").await.unwrap();
        store.delete("abc").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn enumeration_skips_and_prunes_expired() {
        let store = MemoryStore::new();
        store.save("live", &record(Some(Duration::hours(1)))).await.unwrap();
        store.save("forever", &record(None)).await.unwrap();
        store
            .save("stale", &record(Some(Duration::milliseconds(-1))))
            .await
            .unwrap();

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains_key("live"));
        assert!(all.contains_key("forever"));
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
