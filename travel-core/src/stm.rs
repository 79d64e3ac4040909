//! Short-term memory: TTL-bound key/value and capped lists.
//!
//! Redis is the primary backend. When it is not configured or cannot be
//! reached, [`connect_store`] hands back an [`InMemoryStore`] with the same
//! semantics so the service keeps running (fallback mode).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::MemoryConfig;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("key {0} holds a value of the wrong type")]
    WrongType(String),
}

/// Key layout shared by every component that touches short-term memory.
pub mod keys {
    pub fn active_session(user_id: i64) -> String {
        format!("stm:active:{}", user_id)
    }

    pub fn session(user_id: i64, session_id: &str) -> String {
        format!("stm:sess:{}:{}", user_id, session_id)
    }

    pub fn session_turns(user_id: i64, session_id: &str) -> String {
        format!("stm:sess:{}:{}:turns", user_id, session_id)
    }

    pub fn session_prefix(user_id: i64) -> String {
        format!("stm:sess:{}:", user_id)
    }

    pub fn recent(user_id: i64) -> String {
        format!("stm:recent:{}", user_id)
    }

    pub fn profile(user_id: i64) -> String {
        format!("stm:utp:{}", user_id)
    }

    pub fn agent(user_id: i64, agent: &str) -> String {
        format!("stm:agent:{}:{}", user_id, agent)
    }

    pub fn agent_prefix(user_id: i64) -> String {
        format!("stm:agent:{}:", user_id)
    }
}

#[async_trait]
pub trait ShortTermStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Prepend `value` to the list at `key`, keeping at most `cap` items.
    async fn push_capped(
        &self,
        key: &str,
        value: &str,
        cap: usize,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Newest-first list items; `limit == 0` returns all of them.
    async fn range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError>;

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Drop expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    fn name(&self) -> &'static str;
}

// =============================================================================
// REDIS
// =============================================================================

pub struct RedisStore {
    con: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let con = client.get_multiplexed_tokio_connection().await?;
        Ok(Self { con })
    }
}

#[async_trait]
impl ShortTermStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.con.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut con)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        cmd.query_async::<_, ()>(&mut con).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut con = self.con.clone();
        let removed = redis::cmd("DEL")
            .arg(key)
            .query_async::<_, i64>(&mut con)
            .await?;
        Ok(removed > 0)
    }

    async fn push_capped(
        &self,
        key: &str,
        value: &str,
        cap: usize,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("LPUSH")
            .arg(key)
            .arg(value)
            .ignore()
            .cmd("LTRIM")
            .arg(key)
            .arg(0)
            .arg(cap.max(1) as i64 - 1)
            .ignore();
        if let Some(ttl) = ttl {
            pipe.cmd("EXPIRE").arg(key).arg(ttl.as_secs().max(1)).ignore();
        }
        pipe.query_async::<_, ()>(&mut con).await?;
        Ok(())
    }

    async fn range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let mut con = self.con.clone();
        let stop = if limit == 0 { -1 } else { limit as i64 - 1 };
        let items = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(stop)
            .query_async::<_, Vec<String>>(&mut con)
            .await?;
        Ok(items)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut con = self.con.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut found = Vec::new();
        loop {
            let (next, batch) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async::<_, (u64, Vec<String>)>(&mut con)
                .await?;
            found.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        found.sort();
        found.dedup();
        Ok(found)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        // Redis expires keys itself.
        Ok(0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        redis::cmd("PING").query_async::<_, String>(&mut con).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// =============================================================================
// IN-PROCESS
// =============================================================================

#[derive(Debug, Clone)]
enum Slot {
    Text(String),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().await.values().filter(|e| e.is_live(now)).count()
    }
}

#[async_trait]
impl ShortTermStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => match &entry.slot {
                Slot::Text(s) => Ok(Some(s.clone())),
                Slot::List(_) => Err(StoreError::WrongType(key.to_string())),
            },
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let entry = Entry {
            slot: Slot::Text(value.to_string()),
            expires_at: ttl.and_then(|t| Instant::now().checked_add(t)),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let removed = self.entries.write().await.remove(key);
        Ok(removed.map_or(false, |e| e.is_live(Instant::now())))
    }

    async fn push_capped(
        &self,
        key: &str,
        value: &str,
        cap: usize,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::List(VecDeque::new()),
            expires_at: None,
        });
        if !entry.is_live(now) {
            entry.slot = Slot::List(VecDeque::new());
            entry.expires_at = None;
        }
        match &mut entry.slot {
            Slot::List(items) => {
                items.push_front(value.to_string());
                items.truncate(cap.max(1));
            }
            Slot::Text(_) => return Err(StoreError::WrongType(key.to_string())),
        }
        if let Some(ttl) = ttl {
            // Unrepresentable deadlines never expire.
            entry.expires_at = now.checked_add(ttl);
        }
        Ok(())
    }

    async fn range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => match &entry.slot {
                Slot::List(items) => {
                    let take = if limit == 0 { items.len() } else { limit };
                    Ok(items.iter().take(take).cloned().collect())
                }
                Slot::Text(_) => Err(StoreError::WrongType(key.to_string())),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut found: Vec<String> = entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        found.sort();
        Ok(found)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok((before - entries.len()) as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Redis when configured and reachable, otherwise the in-process store.
pub async fn connect_store(config: &MemoryConfig) -> Arc<dyn ShortTermStore> {
    let Some(url) = config.redis_url.as_deref() else {
        info!("No redis_url configured, keeping short-term memory in process");
        return Arc::new(InMemoryStore::new());
    };

    let attempt = async {
        let store = RedisStore::connect(url).await?;
        store.ping().await?;
        Ok::<_, StoreError>(store)
    };

    match tokio::time::timeout(Duration::from_secs(3), attempt).await {
        Ok(Ok(store)) => {
            info!(url = %url, "Connected to Redis");
            Arc::new(store)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Redis unavailable, running short-term memory in fallback mode");
            Arc::new(InMemoryStore::new())
        }
        Err(_) => {
            warn!("Redis connect timed out, running short-term memory in fallback mode");
            Arc::new(InMemoryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible_then_purged() {
        let store = InMemoryStore::new();
        store.set("short", "x", Some(Duration::from_millis(30))).await.unwrap();
        store.set("long", "y", Some(Duration::from_secs(60))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.keys("").await.unwrap(), vec!["long".to_string()]);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_push_capped_keeps_newest_first() {
        let store = InMemoryStore::new();
        for n in 0..5 {
            store
                .push_capped("list", &n.to_string(), 3, None)
                .await
                .unwrap();
        }
        assert_eq!(store.range("list", 0).await.unwrap(), vec!["4", "3", "2"]);
        assert_eq!(store.range("list", 2).await.unwrap(), vec!["4", "3"]);
        assert!(store.range("missing", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = InMemoryStore::new();
        store.set("text", "v", None).await.unwrap();
        assert!(matches!(
            store.push_capped("text", "x", 5, None).await,
            Err(StoreError::WrongType(_))
        ));
        store.push_capped("list", "x", 5, None).await.unwrap();
        assert!(matches!(store.get("list").await, Err(StoreError::WrongType(_))));
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let store = InMemoryStore::new();
        store.set("far", "v", Some(Duration::MAX)).await.unwrap();
        store.push_capped("far_list", "x", 5, Some(Duration::MAX)).await.unwrap();
        assert_eq!(store.get("far").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.range("far_list", 0).await.unwrap(), vec!["x"]);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_keys_by_prefix() {
        let store = InMemoryStore::new();
        store.set(&keys::agent(7, "mood_detector"), "a", None).await.unwrap();
        store.set(&keys::agent(7, "calm_guide"), "b", None).await.unwrap();
        store.set(&keys::agent(8, "calm_guide"), "c", None).await.unwrap();
        let found = store.keys(&keys::agent_prefix(7)).await.unwrap();
        assert_eq!(found, vec!["stm:agent:7:calm_guide", "stm:agent:7:mood_detector"]);
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(keys::active_session(1), "stm:active:1");
        assert_eq!(keys::session_turns(1, "abc"), "stm:sess:1:abc:turns");
        assert_eq!(keys::recent(2), "stm:recent:2");
        assert_eq!(keys::profile(3), "stm:utp:3");
    }

    #[tokio::test]
    async fn test_connect_store_without_redis_url() {
        let store = connect_store(&MemoryConfig::default()).await;
        assert_eq!(store.name(), "memory");
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_store_falls_back_when_unreachable() {
        let config = MemoryConfig {
            redis_url: Some("redis://127.0.0.1:9/".to_string()),
            ..Default::default()
        };
        let store = connect_store(&config).await;
        assert_eq!(store.name(), "memory");
    }
}
