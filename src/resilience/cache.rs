// src/resilience/cache.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A cached upstream payload.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub data: Value,
    pub stored_at: DateTime<Utc>,
    inserted: Instant,
    ttl: Duration,
}

impl CachedEntry {
    fn new(data: Value, ttl: Duration) -> Self {
        Self {
            data,
            stored_at: Utc::now(),
            inserted: Instant::now(),
            ttl,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.inserted.elapsed() > self.ttl
    }
}

/// In-memory response cache with TTL.
///
/// Expired entries are kept until capacity pressure removes them, so a failed
/// upstream can still be answered with the last known data.
#[derive(Debug)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CachedEntry>>,
    default_ttl: Duration,
    max_size: usize,
}

impl ResponseCache {
    #[must_use]
    pub fn new(default_ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            max_size: max_size.max(1),
        }
    }

    /// Entry that is still within its TTL.
    pub async fn get_fresh(&self, key: &str) -> Option<CachedEntry> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                debug!(cache_key = %key, "Cache hit");
                Some(entry.clone())
            }
            Some(_) => {
                debug!(cache_key = %key, "Cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Entry regardless of age.
    pub async fn get_any(&self, key: &str) -> Option<CachedEntry> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn put(&self, key: String, data: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_size {
            Self::evict_expired(&mut entries);

            if entries.len() >= self.max_size {
                let oldest_key = entries
                    .iter()
                    .min_by_key(|(_, v)| v.inserted)
                    .map(|(k, _)| k.clone());
                if let Some(key_to_remove) = oldest_key {
                    entries.remove(&key_to_remove);
                    debug!(removed_key = %key_to_remove, "Evicted oldest cache entry");
                }
            }
        }

        entries.insert(key.clone(), CachedEntry::new(data, ttl));
        drop(entries);
        debug!(cache_key = %key, ttl_seconds = ttl.as_secs(), "Cached response");
    }

    fn evict_expired(entries: &mut HashMap<String, CachedEntry>) {
        entries.retain(|key, entry| {
            let keep = !entry.is_expired();
            if !keep {
                debug!(cache_key = %key, "Evicted expired cache entry");
            }
            keep
        });
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let total_entries = entries.len();
        let expired_entries = entries.values().filter(|v| v.is_expired()).count();
        drop(entries);

        CacheStats {
            total_entries,
            expired_entries,
            active_entries: total_entries - expired_entries,
            max_size: self.max_size,
            default_ttl_millis: self.default_ttl.as_millis().try_into().unwrap_or(u64::MAX),
        }
    }

    /// Drops every entry whose key contains `pattern`, or all entries when
    /// `pattern` is `None`. Returns how many were removed.
    pub async fn clear(&self, pattern: Option<&str>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        match pattern {
            Some(pattern) => entries.retain(|key, _| !key.contains(pattern)),
            None => entries.clear(),
        }
        let cleared = before - entries.len();
        drop(entries);
        info!(cleared_entries = cleared, pattern = ?pattern, "Cache cleared");
        cleared
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub max_size: usize,
    pub default_ttl_millis: u64,
}
