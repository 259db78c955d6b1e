use crate::config::CacheSettings;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache miss: {0}")]
    CacheMiss(String),
}

/// Longest lifetime of an entry; larger TTLs are clamped
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

#[derive(Clone)]
struct Entry {
    bytes: Arc<Vec<u8>>,
    expires_at: Instant,
}

/// Multi-tier cache manager
///
/// L1 is an in-process moka cache; L2 is an optional Redis instance shared
/// across front-end processes. Every entry carries its own TTL.
pub struct CacheManager {
    redis: Option<Arc<tokio::sync::Mutex<ConnectionManager>>>,
    l1_cache: moka::future::Cache<String, Entry>,
}

impl CacheManager {
    /// Create a cache manager from settings, connecting to Redis if configured
    pub async fn new(settings: &CacheSettings) -> Result<Self, CacheError> {
        let mut cache = Self::in_memory(settings.l1_cache_size);
        if let Some(url) = settings.redis_url.as_deref().filter(|u| !u.is_empty()) {
            let client = redis::Client::open(url)?;
            let redis = ConnectionManager::new(client).await?;
            cache.redis = Some(Arc::new(tokio::sync::Mutex::new(redis)));
            tracing::info!("L2 cache enabled");
        }
        Ok(cache)
    }

    /// Cache without a Redis tier
    pub fn in_memory(l1_size: u64) -> Self {
        let l1_cache = moka::future::CacheBuilder::new(l1_size).build();
        Self {
            redis: None,
            l1_cache,
        }
    }

    /// Get a value from cache (L1 first, then L2)
    pub async fn get<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: for<'de> Deserialize<'de>,
    {
        if let Some(entry) = self.l1_cache.get(key).await {
            if entry.expires_at > Instant::now() {
                tracing::trace!("L1 cache hit: {}", key);
                return Ok(serde_json::from_slice(&entry.bytes)?);
            }
            self.l1_cache.invalidate(key).await;
        }

        if let Some(redis) = &self.redis {
            let mut conn = redis.lock().await;
            let (value, ttl): (Option<String>, i64) = redis::pipe()
                .cmd("GET")
                .arg(key)
                .cmd("TTL")
                .arg(key)
                .query_async(&mut *conn)
                .await?;
            drop(conn);

            if let Some(json) = value {
                tracing::trace!("L2 cache hit: {}", key);
                if ttl > 0 {
                    self.insert_l1(key, json.as_bytes().to_vec(), Duration::from_secs(ttl as u64))
                        .await;
                }
                return Ok(serde_json::from_str(&json)?);
            }
        }

        tracing::trace!("Cache miss: {}", key);
        Err(CacheError::CacheMiss(key.to_string()))
    }

    /// Get a value, treating any failure as a miss
    pub async fn get_opt<T>(&self, key: &str) -> Option<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        match self.get(key).await {
            Ok(value) => Some(value),
            Err(CacheError::CacheMiss(_)) => None,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Set a value in both tiers with the given TTL
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let json = serde_json::to_string(value)?;
        self.insert_l1(key, json.as_bytes().to_vec(), ttl).await;

        if let Some(redis) = &self.redis {
            let mut conn = redis.lock().await;
            redis::cmd("SETEX")
                .arg(key)
                .arg(ttl.min(MAX_TTL).as_secs().max(1))
                .arg(json)
                .query_async::<()>(&mut *conn)
                .await?;
        }

        tracing::trace!("Cache set: {} ({:?})", key, ttl);
        Ok(())
    }

    async fn insert_l1(&self, key: &str, bytes: Vec<u8>, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl.min(MAX_TTL))
            .unwrap_or(now);
        let entry = Entry {
            bytes: Arc::new(bytes),
            expires_at,
        };
        self.l1_cache.insert(key.to_string(), entry).await;
    }

    /// Delete a value from both cache tiers
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.l1_cache.invalidate(key).await;
        if let Some(redis) = &self.redis {
            let mut conn = redis.lock().await;
            redis::cmd("DEL")
                .arg(key)
                .query_async::<()>(&mut *conn)
                .await?;
        }
        Ok(())
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_size: self.l1_cache.entry_count(),
            l2_enabled: self.redis.is_some(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub l1_size: u64,
    pub l2_enabled: bool,
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Database list of a server
    pub fn databases(server: &str) -> String {
        format!("dicoweb/databases/{}", server)
    }

    /// Strategy list of a server
    pub fn strategies(server: &str) -> String {
        format!("dicoweb/strategies/{}", server)
    }

    /// Result of one lookup; the parameters are hashed into the key
    pub fn lookup(
        host: &str,
        port: u16,
        langkey: &str,
        kind: &str,
        db: &str,
        strategy: &str,
        query: &str,
    ) -> String {
        format!(
            "dicoweb/{}",
            digest(&format!(
                "{}:{}/{}/{}/{}/{}/{}",
                host, port, langkey, kind, db, strategy, query
            ))
        )
    }

    /// Key of the last match result seen by a session
    pub fn last_match(session: &str) -> String {
        format!("dicoweb/{}/last_match", session)
    }

    /// Server chosen by a session
    pub fn session_server(cookie: &str) -> String {
        format!("dicoweb/session/{}/server", cookie)
    }

    /// Per-server session id derived from the cookie value
    pub fn session_id(cookie: &str, server: &str) -> String {
        digest(&format!("{}/{}", cookie, server))
    }
}

fn digest(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_cache_set_get_redis() {
        let settings = CacheSettings {
            redis_url: Some("redis://127.0.0.1:6379".to_string()),
            ..CacheSettings::default()
        };
        let cache = CacheManager::new(&settings)
            .await
            .expect("Failed to create cache");

        let key = "test_key";
        let value = "test_value";

        cache.set(key, &value, Duration::from_secs(60)).await.unwrap();
        let result: String = cache.get(key).await.unwrap();
        assert_eq!(result, value);

        cache.delete(key).await.unwrap();
        assert!(cache.get::<String>(key).await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_set_get_delete() {
        let cache = CacheManager::in_memory(100);
        cache
            .set("k", &vec!["a".to_string(), "b".to_string()], Duration::from_secs(60))
            .await
            .unwrap();
        let value: Vec<String> = cache.get("k").await.unwrap();
        assert_eq!(value, vec!["a", "b"]);

        cache.delete("k").await.unwrap();
        assert!(matches!(cache.get::<Vec<String>>("k").await, Err(CacheError::CacheMiss(_))));
        assert!(cache.get_opt::<Vec<String>>("k").await.is_none());
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let cache = CacheManager::in_memory(100);
        cache.set("short", &1u32, Duration::from_millis(20)).await.unwrap();
        cache.set("long", &2u32, Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.get_opt::<u32>("short").await.is_none());
        assert_eq!(cache.get_opt::<u32>("long").await, Some(2));
    }

    #[tokio::test]
    async fn test_huge_ttl_is_clamped() {
        let cache = CacheManager::in_memory(100);
        cache.set("forever", &"v", Duration::MAX).await.unwrap();
        cache
            .set("years", &"w", Duration::from_secs(u64::MAX))
            .await
            .unwrap();
        assert_eq!(cache.get_opt::<String>("forever").await.as_deref(), Some("v"));
        assert_eq!(cache.get_opt::<String>("years").await.as_deref(), Some("w"));
    }

    #[test]
    fn test_cache_key_builder() {
        assert_eq!(CacheKey::databases("gnu.org.ua"), "dicoweb/databases/gnu.org.ua");
        assert_eq!(CacheKey::strategies("gnu.org.ua"), "dicoweb/strategies/gnu.org.ua");
        assert_eq!(CacheKey::last_match("abc"), "dicoweb/abc/last_match");

        let a = CacheKey::lookup("h", 2628, "*", "define", "*", ".", "word");
        let b = CacheKey::lookup("h", 2628, "*", "define", "*", ".", "Word");
        assert_ne!(a, b);
        assert!(a.starts_with("dicoweb/"));
        assert_eq!(a.len(), "dicoweb/".len() + 64);
        assert_eq!(a, CacheKey::lookup("h", 2628, "*", "define", "*", ".", "word"));
    }

    #[test]
    fn test_session_id_depends_on_server() {
        assert_ne!(CacheKey::session_id("c", "a"), CacheKey::session_id("c", "b"));
    }
}
