//! Read cache for precomputed responses
//!
//! Handlers read through [`cached`], writers call [`invalidate`] after their
//! transaction commits. Both sides derive keys with [`CacheKey::key`].

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::Instant;

use crate::error::{AppError, AppResult};

/// Key-value store with per-entry expiry
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Drop every entry owned by this server
    async fn clear(&self) -> AppResult<()>;
}

/// Cached read responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    DashboardStats,
    AllSections,
    SectionsWithBooks,
    IssuedBooks { user_id: i32 },
}

impl CacheKey {
    pub fn key(&self) -> String {
        match self {
            CacheKey::DashboardStats => "dashboard_stats".to_string(),
            CacheKey::AllSections => "all_sections".to_string(),
            CacheKey::SectionsWithBooks => "sections_with_books".to_string(),
            CacheKey::IssuedBooks { user_id } => format!("issued_books:{}", user_id),
        }
    }

    pub fn ttl(&self) -> Duration {
        match self {
            CacheKey::DashboardStats | CacheKey::AllSections => Duration::from_secs(60),
            CacheKey::SectionsWithBooks => Duration::from_secs(300),
            CacheKey::IssuedBooks { .. } => Duration::from_secs(10),
        }
    }
}

/// Serve `key` from the cache, computing and storing it on a miss.
///
/// Cache failures never fail the read: the value is computed from the
/// database instead.
pub async fn cached<T, F, Fut>(cache: &dyn Cache, key: CacheKey, compute: F) -> AppResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let name = key.key();

    match cache.get(&name).await {
        Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
            Ok(value) => {
                tracing::debug!(key = %name, "cache hit");
                return Ok(value);
            }
            Err(e) => tracing::warn!(key = %name, "Discarding undecodable cache entry: {}", e),
        },
        Ok(None) => tracing::debug!(key = %name, "cache miss"),
        Err(e) => tracing::warn!(key = %name, "Cache read failed, using database: {}", e),
    }

    let value = compute().await?;

    match serde_json::to_string(&value) {
        Ok(raw) => {
            if let Err(e) = cache.set(&name, &raw, key.ttl()).await {
                tracing::warn!(key = %name, "Cache write failed: {}", e);
            }
        }
        Err(e) => tracing::warn!(key = %name, "Failed to encode cache entry: {}", e),
    }

    Ok(value)
}

/// Delete every key in `keys`. Failures are returned to the caller.
pub async fn invalidate(cache: &dyn Cache, keys: &[CacheKey]) -> AppResult<()> {
    for key in keys {
        let name = key.key();
        cache.delete(&name).await?;
        tracing::debug!(key = %name, "cache invalidated");
    }
    Ok(())
}

/// In-process cache, used when no Redis server is configured
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, MemoryEntry>,
}

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let now = Instant::now();
        let value = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if value.is_none() {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        self.entries.clear();
        Ok(())
    }
}

/// Map a backend error into [`AppError::Cache`]
pub(crate) fn cache_error(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Cache(format!("{}: {}", context, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that is always down
    struct BrokenCache;

    #[async_trait]
    impl Cache for BrokenCache {
        async fn get(&self, _key: &str) -> AppResult<Option<String>> {
            Err(cache_error("get", "connection refused"))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> AppResult<()> {
            Err(cache_error("set", "connection refused"))
        }
        async fn delete(&self, _key: &str) -> AppResult<()> {
            Err(cache_error("delete", "connection refused"))
        }
        async fn clear(&self) -> AppResult<()> {
            Err(cache_error("clear", "connection refused"))
        }
    }

    #[test]
    fn test_key_derivation() {
        assert_eq!(CacheKey::DashboardStats.key(), "dashboard_stats");
        assert_eq!(CacheKey::AllSections.key(), "all_sections");
        assert_eq!(CacheKey::SectionsWithBooks.key(), "sections_with_books");
        assert_eq!(CacheKey::IssuedBooks { user_id: 42 }.key(), "issued_books:42");
        assert_ne!(
            CacheKey::IssuedBooks { user_id: 1 }.key(),
            CacheKey::IssuedBooks { user_id: 11 }.key()
        );
    }

    #[test]
    fn test_ttls() {
        assert_eq!(CacheKey::DashboardStats.ttl(), Duration::from_secs(60));
        assert_eq!(CacheKey::AllSections.ttl(), Duration::from_secs(60));
        assert_eq!(CacheKey::SectionsWithBooks.ttl(), Duration::from_secs(300));
        assert_eq!(CacheKey::IssuedBooks { user_id: 1 }.ttl(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache.set("a", "1", Duration::from_secs(60)).await.unwrap();
        cache.set("b", "2", Duration::ZERO).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(cache.get("b").await.unwrap(), None);
        assert_eq!(cache.get("missing").await.unwrap(), None);

        cache.delete("a").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cached_computes_once() {
        let cache = MemoryCache::new();
        let calls = AtomicUsize::new(0);
        let key = CacheKey::IssuedBooks { user_id: 7 };

        for _ in 0..3 {
            let value: Vec<i32> = cached(&cache, key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1, 2, 3])
            })
            .await
            .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let cache = MemoryCache::new();
        let key = CacheKey::IssuedBooks { user_id: 7 };

        let first: Vec<i32> = cached(&cache, key, || async { Ok(vec![1]) }).await.unwrap();
        assert_eq!(first, vec![1]);

        invalidate(&cache, &[key, CacheKey::DashboardStats]).await.unwrap();

        let second: Vec<i32> = cached(&cache, key, || async { Ok(vec![1, 2]) }).await.unwrap();
        assert_eq!(second, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_undecodable_entry_falls_back() {
        let cache = MemoryCache::new();
        let key = CacheKey::AllSections;
        cache
            .set(&key.key(), "not json", key.ttl())
            .await
            .unwrap();

        let value: Vec<String> = cached(&cache, key, || async { Ok(vec!["Fiction".to_string()]) })
            .await
            .unwrap();
        assert_eq!(value, vec!["Fiction".to_string()]);
        // the bad entry was replaced
        assert_eq!(
            cache.get(&key.key()).await.unwrap().as_deref(),
            Some(r#"["Fiction"]"#)
        );
    }

    #[tokio::test]
    async fn test_broken_cache_read_uses_database() {
        let value: i64 = cached(&BrokenCache, CacheKey::DashboardStats, || async { Ok(12) })
            .await
            .unwrap();
        assert_eq!(value, 12);
    }

    #[tokio::test]
    async fn test_broken_cache_invalidation_is_an_error() {
        let result = invalidate(&BrokenCache, &[CacheKey::SectionsWithBooks]).await;
        assert!(matches!(result, Err(AppError::Cache(_))));
    }

    #[tokio::test]
    async fn test_compute_error_is_returned() {
        let cache = MemoryCache::new();
        let result: AppResult<i64> = cached(&cache, CacheKey::DashboardStats, || async {
            Err(AppError::NotFound("gone".into()))
        })
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(cache.get("dashboard_stats").await.unwrap(), None);
    }
}
