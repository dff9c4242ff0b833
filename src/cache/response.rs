//! TTL response cache over a `CacheStore`.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;

use crate::cache::{CacheEntry, CacheKey, CacheStore, MemoryStore, ResponseSnapshot};
use crate::observability::metrics;

/// Time source, replaceable in tests.
pub type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// An independent copy of a cached response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    snapshot: ResponseSnapshot,
}

impl CachedResponse {
    pub fn status(&self) -> u16 {
        self.snapshot.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.snapshot.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.snapshot.body
    }

    /// Build a fresh HTTP response. Unparseable stored headers are skipped.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.snapshot.body));
        *response.status_mut() =
            StatusCode::from_u16(self.snapshot.status).unwrap_or(StatusCode::OK);
        let headers = response.headers_mut();
        for (name, value) in &self.snapshot.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        response
    }
}

/// Response cache with lazy expiry.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    clock: Clock,
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache").finish_non_exhaustive()
    }
}

impl ResponseCache {
    /// In-process cache holding at most `capacity` responses.
    pub fn new(capacity: usize) -> Self {
        Self::with_store(Arc::new(MemoryStore::new(capacity)))
    }

    pub fn with_store(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemTime::now),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> SystemTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Fetch a fresh entry. Misses, expired entries and store failures all
    /// return `None`.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        let entry = match self.store.load(key.as_str()).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                metrics::record_cache("store_error");
                return None;
            }
        };

        if entry.is_expired_at((self.clock)()) {
            tracing::debug!(key = %key, "Cache entry expired");
            if let Err(e) = self.store.discard(key.as_str(), entry.inserted_at).await {
                tracing::warn!(key = %key, error = %e, "Failed to drop expired cache entry");
            }
            return None;
        }

        Some(CachedResponse {
            snapshot: entry.snapshot,
        })
    }

    /// Store a copy of `snapshot` for `max_age_secs`.
    pub async fn set(&self, key: &CacheKey, snapshot: ResponseSnapshot, max_age_secs: u64) {
        let entry = CacheEntry {
            key: key.as_str().to_string(),
            snapshot,
            inserted_at: (self.clock)(),
            max_age_secs,
        };
        if let Err(e) = self.store.store(entry).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
            metrics::record_cache("store_error");
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "Cache clear failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheError;
    use futures_util::future::{self, BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{Duration, UNIX_EPOCH};

    fn snapshot(body: &str) -> ResponseSnapshot {
        ResponseSnapshot {
            status: 200,
            headers: vec![("content-type".into(), "text/html".into())],
            body: Bytes::from(body.to_string()),
        }
    }

    fn manual_clock() -> (Arc<AtomicU64>, impl Fn() -> SystemTime + Send + Sync + 'static) {
        let now = Arc::new(AtomicU64::new(1_000));
        let handle = now.clone();
        (now, move || UNIX_EPOCH + Duration::from_secs(handle.load(Ordering::SeqCst)))
    }

    #[tokio::test]
    async fn test_get_returns_independent_copies() {
        let cache = ResponseCache::new(8);
        let key = CacheKey::generate("/a", Vec::<(String, String)>::new());
        cache.set(&key, snapshot("hello"), 60).await;

        let first = cache.get(&key).await.unwrap().into_response();
        let second = cache.get(&key).await.unwrap().into_response();

        let a = axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap();
        let b = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(&a[..], b"hello");
    }

    #[tokio::test]
    async fn test_expiry_is_lazy_and_strict() {
        let (now, clock) = manual_clock();
        let cache = ResponseCache::new(8).with_clock(clock);
        let key = CacheKey::generate("/a", Vec::<(String, String)>::new());
        cache.set(&key, snapshot("x"), 10).await;

        now.store(1_009, Ordering::SeqCst);
        assert!(cache.get(&key).await.is_some());
        now.store(1_010, Ordering::SeqCst);
        assert!(cache.get(&key).await.is_none());
        // removed on read, stays gone even if the clock went backwards
        now.store(1_000, Ordering::SeqCst);
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_capacity_scenario() {
        let cache = ResponseCache::new(3);
        let keys: Vec<CacheKey> = ["k1", "k2", "k3", "k4"]
            .iter()
            .map(|k| CacheKey::generate(k, Vec::<(String, String)>::new()))
            .collect();
        for key in &keys {
            cache.set(key, snapshot(key.as_str()), 60).await;
        }
        assert!(cache.get(&keys[0]).await.is_none());
        assert_eq!(cache.get(&keys[3]).await.unwrap().body().as_ref(), b"k4");
    }

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn load<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<Option<CacheEntry>, CacheError>> {
            future::ready(Err(CacheError::Unavailable("down".into()))).boxed()
        }
        fn store(&self, _entry: CacheEntry) -> BoxFuture<'_, Result<(), CacheError>> {
            future::ready(Err(CacheError::Unavailable("down".into()))).boxed()
        }
        fn discard<'a>(&'a self, _key: &'a str, _inserted_at: SystemTime) -> BoxFuture<'a, Result<(), CacheError>> {
            future::ready(Err(CacheError::Unavailable("down".into()))).boxed()
        }
        fn clear(&self) -> BoxFuture<'_, Result<(), CacheError>> {
            future::ready(Err(CacheError::Unavailable("down".into()))).boxed()
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_a_miss() {
        let cache = ResponseCache::with_store(Arc::new(BrokenStore));
        let key = CacheKey::generate("/a", Vec::<(String, String)>::new());
        cache.set(&key, snapshot("x"), 60).await;
        assert!(cache.get(&key).await.is_none());
    }

    /// Lets a concurrent request rewrite the key after the stale read.
    struct RacingStore {
        inner: MemoryStore,
        fresh: ResponseSnapshot,
        fresh_at: SystemTime,
    }

    impl CacheStore for RacingStore {
        fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CacheEntry>, CacheError>> {
            async move {
                let stale = self.inner.load(key).await?;
                self.inner
                    .store(CacheEntry {
                        key: key.to_string(),
                        snapshot: self.fresh.clone(),
                        inserted_at: self.fresh_at,
                        max_age_secs: 60,
                    })
                    .await?;
                Ok(stale)
            }
            .boxed()
        }
        fn store(&self, entry: CacheEntry) -> BoxFuture<'_, Result<(), CacheError>> {
            self.inner.store(entry)
        }
        fn discard<'a>(&'a self, key: &'a str, inserted_at: SystemTime) -> BoxFuture<'a, Result<(), CacheError>> {
            self.inner.discard(key, inserted_at)
        }
        fn clear(&self) -> BoxFuture<'_, Result<(), CacheError>> {
            self.inner.clear()
        }
    }

    #[tokio::test]
    async fn test_expired_read_keeps_concurrent_write() {
        let (now, clock) = manual_clock();
        let store = Arc::new(RacingStore {
            inner: MemoryStore::new(4),
            fresh: snapshot("fresh"),
            fresh_at: UNIX_EPOCH + Duration::from_secs(1_020),
        });
        let cache = ResponseCache::with_store(store.clone()).with_clock(clock);
        let key = CacheKey::generate("/a", Vec::<(String, String)>::new());
        store
            .inner
            .store(CacheEntry {
                key: key.as_str().to_string(),
                snapshot: snapshot("stale"),
                inserted_at: UNIX_EPOCH + Duration::from_secs(1_000),
                max_age_secs: 10,
            })
            .await
            .unwrap();

        now.store(1_020, Ordering::SeqCst);
        assert!(cache.get(&key).await.is_none());

        let kept = store.inner.load(key.as_str()).await.unwrap().unwrap();
        assert_eq!(kept.snapshot.body.as_ref(), b"fresh");
    }
}
