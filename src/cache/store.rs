//! Cache storage backends.
//!
//! # Responsibilities
//! - Define the `CacheStore` seam (in process or remote)
//! - Provide a bounded in-process store with FIFO eviction
//!
//! # Design Decisions
//! - Store methods return boxed futures so remote backends fit the same trait
//! - `MemoryStore` serialises writers on the insertion-order queue; readers
//!   only touch the concurrent map, and no lock is held across an await

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::cache::CacheError;

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// A stored response and its freshness window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub snapshot: ResponseSnapshot,
    pub inserted_at: SystemTime,
    pub max_age_secs: u64,
}

impl CacheEntry {
    pub fn expires_at(&self) -> SystemTime {
        self.inserted_at + Duration::from_secs(self.max_age_secs)
    }

    /// Fresh for `[inserted_at, inserted_at + max_age)`.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at()
    }
}

/// Storage backend behind the response cache.
pub trait CacheStore: Send + Sync {
    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CacheEntry>, CacheError>>;

    fn store(&self, entry: CacheEntry) -> BoxFuture<'_, Result<(), CacheError>>;

    /// Remove `key` only while it still holds the entry inserted at
    /// `inserted_at`; a newer write under the same key survives.
    fn discard<'a>(&'a self, key: &'a str, inserted_at: SystemTime) -> BoxFuture<'a, Result<(), CacheError>>;

    fn clear(&self) -> BoxFuture<'_, Result<(), CacheError>>;
}

/// Bounded in-process store.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
    order: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl MemoryStore {
    /// Create a store holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&self, entry: CacheEntry) {
        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);

        if self.entries.contains_key(&entry.key) {
            // refresh moves the key to the newest position
            order.retain(|k| k != &entry.key);
        } else {
            while order.len() >= self.capacity {
                let Some(oldest) = order.pop_front() else { break };
                self.entries.remove(&oldest);
                tracing::debug!(key = %oldest, "Evicted oldest cache entry");
            }
        }

        order.push_back(entry.key.clone());
        self.entries.insert(entry.key.clone(), entry);
    }

    fn delete_if(&self, key: &str, inserted_at: SystemTime) {
        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        if self
            .entries
            .remove_if(key, |_, entry| entry.inserted_at == inserted_at)
            .is_some()
        {
            order.retain(|k| k != key);
        }
    }
}

impl CacheStore for MemoryStore {
    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CacheEntry>, CacheError>> {
        let entry = self.entries.get(key).map(|r| r.value().clone());
        future::ready(Ok(entry)).boxed()
    }

    fn store(&self, entry: CacheEntry) -> BoxFuture<'_, Result<(), CacheError>> {
        self.insert(entry);
        future::ready(Ok(())).boxed()
    }

    fn discard<'a>(&'a self, key: &'a str, inserted_at: SystemTime) -> BoxFuture<'a, Result<(), CacheError>> {
        self.delete_if(key, inserted_at);
        future::ready(Ok(())).boxed()
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), CacheError>> {
        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        self.entries.clear();
        order.clear();
        future::ready(Ok(())).boxed()
    }
}
