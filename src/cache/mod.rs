//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Request (path, params, headers)
//!     → policy.rs (bypass for authenticated requests, Cache-Control)
//!     → key.rs (canonical key: path + sorted params)
//!     → response.rs (TTL check, independent copies)
//!     → store.rs (CacheStore backend; MemoryStore in process)
//! ```
//!
//! # Design Decisions
//! - Expiry is checked lazily on read; there is no background sweep
//! - Eviction is FIFO by insertion, not LRU: hits never refresh an entry
//! - Store failures degrade to a miss and never fail the request
//! - Capacity is supplied by the owner, no process-wide singleton

pub mod key;
pub mod policy;
pub mod response;
pub mod store;

use thiserror::Error;

pub use key::CacheKey;
pub use policy::{is_authenticated, CachePolicy};
pub use response::{CachedResponse, ResponseCache};
pub use store::{CacheEntry, CacheStore, MemoryStore, ResponseSnapshot};

/// Errors reported by a cache store backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached.
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    /// The backend returned data that could not be decoded.
    #[error("corrupt cache entry for `{0}`")]
    Corrupt(String),
}
