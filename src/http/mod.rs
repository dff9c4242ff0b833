//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, page handler)
//!     → request.rs (request ID, query extraction)
//!     → [route match, cache lookup, loaders, renderer, assembler]
//!     → response.rs (headers, streaming body, cache tee)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdGenerator, X_REQUEST_ID};
pub use response::{CacheStatus, X_CACHE};
pub use server::{AppState, HttpServer, SiteState};
