//! Streaming response assembly.
//!
//! # Data Flow
//! ```text
//! Renderer byte stream (partial HTML, arbitrary chunking)
//!     → scanner.rs (doctype insert, head + body marker substitution)
//!     → assembler.rs (Shell → Content → flush gate → Deferred → Done)
//!           ↑
//!     deferred.rs (loader fields partitioned; each pending field spawned,
//!                  settlements serialised in settlement order)
//!     inject.rs (head tags, asset tags, hydration state)
//! ```
//!
//! # Design Decisions
//! - Substitutions never depend on how the upstream stream was chunked
//! - The complete document is flushed before any deferred unit
//! - Deferred units go out in settlement order, not registration order
//! - Upstream failures end the stream with an error; fragment failures
//!   become diagnostic units

pub mod assembler;
pub mod deferred;
pub mod inject;
pub mod scanner;
pub mod state;

use thiserror::Error;

use crate::render::RenderError;

pub use assembler::{AssembledStream, StreamAssembler};
pub use deferred::{fragment_id, DeferredFragment, FieldState, FragmentError, PartitionedData, Settlement};
pub use inject::{HeadTags, HydrationState, Injection};
pub use scanner::{MarkerScanner, Substitutions};
pub use state::{FlushGate, StreamState};

/// Errors surfaced on an assembled stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The renderer failed mid-stream. Fatal for the response.
    #[error("upstream render failed: {0}")]
    Upstream(#[from] RenderError),
}
