//! Rendering collaborators.
//!
//! # Responsibilities
//! - Define the `Renderer` seam: composed view in, byte stream out
//! - Define the `Loader` seam and the registry that resolves loader refs
//! - Provide the built-in `ShellRenderer` and config-driven `StaticLoader`
//!
//! # Design Decisions
//! - Renderers know nothing about markers beyond emitting them; all
//!   substitution happens in the stream assembler
//! - A render failure before the first byte is an `Err`, after it an error
//!   item on the stream

pub mod loader;
pub mod shell;

use std::collections::BTreeMap;
use std::io;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

use crate::config::StreamConfig;
use crate::routing::LayoutHierarchy;

pub use loader::{
    FnLoader, LoadError, LoadRequest, Loader, LoaderOutput, LoaderRegistry, StaticLoader,
};
pub use shell::ShellRenderer;

/// Rendered document bytes, chunked arbitrarily.
pub type RenderStream = BoxStream<'static, Result<Bytes, RenderError>>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render failed: {0}")]
    Failed(String),

    #[error("render I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Placeholders a renderer must emit exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    pub head: String,
    pub body: String,
}

impl Markers {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            head: config.head_marker.clone(),
            body: config.body_marker.clone(),
        }
    }
}

/// Everything a renderer needs for one matched page.
#[derive(Debug, Clone)]
pub struct ComposedView {
    pub tag: String,
    pub identifier: String,
    pub params: BTreeMap<String, String>,
    pub layouts: LayoutHierarchy,
    /// Immediate loader values.
    pub data: BTreeMap<String, Value>,
    /// Ids of fragments that will be streamed after the document.
    pub deferred: Vec<String>,
    pub markers: Markers,
}

/// Fallback page for 404s and failures before streaming.
#[derive(Debug, Clone)]
pub struct ErrorView {
    pub status: u16,
    pub message: String,
    pub markers: Markers,
}

/// Turns a composed view into a byte stream.
pub trait Renderer: Send + Sync {
    fn render(&self, view: ComposedView) -> Result<RenderStream, RenderError>;

    /// Error pages cannot fail before streaming.
    fn render_error(&self, view: ErrorView) -> RenderStream;
}

/// Escape text for HTML content and attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
