//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → pattern.rs (identifier → RoutePattern, rejects malformed input)
//!     → route.rs (Route, kind, assets, cache policy)
//!     → tree.rs (insert into RouteTree, sorted terminal lists)
//!     → Freeze as immutable RouteTree
//!
//! Incoming Request (path)
//!     → tree.rs (match cache → tree descent → linear scan)
//!     → layout.rs (root-to-leaf layout chain)
//!     → Return: MatchResult or explicit no-match
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: a total order over routes decides every tie
//! - Tree descent and linear scan agree by construction
//! - Explicit no-match (`None`) rather than a silent default

pub mod layout;
pub mod pattern;
pub mod route;
pub mod tree;

use thiserror::Error;

pub use layout::{find_layout_hierarchy, Layout, LayoutHierarchy, LayoutSet};
pub use pattern::{ParamDef, RoutePattern, Segment};
pub use route::{MatchResult, Route, RouteAssets, RouteKind};
pub use tree::RouteTree;

/// Errors raised while compiling or registering routes.
///
/// All of these surface at startup; matching itself never fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The identifier does not follow the routing naming convention.
    #[error("malformed route identifier `{identifier}`: {reason}")]
    Malformed { identifier: String, reason: String },

    /// A parameter name appears twice in one identifier.
    #[error("route identifier `{identifier}` declares parameter `{name}` more than once")]
    DuplicateParam { identifier: String, name: String },

    /// The manifest's parameter list disagrees with the compiled pattern.
    #[error("route `{tag}` declares params {declared:?} but its pattern captures {compiled:?}")]
    ParamMismatch {
        tag: String,
        declared: Vec<String>,
        compiled: Vec<String>,
    },

    /// Two routes share a tag.
    #[error("route tag `{0}` is registered more than once")]
    DuplicateTag(String),
}
