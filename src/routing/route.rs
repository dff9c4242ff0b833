//! Route definitions and match results.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::CachePolicy;
use crate::config::RouteConfig;
use crate::routing::{RouteError, RoutePattern};

/// What a route produces when matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteKind {
    /// Renders a streamed HTML document.
    #[default]
    Page,
    /// Returns loader data only, no document.
    DataOnly,
}

impl RouteKind {
    /// Lower sorts first: pages win over data-only routes.
    pub fn preference(self) -> u8 {
        match self {
            RouteKind::Page => 0,
            RouteKind::DataOnly => 1,
        }
    }
}

/// Client assets attached to a route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteAssets {
    /// Entry chunk id, emitted as a module script.
    pub chunk: Option<String>,
    /// Stylesheet ids, emitted as `<link>` tags.
    pub stylesheets: Vec<String>,
}

/// A registered route. Immutable once built.
#[derive(Debug, Clone)]
pub struct Route {
    pub pattern: RoutePattern,
    /// Directory-style identifier the pattern was compiled from.
    pub identifier: String,
    /// Stable tag, used in logs, metrics and fragment ids.
    pub tag: String,
    pub loader_ref: Option<String>,
    pub kind: RouteKind,
    pub assets: RouteAssets,
    pub cache: Option<CachePolicy>,
}

impl Route {
    /// Compile a page route.
    pub fn new(identifier: impl Into<String>, tag: impl Into<String>) -> Result<Self, RouteError> {
        let identifier = identifier.into();
        let pattern = RoutePattern::compile(&identifier)?;
        Ok(Self {
            pattern,
            identifier,
            tag: tag.into(),
            loader_ref: None,
            kind: RouteKind::Page,
            assets: RouteAssets::default(),
            cache: None,
        })
    }

    /// Build a route from a manifest entry, checking declared params.
    pub fn from_config(config: &RouteConfig) -> Result<Self, RouteError> {
        let route = Self::new(config.identifier.clone(), config.tag.clone())?
            .with_kind(config.kind)
            .with_assets(RouteAssets {
                chunk: config.chunk.clone(),
                stylesheets: config.stylesheets.clone(),
            });
        let route = match &config.loader {
            Some(loader) => route.with_loader(loader.clone()),
            None => route,
        };
        let route = match &config.cache {
            Some(policy) => route.with_cache(policy.clone()),
            None => route,
        };

        // an empty list means the manifest leaves it to the compiler
        if !config.params.is_empty() && config.params != route.pattern.param_names() {
            return Err(RouteError::ParamMismatch {
                tag: route.tag,
                declared: config.params.clone(),
                compiled: route.pattern.param_names(),
            });
        }

        Ok(route)
    }

    pub fn with_kind(mut self, kind: RouteKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_loader(mut self, loader_ref: impl Into<String>) -> Self {
        self.loader_ref = Some(loader_ref.into());
        self
    }

    pub fn with_assets(mut self, assets: RouteAssets) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_cache(mut self, policy: CachePolicy) -> Self {
        self.cache = Some(policy);
        self
    }
}

/// Result of a successful match. One per request.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub route: Arc<Route>,
    pub params: BTreeMap<String, String>,
    /// Number of path segments consumed.
    pub matched_segments: usize,
}
