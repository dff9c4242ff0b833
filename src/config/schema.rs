//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server,
//! including the route manifest and layout declarations.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CachePolicy;
use crate::routing::RouteKind;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SsrConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Route matching settings.
    pub routing: RoutingConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Stream assembly settings.
    pub stream: StreamConfig,

    /// Route manifest.
    pub routes: Vec<RouteConfig>,

    /// Declared layout directories.
    pub layouts: Vec<LayoutConfig>,

    /// Config-driven loaders, by name.
    pub loaders: BTreeMap<String, StaticLoaderConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Route matching configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Entries kept in the path → match cache.
    pub match_cache_capacity: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            match_cache_capacity: 1024,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch; routes still need their own `[routes.cache]`.
    pub enabled: bool,

    /// Maximum number of cached responses.
    pub capacity: usize,

    /// Cookie whose presence marks a request as authenticated.
    pub session_cookie: String,

    /// Emit `X-Cache: HIT|MISS`.
    pub debug_headers: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 512,
            session_cookie: "session".to_string(),
            debug_headers: true,
        }
    }
}

/// Stream assembly configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Replaced by head tags.
    pub head_marker: String,

    /// Replaced by the hydration footer.
    pub body_marker: String,

    /// Inserted before the first `<html`; empty disables.
    pub doctype: String,

    /// Prefix for stylesheet and chunk URLs.
    pub asset_base: String,

    /// Global the hydration state is assigned to.
    pub state_global: String,

    /// Buffered chunks between the assembler and the client.
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            head_marker: "<!--ssr-head-->".to_string(),
            body_marker: "<!--ssr-body-->".to_string(),
            doctype: "<!DOCTYPE html>".to_string(),
            asset_base: "/assets".to_string(),
            state_global: "__SSR_STATE__".to_string(),
            channel_capacity: 16,
        }
    }
}

/// One route manifest entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Directory-style identifier, e.g. `blog/[slug]`.
    pub identifier: String,

    /// Stable route tag.
    pub tag: String,

    /// Declared param names, in order. Empty skips the check.
    #[serde(default)]
    pub params: Vec<String>,

    /// Entry chunk id.
    #[serde(default)]
    pub chunk: Option<String>,

    #[serde(default)]
    pub stylesheets: Vec<String>,

    /// Loader name in the registry.
    #[serde(default)]
    pub loader: Option<String>,

    #[serde(default)]
    pub kind: RouteKind,

    /// Response caching; absent means never cached.
    #[serde(default)]
    pub cache: Option<CachePolicy>,
}

impl RouteConfig {
    pub fn new(identifier: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            tag: tag.into(),
            params: Vec::new(),
            chunk: None,
            stylesheets: Vec::new(),
            loader: None,
            kind: RouteKind::Page,
            cache: None,
        }
    }
}

/// A declared layout directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayoutConfig {
    /// Directory prefix; `""` for the root layout.
    #[serde(default)]
    pub directory: String,

    #[serde(default)]
    pub loader: Option<String>,
}

/// Values served by a config-driven loader.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticLoaderConfig {
    pub title: Option<String>,

    /// `<meta name=… content=…>` pairs.
    pub meta: BTreeMap<String, String>,

    /// Immediate values.
    pub data: BTreeMap<String, Value>,

    /// Values streamed after the document.
    pub deferred: BTreeMap<String, DeferredValueConfig>,
}

/// A deferred value, optionally delayed or failing.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DeferredValueConfig {
    pub value: Value,

    pub delay_ms: u64,

    /// Reject with this message instead of resolving.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: SsrConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.stream.head_marker, "<!--ssr-head-->");
        assert_eq!(config.routing.match_cache_capacity, 1024);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_full_manifest() {
        let config: SsrConfig = toml::from_str(
            r#"
            [observability]
            log_format = "json"

            [[routes]]
            identifier = "blog/[slug]"
            tag = "blog-post"
            params = ["slug"]
            chunk = "blog-post-3f2a"
            stylesheets = ["blog.css"]
            loader = "post"

            [routes.cache]
            max_age_secs = 120
            vary = ["Accept-Language"]

            [[routes]]
            identifier = "api/[id]"
            tag = "api"
            kind = "data-only"

            [[layouts]]
            directory = ""

            [[layouts]]
            directory = "blog"
            loader = "blog-layout"

            [loaders.post]
            title = "Post {slug}"

            [loaders.post.data]
            heading = "Hello"

            [loaders.post.deferred.comments]
            value = ["nice"]
            delay_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.routes.len(), 2);
        let cache = config.routes[0].cache.as_ref().unwrap();
        assert_eq!(cache.max_age_secs, 120);
        assert!(cache.enabled);
        assert_eq!(config.routes[1].kind, RouteKind::DataOnly);
        assert_eq!(config.layouts[1].loader.as_deref(), Some("blog-layout"));
        let post = &config.loaders["post"];
        assert_eq!(post.data["heading"], Value::from("Hello"));
        assert_eq!(post.deferred["comments"].delay_ms, 250);
    }
}
