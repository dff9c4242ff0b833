//! Head and footer content substituted at the markers.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::config::StreamConfig;
use crate::render::escape_html;
use crate::routing::RouteAssets;

/// Head tags contributed by loaders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadTags {
    pub title: Option<String>,
    /// `(name, content)` pairs for `<meta>` tags.
    pub meta: Vec<(String, String)>,
}

impl HeadTags {
    /// Fold `other` in: its title wins, meta tags accumulate.
    pub fn merge(&mut self, other: HeadTags) {
        if other.title.is_some() {
            self.title = other.title;
        }
        self.meta.extend(other.meta);
    }
}

/// State handed to the client-side hydration listener.
#[derive(Debug, Serialize)]
pub struct HydrationState<'a> {
    pub route: &'a str,
    pub params: &'a BTreeMap<String, String>,
    pub data: &'a BTreeMap<String, Value>,
    /// Ids of fragments that will arrive after the document.
    pub deferred: &'a [String],
}

/// Content for the head and body markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Injection {
    pub head: String,
    pub footer: String,
}

impl Injection {
    /// Head: title, meta, stylesheets, chunk preload.
    /// Footer: serialised hydration state, then the entry chunk.
    pub fn build(config: &StreamConfig, assets: &RouteAssets, head: &HeadTags, state: &HydrationState<'_>) -> Self {
        let base = config.asset_base.trim_end_matches('/');

        let mut head_html = String::new();
        if let Some(title) = &head.title {
            head_html.push_str(&format!("<title>{}</title>", escape_html(title)));
        }
        for (name, content) in &head.meta {
            head_html.push_str(&format!(
                r#"<meta name="{}" content="{}">"#,
                escape_html(name),
                escape_html(content)
            ));
        }
        for sheet in &assets.stylesheets {
            head_html.push_str(&format!(
                r#"<link rel="stylesheet" href="{base}/{}">"#,
                escape_html(sheet)
            ));
        }
        if let Some(chunk) = &assets.chunk {
            head_html.push_str(&format!(
                r#"<link rel="modulepreload" href="{base}/{}.js">"#,
                escape_html(chunk)
            ));
        }

        let json = serde_json::to_string(state).unwrap_or_else(|e| {
            tracing::error!(route = state.route, error = %e, "Failed to serialise hydration state");
            "null".to_string()
        });
        let mut footer = format!(
            "<script>window.{}={};</script>",
            config.state_global,
            escape_json_for_script(&json)
        );
        if let Some(chunk) = &assets.chunk {
            footer.push_str(&format!(
                r#"<script type="module" src="{base}/{}.js"></script>"#,
                escape_html(chunk)
            ));
        }

        Self {
            head: head_html,
            footer,
        }
    }
}

/// Make serialised JSON safe inside a `<script>` element.
pub fn escape_json_for_script(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}
