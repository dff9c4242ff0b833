//! Built-in document renderer.
//!
//! Emits a minimal HTML shell: layouts wrap the page inside-out, immediate
//! data is rendered as a definition list, and every deferred fragment gets
//! an empty slot the client fills in. The document is emitted as several
//! chunks so the assembler sees a real stream.

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;

use crate::render::{escape_html, ComposedView, ErrorView, RenderError, RenderStream, Renderer};

#[derive(Debug, Clone)]
pub struct ShellRenderer {
    lang: String,
}

impl Default for ShellRenderer {
    fn default() -> Self {
        Self { lang: "en".to_string() }
    }
}

impl ShellRenderer {
    pub fn new(lang: impl Into<String>) -> Self {
        Self { lang: lang.into() }
    }

    fn open_document(&self, head_marker: &str) -> String {
        format!(
            r#"<html lang="{}"><head><meta charset="utf-8">{head_marker}</head><body>"#,
            escape_html(&self.lang)
        )
    }
}

impl Renderer for ShellRenderer {
    fn render(&self, view: ComposedView) -> Result<RenderStream, RenderError> {
        let mut page = format!(r#"<main data-route="{}">"#, escape_html(&view.tag));
        if !view.data.is_empty() {
            page.push_str("<dl>");
            for (key, value) in &view.data {
                page.push_str(&format!("<dt>{}</dt><dd>{}</dd>", escape_html(key), escape_html(&display(value))));
            }
            page.push_str("</dl>");
        }
        for id in &view.deferred {
            page.push_str(&format!(r#"<div data-deferred-slot="{}"></div>"#, escape_html(id)));
        }
        page.push_str("</main>");

        for layout in view.layouts.compose_order() {
            page = format!(
                r#"<div data-layout="{}">{page}</div>"#,
                escape_html(&layout.identifier)
            );
        }

        let chunks = vec![
            self.open_document(&view.markers.head),
            format!(r#"<div id="app">{page}</div>"#),
            format!("{}</body></html>", view.markers.body),
        ];
        Ok(stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c)))).boxed())
    }

    fn render_error(&self, view: ErrorView) -> RenderStream {
        let chunks = vec![
            self.open_document(&view.markers.head),
            format!(
                r#"<div id="app"><main data-status="{}"><h1>{}</h1><p>{}</p></main></div>"#,
                view.status,
                view.status,
                escape_html(&view.message)
            ),
            format!("{}</body></html>", view.markers.body),
        ];
        stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c)))).boxed()
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
