//! Incremental marker scanning across chunk boundaries.
//!
//! # Responsibilities
//! - Find a marker that may be split across any number of chunks
//! - Substitute it (or insert before it) exactly once
//! - Release bytes as early as possible without ever emitting a partial marker
//!
//! # Design Decisions
//! - Only the last `marker.len() - 1` bytes are held back while searching.
//!   A marker that is not complete in the buffer must start inside that
//!   window, so everything before it is safe to flush.
//! - After the first match the scanner is a pass-through

use bytes::{Bytes, BytesMut};

#[derive(Debug, Clone)]
enum Action {
    Replace(Bytes),
    InsertBefore(Bytes),
}

/// Scanner for a single marker.
#[derive(Debug)]
pub struct MarkerScanner {
    needle: Vec<u8>,
    action: Action,
    buffer: BytesMut,
    matched: bool,
}

impl MarkerScanner {
    /// Replace the first occurrence of `marker` with `replacement`.
    pub fn replace(marker: impl Into<Vec<u8>>, replacement: impl Into<Bytes>) -> Self {
        Self::new(marker.into(), Action::Replace(replacement.into()))
    }

    /// Insert `content` immediately before the first occurrence of `marker`.
    pub fn insert_before(marker: impl Into<Vec<u8>>, content: impl Into<Bytes>) -> Self {
        Self::new(marker.into(), Action::InsertBefore(content.into()))
    }

    fn new(needle: Vec<u8>, action: Action) -> Self {
        Self {
            matched: needle.is_empty(),
            needle,
            action,
            buffer: BytesMut::new(),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.matched
    }

    /// Bytes held back while the marker has not been seen.
    pub fn lookback(&self) -> usize {
        self.needle.len().saturating_sub(1)
    }

    /// Consume `chunk`, appending whatever is safe to emit to `out`.
    pub fn feed(&mut self, chunk: Bytes, out: &mut Vec<Bytes>) {
        if self.matched {
            if !chunk.is_empty() {
                out.push(chunk);
            }
            return;
        }

        self.buffer.extend_from_slice(&chunk);

        match find(&self.buffer, &self.needle) {
            Some(pos) => {
                let mut rest = self.buffer.split().freeze();
                let before = rest.split_to(pos);
                let after = rest.split_off(self.needle.len());
                push_nonempty(out, before);
                match &self.action {
                    Action::Replace(replacement) => push_nonempty(out, replacement.clone()),
                    Action::InsertBefore(content) => {
                        push_nonempty(out, content.clone());
                        out.push(rest);
                    }
                }
                push_nonempty(out, after);
                self.matched = true;
            }
            None => {
                let flushable = self.buffer.len().saturating_sub(self.lookback());
                if flushable > 0 {
                    out.push(self.buffer.split_to(flushable).freeze());
                }
            }
        }
    }

    /// Flush whatever is still held. Returns whether the marker was seen.
    pub fn finish(&mut self, out: &mut Vec<Bytes>) -> bool {
        if !self.buffer.is_empty() {
            out.push(self.buffer.split().freeze());
        }
        self.matched
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn push_nonempty(out: &mut Vec<Bytes>, bytes: Bytes) {
    if !bytes.is_empty() {
        out.push(bytes);
    }
}

/// The three document rewrites, chained.
#[derive(Debug)]
pub struct Substitutions {
    doctype: Option<MarkerScanner>,
    head: MarkerScanner,
    body: MarkerScanner,
}

impl Substitutions {
    /// `doctype` is inserted before the first `<html`; an empty doctype
    /// disables that rewrite.
    pub fn new(doctype: &str, head_marker: &str, head: String, body_marker: &str, footer: String) -> Self {
        Self {
            doctype: (!doctype.is_empty())
                .then(|| MarkerScanner::insert_before("<html", doctype.to_string())),
            head: MarkerScanner::replace(head_marker, head),
            body: MarkerScanner::replace(body_marker, footer),
        }
    }

    pub fn head_injected(&self) -> bool {
        self.head.is_matched()
    }

    fn stages(&mut self) -> impl Iterator<Item = &mut MarkerScanner> {
        self.doctype
            .iter_mut()
            .chain(std::iter::once(&mut self.head))
            .chain(std::iter::once(&mut self.body))
    }

    /// Run one upstream chunk through every stage.
    pub fn feed(&mut self, chunk: Bytes) -> Vec<Bytes> {
        let mut pending = vec![chunk];
        for stage in self.stages() {
            let mut next = Vec::with_capacity(pending.len() + 2);
            for piece in pending {
                stage.feed(piece, &mut next);
            }
            pending = next;
        }
        pending
    }

    /// Drain every stage at end of input.
    pub fn finish(&mut self) -> Vec<Bytes> {
        let mut pending: Vec<Bytes> = Vec::new();
        for stage in self.stages() {
            let mut next = Vec::with_capacity(pending.len() + 1);
            for piece in pending {
                stage.feed(piece, &mut next);
            }
            if !stage.finish(&mut next) {
                tracing::warn!(
                    marker = %String::from_utf8_lossy(&stage.needle),
                    "Marker never appeared in rendered output"
                );
            }
            pending = next;
        }
        pending
    }
}
