//! Route pattern compilation.
//!
//! # Responsibilities
//! - Turn a directory-style routing identifier into a `RoutePattern`
//! - Extract ordered parameter definitions
//! - Compute the specificity score used to order competing routes
//!
//! # Identifier Syntax
//! ```text
//! blog/[slug]      → /blog/:slug     (dynamic segment)
//! posts/[[page]]   → /posts/:page?   (optional, last segment only)
//! docs/[...rest]   → /docs/*rest     (catch-all, last segment only)
//! index, "", "/"   → /
//! ```
//!
//! # Design Decisions
//! - Malformed identifiers are rejected here, never at request time
//! - Specificity = 2×static + dynamic + (0 for root, else total segments)
//! - Equal scores fall back to static-first, then a segment-wise comparison

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::routing::RouteError;

/// One compiled path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Literal text, compared exactly.
    Static(String),
    /// Captures exactly one segment.
    Param(String),
    /// Captures one segment if present.
    Optional(String),
    /// Captures the remainder of the path, possibly empty.
    CatchAll(String),
}

impl Segment {
    /// Rank used for segment-wise tie breaking; lower is more specific.
    fn rank(&self) -> u8 {
        match self {
            Segment::Static(_) => 0,
            Segment::Param(_) => 1,
            Segment::Optional(_) => 2,
            Segment::CatchAll(_) => 3,
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Segment::Static(_))
    }

    /// Parameter name, if this segment captures anything.
    pub fn param_name(&self) -> Option<&str> {
        match self {
            Segment::Static(_) => None,
            Segment::Param(name) | Segment::Optional(name) | Segment::CatchAll(name) => Some(name),
        }
    }

    fn template(&self) -> String {
        match self {
            Segment::Static(text) => text.clone(),
            Segment::Param(name) => format!(":{name}"),
            Segment::Optional(name) => format!(":{name}?"),
            Segment::CatchAll(name) => format!("*{name}"),
        }
    }
}

/// A named parameter captured by a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDef {
    pub name: String,
    pub optional: bool,
}

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    /// Normalised template, e.g. `/blog/:slug`.
    pub path_template: String,
    /// Parameters in path order.
    pub params: Vec<ParamDef>,
    /// True when the pattern has no dynamic segment.
    pub is_static: bool,
    /// Ranking score, see module docs.
    pub specificity: u32,
    pub segments: Vec<Segment>,
}

impl RoutePattern {
    /// Compile a routing identifier.
    pub fn compile(identifier: &str) -> Result<Self, RouteError> {
        let normalized = normalize_identifier(identifier);
        if normalized.is_empty() {
            return Ok(Self::from_segments(Vec::new()));
        }

        let raw: Vec<&str> = normalized.split('/').collect();
        let mut segments = Vec::with_capacity(raw.len());
        let mut seen = HashSet::new();

        for (index, raw_segment) in raw.iter().enumerate() {
            let segment = parse_segment(identifier, raw_segment)?;
            let is_last = index + 1 == raw.len();
            if matches!(segment, Segment::Optional(_) | Segment::CatchAll(_)) && !is_last {
                return Err(malformed(
                    identifier,
                    "optional and catch-all segments must come last",
                ));
            }
            if let Some(name) = segment.param_name() {
                if !seen.insert(name.to_string()) {
                    return Err(RouteError::DuplicateParam {
                        identifier: identifier.to_string(),
                        name: name.to_string(),
                    });
                }
            }
            segments.push(segment);
        }

        Ok(Self::from_segments(segments))
    }

    fn from_segments(segments: Vec<Segment>) -> Self {
        let static_count = segments.iter().filter(|s| s.is_static()).count() as u32;
        let dynamic_count = segments.len() as u32 - static_count;
        let total = segments.len() as u32;
        // root has no segments, so its total term is 0 as well
        let specificity = 2 * static_count + dynamic_count + total;

        let params = segments
            .iter()
            .filter_map(|s| {
                s.param_name().map(|name| ParamDef {
                    name: name.to_string(),
                    optional: matches!(s, Segment::Optional(_)),
                })
            })
            .collect();

        let path_template = if segments.is_empty() {
            "/".to_string()
        } else {
            segments
                .iter()
                .map(|s| format!("/{}", s.template()))
                .collect::<String>()
        };

        Self {
            path_template,
            params,
            is_static: dynamic_count == 0,
            specificity,
            segments,
        }
    }

    /// Parameter names in path order.
    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Compare two patterns for match precedence.
    ///
    /// A static pattern beats any dynamic one; specificity only orders
    /// patterns of the same kind. `Ordering::Less` means `self` wins.
    pub fn precedence(&self, other: &Self) -> Ordering {
        other
            .is_static
            .cmp(&self.is_static)
            .then_with(|| other.specificity.cmp(&self.specificity))
            .then_with(|| {
                self.segments
                    .iter()
                    .zip(&other.segments)
                    .map(|(a, b)| a.rank().cmp(&b.rank()))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| other.segments.len().cmp(&self.segments.len()))
    }

    /// Structural match of already-split path segments.
    ///
    /// This is the reference semantics the route tree must reproduce.
    pub fn match_segments(&self, path: &[&str]) -> Option<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();
        let mut consumed = 0;

        for segment in &self.segments {
            match segment {
                Segment::Static(text) => {
                    if path.get(consumed) != Some(&text.as_str()) {
                        return None;
                    }
                    consumed += 1;
                }
                Segment::Param(name) => {
                    let value = path.get(consumed)?;
                    params.insert(name.clone(), (*value).to_string());
                    consumed += 1;
                }
                Segment::Optional(name) => {
                    if let Some(value) = path.get(consumed) {
                        params.insert(name.clone(), (*value).to_string());
                        consumed += 1;
                    }
                }
                Segment::CatchAll(name) => {
                    params.insert(name.clone(), path[consumed..].join("/"));
                    consumed = path.len();
                }
            }
        }

        (consumed == path.len()).then_some(params)
    }
}

/// Strip slashes and index suffixes; the root becomes the empty string.
pub fn normalize_identifier(identifier: &str) -> &str {
    let mut trimmed = identifier.trim().trim_matches('/');
    if trimmed == "index" {
        return "";
    }
    if let Some(stripped) = trimmed.strip_suffix("/index") {
        trimmed = stripped.trim_end_matches('/');
    }
    trimmed
}

/// Split a request path into non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn parse_segment(identifier: &str, raw: &str) -> Result<Segment, RouteError> {
    if raw.is_empty() {
        return Err(malformed(identifier, "empty segment"));
    }

    if let Some(rest) = raw.strip_prefix("[[") {
        let name = rest
            .strip_suffix("]]")
            .ok_or_else(|| malformed(identifier, "unbalanced `[[` in segment"))?;
        return Ok(Segment::Optional(param_name(identifier, name)?));
    }

    if let Some(rest) = raw.strip_prefix('[') {
        let inner = rest
            .strip_suffix(']')
            .ok_or_else(|| malformed(identifier, "unbalanced `[` in segment"))?;
        return match inner.strip_prefix("...") {
            Some(name) => Ok(Segment::CatchAll(param_name(identifier, name)?)),
            None => Ok(Segment::Param(param_name(identifier, inner)?)),
        };
    }

    if raw.contains(['[', ']', ':', '*', '?']) {
        return Err(malformed(
            identifier,
            &format!("segment `{raw}` mixes literal text with reserved characters"),
        ));
    }

    Ok(Segment::Static(raw.to_string()))
}

fn param_name(identifier: &str, name: &str) -> Result<String, RouteError> {
    if name.is_empty() {
        return Err(malformed(identifier, "empty parameter name"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(malformed(
            identifier,
            &format!("invalid parameter name `{name}`"),
        ));
    }
    Ok(name.to_string())
}

fn malformed(identifier: &str, reason: &str) -> RouteError {
    RouteError::Malformed {
        identifier: identifier.to_string(),
        reason: reason.to_string(),
    }
}
