//! Route tree and match cache.
//!
//! # Responsibilities
//! - Store compiled routes in a segment tree
//! - Resolve a request path to the best matching route
//! - Cache match results (including misses) per raw path
//! - Provide the linear-scan oracle the tree must agree with
//!
//! # Design Decisions
//! - Structure is immutable once the server starts; only the cache mutates
//! - Captures are positional in the tree and bound to names per route, so
//!   routes using different parameter names at one position share a branch
//! - Every structural candidate is ranked by the registration order, never
//!   by the order the traversal happens to reach it
//! - Cache eviction is FIFO by insertion; a hit does not refresh an entry

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::RouteConfig;
use crate::observability::metrics;
use crate::routing::pattern::split_path;
use crate::routing::{MatchResult, Route, RouteError, Segment};

/// A route plus its registration index.
#[derive(Debug, Clone)]
struct RouteEntry {
    route: Arc<Route>,
    order: usize,
}

/// Total order used everywhere a winner must be chosen.
fn rank(a: &RouteEntry, b: &RouteEntry) -> Ordering {
    a.route
        .kind
        .preference()
        .cmp(&b.route.kind.preference())
        .then_with(|| a.route.pattern.precedence(&b.route.pattern))
        .then_with(|| a.order.cmp(&b.order))
}

fn insert_sorted(entries: &mut Vec<RouteEntry>, entry: RouteEntry) {
    let pos = entries.partition_point(|e| rank(e, &entry) == Ordering::Less);
    entries.insert(pos, entry);
}

#[derive(Debug, Default)]
struct RouteNode {
    statics: HashMap<String, RouteNode>,
    param: Option<Box<RouteNode>>,
    wildcard: Option<Box<RouteNode>>,
    /// Terminal routes, best first.
    routes: Vec<RouteEntry>,
}

/// Best candidate seen during a descent.
struct Candidate<'a> {
    entry: &'a RouteEntry,
    captures: Vec<String>,
}

impl RouteNode {
    fn insert(&mut self, segments: &[Segment], entry: RouteEntry) {
        let Some((first, rest)) = segments.split_first() else {
            insert_sorted(&mut self.routes, entry);
            return;
        };

        match first {
            Segment::Static(text) => self
                .statics
                .entry(text.clone())
                .or_default()
                .insert(rest, entry),
            Segment::Param(_) => self.param.get_or_insert_with(Default::default).insert(rest, entry),
            Segment::Optional(_) => {
                // absent form terminates here, present form one level down
                insert_sorted(&mut self.routes, entry.clone());
                self.param.get_or_insert_with(Default::default).insert(rest, entry);
            }
            Segment::CatchAll(_) => {
                insert_sorted(
                    &mut self.wildcard.get_or_insert_with(Default::default).routes,
                    entry,
                );
            }
        }
    }

    fn offer<'a>(best: &mut Option<Candidate<'a>>, entry: Option<&'a RouteEntry>, captures: &[String]) {
        let Some(entry) = entry else { return };
        let better = match best {
            Some(current) => rank(entry, current.entry) == Ordering::Less,
            None => true,
        };
        if better {
            *best = Some(Candidate {
                entry,
                captures: captures.to_vec(),
            });
        }
    }

    fn descend<'a>(
        &'a self,
        path: &[&str],
        depth: usize,
        captures: &mut Vec<String>,
        best: &mut Option<Candidate<'a>>,
    ) {
        match path.get(depth) {
            None => Self::offer(best, self.routes.first(), captures),
            Some(segment) => {
                if let Some(child) = self.statics.get(*segment) {
                    child.descend(path, depth + 1, captures, best);
                }
                if let Some(child) = &self.param {
                    captures.push((*segment).to_string());
                    child.descend(path, depth + 1, captures, best);
                    captures.pop();
                }
            }
        }

        // a wildcard takes whatever is left, including nothing
        if let Some(wildcard) = &self.wildcard {
            captures.push(path[depth.min(path.len())..].join("/"));
            Self::offer(best, wildcard.routes.first(), captures);
            captures.pop();
        }
    }
}

/// Bounded path → result cache with insertion-order eviction.
#[derive(Debug)]
struct MatchCache {
    capacity: usize,
    entries: HashMap<String, Option<MatchResult>>,
    order: VecDeque<String>,
}

impl MatchCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, path: &str) -> Option<Option<MatchResult>> {
        self.entries.get(path).cloned()
    }

    fn insert(&mut self, path: String, result: Option<MatchResult>) {
        if self.capacity == 0 {
            return;
        }
        if let Some(slot) = self.entries.get_mut(&path) {
            *slot = result;
            return;
        }
        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(path.clone());
        self.entries.insert(path, result);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Hierarchical route matcher.
#[derive(Debug)]
pub struct RouteTree {
    root: RouteNode,
    /// All routes, best first; the linear scan walks this list.
    entries: Vec<RouteEntry>,
    cache: Mutex<MatchCache>,
}

impl RouteTree {
    /// Create an empty tree whose match cache holds `cache_capacity` paths.
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            root: RouteNode::default(),
            entries: Vec::new(),
            cache: Mutex::new(MatchCache::new(cache_capacity)),
        }
    }

    /// Build a tree from already-compiled routes, rejecting duplicate tags.
    pub fn from_routes(
        routes: impl IntoIterator<Item = Route>,
        cache_capacity: usize,
    ) -> Result<Self, RouteError> {
        let mut tree = Self::new(cache_capacity);
        for route in routes {
            if tree.entries.iter().any(|e| e.route.tag == route.tag) {
                return Err(RouteError::DuplicateTag(route.tag));
            }
            tree.add_route(route);
        }
        Ok(tree)
    }

    /// Compile and insert every manifest entry.
    pub fn from_config(routes: &[RouteConfig], cache_capacity: usize) -> Result<Self, RouteError> {
        let compiled = routes
            .iter()
            .map(Route::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_routes(compiled, cache_capacity)
    }

    /// Register a route. Invalidates the match cache.
    pub fn add_route(&mut self, route: Route) -> Arc<Route> {
        let route = Arc::new(route);
        let entry = RouteEntry {
            route: route.clone(),
            order: self.entries.len(),
        };
        let segments = route.pattern.segments.clone();
        self.root.insert(&segments, entry.clone());
        insert_sorted(&mut self.entries, entry);
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        route
    }

    /// Routes in match precedence order.
    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.entries.iter().map(|e| &e.route)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a path or absolute URL.
    ///
    /// Query strings and fragments are ignored. Returns `None` when no route
    /// matches; misses are cached too.
    pub fn match_path(&self, url: &str) -> Option<MatchResult> {
        let path = request_path(url);

        if let Some(cached) = self.lock_cache().get(&path) {
            metrics::record_match("cache");
            return cached;
        }

        let segments = split_path(&path);
        let result = match self.descend(&segments) {
            Some(found) => {
                metrics::record_match("tree");
                Some(found)
            }
            None => {
                let fallback = self.scan(&segments);
                if fallback.is_some() {
                    tracing::warn!(path = %path, "Linear scan matched a path the route tree missed");
                    metrics::record_match("linear");
                } else {
                    metrics::record_match("none");
                }
                fallback
            }
        };

        self.lock_cache().insert(path, result.clone());
        result
    }

    /// Tree descent only, bypassing the cache and the fallback.
    pub fn tree_match(&self, url: &str) -> Option<MatchResult> {
        let path = request_path(url);
        self.descend(&split_path(&path))
    }

    /// Linear scan over all routes in precedence order.
    pub fn linear_match(&self, url: &str) -> Option<MatchResult> {
        let path = request_path(url);
        self.scan(&split_path(&path))
    }

    /// Drop every cached match result.
    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    #[cfg(test)]
    fn cached_len(&self) -> usize {
        self.lock_cache().entries.len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, MatchCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn descend(&self, segments: &[&str]) -> Option<MatchResult> {
        let mut best = None;
        let mut captures = Vec::new();
        self.root.descend(segments, 0, &mut captures, &mut best);

        best.map(|candidate| {
            let route = candidate.entry.route.clone();
            let params = route
                .pattern
                .params
                .iter()
                .map(|p| p.name.clone())
                .zip(candidate.captures)
                .collect();
            MatchResult {
                route,
                params,
                matched_segments: segments.len(),
            }
        })
    }

    fn scan(&self, segments: &[&str]) -> Option<MatchResult> {
        self.entries.iter().find_map(|entry| {
            entry
                .route
                .pattern
                .match_segments(segments)
                .map(|params| MatchResult {
                    route: entry.route.clone(),
                    params,
                    matched_segments: segments.len(),
                })
        })
    }
}

/// Extract the path component of a bare path or absolute URL.
fn request_path(url: &str) -> String {
    if url.contains("://") {
        if let Ok(parsed) = url::Url::parse(url) {
            return parsed.path().to_string();
        }
    }
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].to_string()
}
