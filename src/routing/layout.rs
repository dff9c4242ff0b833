//! Layout hierarchy resolution.
//!
//! # Responsibilities
//! - Hold the set of declared layout directories
//! - Resolve the root-to-leaf layout chain for a route identifier
//!
//! # Design Decisions
//! - Pure function of the identifier and the declared set
//! - Root is always probed first, then each directory prefix left to right
//! - Missing directories are skipped, never reordered

use std::collections::HashMap;

use crate::config::LayoutConfig;
use crate::routing::pattern::normalize_identifier;

/// A layout wrapping every route below its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub identifier: String,
    pub loader_ref: Option<String>,
    /// Directory depth, 0 for the root layout.
    pub depth: usize,
    /// Directory prefix, empty for the root.
    pub directory: String,
}

/// Declared layout directories.
#[derive(Debug, Clone, Default)]
pub struct LayoutSet {
    declared: HashMap<String, Option<String>>,
}

impl LayoutSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a layout at `directory` (`""` or `"/"` for the root).
    pub fn declare(&mut self, directory: &str, loader_ref: Option<String>) {
        self.declared
            .insert(normalize_directory(directory).to_string(), loader_ref);
    }

    pub fn from_config(layouts: &[LayoutConfig]) -> Self {
        let mut set = Self::new();
        for layout in layouts {
            if set.contains(&layout.directory) {
                tracing::warn!(directory = %layout.directory, "Layout declared twice, last declaration wins");
            }
            set.declare(&layout.directory, layout.loader.clone());
        }
        set
    }

    pub fn contains(&self, directory: &str) -> bool {
        self.declared.contains_key(normalize_directory(directory))
    }

    /// Loader refs of every declared layout.
    pub fn loader_refs(&self) -> impl Iterator<Item = &str> {
        self.declared.values().filter_map(|l| l.as_deref())
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }

    fn get(&self, directory: &str) -> Option<&Option<String>> {
        self.declared.get(directory)
    }
}

/// Result of a layout lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutHierarchy {
    /// Existing layouts, root first.
    pub layouts: Vec<Layout>,
    /// Segments of the route identifier.
    pub segments: Vec<String>,
    /// Every directory probed, in probe order.
    pub checked_paths: Vec<String>,
}

impl LayoutHierarchy {
    /// Layouts leaf-most first, the order a renderer wraps them in.
    pub fn compose_order(&self) -> impl Iterator<Item = &Layout> {
        self.layouts.iter().rev()
    }
}

/// Resolve the layouts enclosing `route_identifier`.
pub fn find_layout_hierarchy(route_identifier: &str, declared: &LayoutSet) -> LayoutHierarchy {
    let normalized = normalize_identifier(route_identifier);
    let segments: Vec<String> = normalized
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let mut hierarchy = LayoutHierarchy {
        segments,
        ..Default::default()
    };

    let mut prefix = String::new();
    probe(&mut hierarchy, declared, &prefix, 0);
    for depth in 0..hierarchy.segments.len() {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(&hierarchy.segments[depth]);
        let directory = prefix.clone();
        probe(&mut hierarchy, declared, &directory, depth + 1);
    }

    hierarchy
}

fn probe(hierarchy: &mut LayoutHierarchy, declared: &LayoutSet, directory: &str, depth: usize) {
    hierarchy.checked_paths.push(directory.to_string());
    if let Some(loader_ref) = declared.get(directory) {
        hierarchy.layouts.push(Layout {
            identifier: layout_identifier(directory),
            loader_ref: loader_ref.clone(),
            depth,
            directory: directory.to_string(),
        });
    }
}

fn layout_identifier(directory: &str) -> String {
    if directory.is_empty() {
        "layout".to_string()
    } else {
        format!("{directory}/layout")
    }
}

fn normalize_directory(directory: &str) -> &str {
    directory.trim().trim_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(dirs: &[&str]) -> LayoutSet {
        let mut set = LayoutSet::new();
        for dir in dirs {
            set.declare(dir, Some(format!("loader:{dir}")));
        }
        set
    }

    #[test]
    fn test_root_to_leaf_order() {
        let set = declared(&["a/b", "", "a"]);
        let hierarchy = find_layout_hierarchy("a/b/c", &set);
        let dirs: Vec<_> = hierarchy.layouts.iter().map(|l| l.directory.as_str()).collect();
        assert_eq!(dirs, vec!["", "a", "a/b"]);
        assert_eq!(hierarchy.checked_paths, vec!["", "a", "a/b", "a/b/c"]);
        assert_eq!(hierarchy.segments, vec!["a", "b", "c"]);
        assert_eq!(hierarchy.layouts[2].depth, 2);
    }

    #[test]
    fn test_missing_directories_skipped() {
        let set = declared(&["/", "a/b"]);
        let hierarchy = find_layout_hierarchy("/a/b/c/", &set);
        let dirs: Vec<_> = hierarchy.layouts.iter().map(|l| l.directory.as_str()).collect();
        assert_eq!(dirs, vec!["", "a/b"]);
    }

    #[test]
    fn test_root_route() {
        let set = declared(&[""]);
        let hierarchy = find_layout_hierarchy("index", &set);
        assert_eq!(hierarchy.layouts.len(), 1);
        assert_eq!(hierarchy.layouts[0].identifier, "layout");
        assert_eq!(hierarchy.checked_paths, vec![""]);
    }

    #[test]
    fn test_dynamic_directories() {
        let set = declared(&["blog/[slug]"]);
        let hierarchy = find_layout_hierarchy("blog/[slug]/comments", &set);
        assert_eq!(hierarchy.layouts.len(), 1);
        assert_eq!(hierarchy.layouts[0].identifier, "blog/[slug]/layout");
    }

    #[test]
    fn test_compose_order_is_leaf_first() {
        let set = declared(&["", "a"]);
        let hierarchy = find_layout_hierarchy("a/x", &set);
        let order: Vec<_> = hierarchy.compose_order().map(|l| l.directory.as_str()).collect();
        assert_eq!(order, vec!["a", ""]);
    }

    #[test]
    fn test_no_layouts() {
        let hierarchy = find_layout_hierarchy("a/b", &LayoutSet::new());
        assert!(hierarchy.layouts.is_empty());
        assert_eq!(hierarchy.checked_paths.len(), 3);
    }

    #[test]
    fn test_duplicate_declaration_last_wins() {
        let set = LayoutSet::from_config(&[
            LayoutConfig {
                directory: "blog".into(),
                loader: Some("first".into()),
            },
            LayoutConfig {
                directory: "/blog/".into(),
                loader: Some("second".into()),
            },
        ]);
        assert_eq!(set.len(), 1);
        assert!(set.contains("blog"));
        assert_eq!(set.loader_refs().collect::<Vec<_>>(), vec!["second"]);
    }
}
