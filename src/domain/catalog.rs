//! Per-domain path registry.

use dashmap::{DashMap, DashSet};

use crate::error::Result;
use crate::selection::{parse_selection, SelectionObject};
use crate::value::ValueType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathInfo {
    pub value_type: ValueType,
    /// Public paths are listed by `get_paths`; private ones are only queryable.
    pub public: bool,
}

/// Registry of a domain's paths keyed by their index-free dotted form.
///
/// Backends may register fields discovered at start-up, so every map is
/// concurrent and the catalog is shared behind `&self`.
#[derive(Debug, Default)]
pub struct PathCatalog {
    paths: DashMap<String, PathInfo>,
    repeated: DashSet<String>,
    selections: DashMap<String, SelectionObject>,
}

impl PathCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paths<'a>(paths: impl IntoIterator<Item = (&'a str, ValueType)>) -> Self {
        let catalog = Self::new();
        for (path, value_type) in paths {
            catalog.register(path, value_type, true);
        }
        catalog
    }

    pub fn register(&self, path: &str, value_type: ValueType, public: bool) {
        self.paths.insert(path.to_string(), PathInfo { value_type, public });
    }

    /// Mark a path prefix (e.g. `alert.source`) as a repeated element.
    pub fn register_repeated(&self, prefix: &str) {
        self.repeated.insert(prefix.to_string());
    }

    pub fn is_repeated(&self, prefix: &str) -> bool {
        self.repeated.contains(prefix)
    }

    pub fn get(&self, path: &str) -> Option<PathInfo> {
        self.paths.get(path).map(|entry| *entry.value())
    }

    pub fn path_type(&self, path: &str) -> Option<ValueType> {
        self.get(path).map(|info| info.value_type)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    /// Sorted public paths.
    pub fn public_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .paths
            .iter()
            .filter(|entry| entry.value().public)
            .map(|entry| entry.key().clone())
            .collect();
        paths.sort();
        paths
    }

    /// Parse a selection, reusing a previous parse of the same text.
    pub fn parse_cached(&self, text: &str) -> Result<SelectionObject> {
        if let Some(hit) = self.selections.get(text) {
            return Ok(hit.value().clone());
        }
        let selection = parse_selection(text)?;
        self.selections.insert(text.to_string(), selection.clone());
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths_sorted() {
        let catalog = PathCatalog::with_paths([("log.message", ValueType::Text), ("log.host", ValueType::Text)]);
        catalog.register("log._raw_query", ValueType::Text, false);
        assert_eq!(catalog.public_paths(), vec!["log.host", "log.message"]);
        assert!(catalog.contains("log._raw_query"));
    }

    #[test]
    fn test_parse_cache() {
        let catalog = PathCatalog::new();
        let a = catalog.parse_cached("count(log.host)/group_by").unwrap();
        let b = catalog.parse_cached("count(log.host)/group_by").unwrap();
        assert_eq!(a, b);
        assert!(catalog.parse_cached("count(").is_err());
    }
}
