//! Materialized path arithmetic
//!
//! A category's `tree_path` lists its ancestor ids from the root down to the
//! immediate parent, e.g. `"/1/2/"`. Roots carry `"/"`.

use crate::models::{CategoryId, ValidationError, ROOT_TREE_PATH};

const PATH_SEPARATOR: char = '/';

pub struct PathCalculator;

impl PathCalculator {
    /// Path of a child created under `parent_id` whose own path is `parent_path`
    ///
    /// `parent_id = None` yields the root path. `parent_path` is assumed
    /// well-formed.
    ///
    /// ```
    /// use qbank_core::services::PathCalculator;
    ///
    /// assert_eq!(PathCalculator::compute_path("/", None), "/");
    /// assert_eq!(PathCalculator::compute_path("/", Some(1)), "/1/");
    /// assert_eq!(PathCalculator::compute_path("/1/", Some(2)), "/1/2/");
    /// ```
    pub fn compute_path(parent_path: &str, parent_id: Option<CategoryId>) -> String {
        match parent_id {
            Some(id) => format!("{}{}{}", parent_path, id, PATH_SEPARATOR),
            None => ROOT_TREE_PATH.to_string(),
        }
    }

    /// Path built from an ancestor chain (root first)
    pub fn path_from_chain(chain: &[CategoryId]) -> String {
        chain.iter().fold(ROOT_TREE_PATH.to_string(), |path, id| {
            Self::compute_path(&path, Some(*id))
        })
    }

    /// Parse a path back into its ancestor chain (root first)
    pub fn parse_path(path: &str) -> Result<Vec<CategoryId>, ValidationError> {
        if path == ROOT_TREE_PATH {
            return Ok(Vec::new());
        }

        let invalid = || ValidationError::InvalidTreePath(path.to_string());

        let inner = path
            .strip_prefix(PATH_SEPARATOR)
            .and_then(|rest| rest.strip_suffix(PATH_SEPARATOR))
            .ok_or_else(invalid)?;

        inner
            .split(PATH_SEPARATOR)
            .map(|segment| match segment.parse::<CategoryId>() {
                Ok(id) if id > 0 => Ok(id),
                _ => Err(invalid()),
            })
            .collect()
    }

    /// Replace the `old_prefix` of `path` with `new_prefix`
    ///
    /// Used when a subtree moves: every descendant path starts with the moved
    /// node's old subtree prefix. Returns `None` when `path` does not start
    /// with `old_prefix`.
    ///
    /// ```
    /// use qbank_core::services::PathCalculator;
    ///
    /// let moved = PathCalculator::rebase("/1/2/3/", "/1/2/", "/5/2/");
    /// assert_eq!(moved.as_deref(), Some("/5/2/3/"));
    /// assert!(PathCalculator::rebase("/4/", "/1/", "/2/").is_none());
    /// ```
    pub fn rebase(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
        path.strip_prefix(old_prefix)
            .map(|rest| format!("{}{}", new_prefix, rest))
    }
}
