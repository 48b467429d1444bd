//! Path exclusion for raw watcher paths.
//!
//! Anything living under a dot-prefixed segment (`.git`, `.idea`, editor swap
//! directories, dotfiles) is never considered a repository change.

use std::path::{Component, Path, PathBuf};

/// Result of applying a [`PathFilter`] to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Include,
    Exclude,
}

/// Pure predicate deciding whether a watcher path goes on to reconciliation.
///
/// The unscoped filter looks at every segment of the path. A filter scoped to
/// a watch root skips the root's own segments, so a repository checked out
/// under e.g. `~/.local/src` is still observable.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    root: Option<PathBuf>,
}

impl PathFilter {
    /// A filter that inspects every segment of the given path.
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter that only inspects the segments below `root`.
    pub fn scoped(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn decide(&self, path: &Path) -> FilterDecision {
        let inspected = match &self.root {
            Some(root) => path.strip_prefix(root).unwrap_or(path),
            None => path,
        };

        let hidden = inspected.components().any(|component| match component {
            Component::Normal(segment) => segment.to_string_lossy().starts_with('.'),
            _ => false,
        });

        if hidden {
            FilterDecision::Exclude
        } else {
            FilterDecision::Include
        }
    }

    /// Convenience wrapper over [`PathFilter::decide`].
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.decide(path) == FilterDecision::Exclude
    }
}
