//! Path utility functions for normalization and comparison.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by processing `.` and `..` components lexically.
/// This does not access the filesystem and does not follow symlinks.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Keep the `..` when there is nothing left to pop
                if !result.pop() {
                    result.push(component);
                }
            }
            _ => result.push(component),
        }
    }
    result
}

/// Resolve a possibly relative path against a base directory.
///
/// For example, with base `/work/app` and path `../lib/pkg` this returns
/// `/work/lib/pkg`. Absolute paths are returned normalized but otherwise as-is.
pub fn resolve_relative_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base_dir.join(path))
    }
}

/// Number of normal components in a path, used as its nesting depth.
///
/// `/app/node_modules/a/node_modules/b` is deeper than `/app/node_modules/b`.
pub fn path_depth(path: &Path) -> usize {
    normalize_path(path)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

/// Returns the final component of a path as UTF-8, if any.
pub fn base_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}
