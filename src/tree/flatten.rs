//! Flattening of a normalized tree into package records, then newest-wins dedup.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::normalize::TreeNode;
use crate::package::{PackageRecord, VersionComparator};
use crate::runtime::{path_depth, resolve_relative_path};

/// Collect every qualifying package of the tree, depth first.
///
/// A node qualifies when it has a name and a version and does not sit at the
/// project root. Records are keyed by `name@version:path`; a key seen before
/// is neither re-emitted nor re-descended, which also ends any cycle. The same
/// name may still appear several times at different versions or paths.
pub fn flatten(roots: &[TreeNode], project_dir: &Path, store_dir: &str) -> Vec<PackageRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    // (node, is_root); children pushed reversed to keep pre-order
    let mut stack: Vec<(&TreeNode, bool)> = roots.iter().rev().map(|n| (n, true)).collect();
    while let Some((node, is_root)) = stack.pop() {
        if let Some(record) = qualify(node, is_root, project_dir, store_dir) {
            if !seen.insert(record.key()) {
                continue;
            }
            records.push(record);
        }
        stack.extend(node.dependencies.iter().rev().map(|n| (n, false)));
    }
    records
}

fn qualify(
    node: &TreeNode,
    is_root: bool,
    project_dir: &Path,
    store_dir: &str,
) -> Option<PackageRecord> {
    let name = node.name.as_deref().filter(|n| !n.is_empty())?;
    let version = node.version.as_deref().filter(|v| !v.is_empty())?;
    let path = infer_path(node, name, is_root, project_dir, store_dir);
    if path == project_dir {
        return None;
    }
    Some(PackageRecord::new(name, version, path))
}

/// Explicit path, else a local `resolved` hint, else `<project>/<store>/<name>`.
/// A root without any location is the project itself.
fn infer_path(
    node: &TreeNode,
    name: &str,
    is_root: bool,
    project_dir: &Path,
    store_dir: &str,
) -> PathBuf {
    if let Some(path) = node.path.as_deref() {
        return resolve_relative_path(project_dir, Path::new(path));
    }

    if let Some(hint) = node.resolved.as_deref().and_then(local_location) {
        return resolve_relative_path(project_dir, Path::new(hint));
    }

    if is_root {
        return project_dir.to_path_buf();
    }

    let mut path = project_dir.join(store_dir);
    for segment in name.split('/') {
        path.push(segment);
    }
    path
}

/// Local part of a `resolved` value; registry URLs and VCS specs carry no location.
fn local_location(resolved: &str) -> Option<&str> {
    if let Some(rest) = resolved.strip_prefix("file:") {
        return Some(rest.strip_prefix("//").unwrap_or(rest));
    }
    if resolved.contains("://") || (resolved.contains(':') && !Path::new(resolved).is_absolute()) {
        return None;
    }
    Some(resolved)
}

/// Keep one record per name, first-seen name order.
///
/// Several candidates prefer the highest valid version; when no candidate has
/// a valid version the most deeply nested path wins. Remaining ties go to the
/// candidate seen first.
pub fn newest_per_name(records: Vec<PackageRecord>) -> Vec<PackageRecord> {
    let mut order: Vec<Vec<PackageRecord>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        match index.get(&record.name) {
            Some(&i) => order[i].push(record),
            None => {
                index.insert(record.name.clone(), order.len());
                order.push(vec![record]);
            }
        }
    }

    order.into_iter().filter_map(pick_newest).collect()
}

fn pick_newest(candidates: Vec<PackageRecord>) -> Option<PackageRecord> {
    let any_valid = candidates
        .iter()
        .any(|c| VersionComparator::is_valid(&c.version));

    let mut best: Option<PackageRecord> = None;
    for candidate in candidates {
        let replace = match &best {
            None => !any_valid || VersionComparator::is_valid(&candidate.version),
            Some(current) if any_valid => {
                VersionComparator::is_newer(&candidate.version, &current.version)
            }
            Some(current) => path_depth(&candidate.path) > path_depth(&current.path),
        };
        if replace {
            best = Some(candidate);
        }
    }
    best
}
