use anyhow::Result;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::DiscoveryConfig;
use crate::runtime::{Runtime, base_name, is_not_found};

/// Enumerates the canonical directories of every package in a module store.
///
/// Handles both store layouts:
/// - flat: `<store>/<pkg>` and `<store>/@group/<pkg>`, any of which may carry
///   its own nested `<pkg>/<store>`
/// - content-addressed: top-level entries are links into a hidden side index
///   (`<store>/.pnpm/<pkg>@<ver>/<store>/<pkg>`); the side index is reached as a
///   nested store through the real parent of each linked package
pub struct StoreWalker<'a, R: Runtime> {
    runtime: &'a R,
    config: &'a DiscoveryConfig,
}

impl<'a, R: Runtime> StoreWalker<'a, R> {
    pub fn new(runtime: &'a R, config: &'a DiscoveryConfig) -> Self {
        Self { runtime, config }
    }

    /// Enumerate the store of a project directory (`<project>/node_modules`).
    pub fn enumerate_project(&self, project_dir: &Path) -> Result<BTreeSet<PathBuf>> {
        self.enumerate(&project_dir.join(&self.config.store_dir), &BTreeSet::new())
    }

    /// Enumerate every package directory reachable from `store_root`.
    ///
    /// Returns canonical paths; paths in `exclude` are never reported.
    /// A missing root yields an empty set.
    #[tracing::instrument(skip(self, exclude))]
    pub fn enumerate(
        &self,
        store_root: &Path,
        exclude: &BTreeSet<PathBuf>,
    ) -> Result<BTreeSet<PathBuf>> {
        if !self.runtime.exists(store_root) {
            warn!("Module store {:?} does not exist", store_root);
            return Ok(BTreeSet::new());
        }

        let mut visited_stores = BTreeSet::new();
        let found = self.walk(store_root, exclude, &mut visited_stores)?;

        // Links may have changed while nested stores were walked
        let mut packages = BTreeSet::new();
        for path in found {
            if let Some(real) = self.real_path(&path)? {
                packages.insert(real);
            }
        }
        debug!("Found {} packages under {:?}", packages.len(), store_root);
        Ok(packages)
    }

    fn walk(
        &self,
        store: &Path,
        exclude: &BTreeSet<PathBuf>,
        visited_stores: &mut BTreeSet<PathBuf>,
    ) -> Result<BTreeSet<PathBuf>> {
        let Some(store_real) = self.real_path(store)? else {
            return Ok(BTreeSet::new());
        };
        if !visited_stores.insert(store_real.clone()) {
            return Ok(BTreeSet::new());
        }

        let mut found = BTreeSet::new();
        for candidate in self.list_candidates(store)? {
            let Some(real) = self.real_path(&candidate)? else {
                continue;
            };
            if !exclude.contains(&real) {
                found.insert(real);
            }
        }

        let mut nested_stores = BTreeSet::new();
        for package in &found {
            let own_store = package.join(&self.config.store_dir);
            if self.runtime.is_dir(&own_store) {
                nested_stores.insert(own_store);
            }
            if let Some(parent_store) = self.containing_store(package)
                && parent_store != store_real
            {
                nested_stores.insert(parent_store);
            }
        }

        let mut seen: BTreeSet<PathBuf> = exclude.union(&found).cloned().collect();
        let mut all = found;
        for nested in nested_stores {
            debug!("Descending into nested store {:?}", nested);
            let more = self.walk(&nested, &seen, visited_stores)?;
            seen.extend(more.iter().cloned());
            all.extend(more);
        }
        Ok(all)
    }

    /// List package directory candidates of one store, expanding groups.
    fn list_candidates(&self, store: &Path) -> Result<Vec<PathBuf>> {
        let mut plain = Vec::new();
        let mut groups = Vec::new();
        for entry in self.runtime.read_dir(store)? {
            match base_name(&entry) {
                Some(name) if name.starts_with('.') => {}
                Some(name) if self.config.is_group(name) => groups.push(entry),
                Some(_) => plain.push(entry),
                None => debug!("Skipping non UTF-8 entry {:?}", entry),
            }
        }

        for group in groups {
            if !self.runtime.is_dir(&group) {
                continue;
            }
            for entry in self.runtime.read_dir(&group)? {
                if base_name(&entry).is_some_and(|name| !name.starts_with('.')) {
                    plain.push(entry);
                }
            }
        }

        // is_dir follows links, so dangling links and stray files drop out here
        Ok(plain
            .into_iter()
            .filter(|p| self.runtime.is_dir(p))
            .collect())
    }

    /// The store directory that really holds `package`, one grouping level stripped.
    ///
    /// Only directories named like a store qualify, so packages linked in from
    /// plain source folders do not drag their siblings in.
    fn containing_store(&self, package: &Path) -> Option<PathBuf> {
        let mut parent = package.parent()?;
        if base_name(parent).is_some_and(|name| self.config.is_group(name)) {
            parent = parent.parent()?;
        }
        (base_name(parent) == Some(self.config.store_dir.as_str())).then(|| parent.to_path_buf())
    }

    fn real_path(&self, path: &Path) -> Result<Option<PathBuf>> {
        match self.runtime.canonicalize(path) {
            Ok(real) => Ok(Some(real)),
            Err(e) if is_not_found(&e) => {
                debug!("Skipping {:?}: target is absent", path);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::io;

    #[test]
    fn test_enumerate_missing_root() {
        // Test that an empty set is returned when the store doesn't exist

        let mut runtime = MockRuntime::new();
        let root = PathBuf::from("/app/node_modules");

        // Directory exists: /app/node_modules -> false
        runtime
            .expect_exists()
            .with(eq(root.clone()))
            .returning(|_| false);

        let config = DiscoveryConfig::default();
        let walker = StoreWalker::new(&runtime, &config);
        let packages = walker.enumerate(&root, &BTreeSet::new()).unwrap();
        assert!(packages.is_empty());
    }

    #[test]
    fn test_enumerate_with_mock_groups() {
        // Test a flat store with one plain package and one grouped package

        let mut runtime = MockRuntime::new();
        let root = PathBuf::from("/app/node_modules");

        runtime.expect_exists().returning(|_| true);
        runtime.expect_canonicalize().returning(|p| Ok(p.to_path_buf()));

        // --- 1. Scan store: [.bin, @scope, plain] ---
        runtime
            .expect_read_dir()
            .with(eq(root.clone()))
            .returning(|p| Ok(vec![p.join(".bin"), p.join("@scope"), p.join("plain")]));

        // --- 2. Expand group: [@scope/grouped] ---
        runtime
            .expect_read_dir()
            .with(eq(root.join("@scope")))
            .returning(|p| Ok(vec![p.join("grouped")]));

        // Packages are directories, but carry no nested store
        runtime
            .expect_is_dir()
            .returning(|p| !p.ends_with("node_modules"));

        let config = DiscoveryConfig::default();
        let walker = StoreWalker::new(&runtime, &config);
        let packages = walker.enumerate(&root, &BTreeSet::new()).unwrap();

        let expected: BTreeSet<PathBuf> = [root.join("@scope/grouped"), root.join("plain")]
            .into_iter()
            .collect();
        assert_eq!(packages, expected);
    }

    #[test]
    fn test_enumerate_propagates_errors_inside_root() {
        let mut runtime = MockRuntime::new();
        let root = PathBuf::from("/app/node_modules");

        runtime.expect_exists().returning(|_| true);
        runtime.expect_canonicalize().returning(|p| Ok(p.to_path_buf()));
        runtime.expect_read_dir().returning(|_| {
            Err(anyhow::Error::new(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "denied",
            )))
        });

        let config = DiscoveryConfig::default();
        let walker = StoreWalker::new(&runtime, &config);
        assert!(walker.enumerate(&root, &BTreeSet::new()).is_err());
    }
}
