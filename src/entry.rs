//! Entry file resolution for installed packages.

use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{DiscoveryError, Result};
use crate::package::Manifest;
use crate::runtime::{Runtime, resolve_relative_path};

/// Conventional index file of a package or directory.
pub const INDEX_FILE: &str = "index.js";

/// Extension probed for an extensionless entry candidate.
const PROBE_EXTENSION: &str = "js";

/// Tried in order when the declared entry is not a readable file.
pub const ENTRY_FALLBACKS: &[&str] = &[
    "index.js",
    "index.mjs",
    "index.cjs",
    "lib/index.js",
    "dist/index.js",
    "src/index.js",
];

/// Resolves the entry file of a package directory, caching by directory.
pub struct EntryResolver<'a, R: Runtime> {
    runtime: &'a R,
    cache: Mutex<HashMap<PathBuf, PathBuf>>,
}

impl<'a, R: Runtime> EntryResolver<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self {
            runtime,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Absolute path of the file `package_dir` designates as its implementation.
    ///
    /// The manifest `module` field is preferred over `main`; without either the
    /// conventional index file is assumed. A missing or malformed manifest
    /// counts as declaring nothing.
    #[tracing::instrument(skip(self))]
    pub fn resolve_entry(&self, package_dir: &Path) -> Result<PathBuf> {
        if let Some(entry) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(package_dir)
        {
            return Ok(entry.clone());
        }

        let entry = self.find_entry(package_dir)?;
        debug!("Entry of {:?} is {:?}", package_dir, entry);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(package_dir.to_path_buf(), entry.clone());
        Ok(entry)
    }

    fn find_entry(&self, package_dir: &Path) -> Result<PathBuf> {
        let manifest = Manifest::load_or_default(self.runtime, package_dir)?;
        let declared = manifest
            .module
            .as_deref()
            .or(manifest.main.as_deref())
            .filter(|candidate| !candidate.trim().is_empty())
            .unwrap_or(INDEX_FILE);

        let candidate = self.expand_candidate(package_dir, declared);
        if self.runtime.is_file(&candidate) {
            return Ok(candidate);
        }
        debug!(
            "Declared entry {:?} of {:?} is not a file, trying conventional names",
            declared, package_dir
        );

        ENTRY_FALLBACKS
            .iter()
            .map(|name| package_dir.join(name))
            .find(|path| self.runtime.is_file(path))
            .ok_or_else(|| DiscoveryError::not_found("entry file", package_dir))
    }

    /// Apply the extension probe and directory-index rule to a declared entry.
    fn expand_candidate(&self, package_dir: &Path, declared: &str) -> PathBuf {
        let path = resolve_relative_path(package_dir, Path::new(declared));
        if names_directory(declared) {
            return path.join(INDEX_FILE);
        }
        if Path::new(declared).extension().is_some() {
            return path;
        }

        let probed = path.with_extension(PROBE_EXTENSION);
        if self.runtime.exists(&probed) {
            probed
        } else {
            path.join(INDEX_FILE)
        }
    }
}

/// True when the declared entry can only denote a directory.
fn names_directory(declared: &str) -> bool {
    declared.ends_with('/')
        || declared.ends_with('\\')
        || matches!(declared.trim_end_matches(['/', '\\']), "." | "..")
}
