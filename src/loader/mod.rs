//! Plugin loading.
//!
//! Loading is staged: direct resolution first, then lookup in the project
//! store or as a path, then entry file resolution from the manifest, then
//! instantiation by the [`ModuleHost`]. [`PluginLoader::load`] never fails;
//! a broken plugin is logged and skipped so the others still load.

mod table;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::package::Manifest;
use crate::parser::ParserFactory;
use crate::runtime::{Runtime, base_name, resolve_relative_path};

pub use table::{ModuleInit, ModuleTable};

/// Extensions of loadable module files, in probe order.
pub const LOADABLE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs"];

/// What the loader asks a host to instantiate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// The identifier the caller asked for
    pub identifier: String,
    /// Package name from the manifest, or the bare name for direct loads
    pub package_name: Option<String>,
    /// Resolved entry file, when one was located
    pub entry: Option<PathBuf>,
}

/// A named symbol exported by a loaded module.
#[derive(Clone)]
pub enum Export {
    Parser(ParserFactory),
    Value(Value),
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Export::Parser(_) => write!(f, "Parser(..)"),
            Export::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

/// A module instance with its exported symbols.
#[derive(Debug, Clone, Default)]
pub struct LoadedModule {
    name: String,
    exports: BTreeMap<String, Export>,
}

impl LoadedModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exports: BTreeMap::new(),
        }
    }

    pub fn with_export(mut self, symbol: impl Into<String>, export: Export) -> Self {
        self.exports.insert(symbol.into(), export);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn export(&self, symbol: &str) -> Option<&Export> {
        self.exports.get(symbol)
    }

    /// Exported symbol names, sorted.
    pub fn export_names(&self) -> Vec<&str> {
        self.exports.keys().map(String::as_str).collect()
    }
}

/// Instantiates modules on behalf of the loader.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModuleHost: Send + Sync {
    async fn instantiate(&self, request: &LoadRequest) -> AnyResult<LoadedModule>;
}

/// Loads plugin modules for one project.
pub struct PluginLoader<'a, R: Runtime, H: ModuleHost> {
    runtime: &'a R,
    host: &'a H,
    project_dir: PathBuf,
    store_dir: String,
}

impl<'a, R: Runtime, H: ModuleHost> PluginLoader<'a, R, H> {
    pub fn new(
        runtime: &'a R,
        host: &'a H,
        config: &DiscoveryConfig,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runtime,
            host,
            project_dir: project_dir.into(),
            store_dir: config.store_dir.clone(),
        }
    }

    /// Load the module behind `identifier`, or `None` when it cannot be found
    /// or fails to instantiate. Failures are logged with the identifier.
    pub async fn load(&self, identifier: &str) -> Option<LoadedModule> {
        match self.try_load(identifier).await {
            Ok(module) => Some(module),
            Err(e) if e.is_not_found() => {
                debug!("Skipping module '{}': {}", identifier, e);
                None
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    /// Same staged strategy as [`PluginLoader::load`] with a typed failure.
    #[tracing::instrument(skip(self))]
    pub async fn try_load(&self, identifier: &str) -> Result<LoadedModule> {
        // --- 1. Direct resolution ---
        if let Some(request) = self.direct_request(identifier) {
            match self.host.instantiate(&request).await {
                Ok(module) => return Ok(module),
                Err(e) => debug!("Direct load of '{}' failed: {:#}", identifier, e),
            }
        }

        // --- 2. Project store, then plain path ---
        let candidate = self
            .locate(identifier)
            .ok_or_else(|| DiscoveryError::not_found("module", identifier))?;

        // --- 3. Loadable entry file ---
        let (entry, package_name) = self.loadable_entry(&candidate)?;
        debug!("Loading '{}' from {:?}", identifier, entry);

        // --- 4. Instantiate ---
        let request = LoadRequest {
            identifier: identifier.to_string(),
            package_name,
            entry: Some(entry),
        };
        self.host
            .instantiate(&request)
            .await
            .map_err(|e| DiscoveryError::load_failure(identifier, e))
    }

    /// A request the host may satisfy without consulting the store: an
    /// existing absolute file, a `file://` URL, another URL or a bare name.
    fn direct_request(&self, identifier: &str) -> Option<LoadRequest> {
        let request = |package_name: Option<String>, entry: Option<PathBuf>| LoadRequest {
            identifier: identifier.to_string(),
            package_name,
            entry,
        };

        if let Some(path) = local_path(identifier) {
            return self
                .runtime
                .is_file(&path)
                .then(|| request(None, Some(path)));
        }
        if identifier.contains("://") {
            return Some(request(None, None));
        }
        is_bare_name(identifier).then(|| request(Some(identifier.to_string()), None))
    }

    fn locate(&self, identifier: &str) -> Option<PathBuf> {
        if is_bare_name(identifier) {
            let mut in_store = self.project_dir.join(&self.store_dir);
            for segment in identifier.split('/') {
                in_store.push(segment);
            }
            if self.runtime.exists(&in_store) {
                return Some(in_store);
            }
        }

        let path = local_path(identifier).unwrap_or_else(|| PathBuf::from(identifier));
        let path = resolve_relative_path(&self.project_dir, &path);
        self.runtime.exists(&path).then_some(path)
    }

    /// Entry file and package name of a located module.
    fn loadable_entry(&self, candidate: &Path) -> Result<(PathBuf, Option<String>)> {
        if self.runtime.is_file(candidate) {
            return Ok((candidate.to_path_buf(), None));
        }

        let manifest = Manifest::load_or_default(self.runtime, candidate)?;
        let main = manifest
            .main
            .as_deref()
            .filter(|main| !main.trim().is_empty())
            .map(|main| resolve_relative_path(candidate, Path::new(main)));

        let entry = loadable_candidates(candidate, main.as_deref())
            .into_iter()
            .find(|path| self.runtime.is_file(path))
            .ok_or_else(|| DiscoveryError::not_found("loadable entry", candidate))?;

        let package_name = manifest
            .name
            .filter(|name| !name.is_empty())
            .or_else(|| base_name(candidate).map(str::to_string));
        Ok((entry, package_name))
    }
}

/// `<main>`, `<main>.<ext>`, `<main>/index.<ext>`; just `index.<ext>` without a main.
fn loadable_candidates(dir: &Path, main: Option<&Path>) -> Vec<PathBuf> {
    let with_ext = |base: &Path, ext: &str| {
        let mut name = OsString::from(base.as_os_str());
        name.push(".");
        name.push(ext);
        PathBuf::from(name)
    };

    let mut candidates = Vec::new();
    match main {
        Some(main) => {
            candidates.push(main.to_path_buf());
            candidates.extend(LOADABLE_EXTENSIONS.iter().map(|ext| with_ext(main, ext)));
            let index = main.join("index");
            candidates.extend(LOADABLE_EXTENSIONS.iter().map(|ext| with_ext(&index, ext)));
        }
        None => {
            let index = dir.join("index");
            candidates.extend(LOADABLE_EXTENSIONS.iter().map(|ext| with_ext(&index, ext)));
        }
    }
    candidates
}

/// Filesystem location named by an absolute path or `file://` URL.
fn local_path(identifier: &str) -> Option<PathBuf> {
    if let Some(rest) = identifier.strip_prefix("file://") {
        return Some(PathBuf::from(rest));
    }
    let path = Path::new(identifier);
    path.is_absolute().then(|| path.to_path_buf())
}

/// A package name such as `pkg` or `@group/pkg`, as opposed to a path or URL.
/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn is_bare_name(identifier: &str) -> bool {
    !identifier.is_empty()
        && !identifier.starts_with('.')
        && !identifier.contains("://")
        && !identifier.contains('\\')
        && !Path::new(identifier).is_absolute()
}
