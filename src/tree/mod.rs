//! Declared dependency tree extraction.
//!
//! The tree comes from an external provider (`npm ls`, `pnpm ls`, `yarn list`)
//! and is turned into package records in two phases: every qualifying node is
//! collected first, then one record per name is kept, newest version winning.

mod flatten;
mod normalize;
mod source;

use log::{debug, info};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::package::PackageRecord;
use crate::runtime::{Runtime, is_not_found, resolve_relative_path};

pub use flatten::{flatten, newest_per_name};
pub use normalize::{TreeNode, parse_tree_output};
pub use source::{Acquired, CommandSource, TreeSource};

#[cfg(test)]
pub use source::MockTreeSource;

/// Extracts deduplicated package records from a provider's dependency tree.
///
/// Results are cached per project directory for the lifetime of the extractor.
pub struct TreeExtractor<'a, R: Runtime> {
    runtime: &'a R,
    store_dir: String,
    sources: Vec<Box<dyn TreeSource + 'a>>,
    cache: Mutex<HashMap<PathBuf, Vec<PackageRecord>>>,
}

impl<'a, R: Runtime> TreeExtractor<'a, R> {
    /// Create an extractor trying the configured provider commands in order.
    pub fn new(runtime: &'a R, config: &DiscoveryConfig) -> Self {
        let sources = config
            .providers
            .iter()
            .map(|command| {
                Box::new(CommandSource::new(runtime, command.clone())) as Box<dyn TreeSource + 'a>
            })
            .collect();
        Self::with_sources(runtime, config, sources)
    }

    /// Create an extractor over an explicit, ordered list of providers.
    pub fn with_sources(
        runtime: &'a R,
        config: &DiscoveryConfig,
        sources: Vec<Box<dyn TreeSource + 'a>>,
    ) -> Self {
        Self {
            runtime,
            store_dir: config.store_dir.clone(),
            sources,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Newest record per package name for the project at `project_dir`.
    #[tracing::instrument(skip(self))]
    pub async fn extract(&self, project_dir: &Path) -> Result<Vec<PackageRecord>> {
        let project_dir = self.project_root(project_dir)?;
        if let Some(cached) = self.cached(&project_dir) {
            debug!("Using cached dependency tree for {:?}", project_dir);
            return Ok(cached);
        }

        let records = newest_per_name(self.collect_in(&project_dir).await?);
        info!(
            "Extracted {} packages from the dependency tree of {:?}",
            records.len(),
            project_dir
        );

        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(project_dir, records.clone());
        Ok(records)
    }

    /// Every qualifying record of the tree before deduplication; a name may
    /// appear once per installed version or location.
    pub async fn collect(&self, project_dir: &Path) -> Result<Vec<PackageRecord>> {
        let project_dir = self.project_root(project_dir)?;
        self.collect_in(&project_dir).await
    }

    async fn collect_in(&self, project_dir: &Path) -> Result<Vec<PackageRecord>> {
        let roots = self.acquire(project_dir).await?;
        Ok(flatten(&roots, project_dir, &self.store_dir))
    }

    /// Ask each provider in turn; the first whose output normalizes wins.
    async fn acquire(&self, project_dir: &Path) -> Result<Vec<TreeNode>> {
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.acquire(project_dir).await {
                Acquired::Output(output) => match parse_tree_output(&output) {
                    Ok(roots) => {
                        debug!("Using dependency tree from {}", source.name());
                        return Ok(roots);
                    }
                    Err(e) => {
                        debug!("Discarding output of {}: {}", source.name(), e);
                        failures.push(format!("{}: {}", source.name(), e));
                    }
                },
                Acquired::Failed(reason) => {
                    debug!("Tree provider {} failed: {}", source.name(), reason);
                    failures.push(format!("{}: {}", source.name(), reason));
                }
            }
        }

        Err(DiscoveryError::MalformedOutput(if failures.is_empty() {
            "no tree provider configured".to_string()
        } else {
            failures.join("; ")
        }))
    }

    fn project_root(&self, project_dir: &Path) -> Result<PathBuf> {
        let absolute = if project_dir.is_absolute() {
            project_dir.to_path_buf()
        } else {
            resolve_relative_path(&self.runtime.current_dir()?, project_dir)
        };
        match self.runtime.canonicalize(&absolute) {
            Ok(real) => Ok(real),
            Err(e) if is_not_found(&e) => Ok(absolute),
            Err(e) => Err(e.into()),
        }
    }

    fn cached(&self, project_dir: &Path) -> Option<Vec<PackageRecord>> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(project_dir)
            .cloned()
    }
}
