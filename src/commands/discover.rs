use anyhow::Result;
use log::debug;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::{Config, print_json};
use crate::{
    entry::EntryResolver,
    package::{PackageRecord, StoreWalker},
    runtime::Runtime,
    tree::TreeExtractor,
};

/// Print every package directory of the project store (or of `store`).
#[tracing::instrument(skip(runtime, project))]
pub fn enumerate<R: Runtime>(
    runtime: R,
    project: Option<PathBuf>,
    store: Option<PathBuf>,
) -> Result<()> {
    let config = Config::new(runtime, project)?;
    print_json(&enumerate_report(&config, store.as_deref())?)
}

pub(crate) fn enumerate_report<R: Runtime>(
    config: &Config<R>,
    store: Option<&Path>,
) -> Result<BTreeSet<PathBuf>> {
    let walker = StoreWalker::new(&config.runtime, &config.discovery);
    match store {
        Some(store) => walker.enumerate(&config.resolve(store)?, &BTreeSet::new()),
        None => walker.enumerate_project(&config.project_dir),
    }
}

/// Print the deduplicated dependency tree of the project.
#[tracing::instrument(skip(runtime, project))]
pub async fn extract<R: Runtime>(runtime: R, project: Option<PathBuf>, entries: bool) -> Result<()> {
    let config = Config::new(runtime, project)?;
    print_json(&extract_report(&config, entries).await?)
}

pub(crate) async fn extract_report<R: Runtime>(
    config: &Config<R>,
    entries: bool,
) -> Result<Vec<PackageRecord>> {
    let extractor = TreeExtractor::new(&config.runtime, &config.discovery);
    let mut records = extractor.extract(&config.project_dir).await?;

    if entries {
        let resolver = EntryResolver::new(&config.runtime);
        for record in &mut records {
            match resolver.resolve_entry(&record.path) {
                Ok(entry) => record.entry_path = Some(entry),
                Err(e) if e.is_not_found() => debug!("{} has no entry file", record),
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(records)
}

/// Print the entry file of one package directory.
#[tracing::instrument(skip(runtime))]
pub fn entry<R: Runtime>(runtime: R, package_dir: &Path) -> Result<()> {
    let config = Config::new(runtime, None)?;
    let package_dir = config.resolve(package_dir)?;
    let entry = EntryResolver::new(&config.runtime).resolve_entry(&package_dir)?;
    print_json(&entry)
}
