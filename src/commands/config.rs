use anyhow::Result;
use log::debug;
use std::path::PathBuf;

use crate::{
    config::DiscoveryConfig,
    runtime::{Runtime, resolve_relative_path},
};

/// Everything a command needs: the runtime, discovery settings and the project.
pub struct Config<R: Runtime> {
    pub runtime: R,
    pub discovery: DiscoveryConfig,
    /// Absolute project directory
    pub project_dir: PathBuf,
}

impl<R: Runtime> Config<R> {
    /// Build from the environment; `project` defaults to the working directory.
    pub fn new(runtime: R, project: Option<PathBuf>) -> Result<Self> {
        let discovery = DiscoveryConfig::from_runtime(&runtime);
        let cwd = runtime.current_dir()?;
        let project_dir = match project {
            Some(path) => resolve_relative_path(&cwd, &path),
            None => cwd,
        };
        debug!("Using project directory {:?}", project_dir);

        Ok(Self {
            runtime,
            discovery,
            project_dir,
        })
    }

    /// Resolve a command-line path against the working directory.
    pub fn resolve(&self, path: &std::path::Path) -> Result<PathBuf> {
        Ok(resolve_relative_path(&self.runtime.current_dir()?, path))
    }
}
