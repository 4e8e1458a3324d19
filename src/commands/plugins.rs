use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::{Config, print_json};
use crate::{
    loader::{ModuleHost, PluginLoader},
    parser::{ParseOptions, ParserRegistry},
    runtime::Runtime,
};

/// Summary of a loaded module.
#[derive(Serialize, Debug, PartialEq)]
pub struct ModuleReport {
    pub identifier: String,
    pub name: String,
    pub exports: Vec<String>,
}

/// Summary of one registered parser.
#[derive(Serialize, Debug, PartialEq)]
pub struct ParserReport {
    pub capability: String,
    pub type_pattern: String,
}

/// Load one module and print its exports, or `null` when it cannot be loaded.
#[tracing::instrument(skip(runtime, host, project))]
pub async fn load<R: Runtime, H: ModuleHost>(
    runtime: R,
    host: &H,
    project: Option<PathBuf>,
    identifier: &str,
) -> Result<()> {
    let config = Config::new(runtime, project)?;
    print_json(&load_report(&config, host, identifier).await)
}

pub(crate) async fn load_report<R: Runtime, H: ModuleHost>(
    config: &Config<R>,
    host: &H,
    identifier: &str,
) -> Option<ModuleReport> {
    let loader = PluginLoader::new(
        &config.runtime,
        host,
        &config.discovery,
        config.project_dir.clone(),
    );
    loader.load(identifier).await.map(|module| ModuleReport {
        identifier: identifier.to_string(),
        name: module.name().to_string(),
        exports: module.export_names().into_iter().map(str::to_string).collect(),
    })
}

/// Parse one file with the project's parser plugins and print the result.
#[tracing::instrument(skip(runtime, host, project))]
pub async fn parse<R: Runtime, H: ModuleHost>(
    runtime: R,
    host: &H,
    project: Option<PathBuf>,
    file: &Path,
    type_hint: Option<String>,
    sync: bool,
) -> Result<()> {
    let config = Config::new(runtime, project)?;
    print_json(&parse_report(&config, host, file, type_hint, sync).await?)
}

pub(crate) async fn parse_report<R: Runtime, H: ModuleHost>(
    config: &Config<R>,
    host: &H,
    file: &Path,
    type_hint: Option<String>,
    sync: bool,
) -> Result<Option<Value>> {
    let file = config.resolve(file)?;
    let registry = ParserRegistry::new(
        &config.runtime,
        host,
        &config.discovery,
        config.project_dir.clone(),
    );

    let mut options = ParseOptions {
        type_hint,
        ..Default::default()
    };
    if sync {
        options = options.sync();
    }
    Ok(registry.parse_file(&file, Some(options))?.await?)
}

/// Print the registered parsers in dispatch order.
#[tracing::instrument(skip(runtime, host, project))]
pub async fn parsers<R: Runtime, H: ModuleHost>(
    runtime: R,
    host: &H,
    project: Option<PathBuf>,
) -> Result<()> {
    let config = Config::new(runtime, project)?;
    print_json(&parsers_report(&config, host).await?)
}

pub(crate) async fn parsers_report<R: Runtime, H: ModuleHost>(
    config: &Config<R>,
    host: &H,
) -> Result<Vec<ParserReport>> {
    let registry = ParserRegistry::new(
        &config.runtime,
        host,
        &config.discovery,
        config.project_dir.clone(),
    );
    Ok(registry
        .parsers()
        .await?
        .iter()
        .map(|parser| ParserReport {
            capability: parser.capability().to_string(),
            type_pattern: parser.type_pattern().as_str().to_string(),
        })
        .collect())
}
