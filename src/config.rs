//! Discovery settings shared by the walker, extractor, loader and registry.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::runtime::Runtime;

/// Default directory name of a module store.
pub const DEFAULT_STORE_DIR: &str = "node_modules";

/// Prefix marking a grouping (scope) directory inside a store.
pub const DEFAULT_GROUP_PREFIX: char = '@';

/// Base-name prefix of packages that are considered parser plugins.
pub const DEFAULT_PLUGIN_PREFIX: &str = "modscan-parser-";

/// Manifest file read from every package directory.
pub const MANIFEST_FILE: &str = "package.json";

/// A tree-listing command tried by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ProviderCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Well-known provider by short name (`npm`, `pnpm`, `yarn`).
    pub fn named(name: &str) -> Option<Self> {
        match name.trim() {
            "npm" => Some(Self::new("npm", &["ls", "--all", "--json", "--long"])),
            "pnpm" => Some(Self::new(
                "pnpm",
                &["ls", "--json", "--depth", "Infinity", "--long"],
            )),
            "yarn" => Some(Self::new("yarn", &["list", "--json"])),
            _ => None,
        }
    }
}

/// Discovery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Name of the store directory inside a project or package
    pub store_dir: String,
    /// Prefix character of grouping directories
    pub group_prefix: char,
    /// Base-name prefix selecting parser plugin packages
    pub plugin_prefix: String,
    /// Tree providers in preference order
    pub providers: Vec<ProviderCommand>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            store_dir: DEFAULT_STORE_DIR.to_string(),
            group_prefix: DEFAULT_GROUP_PREFIX,
            plugin_prefix: DEFAULT_PLUGIN_PREFIX.to_string(),
            providers: ["npm", "pnpm", "yarn"]
                .iter()
                .filter_map(|name| ProviderCommand::named(name))
                .collect(),
        }
    }
}

impl DiscoveryConfig {
    /// Build the configuration from defaults overridden by environment variables:
    ///
    /// - `MODSCAN_STORE_DIR` - store directory name
    /// - `MODSCAN_PLUGIN_PREFIX` - plugin package prefix
    /// - `MODSCAN_TREE_PROVIDERS` - comma-separated provider names, e.g. `pnpm,npm`
    pub fn from_runtime<R: Runtime>(runtime: &R) -> Self {
        let mut config = Self::default();

        if let Ok(store_dir) = runtime.env_var("MODSCAN_STORE_DIR")
            && !store_dir.trim().is_empty()
        {
            config.store_dir = store_dir.trim().to_string();
        }

        if let Ok(prefix) = runtime.env_var("MODSCAN_PLUGIN_PREFIX")
            && !prefix.trim().is_empty()
        {
            config.plugin_prefix = prefix.trim().to_string();
        }

        if let Ok(providers) = runtime.env_var("MODSCAN_TREE_PROVIDERS") {
            let parsed: Vec<ProviderCommand> = providers
                .split(',')
                .filter_map(|name| {
                    let command = ProviderCommand::named(name);
                    if command.is_none() && !name.trim().is_empty() {
                        debug!("Ignoring unknown tree provider {:?}", name.trim());
                    }
                    command
                })
                .collect();
            if !parsed.is_empty() {
                config.providers = parsed;
            }
        }

        config
    }

    /// True when the directory name denotes a grouping directory.
    pub fn is_group(&self, name: &str) -> bool {
        name.starts_with(self.group_prefix)
    }
}
