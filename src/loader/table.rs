//! In-process module host.
//!
//! Modules are linked into the host binary and bound by package name. A load
//! request resolves to the module bound to its package name, falling back to
//! the raw identifier. A module whose initializer panics fails to load like
//! one that returns an error.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::{LoadRequest, LoadedModule, ModuleHost, panic_message};

/// Builds a module instance for one load request.
pub type ModuleInit = Arc<dyn Fn(&LoadRequest) -> Result<LoadedModule> + Send + Sync>;

/// Table of modules available to the loader.
#[derive(Clone, Default)]
pub struct ModuleTable {
    modules: HashMap<String, ModuleInit>,
}

impl ModuleTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a module to a package name or identifier.
    ///
    /// A module already bound to `name` is replaced.
    pub fn register(&mut self, name: impl Into<String>, init: ModuleInit) {
        self.modules.insert(name.into(), init);
    }

    /// Check if a module is bound to `name`.
    pub fn has(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Bound names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn lookup(&self, request: &LoadRequest) -> Option<&ModuleInit> {
        request
            .package_name
            .as_deref()
            .and_then(|name| self.modules.get(name))
            .or_else(|| self.modules.get(&request.identifier))
    }
}

#[async_trait]
impl ModuleHost for ModuleTable {
    async fn instantiate(&self, request: &LoadRequest) -> Result<LoadedModule> {
        let init = self.lookup(request).with_context(|| {
            format!(
                "No module bound to '{}'",
                request.package_name.as_deref().unwrap_or(&request.identifier)
            )
        })?;
        panic::catch_unwind(AssertUnwindSafe(|| init(request)))
            .unwrap_or_else(|payload| Err(anyhow!("panicked: {}", panic_message(payload.as_ref()))))
            .with_context(|| format!("Module '{}' failed to initialize", request.identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Export;

    fn module_init(name: &'static str) -> ModuleInit {
        Arc::new(move |_: &LoadRequest| -> Result<LoadedModule> {
            Ok(LoadedModule::new(name).with_export("name", Export::Value(name.into())))
        })
    }

    fn request(identifier: &str, package_name: Option<&str>) -> LoadRequest {
        LoadRequest {
            identifier: identifier.to_string(),
            package_name: package_name.map(str::to_string),
            entry: None,
        }
    }

    #[test]
    fn test_register_and_names() {
        let mut table = ModuleTable::new();
        assert!(table.is_empty());

        table.register("b", module_init("b"));
        table.register("a", module_init("a"));
        table.register("a", module_init("a2"));

        assert_eq!(table.len(), 2);
        assert!(table.has("a"));
        assert!(!table.has("c"));
        assert_eq!(table.names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_instantiate_prefers_package_name() {
        let mut table = ModuleTable::new();
        table.register("pkg", module_init("by-name"));
        table.register("/abs/pkg", module_init("by-identifier"));

        let module = table
            .instantiate(&request("/abs/pkg", Some("pkg")))
            .await
            .unwrap();
        assert_eq!(module.name(), "by-name");

        let module = table
            .instantiate(&request("/abs/pkg", Some("other")))
            .await
            .unwrap();
        assert_eq!(module.name(), "by-identifier");
    }

    #[tokio::test]
    async fn test_instantiate_unbound() {
        let table = ModuleTable::new();
        let err = table
            .instantiate(&request("missing", Some("missing")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No module bound to 'missing'"));
    }

    #[tokio::test]
    async fn test_instantiate_init_failure() {
        let mut table = ModuleTable::new();
        table.register(
            "broken",
            Arc::new(|_: &LoadRequest| -> Result<LoadedModule> { anyhow::bail!("boom") }),
        );

        let err = table
            .instantiate(&request("broken", None))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("boom"));
    }

    #[tokio::test]
    async fn test_instantiate_init_panic_is_a_failure() {
        let mut table = ModuleTable::new();
        table.register(
            "panicky",
            Arc::new(|_: &LoadRequest| -> Result<LoadedModule> { panic!("init exploded") }),
        );

        let err = table
            .instantiate(&request("panicky", None))
            .await
            .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Module 'panicky' failed to initialize"));
        assert!(message.contains("init exploded"));
    }
}
