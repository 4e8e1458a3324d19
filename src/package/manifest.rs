use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::path::Path;

use crate::config::MANIFEST_FILE;
use crate::runtime::{Runtime, is_not_found};

/// The fields of a package manifest that discovery reads. Never written.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Manifest {
    pub name: Option<String>,
    pub version: Option<String>,
    /// Primary entry field
    pub main: Option<String>,
    /// Alternate module-style entry field, preferred over `main`
    pub module: Option<String>,
}

impl Manifest {
    /// Read `<package_dir>/package.json`.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, package_dir: &Path) -> Result<Self> {
        let path = package_dir.join(MANIFEST_FILE);
        let content = runtime.read_to_string(&path)?;
        let manifest: Manifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest {:?}", path))?;
        Ok(manifest)
    }

    /// Read the manifest, treating an absent or unparsable one as empty.
    ///
    /// Other read failures (permissions) still propagate.
    pub fn load_or_default<R: Runtime>(runtime: &R, package_dir: &Path) -> Result<Self> {
        match Self::load(runtime, package_dir) {
            Ok(manifest) => Ok(manifest),
            Err(e) if is_not_found(&e) => {
                debug!("No manifest in {:?}", package_dir);
                Ok(Self::default())
            }
            Err(e) if e.chain().any(|c| c.is::<serde_json::Error>()) => {
                debug!("Ignoring malformed manifest in {:?}: {:#}", package_dir, e);
                Ok(Self::default())
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
    use std::path::PathBuf;

    #[test]
    fn test_load_manifest() {
        let mut runtime = MockRuntime::new();
        let dir = PathBuf::from("/app/node_modules/pkg");

        runtime
            .expect_read_to_string()
            .with(eq(dir.join("package.json")))
            .returning(|_| {
                Ok(r#"{
                    "name": "pkg",
                    "version": "1.0.0",
                    "main": "lib/index.js",
                    "module": "es/index.mjs",
                    "dependencies": {"b": "^1.0.0"},
                    "devDependencies": {"a": "^2.0.0", "b": "^1.0.0"},
                    "scripts": {"test": "jest"}
                }"#
                .to_string())
            });

        let manifest = Manifest::load(&runtime, &dir).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("pkg"));
        assert_eq!(manifest.main.as_deref(), Some("lib/index.js"));
        assert_eq!(manifest.module.as_deref(), Some("es/index.mjs"));
        assert_eq!(manifest.version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_load_or_default_missing_manifest() {
        let mut runtime = MockRuntime::new();
        runtime.expect_read_to_string().returning(|_| {
            Err(anyhow::Error::new(io::Error::new(
                io::ErrorKind::NotFound,
                "missing",
            )))
        });

        let manifest = Manifest::load_or_default(&runtime, Path::new("/pkg")).unwrap();
        assert_eq!(manifest, Manifest::default());
    }

    #[test]
    fn test_load_or_default_malformed_manifest() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok("{ not json".to_string()));

        let manifest = Manifest::load_or_default(&runtime, Path::new("/pkg")).unwrap();
        assert_eq!(manifest, Manifest::default());
    }

    #[test]
    fn test_load_or_default_propagates_other_errors() {
        let mut runtime = MockRuntime::new();
        runtime.expect_read_to_string().returning(|_| {
            Err(anyhow::Error::new(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "denied",
            )))
        });

        assert!(Manifest::load_or_default(&runtime, Path::new("/pkg")).is_err());
    }
}
