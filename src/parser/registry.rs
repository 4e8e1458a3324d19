//! Parser registry and content dispatch.

use log::{debug, info, warn};
use serde_json::Value;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::{Capability, PARSER_EXPORT, ParseMode, ParseOptions, ParserPlugin};
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::loader::{Export, LoadedModule, ModuleHost, PluginLoader, panic_message};
use crate::package::StoreWalker;
use crate::runtime::{Runtime, base_name};

/// Parsers discovered in a project store, in discovery order.
///
/// Discovery runs on first use. Concurrent early callers all wait for the same
/// pass and never observe a partially populated list. The outcome of the pass
/// is kept, so a failure is reported to every later caller without rerunning
/// discovery.
pub struct ParserRegistry<'a, R: Runtime, H: ModuleHost> {
    runtime: &'a R,
    config: &'a DiscoveryConfig,
    project_dir: PathBuf,
    loader: PluginLoader<'a, R, H>,
    parsers: OnceCell<std::result::Result<Vec<Arc<dyn ParserPlugin>>, Arc<DiscoveryError>>>,
}

impl<'a, R: Runtime, H: ModuleHost> ParserRegistry<'a, R, H> {
    pub fn new(
        runtime: &'a R,
        host: &'a H,
        config: &'a DiscoveryConfig,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        let project_dir = project_dir.into();
        Self {
            runtime,
            config,
            loader: PluginLoader::new(runtime, host, config, project_dir.clone()),
            project_dir,
            parsers: OnceCell::new(),
        }
    }

    /// Wait until discovery has completed.
    pub async fn ready(&self) -> Result<()> {
        self.parsers().await.map(|_| ())
    }

    /// The registered parsers, first discovered first.
    pub async fn parsers(&self) -> Result<&[Arc<dyn ParserPlugin>]> {
        let outcome = self
            .parsers
            .get_or_init(|| async { self.discover().await.map_err(Arc::new) })
            .await;
        match outcome {
            Ok(parsers) => Ok(parsers.as_slice()),
            Err(e) => Err(DiscoveryError::Shared(Arc::clone(e))),
        }
    }

    /// Parse `content` with the first parser matching the type token.
    ///
    /// The token is `type_hint`, else the extension of `path`. No matching
    /// parser (or no token at all) is `Ok(None)`.
    pub async fn parse_content(&self, content: &str, options: ParseOptions) -> Result<Option<Value>> {
        let parsers = self.parsers().await?;
        let Some(token) = options.type_token() else {
            debug!("No content type given, nothing to dispatch");
            return Ok(None);
        };

        let Some(parser) = parsers.iter().find(|p| p.type_pattern().is_match(&token)) else {
            debug!("No parser registered for type {:?}", token);
            return Ok(None);
        };

        let value = match options.mode {
            ParseMode::Async => parser.parse(content).await,
            ParseMode::Sync => parser.parse_sync(content),
        }?;
        Ok(Some(value))
    }

    /// Read `path` and parse it like [`ParserRegistry::parse_content`].
    ///
    /// Omitting `options` is rejected right away, before the returned future
    /// exists and without touching the filesystem.
    pub fn parse_file(
        &self,
        path: &Path,
        options: Option<ParseOptions>,
    ) -> Result<impl Future<Output = Result<Option<Value>>>> {
        let mut options = options.ok_or(DiscoveryError::MissingOptions("options"))?;
        let path = path.to_path_buf();
        Ok(async move {
            self.ready().await?;
            let content = self.runtime.read_to_string(&path)?;
            options.path = Some(path);
            self.parse_content(&content, options).await
        })
    }

    #[tracing::instrument(skip(self))]
    async fn discover(&self) -> Result<Vec<Arc<dyn ParserPlugin>>> {
        let walker = StoreWalker::new(self.runtime, self.config);
        let packages = walker.enumerate_project(&self.project_dir)?;

        let mut parsers = Vec::new();
        for dir in packages {
            if !base_name(&dir).is_some_and(|name| name.starts_with(&self.config.plugin_prefix)) {
                continue;
            }

            let identifier = dir.to_string_lossy();
            let Some(module) = self.loader.load(&identifier).await else {
                continue;
            };
            match instantiate_parser(&module) {
                Ok(parser) => {
                    debug!("Registered parser from {:?}", dir);
                    parsers.push(parser);
                }
                Err(reason) => warn!("Rejected plugin {:?}: {}", dir, reason),
            }
        }

        info!("Registered {} parsers", parsers.len());
        Ok(parsers)
    }
}

/// Construct the parser a module exports, checking its declared capability.
fn instantiate_parser(module: &LoadedModule) -> std::result::Result<Arc<dyn ParserPlugin>, String> {
    let factory = match module.export(PARSER_EXPORT) {
        Some(Export::Parser(factory)) => factory,
        Some(other) => {
            return Err(format!("'{}' export is not a parser factory: {:?}", PARSER_EXPORT, other));
        }
        None => return Err(format!("no '{}' export", PARSER_EXPORT)),
    };

    let parser = panic::catch_unwind(AssertUnwindSafe(|| factory()))
        .map_err(|payload| format!("parser construction panicked: {}", panic_message(payload.as_ref())))?
        .map_err(|e| format!("parser construction failed: {:#}", e))?;
    match parser.capability() {
        Capability::Parser => Ok(Arc::from(parser)),
        other => Err(format!("declares capability '{}'", other)),
    }
}


#[cfg(all(test, unix))]
mod fs_tests {
    use super::*;
    use crate::loader::{LoadRequest, ModuleInit, ModuleTable};
    use crate::parser::builtin_modules;
    use crate::runtime::RealRuntime;
    use async_trait::async_trait;
    use regex::Regex;
    use serde_json::json;
    use std::fs;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    /// Answers every input with a fixed value.
    struct FixedParser {
        capability: Capability,
        pattern: Regex,
        answer: Value,
    }

    impl ParserPlugin for FixedParser {
        fn capability(&self) -> Capability {
            self.capability.clone()
        }

        fn type_pattern(&self) -> &Regex {
            &self.pattern
        }

        fn parse_sync(&self, _content: &str) -> anyhow::Result<Value> {
            Ok(self.answer.clone())
        }
    }

    fn fixed_module(capability: Capability, pattern: &'static str, answer: Value) -> ModuleInit {
        Arc::new(move |request: &LoadRequest| -> anyhow::Result<LoadedModule> {
            let capability = capability.clone();
            let answer = answer.clone();
            let factory: crate::parser::ParserFactory =
                Arc::new(move || -> anyhow::Result<Box<dyn ParserPlugin>> {
                    Ok(Box::new(FixedParser {
                        capability: capability.clone(),
                        pattern: Regex::new(pattern)?,
                        answer: answer.clone(),
                    }))
                });
            Ok(LoadedModule::new(request.package_name.clone().unwrap_or_default())
                .with_export(PARSER_EXPORT, Export::Parser(factory)))
        })
    }

    /// Lay out `<project>/node_modules/<name>` packages with an index file.
    fn project(packages: &[&str]) -> TempDir {
        let dir = tempdir().unwrap();
        for name in packages {
            let pkg = dir.path().join("node_modules").join(name);
            fs::create_dir_all(&pkg).unwrap();
            fs::write(
                pkg.join("package.json"),
                format!(r#"{{"name": "{}", "version": "1.0.0"}}"#, name),
            )
            .unwrap();
            fs::write(pkg.join("index.js"), "").unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_first_registered_parser_wins() {
        let dir = project(&["modscan-parser-a", "modscan-parser-b", "unrelated"]);
        let mut table = ModuleTable::new();
        table.register(
            "modscan-parser-a",
            fixed_module(Capability::Parser, "^json$", json!({"by": "a"})),
        );
        table.register(
            "modscan-parser-b",
            fixed_module(Capability::Parser, "^json$", json!({"by": "b"})),
        );

        let runtime = RealRuntime;
        let config = DiscoveryConfig::default();
        let registry = ParserRegistry::new(&runtime, &table, &config, dir.path());

        let value = registry
            .parse_content("{}", ParseOptions::default().with_type("json"))
            .await
            .unwrap();
        assert_eq!(value, Some(json!({"by": "a"})));
        assert_eq!(registry.parsers().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_plugins_do_not_stop_discovery() {
        let dir = project(&[
            "modscan-parser-a",
            "modscan-parser-b",
            "modscan-parser-c",
        ]);
        let mut table = ModuleTable::new();
        table.register(
            "modscan-parser-a",
            Arc::new(|_: &LoadRequest| -> anyhow::Result<LoadedModule> { panic!("init") }),
        );
        let factory: crate::parser::ParserFactory =
            Arc::new(|| -> anyhow::Result<Box<dyn ParserPlugin>> { panic!("factory") });
        table.register(
            "modscan-parser-b",
            Arc::new(move |_: &LoadRequest| -> anyhow::Result<LoadedModule> {
                Ok(LoadedModule::new("b").with_export(PARSER_EXPORT, Export::Parser(factory.clone())))
            }),
        );
        table.register(
            "modscan-parser-c",
            fixed_module(Capability::Parser, "^json$", json!({"by": "c"})),
        );

        let runtime = RealRuntime;
        let config = DiscoveryConfig::default();
        let registry = ParserRegistry::new(&runtime, &table, &config, dir.path());

        assert_eq!(registry.parsers().await.unwrap().len(), 1);
        let value = registry
            .parse_content("{}", ParseOptions::default().with_type("json"))
            .await
            .unwrap();
        assert_eq!(value, Some(json!({"by": "c"})));
    }

    #[tokio::test]
    async fn test_builtin_json_dispatch() {
        let dir = project(&["modscan-parser-json", "modscan-parser-yaml"]);
        let table = builtin_modules();
        let runtime = RealRuntime;
        let config = DiscoveryConfig::default();
        let registry = ParserRegistry::new(&runtime, &table, &config, dir.path());

        let value = registry
            .parse_content(r#"{"a":1}"#, ParseOptions::default().with_type("json"))
            .await
            .unwrap();
        assert_eq!(value, Some(json!({"a": 1})));

        let value = registry
            .parse_content("a: 1", ParseOptions::default().with_type("yml").sync())
            .await
            .unwrap();
        assert_eq!(value, Some(json!({"a": 1})));

        let value = registry
            .parse_content("x", ParseOptions::default().with_type("toml"))
            .await
            .unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_parse_file_infers_type_from_path() {
        let dir = project(&["modscan-parser-json"]);
        let file = dir.path().join("data.json");
        fs::write(&file, r#"{"items": [1, 2]}"#).unwrap();

        let table = builtin_modules();
        let runtime = RealRuntime;
        let config = DiscoveryConfig::default();
        let registry = ParserRegistry::new(&runtime, &table, &config, dir.path());

        let value = registry
            .parse_file(&file, Some(ParseOptions::default()))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(value, Some(json!({"items": [1, 2]})));
    }

    #[tokio::test]
    async fn test_parse_error_propagates() {
        let dir = project(&["modscan-parser-json"]);
        let table = builtin_modules();
        let runtime = RealRuntime;
        let config = DiscoveryConfig::default();
        let registry = ParserRegistry::new(&runtime, &table, &config, dir.path());

        let result = registry
            .parse_content("{", ParseOptions::default().with_type("json"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_non_parser_capability_and_exports_are_rejected() {
        let dir = project(&[
            "modscan-parser-formatter",
            "modscan-parser-json",
            "modscan-parser-value",
        ]);
        let mut table = builtin_modules();
        table.register(
            "modscan-parser-formatter",
            fixed_module(
                Capability::Other("formatter".into()),
                "^json$",
                json!("formatted"),
            ),
        );
        table.register(
            "modscan-parser-value",
            Arc::new(|_: &LoadRequest| -> anyhow::Result<LoadedModule> {
                Ok(LoadedModule::new("value").with_export(PARSER_EXPORT, Export::Value(json!(1))))
            }),
        );

        let runtime = RealRuntime;
        let config = DiscoveryConfig::default();
        let registry = ParserRegistry::new(&runtime, &table, &config, dir.path());

        let parsers = registry.parsers().await.unwrap();
        assert_eq!(parsers.len(), 1);
        let value = registry
            .parse_content(r#"{"a":1}"#, ParseOptions::default().with_type("json"))
            .await
            .unwrap();
        assert_eq!(value, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_missing_store_has_no_parsers() {
        let dir = tempdir().unwrap();
        let table = builtin_modules();
        let runtime = RealRuntime;
        let config = DiscoveryConfig::default();
        let registry = ParserRegistry::new(&runtime, &table, &config, dir.path());

        assert!(registry.parsers().await.unwrap().is_empty());
        let value = registry
            .parse_content("{}", ParseOptions::default().with_type("json"))
            .await
            .unwrap();
        assert_eq!(value, None);
    }

    /// Host whose instantiation suspends, to widen the discovery window.
    struct SlowHost {
        inner: ModuleTable,
        instantiated: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ModuleHost for SlowHost {
        async fn instantiate(&self, request: &LoadRequest) -> anyhow::Result<LoadedModule> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.instantiated
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.instantiate(request).await
        }
    }

    #[tokio::test]
    async fn test_early_parse_file_waits_for_full_list() {
        // The json parser is discovered last
        let dir = project(&["modscan-parser-a-yaml", "modscan-parser-z-json"]);
        let file = dir.path().join("data.json");
        fs::write(&file, r#"{"a":1}"#).unwrap();

        let mut inner = ModuleTable::new();
        inner.register("modscan-parser-a-yaml", crate::parser::yaml_module());
        inner.register("modscan-parser-z-json", crate::parser::json_module());
        let host = SlowHost {
            inner,
            instantiated: Default::default(),
        };

        let runtime = RealRuntime;
        let config = DiscoveryConfig::default();
        let registry = ParserRegistry::new(&runtime, &host, &config, dir.path());

        let early = registry
            .parse_file(&file, Some(ParseOptions::default()))
            .unwrap();
        let (value, ready, parsers) = tokio::join!(early, registry.ready(), registry.parsers());

        assert_eq!(value.unwrap(), Some(json!({"a": 1})));
        ready.unwrap();
        assert_eq!(parsers.unwrap().len(), 2);
        // Discovery ran once for all three callers
        assert_eq!(
            host.instantiated.load(std::sync::atomic::Ordering::SeqCst),
            2
        );
    }
}
