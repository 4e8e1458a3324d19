//! Parser plugins and content dispatch.
//!
//! A parser plugin is a loaded module exporting a `parser` symbol. The symbol
//! is a factory producing one [`ParserPlugin`]; only instances declaring the
//! [`Capability::Parser`] capability are registered.

mod builtin;
mod registry;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use builtin::{JsonParser, YamlParser, builtin_modules, json_module, yaml_module};
pub use registry::ParserRegistry;

/// Name of the export a parser module must provide.
pub const PARSER_EXPORT: &str = "parser";

/// What a loaded plugin instance declares itself to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Parser,
    /// Any other declared role; never registered as a parser
    Other(String),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Parser => write!(f, "parser"),
            Capability::Other(name) => write!(f, "{}", name),
        }
    }
}

/// A content parser contributed by a plugin.
#[async_trait]
pub trait ParserPlugin: Send + Sync {
    fn capability(&self) -> Capability;

    /// Pattern matched against the content type token (`json`, `yml`, ...).
    fn type_pattern(&self) -> &Regex;

    /// Parse without suspending.
    fn parse_sync(&self, content: &str) -> Result<Value>;

    /// Parse, possibly suspending. Defaults to [`ParserPlugin::parse_sync`].
    async fn parse(&self, content: &str) -> Result<Value> {
        self.parse_sync(content)
    }
}

/// Constructs one parser instance from a loaded module.
pub type ParserFactory = Arc<dyn Fn() -> Result<Box<dyn ParserPlugin>> + Send + Sync>;

/// Which parse operation a dispatch uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    #[default]
    Async,
    Sync,
}

/// Options of one dispatch call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOptions {
    /// Explicit type token; wins over the extension of `path`
    pub type_hint: Option<String>,
    pub path: Option<PathBuf>,
    pub mode: ParseMode,
}

impl ParseOptions {
    pub fn with_type(mut self, type_hint: impl Into<String>) -> Self {
        self.type_hint = Some(type_hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn sync(mut self) -> Self {
        self.mode = ParseMode::Sync;
        self
    }

    /// The type token used to select a parser.
    pub fn type_token(&self) -> Option<String> {
        self.type_hint
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| self.path.as_deref().and_then(extension_of))
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_string)
}
