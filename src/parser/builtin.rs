//! Parser modules linked into the binary.

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

use super::{Capability, PARSER_EXPORT, ParserFactory, ParserPlugin};
use crate::loader::{Export, LoadRequest, LoadedModule, ModuleInit, ModuleTable};

/// Package name the JSON parser module is bound to.
pub const JSON_MODULE: &str = "modscan-parser-json";

/// Package name the YAML parser module is bound to.
pub const YAML_MODULE: &str = "modscan-parser-yaml";

/// Parses `json` content.
pub struct JsonParser {
    pattern: Regex,
}

impl JsonParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(r"^json$").context("Invalid JSON type pattern")?,
        })
    }
}

impl ParserPlugin for JsonParser {
    fn capability(&self) -> Capability {
        Capability::Parser
    }

    fn type_pattern(&self) -> &Regex {
        &self.pattern
    }

    fn parse_sync(&self, content: &str) -> Result<Value> {
        serde_json::from_str(content).context("Failed to parse JSON content")
    }
}

/// Parses `yaml` and `yml` content.
pub struct YamlParser {
    pattern: Regex,
}

impl YamlParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(r"^ya?ml$").context("Invalid YAML type pattern")?,
        })
    }
}

impl ParserPlugin for YamlParser {
    fn capability(&self) -> Capability {
        Capability::Parser
    }

    fn type_pattern(&self) -> &Regex {
        &self.pattern
    }

    fn parse_sync(&self, content: &str) -> Result<Value> {
        serde_yaml::from_str(content).context("Failed to parse YAML content")
    }
}

fn parser_module<P, F>(name: &'static str, new: F) -> ModuleInit
where
    P: ParserPlugin + 'static,
    F: Fn() -> Result<P> + Send + Sync + Copy + 'static,
{
    Arc::new(move |_: &LoadRequest| -> Result<LoadedModule> {
        let factory: ParserFactory =
            Arc::new(move || -> Result<Box<dyn ParserPlugin>> { Ok(Box::new(new()?)) });
        Ok(LoadedModule::new(name).with_export(PARSER_EXPORT, Export::Parser(factory)))
    })
}

/// Module exporting the JSON parser.
pub fn json_module() -> ModuleInit {
    parser_module(JSON_MODULE, JsonParser::new)
}

/// Module exporting the YAML parser.
pub fn yaml_module() -> ModuleInit {
    parser_module(YAML_MODULE, YamlParser::new)
}

/// Module table with every built-in parser module bound.
pub fn builtin_modules() -> ModuleTable {
    let mut table = ModuleTable::new();
    table.register(JSON_MODULE, json_module());
    table.register(YAML_MODULE, yaml_module());
    table
}
