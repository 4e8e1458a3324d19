use anyhow::{Context, Result};
use serde::Serialize;

pub mod config;
mod discover;
mod plugins;

pub use config::Config;
pub use discover::{entry, enumerate, extract};
pub use plugins::{ModuleReport, ParserReport, load, parse, parsers};

/// Write a value to stdout as pretty-printed JSON.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
