pub mod commands;
pub mod config;
pub mod entry;
pub mod error;
pub mod loader;
pub mod package;
pub mod parser;
pub mod runtime;
pub mod tree;

pub use error::{DiscoveryError, Result};
