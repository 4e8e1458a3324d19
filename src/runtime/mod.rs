//! Runtime abstraction for system operations.
//!
//! This module provides a trait-based abstraction over system operations,
//! enabling dependency injection and testability.
//!
//! # Structure
//!
//! - `path` - Path utility functions (normalize, resolve, depth)
//! - `env` - Environment variables and the working directory
//! - `fs` - File system reads (files, directories)
//! - `symlink` - Symlink resolution (canonicalization)
//! - `process` - External command execution

mod env;
mod fs;
pub mod path;
mod process;
mod symlink;

use anyhow::Result;
use async_trait::async_trait;
use std::env as std_env;
use std::io;
use std::path::{Path, PathBuf};

pub use path::{base_name, path_depth, resolve_relative_path};
pub use process::CommandOutput;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Runtime: Send + Sync {
    // Environment
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError>;
    fn current_dir(&self) -> Result<PathBuf>;

    // File System
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn exists(&self, path: &Path) -> bool;
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
    fn is_dir(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;

    // Symlinks
    /// Canonicalize a path by resolving all symlinks and returning the canonical absolute path.
    /// This recursively resolves all symlinks in the path.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    // Processes
    /// Run a program to completion in `cwd`, capturing its output.
    /// A non-zero exit status is not an error; failing to spawn is.
    async fn run_command(&self, program: &str, args: &[String], cwd: &Path)
    -> Result<CommandOutput>;
}

/// Returns true when the error chain says the path does not exist.
///
/// Absent paths are tolerated by discovery; every other I/O failure propagates.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
    })
}

pub struct RealRuntime;

#[async_trait]
impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        self.env_var_impl(key)
    }

    fn current_dir(&self) -> Result<PathBuf> {
        self.current_dir_impl()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exists_impl(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.read_dir_impl(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.is_dir_impl(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.is_file_impl(path)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        self.canonicalize_impl(path)
    }

    async fn run_command(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandOutput> {
        self.run_command_impl(program, args, cwd).await
    }
}
