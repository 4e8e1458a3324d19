//! External command execution.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;

use super::RealRuntime;

/// Captured result of a finished external command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub success: bool,
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) async fn run_command_impl(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", program))?;

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
