//! Tree providers: external commands that print a dependency tree.

use async_trait::async_trait;
use log::{debug, warn};
use std::path::Path;

use crate::config::ProviderCommand;
use crate::runtime::Runtime;

/// Uniform outcome of asking one provider for a tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquired {
    /// The provider printed something (possibly salvaged from a failed run)
    Output(String),
    /// The provider produced nothing usable; carries the reason
    Failed(String),
}

/// A strategy for obtaining the raw dependency tree of a project.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TreeSource: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Run the provider against `project_dir`.
    async fn acquire(&self, project_dir: &Path) -> Acquired;
}

/// Tree provider backed by an external command such as `npm ls --json`.
pub struct CommandSource<'a, R: Runtime> {
    runtime: &'a R,
    command: ProviderCommand,
}

impl<'a, R: Runtime> CommandSource<'a, R> {
    pub fn new(runtime: &'a R, command: ProviderCommand) -> Self {
        Self { runtime, command }
    }
}

#[async_trait]
impl<R: Runtime> TreeSource for CommandSource<'_, R> {
    fn name(&self) -> &str {
        &self.command.program
    }

    async fn acquire(&self, project_dir: &Path) -> Acquired {
        debug!(
            "Running {} {} in {:?}",
            self.command.program,
            self.command.args.join(" "),
            project_dir
        );

        match self
            .runtime
            .run_command(&self.command.program, &self.command.args, project_dir)
            .await
        {
            Ok(out) if !out.stdout.trim().is_empty() => {
                if !out.success {
                    // npm exits non-zero on peer/extraneous problems but still prints the tree
                    warn!(
                        "{} exited with status {:?}; using its output anyway",
                        self.command.program, out.status
                    );
                }
                Acquired::Output(out.stdout)
            }
            Ok(out) => Acquired::Failed(format!(
                "no output (status {:?}) {}",
                out.status,
                out.stderr.trim()
            )),
            Err(e) => Acquired::Failed(format!("{:#}", e)),
        }
    }
}
