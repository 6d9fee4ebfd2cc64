//! Repository management through `eselect repository` and `emaint`.

use staves_common::{CommandRunner, HostPaths, Invocation, StavesResult};

use crate::config::Repository;

/// What to do when an external command fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and carry on.
    #[default]
    BestEffort,
    /// Abort the build.
    Fatal,
}

/// Enables, adds and syncs package repositories.
pub struct RepositoryManager<'a> {
    runner: &'a dyn CommandRunner,
    paths: &'a HostPaths,
    policy: FailurePolicy,
}

impl<'a> RepositoryManager<'a> {
    /// Create a manager with the given failure policy.
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner, paths: &'a HostPaths, policy: FailurePolicy) -> Self {
        Self {
            runner,
            paths,
            policy,
        }
    }

    /// Prepare the host and set up every repository in order.
    pub async fn setup_all(&self, repositories: &[Repository]) -> StavesResult<()> {
        if repositories.is_empty() {
            return Ok(());
        }

        std::fs::create_dir_all(self.paths.repos_conf())?;
        // Refreshes the list of known repositories.
        self.run(Invocation::new("eselect").args(["repository", "list", "-i"]))
            .await?;

        for repository in repositories {
            self.setup(repository).await?;
        }
        Ok(())
    }

    /// Add or enable a repository, then sync it.
    pub async fn setup(&self, repository: &Repository) -> StavesResult<()> {
        let name = repository.name.as_str();

        let register = match (repository.sync_type.as_deref(), repository.uri.as_deref()) {
            (Some(sync_type), Some(uri)) => {
                tracing::info!(name, sync_type, uri, "Adding repository");
                Invocation::new("eselect").args(["repository", "add", name, sync_type, uri])
            }
            _ => {
                tracing::info!(name, "Enabling repository");
                Invocation::new("eselect").args(["repository", "enable", name])
            }
        };
        self.run(register).await?;

        self.run(Invocation::new("emaint").args(["sync", "--repo", name]))
            .await
    }

    async fn run(&self, invocation: Invocation) -> StavesResult<()> {
        let output = self.runner.run(&invocation).await?;
        if output.success() {
            return Ok(());
        }

        tracing::error!(
            command = %invocation,
            code = ?output.code,
            stderr = %output.stderr.trim(),
            "Repository command failed"
        );
        match self.policy {
            FailurePolicy::BestEffort => Ok(()),
            FailurePolicy::Fatal => output.check(&invocation).map(|_| ()),
        }
    }
}
