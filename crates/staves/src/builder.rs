//! Preparing the builder host itself.

use staves_common::{CommandRunner, HostPaths, Invocation, StavesError, StavesResult};

use crate::rootfs::Parallelism;

/// Package providing this tool inside builder images.
pub const STAVES_PACKAGE: &str = "dev-util/staves";

/// Brings the builder's own installation up to date.
pub struct BuilderUpdater<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> BuilderUpdater<'a> {
    /// Create an updater running commands through `runner`.
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Ensure staves is installed and update `@world`.
    pub async fn update(&self, parallelism: Parallelism) -> StavesResult<()> {
        tracing::info!("Updating builder");

        let install = parallelism.emerge().args(["--noreplace", STAVES_PACKAGE]);
        self.run(install, "Unable to register Staves as an installed package")
            .await?;

        let world = parallelism
            .emerge()
            .args(["--verbose", "--deep", "--usepkg", "--with-bdeps=y"])
            .args(parallelism.emerge_flags())
            .arg("@world");
        self.run(world, "Unable to update builder environment").await
    }

    async fn run(&self, invocation: Invocation, message: &str) -> StavesResult<()> {
        let output = self.runner.run(&invocation).await?;
        if output.success() {
            return Ok(());
        }
        tracing::error!(command = %invocation, code = ?output.code, "{}", output.stderr.trim());
        Err(StavesError::rootfs(message, output.stderr))
    }
}

/// Hand the Portage tree to the `portage` user, if there is one.
///
/// Returns whether the tree existed.
pub async fn fix_portage_tree_permissions(
    runner: &dyn CommandRunner,
    paths: &HostPaths,
) -> StavesResult<bool> {
    let tree = paths.portage_tree();
    if !tree.exists() {
        return Ok(false);
    }

    let invocation = Invocation::new("chown").args([
        "-R".to_string(),
        "portage:portage".to_string(),
        tree.display().to_string(),
    ]);
    runner.run(&invocation).await?.check(&invocation)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use staves_common::{CommandOutput, ErrorKind, RecordingRunner};
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn update_commands() {
        let runner = RecordingRunner::new();
        BuilderUpdater::new(&runner)
            .update(Parallelism::for_cpus(8))
            .await
            .unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![
                "emerge --noreplace dev-util/staves",
                "emerge --verbose --deep --usepkg --with-bdeps=y --jobs 9 --load-average 8 @world",
            ]
        );
        assert!(
            runner
                .calls()
                .iter()
                .all(|call| call.env_var("MAKEOPTS") == Some("-j9 -l8"))
        );
    }

    #[tokio::test]
    async fn failed_install_skips_world_update() {
        let runner =
            RecordingRunner::new().respond("--noreplace", CommandOutput::failed(1, "masked"));
        let err = BuilderUpdater::new(&runner)
            .update(Parallelism::for_cpus(1))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Rootfs);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn world_failure_is_fatal() {
        let runner = RecordingRunner::new().respond("@world", CommandOutput::failed(1, "conflict"));
        let err = BuilderUpdater::new(&runner)
            .update(Parallelism::for_cpus(1))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unable to update builder environment");
    }

    #[tokio::test]
    async fn chown_only_when_tree_exists() {
        let temp = tempdir().unwrap();
        let paths = HostPaths::with_root(temp.path());
        let runner = RecordingRunner::new();

        assert!(!fix_portage_tree_permissions(&runner, &paths).await.unwrap());
        assert!(runner.calls().is_empty());

        std::fs::create_dir_all(paths.portage_tree()).unwrap();
        assert!(fix_portage_tree_permissions(&runner, &paths).await.unwrap());
        assert_eq!(
            runner.command_lines(),
            vec![format!(
                "chown -R portage:portage {}",
                paths.portage_tree().display()
            )]
        );
    }

    #[tokio::test]
    async fn chown_failure_is_fatal() {
        let temp = tempdir().unwrap();
        let paths = HostPaths::with_root(temp.path());
        std::fs::create_dir_all(paths.portage_tree()).unwrap();
        let runner = RecordingRunner::new().respond("chown", CommandOutput::failed(1, "no user"));

        let err = fix_portage_tree_permissions(&runner, &paths)
            .await
            .unwrap_err();
        assert!(matches!(err, StavesError::CommandFailed { .. }));
    }
}
