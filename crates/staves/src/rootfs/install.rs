//! Installing packages and their runtime dependencies into the staging root.

use std::num::NonZeroUsize;
use std::path::Path;

use staves_common::{CommandRunner, Invocation, StavesError, StavesResult};

/// Build parallelism handed to the package manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parallelism {
    /// Number of parallel package builds.
    pub jobs: usize,
    /// Load average above which no new jobs are started.
    pub load_average: usize,
}

impl Parallelism {
    /// Derive parallelism from the number of available CPUs.
    ///
    /// One job more than there are CPUs, and a load limit equal to the
    /// CPU count.
    #[must_use]
    pub fn from_host() -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self::for_cpus(cpus)
    }

    /// Parallelism for a machine with `cpus` processors.
    #[must_use]
    pub const fn for_cpus(cpus: usize) -> Self {
        Self {
            jobs: cpus + 1,
            load_average: cpus,
        }
    }

    /// Override the job count, keeping the load limit.
    #[must_use]
    pub const fn with_jobs(self, jobs: usize) -> Self {
        Self { jobs, ..self }
    }

    /// Value of the `MAKEOPTS` variable.
    #[must_use]
    pub fn makeopts(&self) -> String {
        format!("-j{} -l{}", self.jobs, self.load_average)
    }

    /// Base `emerge` invocation with job flags and `MAKEOPTS`.
    pub(crate) fn emerge(&self) -> Invocation {
        Invocation::new("emerge").env("MAKEOPTS", self.makeopts())
    }

    pub(crate) fn emerge_flags(&self) -> [String; 4] {
        [
            "--jobs".to_string(),
            self.jobs.to_string(),
            "--load-average".to_string(),
            self.load_average.to_string(),
        ]
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        Self::from_host()
    }
}

/// Installs packages into a staging root with `emerge`.
///
/// Build-time dependencies are installed on the host first (from binary
/// packages where possible); the packages themselves and their runtime
/// dependencies then go into the staging root.
pub struct DependencyInstaller<'a> {
    runner: &'a dyn CommandRunner,
    cache_exclusions: Vec<String>,
}

impl<'a> DependencyInstaller<'a> {
    /// Create an installer running commands through `runner`.
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            cache_exclusions: Vec::new(),
        }
    }

    /// Never store binary packages for these atoms.
    #[must_use]
    pub fn with_cache_exclusions(mut self, atoms: Vec<String>) -> Self {
        self.cache_exclusions = atoms;
        self
    }

    fn exclusion_flags(&self) -> impl Iterator<Item = String> + '_ {
        self.cache_exclusions
            .iter()
            .flat_map(|atom| ["--buildpkg-exclude".to_string(), atom.clone()])
    }

    /// Command installing build-time dependencies on the host.
    #[must_use]
    pub fn build_deps_invocation(&self, packages: &[String], parallelism: Parallelism) -> Invocation {
        parallelism
            .emerge()
            .args([
                "--verbose",
                "--onlydeps",
                "--usepkg",
                "--with-bdeps=y",
                "--emptytree",
            ])
            .args(parallelism.emerge_flags())
            .args(self.exclusion_flags())
            .args(packages.iter().cloned())
    }

    /// Command installing the packages and runtime dependencies into `root`.
    #[must_use]
    pub fn runtime_deps_invocation(
        &self,
        root: &Path,
        packages: &[String],
        parallelism: Parallelism,
    ) -> Invocation {
        parallelism
            .emerge()
            .arg("--verbose")
            .arg(format!("--root={}", root.display()))
            .args(["--root-deps=rdeps", "--oneshot", "--usepkg"])
            .args(parallelism.emerge_flags())
            .args(self.exclusion_flags())
            .args(packages.iter().cloned())
    }

    /// Install `packages` into `root`.
    pub async fn install(
        &self,
        root: &Path,
        packages: &[String],
        parallelism: Parallelism,
    ) -> StavesResult<()> {
        tracing::info!(packages = ?packages, "Installing build-time dependencies");
        self.run(
            self.build_deps_invocation(packages, parallelism),
            "Unable to install build-time dependencies.",
        )
        .await?;

        tracing::info!(root = %root.display(), "Installing runtime dependencies");
        self.run(
            self.runtime_deps_invocation(root, packages, parallelism),
            "Unable to install runtime dependencies.",
        )
        .await
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
