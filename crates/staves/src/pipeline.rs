//! The end-to-end build: configure Portage, assemble the staging root and
//! optionally package it as an image.

use std::path::PathBuf;

use staves_common::{CommandRunner, HostPaths, StavesError, StavesResult};
use staves_image::{BuildInstructions, ImageEngine, ImageTag};

use crate::builder::{BuilderUpdater, fix_portage_tree_permissions};
use crate::config::BuildConfig;
use crate::portage::{EnvWriter, FailurePolicy, PackageConfigWriter, RepositoryManager};
use crate::rootfs::layout;
use crate::rootfs::{DependencyInstaller, Parallelism, StdlibProvisioner};

/// Default staging directory.
pub const DEFAULT_ROOTFS_PATH: &str = "/tmp/rootfs";

/// What to do with the finished staging root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Packaging {
    /// Leave the staging directory as is.
    None,
    /// Build a container image from it.
    #[default]
    Image,
}

/// Build options.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Image version.
    pub version: String,
    /// libc package installed alongside the configured packages.
    pub libc: Option<String>,
    /// Copy `libstdc++` into the staging root.
    pub stdlib: bool,
    /// Overrides the configured image name.
    pub name: Option<String>,
    /// Staging directory.
    pub rootfs_path: PathBuf,
    /// Packaging format.
    pub packaging: Packaging,
    /// Include Portage itself so the result can build further images.
    pub create_builder: bool,
    /// Job and load limits for `emerge`.
    pub parallelism: Parallelism,
    /// Failure policy for repository commands.
    pub repository_policy: FailurePolicy,
    /// Packages never stored in the binary package cache.
    pub disable_cache: Vec<String>,
    /// Container engine program.
    pub engine: String,
}

impl BuildOptions {
    /// Options with defaults for everything but the version.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            libc: None,
            stdlib: false,
            name: None,
            rootfs_path: PathBuf::from(DEFAULT_ROOTFS_PATH),
            packaging: Packaging::default(),
            create_builder: false,
            parallelism: Parallelism::from_host(),
            repository_policy: FailurePolicy::default(),
            disable_cache: Vec::new(),
            engine: ImageEngine::DEFAULT_PROGRAM.to_string(),
        }
    }

    fn libc(&self) -> &str {
        self.libc.as_deref().unwrap_or_default()
    }
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Populated staging directory.
    pub rootfs: PathBuf,
    /// Image tag.
    pub tag: ImageTag,
    /// Whether an image was built.
    pub packaged: bool,
}

/// Runs every build step in order.
pub struct Pipeline<'a> {
    runner: &'a dyn CommandRunner,
    paths: HostPaths,
    options: BuildOptions,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline operating on the given host.
    #[must_use]
    pub const fn new(runner: &'a dyn CommandRunner, paths: HostPaths, options: BuildOptions) -> Self {
        Self {
            runner,
            paths,
            options,
        }
    }

    /// Resolve the image tag from the options and configuration.
    pub fn tag(&self, config: &BuildConfig) -> StavesResult<ImageTag> {
        let name = self
            .options
            .name
            .as_deref()
            .or(config.name.as_deref())
            .ok_or_else(|| StavesError::config("No image name given"))?;
        ImageTag::new(name, self.options.version.as_str())
    }

    /// Packages to install, including the libc.
    #[must_use]
    pub fn packages(&self, config: &BuildConfig) -> Vec<String> {
        let mut packages = config.packages.clone();
        if let Some(libc) = self.options.libc.as_ref().filter(|libc| !libc.is_empty()) {
            packages.push(libc.clone());
        }
        packages
    }

    /// Run the build.
    pub async fn run(&self, config: &BuildConfig) -> StavesResult<BuildOutcome> {
        let options = &self.options;
        let tag = self.tag(config)?;
        if options.packaging == Packaging::Image && config.command.is_empty() {
            return Err(StavesError::config("An image needs a command"));
        }
        let rootfs = options.rootfs_path.as_path();
        tracing::info!(tag = %tag, rootfs = %rootfs.display(), "Building root filesystem");

        let env_writer = EnvWriter::new(&self.paths);
        env_writer.write_baseline()?;
        env_writer.write(&config.env)?;
        RepositoryManager::new(self.runner, &self.paths, options.repository_policy)
            .setup_all(&config.repositories)
            .await?;

        let package_writer = PackageConfigWriter::new(&self.paths);
        for (package, package_config) in &config.package_configs {
            package_writer.write(package, package_config)?;
        }

        let packages = self.packages(config);
        std::fs::create_dir_all(rootfs)?;
        layout::create_lib_symlinks(rootfs, options.libc())?;

        fix_portage_tree_permissions(self.runner, &self.paths).await?;
        if options.create_builder {
            BuilderUpdater::new(self.runner)
                .update(options.parallelism)
                .await?;
        }

        tracing::info!(packages = %packages.join(", "), "Creating rootfs");
        DependencyInstaller::new(self.runner)
            .with_cache_exclusions(options.disable_cache.clone())
            .install(rootfs, &packages, options.parallelism)
            .await?;

        StdlibProvisioner::new(self.paths.gcc_lib_dir()).provision(rootfs, options.stdlib)?;

        if layout::is_glibc(options.libc()) {
            layout::generate_locale(self.runner, &self.paths, rootfs, &config.locale).await?;
        }
        if options.create_builder {
            layout::copy_builder_files(&self.paths, rootfs)?;
        }

        let packaged = options.packaging == Packaging::Image;
        if packaged {
            let instructions =
                BuildInstructions::new(config.command.clone(), config.annotations.clone());
            ImageEngine::new(options.engine.as_str())
                .package(self.runner, rootfs, &tag, &instructions)
                .await?;
        }

        Ok(BuildOutcome {
            rootfs: rootfs.to_path_buf(),
            tag,
            packaged,
        })
    }
}
