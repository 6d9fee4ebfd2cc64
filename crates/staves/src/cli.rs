//! Staves CLI.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use staves_common::{HostPaths, StavesError, SystemRunner};
use staves_image::ImageEngine;
use tokio::io::AsyncReadExt;

use crate::config::BuildConfig;
use crate::pipeline::{BuildOptions, DEFAULT_ROOTFS_PATH, Packaging, Pipeline};
use crate::portage::FailurePolicy;
use crate::rootfs::Parallelism;
use crate::runtime::BuilderRuntime;

/// Staves - Builds minimal container images from Portage packages
///
/// The build configuration (TOML) is read from stdin.
#[derive(Parser)]
#[command(name = "staves")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Staves commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Install packages into a root filesystem and package it
    Build {
        /// Image version
        version: String,

        /// Libc to be installed into the rootfs
        #[arg(long, env = "STAVES_LIBC")]
        libc: Option<String>,

        /// Copy libstdc++ into the rootfs
        #[arg(long)]
        stdlib: bool,

        /// Override the image name from the configuration
        #[arg(long)]
        name: Option<String>,

        /// Directory where the root filesystem is installed
        #[arg(long, default_value = DEFAULT_ROOTFS_PATH)]
        rootfs_path: PathBuf,

        /// Packaging format of the result
        #[arg(long, value_enum, default_value_t = Packaging::Image)]
        packaging: Packaging,

        /// Include the Portage tree and configuration to produce a builder
        #[arg(long)]
        create_builder: bool,

        /// Number of parallel emerge jobs (default: CPUs + 1)
        #[arg(long)]
        jobs: Option<NonZeroUsize>,

        /// Abort when a repository cannot be added or synced
        #[arg(long)]
        strict_repositories: bool,

        /// Don't keep binary packages of this package (repeatable)
        #[arg(long, value_name = "PACKAGE")]
        disable_cache: Vec<String>,

        /// Container engine
        #[arg(long, default_value = ImageEngine::DEFAULT_PROGRAM)]
        engine: String,
    },

    /// Run a build inside a builder image, forwarding stdin
    RunBuilder {
        /// Builder image
        builder: String,

        /// Volume caching binary packages
        #[arg(long)]
        build_cache: Option<String>,

        /// Don't mount ~/.ssh
        #[arg(long)]
        no_ssh: bool,

        /// Don't mount ~/.netrc
        #[arg(long)]
        no_netrc: bool,

        /// Container engine
        #[arg(long, default_value = ImageEngine::DEFAULT_PROGRAM)]
        engine: String,

        /// Arguments for the builder (after `--`)
        #[arg(last = true)]
        args: Vec<String>,
    },
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Build {
                version,
                libc,
                stdlib,
                name,
                rootfs_path,
                packaging,
                create_builder,
                jobs,
                strict_repositories,
                disable_cache,
                engine,
            } => {
                let config = BuildConfig::from_toml(&read_stdin_string().await?)
                    .map_err(StavesError::from)?;

                let parallelism = jobs.map_or_else(Parallelism::from_host, |jobs| {
                    Parallelism::from_host().with_jobs(jobs.get())
                });
                let options = BuildOptions {
                    version,
                    libc,
                    stdlib,
                    name,
                    rootfs_path,
                    packaging,
                    create_builder,
                    parallelism,
                    repository_policy: if strict_repositories {
                        FailurePolicy::Fatal
                    } else {
                        FailurePolicy::BestEffort
                    },
                    disable_cache,
                    engine,
                };

                let runner = SystemRunner;
                let outcome = Pipeline::new(&runner, HostPaths::new(), options)
                    .run(&config)
                    .await?;

                if outcome.packaged {
                    println!("{}", outcome.tag);
                } else {
                    println!("{}", outcome.rootfs.display());
                }
            }

            Commands::RunBuilder {
                builder,
                build_cache,
                no_ssh,
                no_netrc,
                engine,
                args,
            } => {
                let config = read_stdin().await?;
                let runtime = BuilderRuntime {
                    engine,
                    image: builder,
                    build_cache,
                    ssh: !no_ssh,
                    netrc: !no_netrc,
                    args,
                };
                runtime.run(&SystemRunner, config).await?;
            }
        }

        Ok(())
    }
}

async fn read_stdin() -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    tokio::io::stdin().read_to_end(&mut buf).await?;
    Ok(buf)
}

async fn read_stdin_string() -> Result<String> {
    let bytes = read_stdin().await?;
    String::from_utf8(bytes)
        .map_err(|e| StavesError::config(format!("Configuration is not UTF-8: {e}")).into())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_defaults() {
        let cli = Cli::try_parse_from(["staves", "build", "1.0"]).unwrap();
        let Commands::Build {
            version,
            rootfs_path,
            packaging,
            engine,
            strict_repositories,
            ..
        } = cli.command
        else {
            panic!("expected build");
        };
        assert_eq!(version, "1.0");
        assert_eq!(rootfs_path, PathBuf::from("/tmp/rootfs"));
        assert_eq!(packaging, Packaging::Image);
        assert_eq!(engine, "docker");
        assert!(!strict_repositories);
    }

    #[test]
    fn jobs_must_be_positive() {
        assert!(Cli::try_parse_from(["staves", "build", "1.0", "--jobs", "0"]).is_err());

        let cli = Cli::try_parse_from(["staves", "build", "1.0", "--jobs", "4"]).unwrap();
        let Commands::Build { jobs, .. } = cli.command else {
            panic!("expected build");
        };
        assert_eq!(jobs.map(NonZeroUsize::get), Some(4));
    }

    #[test]
    fn disable_cache_is_repeatable() {
        let cli = Cli::try_parse_from([
            "staves",
            "build",
            "1.0",
            "--disable-cache",
            "app-misc/a",
            "--disable-cache",
            "app-misc/b",
        ])
        .unwrap();
        let Commands::Build { disable_cache, .. } = cli.command else {
            panic!("expected build");
        };
        assert_eq!(disable_cache, vec!["app-misc/a", "app-misc/b"]);
    }

    #[test]
    fn run_builder_trailing_args() {
        let cli = Cli::try_parse_from([
            "staves",
            "--debug",
            "run-builder",
            "example/builder",
            "--no-ssh",
            "--",
            "build",
            "1.0",
            "--packaging",
            "none",
        ])
        .unwrap();
        assert!(cli.debug);
        let Commands::RunBuilder { no_ssh, args, .. } = cli.command else {
            panic!("expected run-builder");
        };
        assert!(no_ssh);
        assert_eq!(args, vec!["build", "1.0", "--packaging", "none"]);
    }
}
