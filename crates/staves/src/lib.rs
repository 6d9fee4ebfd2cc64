//! # staves
//!
//! Builds minimal container root filesystems from Portage packages.
//!
//! A build reads a TOML configuration, configures Portage on the builder
//! host, installs the requested packages and their runtime dependencies
//! into a staging directory and optionally packages it as a container
//! image:
//! - Portage environment, repository and per-package configuration
//! - Dependency installation with `emerge`
//! - Toolchain libraries, locales and builder files
//! - Image packaging and running builds inside builder containers

#![warn(missing_docs)]

pub mod builder;
pub mod cli;
pub mod config;
pub mod pipeline;
pub mod portage;
pub mod rootfs;
pub mod runtime;

pub use config::{BuildConfig, ConfigError};
pub use pipeline::{BuildOptions, BuildOutcome, Packaging, Pipeline};
pub use runtime::BuilderRuntime;
