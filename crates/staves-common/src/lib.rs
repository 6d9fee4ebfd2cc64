//! # staves-common
//!
//! Shared utilities and types for staves.
//!
//! This crate provides common functionality used across all staves crates:
//! - Error types and their diagnostic codes
//! - Host filesystem locations used by the builder
//! - External command execution

#![warn(missing_docs)]

pub mod error;
pub mod paths;
pub mod process;

pub use error::{ErrorKind, StavesError, StavesResult};
pub use paths::HostPaths;
pub use process::{CommandOutput, CommandRunner, Invocation, RecordingRunner, SystemRunner};
