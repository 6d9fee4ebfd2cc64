//! Common error types for staves.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`StavesError`].
pub type StavesResult<T> = Result<T, StavesError>;

/// Broad classification of a [`StavesError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Misuse, missing files or unsupported input.
    Tool,
    /// Assembling the root filesystem failed.
    Rootfs,
}

/// Errors raised while building a root filesystem or image.
#[derive(Error, Diagnostic, Debug)]
pub enum StavesError {
    /// The root filesystem could not be built.
    #[error("{message}")]
    #[diagnostic(
        code(staves::rootfs),
        help("Inspect the package manager output above and rerun after fixing it")
    )]
    Rootfs {
        /// What failed.
        message: String,
        /// Diagnostic stream captured from the package manager.
        stderr: String,
    },

    /// A source path has a file type that cannot be copied.
    #[error("Copying {} to rootfs is not supported", path.display())]
    #[diagnostic(
        code(staves::copy::unsupported),
        help("Only regular files, directories and symbolic links can be copied")
    )]
    UnsupportedCopy {
        /// The offending path.
        path: PathBuf,
    },

    /// A required shared library is missing from the toolchain.
    #[error("Unable to find {name} in {}", search_path.display())]
    #[diagnostic(code(staves::stdlib::not_found))]
    LibraryNotFound {
        /// File name that was searched for.
        name: String,
        /// Directory that was searched.
        search_path: PathBuf,
    },

    /// An external command exited unsuccessfully.
    #[error("Command failed: {command} (exit code {code:?})")]
    #[diagnostic(code(staves::command))]
    CommandFailed {
        /// Rendered command line.
        command: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Captured diagnostic stream.
        stderr: String,
    },

    /// An external command could not be started.
    #[error("Failed to execute {program}: {source}")]
    #[diagnostic(
        code(staves::spawn),
        help("Make sure the program is installed and on PATH")
    )]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(staves::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(staves::io))]
    Io(#[from] std::io::Error),
}

impl StavesError {
    /// Build a root filesystem error from a message and captured stderr.
    pub fn rootfs(message: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Rootfs {
            message: message.into(),
            stderr: stderr.into(),
        }
    }

    /// Build a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Rootfs { .. } => ErrorKind::Rootfs,
            _ => ErrorKind::Tool,
        }
    }
}
