//! Staging root assembly.

pub mod copy;
pub mod install;
pub mod layout;
pub mod stdlib;

pub use copy::{copy_from_root, copy_to_rootfs};
pub use install::{DependencyInstaller, Parallelism};
pub use stdlib::StdlibProvisioner;
