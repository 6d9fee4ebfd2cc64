//! Portage configuration on the builder host.

pub mod env;
pub mod package;
pub mod repository;

pub use env::EnvWriter;
pub use package::PackageConfigWriter;
pub use repository::{FailurePolicy, RepositoryManager};
