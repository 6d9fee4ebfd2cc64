//! Per-package configuration files.

use std::path::PathBuf;

use staves_common::{HostPaths, StavesResult};

use crate::config::PackageConfig;

/// Category directories below the Portage configuration root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// `package.env`
    Env,
    /// `package.accept_keywords`
    Keywords,
    /// `package.use`
    Use,
}

impl Category {
    /// Directory name of the category.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Env => "package.env",
            Self::Keywords => "package.accept_keywords",
            Self::Use => "package.use",
        }
    }
}

/// Writes `package.env`, `package.accept_keywords` and `package.use` entries.
#[derive(Debug, Clone)]
pub struct PackageConfigWriter<'a> {
    paths: &'a HostPaths,
}

impl<'a> PackageConfigWriter<'a> {
    /// Create a writer for the given host.
    #[must_use]
    pub const fn new(paths: &'a HostPaths) -> Self {
        Self { paths }
    }

    /// Path of the file holding `package`'s entry in `category`.
    #[must_use]
    pub fn path(&self, category: Category, package: &str) -> PathBuf {
        package
            .split('/')
            .fold(self.paths.portage_config().join(category.dir_name()), |path, segment| {
                path.join(segment)
            })
    }

    /// Write one file per non-empty list in `config`.
    pub fn write(&self, package: &str, config: &PackageConfig) -> StavesResult<()> {
        for (category, values) in [
            (Category::Env, &config.env),
            (Category::Keywords, &config.keywords),
            (Category::Use, &config.use_flags),
        ] {
            if !values.is_empty() {
                self.write_category(category, package, values)?;
            }
        }
        Ok(())
    }

    /// Write (truncating) a single category file.
    pub fn write_category(
        &self,
        category: Category,
        package: &str,
        values: &[String],
    ) -> StavesResult<()> {
        let path = self.path(category, package);
        tracing::debug!(package, path = %path.display(), "Writing package config");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, format!("{package} {}\n", values.join(" ")))?;
        Ok(())
    }
}
