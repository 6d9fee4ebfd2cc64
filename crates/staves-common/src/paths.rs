//! Host filesystem locations used while building.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

/// Default host root (`$STAVES_HOST_ROOT`, falling back to `/`).
pub static STAVES_HOST_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("STAVES_HOST_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/"))
});

/// Fixed locations on the builder host.
///
/// Everything is resolved relative to `root`, which is `/` on a real
/// builder and a scratch directory in tests.
#[derive(Debug, Clone)]
pub struct HostPaths {
    /// Host root directory.
    pub root: PathBuf,
}

impl HostPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths below a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an absolute host path below the root.
    #[must_use]
    pub fn host(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        self.root.join(path.strip_prefix("/").unwrap_or(path))
    }

    /// Portage configuration directory.
    #[must_use]
    pub fn portage_config(&self) -> PathBuf {
        self.host("/etc/portage")
    }

    /// Global `make.conf`.
    #[must_use]
    pub fn make_conf(&self) -> PathBuf {
        self.portage_config().join("make.conf")
    }

    /// Directory of named environment profiles.
    #[must_use]
    pub fn env_dir(&self) -> PathBuf {
        self.portage_config().join("env")
    }

    /// Repository definitions.
    #[must_use]
    pub fn repos_conf(&self) -> PathBuf {
        self.portage_config().join("repos.conf")
    }

    /// Toolchain library directory searched for runtime libraries.
    #[must_use]
    pub fn gcc_lib_dir(&self) -> PathBuf {
        self.host("/usr/lib/gcc")
    }

    /// Locale generation list.
    #[must_use]
    pub fn locale_gen(&self) -> PathBuf {
        self.host("/etc/locale.gen")
    }

    /// Compiled locale archive.
    #[must_use]
    pub fn locale_archive(&self) -> PathBuf {
        self.host("/usr/lib/locale/locale-archive")
    }

    /// Portage package tree.
    #[must_use]
    pub fn portage_tree(&self) -> PathBuf {
        self.host("/usr/portage")
    }

    /// Checked-out overlay repositories.
    #[must_use]
    pub fn repos_dir(&self) -> PathBuf {
        self.host("/var/db/repos")
    }
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            root: STAVES_HOST_ROOT.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_root() {
        let paths = HostPaths::with_root("/tmp/staves-test");
        assert_eq!(
            paths.make_conf(),
            PathBuf::from("/tmp/staves-test/etc/portage/make.conf")
        );
        assert_eq!(
            paths.gcc_lib_dir(),
            PathBuf::from("/tmp/staves-test/usr/lib/gcc")
        );
    }

    #[test]
    fn host_strips_leading_slash() {
        let paths = HostPaths::with_root("/srv/builder");
        assert_eq!(
            paths.host("/var/db/repos/gentoo"),
            PathBuf::from("/srv/builder/var/db/repos/gentoo")
        );
        assert_eq!(
            paths.host("etc/locale.gen"),
            PathBuf::from("/srv/builder/etc/locale.gen")
        );
    }

    #[test]
    fn root_slash_is_identity() {
        let paths = HostPaths::with_root("/");
        assert_eq!(paths.repos_conf(), PathBuf::from("/etc/portage/repos.conf"));
    }
}
