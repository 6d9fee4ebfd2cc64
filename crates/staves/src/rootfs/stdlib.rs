//! Toolchain runtime libraries.

use std::path::{Path, PathBuf};

use staves_common::{StavesError, StavesResult};

/// GCC runtime support library (needed for pthread cancellation).
pub const LIBGCC: &str = "libgcc_s.so.1";
/// C++ standard library.
pub const LIBSTDCXX: &str = "libstdc++.so.6";

/// Copies `libgcc_s` and optionally `libstdc++` into the staging root.
#[derive(Debug, Clone)]
pub struct StdlibProvisioner {
    search_path: PathBuf,
}

impl StdlibProvisioner {
    /// Search for libraries below `search_path` (usually `/usr/lib/gcc`).
    pub fn new(search_path: impl Into<PathBuf>) -> Self {
        Self {
            search_path: search_path.into(),
        }
    }

    /// Find `name` below the search path.
    ///
    /// When several toolchains provide the file, the lexicographically
    /// greatest path wins.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        walkdir::WalkDir::new(&self.search_path)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| !entry.file_type().is_dir() && entry.file_name() == name)
            .map(walkdir::DirEntry::into_path)
            .max()
    }

    /// Copy the runtime libraries into `<rootfs>/usr/lib`.
    pub fn provision(&self, rootfs: &Path, with_libstdcxx: bool) -> StavesResult<()> {
        let lib_dir = rootfs.join("usr").join("lib");
        std::fs::create_dir_all(&lib_dir)?;

        self.copy_library(LIBGCC, &lib_dir)?;
        if with_libstdcxx {
            self.copy_library(LIBSTDCXX, &lib_dir)?;
        }
        Ok(())
    }

    fn copy_library(&self, name: &str, lib_dir: &Path) -> StavesResult<()> {
        let source = self.find(name).ok_or_else(|| StavesError::LibraryNotFound {
            name: name.to_string(),
            search_path: self.search_path.clone(),
        })?;

        tracing::info!(library = name, source = %source.display(), "Copying runtime library");
        std::fs::copy(&source, lib_dir.join(name))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn toolchain(root: &Path, version: &str, files: &[&str]) {
        let dir = root.join("x86_64-pc-linux-gnu").join(version);
        std::fs::create_dir_all(&dir).unwrap();
        for file in files {
            std::fs::write(dir.join(file), version).unwrap();
        }
    }

    #[test]
    fn copies_libgcc() {
        let temp = tempdir().unwrap();
        let gcc = temp.path().join("gcc");
        toolchain(&gcc, "13", &[LIBGCC]);
        let rootfs = temp.path().join("rootfs");

        StdlibProvisioner::new(&gcc).provision(&rootfs, false).unwrap();

        assert!(rootfs.join("usr/lib").join(LIBGCC).is_file());
        assert!(!rootfs.join("usr/lib").join(LIBSTDCXX).exists());
    }

    #[test]
    fn missing_libgcc_is_fatal() {
        let temp = tempdir().unwrap();
        let gcc = temp.path().join("gcc");
        std::fs::create_dir_all(&gcc).unwrap();

        let err = StdlibProvisioner::new(&gcc)
            .provision(&temp.path().join("rootfs"), false)
            .unwrap_err();
        assert!(matches!(err, StavesError::LibraryNotFound { name, .. } if name == LIBGCC));
    }

    #[test]
    fn missing_requested_libstdcxx_is_fatal() {
        let temp = tempdir().unwrap();
        let gcc = temp.path().join("gcc");
        toolchain(&gcc, "13", &[LIBGCC]);

        let err = StdlibProvisioner::new(&gcc)
            .provision(&temp.path().join("rootfs"), true)
            .unwrap_err();
        assert!(matches!(err, StavesError::LibraryNotFound { name, .. } if name == LIBSTDCXX));
    }

    #[test]
    fn greatest_path_wins() {
        let temp = tempdir().unwrap();
        let gcc = temp.path().join("gcc");
        toolchain(&gcc, "12", &[LIBGCC, LIBSTDCXX]);
        toolchain(&gcc, "13", &[LIBGCC, LIBSTDCXX]);
        let rootfs = temp.path().join("rootfs");

        StdlibProvisioner::new(&gcc).provision(&rootfs, true).unwrap();

        let libgcc = std::fs::read_to_string(rootfs.join("usr/lib").join(LIBGCC)).unwrap();
        let libstdcxx = std::fs::read_to_string(rootfs.join("usr/lib").join(LIBSTDCXX)).unwrap();
        assert_eq!(libgcc, "13");
        assert_eq!(libstdcxx, "13");
    }
}
