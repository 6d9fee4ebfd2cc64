//! Base layout of the staging root: library directories, locales and the
//! files a builder image needs to run Portage itself.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use staves_common::{CommandRunner, HostPaths, Invocation, StavesResult};

use super::copy::copy_from_root;
use crate::config::Locale;

/// Prefixes that get a `lib -> lib64` symlink on glibc systems.
const LIB_PREFIXES: [&str; 3] = ["", "usr", "usr/local"];

/// Host paths copied into builder images.
pub const BUILDER_FILES: [&str; 9] = [
    "/usr/portage",
    "/etc/portage/make.conf",
    "/etc/portage/make.profile",
    "/etc/portage/repos.conf",
    "/etc/portage/env",
    "/etc/portage/package.env",
    "/etc/portage/package.use",
    "/etc/portage/package.accept_keywords",
    "/var/db/repos/*",
];

/// Whether the libc package is musl.
#[must_use]
pub fn is_musl(libc: &str) -> bool {
    libc.contains("musl")
}

/// Whether the libc package is glibc.
#[must_use]
pub fn is_glibc(libc: &str) -> bool {
    libc.contains("glibc")
}

/// Create `lib64` directories with `lib` symlinks pointing at them.
///
/// musl uses plain `lib` directories, so nothing is created for it.
pub fn create_lib_symlinks(rootfs: &Path, libc: &str) -> StavesResult<()> {
    if is_musl(libc) {
        return Ok(());
    }

    for prefix in LIB_PREFIXES {
        let base = rootfs.join(prefix);
        std::fs::create_dir_all(base.join("lib64"))?;

        let link = base.join("lib");
        if link.symlink_metadata().is_err() {
            std::os::unix::fs::symlink("lib64", &link)?;
        }
    }
    Ok(())
}

/// Generate `locale` on the host and copy the archive into the staging root.
pub async fn generate_locale(
    runner: &dyn CommandRunner,
    paths: &HostPaths,
    rootfs: &Path,
    locale: &Locale,
) -> StavesResult<Vec<PathBuf>> {
    tracing::info!(name = %locale.name, charset = %locale.charset, "Generating locale");

    let locale_gen = paths.locale_gen();
    if let Some(parent) = locale_gen.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&locale_gen)?;
    writeln!(file, "{} {}", locale.name, locale.charset)?;

    let invocation = Invocation::new("locale-gen");
    runner.run(&invocation).await?.check(&invocation)?;

    let archive = paths.locale_archive();
    let relative = archive.strip_prefix(&paths.root).unwrap_or(&archive);
    copy_from_root(
        &paths.root,
        rootfs,
        &glob::Pattern::escape(&relative.to_string_lossy()),
    )
}

/// Copy the Portage tree, configuration and overlays into the staging root.
pub fn copy_builder_files(paths: &HostPaths, rootfs: &Path) -> StavesResult<()> {
    for pattern in BUILDER_FILES {
        let copied = copy_from_root(&paths.root, rootfs, pattern)?;
        tracing::debug!(pattern, count = copied.len(), "Copied builder files");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use staves_common::{CommandOutput, RecordingRunner, StavesError};
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn glibc_gets_lib64_symlinks() {
        let temp = tempdir().unwrap();
        create_lib_symlinks(temp.path(), "sys-libs/glibc").unwrap();

        for prefix in LIB_PREFIXES {
            let base = temp.path().join(prefix);
            assert!(base.join("lib64").is_dir());
            assert_eq!(
                std::fs::read_link(base.join("lib")).unwrap(),
                PathBuf::from("lib64")
            );
        }
    }

    #[test]
    fn symlinks_are_idempotent() {
        let temp = tempdir().unwrap();
        create_lib_symlinks(temp.path(), "sys-libs/glibc").unwrap();
        create_lib_symlinks(temp.path(), "sys-libs/glibc").unwrap();
    }

    #[test]
    fn musl_keeps_plain_lib() {
        let temp = tempdir().unwrap();
        create_lib_symlinks(temp.path(), "sys-libs/musl").unwrap();
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn locale_is_generated_and_copied() {
        let temp = tempdir().unwrap();
        let paths = HostPaths::with_root(temp.path().join("host"));
        let archive = paths.locale_archive();
        std::fs::create_dir_all(archive.parent().unwrap()).unwrap();
        std::fs::write(&archive, "archive").unwrap();
        let rootfs = temp.path().join("rootfs");
        let runner = RecordingRunner::new();

        let locale = Locale {
            name: "en_US.UTF-8".to_string(),
            charset: "UTF-8".to_string(),
        };
        let copied = generate_locale(&runner, &paths, &rootfs, &locale)
            .await
            .unwrap();

        let dest = rootfs.join("usr/lib/locale/locale-archive");
        assert_eq!(copied, vec![dest.clone()]);
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "archive");
        assert_eq!(
            std::fs::read_to_string(paths.locale_gen()).unwrap(),
            "en_US.UTF-8 UTF-8\n"
        );
        assert_eq!(runner.command_lines(), vec!["locale-gen"]);
    }

    #[tokio::test]
    async fn locale_gen_failure_is_fatal() {
        let temp = tempdir().unwrap();
        let paths = HostPaths::with_root(temp.path());
        let runner = RecordingRunner::new().respond("locale-gen", CommandOutput::failed(1, "bad"));

        let err = generate_locale(&runner, &paths, temp.path(), &Locale::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StavesError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn existing_locale_archive_is_not_overwritten() {
        let temp = tempdir().unwrap();
        let paths = HostPaths::with_root(temp.path().join("host"));
        let archive = paths.locale_archive();
        std::fs::create_dir_all(archive.parent().unwrap()).unwrap();
        std::fs::write(&archive, "archive").unwrap();
        let rootfs = temp.path().join("rootfs");
        let dest = rootfs.join("usr/lib/locale/locale-archive");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, "stale").unwrap();

        let err = generate_locale(&RecordingRunner::new(), &paths, &rootfs, &Locale::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StavesError::Io(_)));
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "stale");
    }

    #[test]
    fn builder_files_are_copied() {
        let temp = tempdir().unwrap();
        let paths = HostPaths::with_root(temp.path().join("host"));
        std::fs::create_dir_all(paths.host("/etc/portage/package.use")).unwrap();
        std::fs::write(paths.make_conf(), "FEATURES=\"buildpkg\"\n").unwrap();
        std::fs::create_dir_all(paths.host("/var/db/repos/gentoo/metadata")).unwrap();
        let rootfs = temp.path().join("rootfs");

        copy_builder_files(&paths, &rootfs).unwrap();

        assert!(rootfs.join("etc/portage/make.conf").is_file());
        assert!(rootfs.join("etc/portage/package.use").is_dir());
        assert!(rootfs.join("var/db/repos/gentoo/metadata").is_dir());
        assert!(!rootfs.join("usr/portage").exists());
    }
}
