//! Copying host files into the staging root.

use std::fs;
use std::path::{Component, Path, PathBuf};

use staves_common::{StavesError, StavesResult};

/// Copy every host path matching `pattern` into `rootfs`.
///
/// A match at `/a/b` lands at `<rootfs>/a/b`. Symbolic links are recreated
/// with the same target, directories are copied recursively and regular
/// files byte for byte. Existing destinations are not overwritten: the
/// copy fails instead. A pattern without matches copies nothing.
pub fn copy_to_rootfs(rootfs: &Path, pattern: &str) -> StavesResult<Vec<PathBuf>> {
    copy_from_root(Path::new("/"), rootfs, pattern)
}

/// Like [`copy_to_rootfs`], with `pattern` resolved below `source_root`.
///
/// Destinations mirror the match relative to `source_root`.
pub fn copy_from_root(
    source_root: &Path,
    rootfs: &Path,
    pattern: &str,
) -> StavesResult<Vec<PathBuf>> {
    let full_pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&source_root.to_string_lossy()).trim_end_matches('/'),
        pattern.trim_start_matches('/')
    );
    let matches = glob::glob(&full_pattern)
        .map_err(|e| StavesError::config(format!("Invalid glob pattern '{pattern}': {e}")))?;

    let mut copied = Vec::new();
    for entry in matches {
        let host_path = entry.map_err(|e| StavesError::Io(e.into_error()))?;
        let relative = host_path.strip_prefix(source_root).unwrap_or(&host_path);
        let dest = rootfs.join(relative_to_root(relative));

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        copy_entry(&host_path, &dest)?;
        tracing::debug!(src = %host_path.display(), dest = %dest.display(), "Copied to rootfs");
        copied.push(dest);
    }

    if copied.is_empty() {
        tracing::debug!(pattern, "No paths matched");
    }
    Ok(copied)
}

/// Strip the root and prefix components so the path can be joined.
fn relative_to_root(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect()
}

/// Copy a single path without following a top-level symlink.
fn copy_entry(src: &Path, dest: &Path) -> StavesResult<()> {
    let file_type = fs::symlink_metadata(src)?.file_type();

    if file_type.is_symlink() {
        let target = fs::read_link(src)?;
        std::os::unix::fs::symlink(target, dest)?;
    } else if file_type.is_dir() {
        copy_dir_recursive(src, dest)?;
    } else if file_type.is_file() {
        if dest.symlink_metadata().is_ok() {
            return Err(StavesError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", dest.display()),
            )));
        }
        fs::copy(src, dest)?;
    } else {
        return Err(StavesError::UnsupportedCopy {
            path: src.to_path_buf(),
        });
    }
    Ok(())
}

/// Copy a directory tree, preserving symlinks inside it.
fn copy_dir_recursive(src: &Path, dest: &Path) -> StavesResult<()> {
    fs::create_dir(dest)?;
    // Permissions are applied last so read-only directories can be filled.
    let mut dir_permissions = vec![(dest.to_path_buf(), fs::metadata(src)?.permissions())];

    for entry in walkdir::WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(walkdir_io)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| StavesError::Io(std::io::Error::other(e.to_string())))?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            std::os::unix::fs::symlink(fs::read_link(entry.path())?, &target)?;
        } else if file_type.is_dir() {
            fs::create_dir(&target)?;
            let permissions = entry.metadata().map_err(walkdir_io)?.permissions();
            dir_permissions.push((target, permissions));
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        } else {
            return Err(StavesError::UnsupportedCopy {
                path: entry.path().to_path_buf(),
            });
        }
    }

    for (dir, permissions) in dir_permissions.into_iter().rev() {
        fs::set_permissions(dir, permissions)?;
    }
    Ok(())
}

fn walkdir_io(err: walkdir::Error) -> StavesError {
    let message = err.to_string();
    StavesError::Io(
        err.into_io_error()
            .unwrap_or_else(|| std::io::Error::other(message)),
    )
}
