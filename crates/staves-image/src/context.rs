//! In-memory build context archives.

use std::path::Path;

use staves_common::StavesResult;

use crate::dockerfile::{BuildInstructions, ROOTFS_DIR};

/// Name of the build-instruction document inside the context.
pub const DOCKERFILE: &str = "Dockerfile";

/// A tar stream holding the build instructions and the staging root.
#[derive(Debug, Clone)]
pub struct BuildContext {
    bytes: Vec<u8>,
}

impl BuildContext {
    /// Archive `instructions` and the tree at `staging_root`.
    ///
    /// Symbolic links in the staging root are archived as links.
    pub fn new(instructions: &BuildInstructions, staging_root: &Path) -> StavesResult<Self> {
        tracing::debug!(rootfs = %staging_root.display(), "Creating build context");

        let dockerfile = instructions.render();
        let mut builder = tar::Builder::new(Vec::new());
        builder.follow_symlinks(false);

        let mut header = tar::Header::new_gnu();
        header.set_size(dockerfile.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, DOCKERFILE, dockerfile.as_bytes())?;

        builder.append_dir_all(ROOTFS_DIR, staging_root)?;

        let bytes = builder.into_inner()?;
        tracing::debug!(size = bytes.len(), "Build context created");

        Ok(Self { bytes })
    }

    /// Size of the archive in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the archive is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw tar bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the context, returning the tar bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
