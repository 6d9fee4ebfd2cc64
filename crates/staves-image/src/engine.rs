//! Container engine front end.

use staves_common::{CommandRunner, Invocation, StavesResult};

use crate::context::BuildContext;
use crate::dockerfile::BuildInstructions;
use crate::tag::ImageTag;

/// A Docker-compatible container engine CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEngine {
    program: String,
}

impl ImageEngine {
    /// Default engine program.
    pub const DEFAULT_PROGRAM: &'static str = "docker";

    /// Use the given engine program (`docker`, `podman`, ...).
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Invocation that builds `tag` from a context read on stdin.
    #[must_use]
    pub fn build_invocation(&self, context: BuildContext, tag: &ImageTag) -> Invocation {
        Invocation::new(&self.program)
            .args(["build", "--tag"])
            .arg(tag.to_string())
            .arg("-")
            .stdin(context.into_bytes())
    }

    /// Submit a build context and wait for the image to be built.
    pub async fn build(
        &self,
        runner: &dyn CommandRunner,
        context: BuildContext,
        tag: &ImageTag,
    ) -> StavesResult<()> {
        tracing::info!(tag = %tag, context_size = context.len(), "Building image");

        let invocation = self.build_invocation(context, tag);
        let output = runner.run(&invocation).await?;
        if !output.success() {
            tracing::error!(stderr = %output.stderr.trim(), "Image build failed");
        }
        output.check(&invocation)?;

        tracing::info!(tag = %tag, "Image built successfully");
        Ok(())
    }

    /// Package a finished staging root as a single-layer image.
    pub async fn package(
        &self,
        runner: &dyn CommandRunner,
        staging_root: &std::path::Path,
        tag: &ImageTag,
        instructions: &BuildInstructions,
    ) -> StavesResult<()> {
        let context = BuildContext::new(instructions, staging_root)?;
        self.build(runner, context, tag).await
    }
}

impl Default for ImageEngine {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PROGRAM)
    }
}
