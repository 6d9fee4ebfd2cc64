//! Running a build inside a builder container.

use std::path::{Path, PathBuf};

use staves_common::{CommandRunner, Invocation, StavesError, StavesResult};

/// Engine socket on the host.
pub const ENGINE_SOCKET: &str = "/run/docker.sock";
/// Where the binary package cache is mounted in the builder.
pub const PACKAGE_CACHE_TARGET: &str = "/usr/portage/packages";

/// Home directories of the users that may need credentials in the builder.
const CREDENTIAL_HOMES: [&str; 2] = ["/root", "/var/tmp/portage"];

/// Options for `staves run-builder`.
#[derive(Debug, Clone)]
pub struct BuilderRuntime {
    /// Container engine program.
    pub engine: String,
    /// Builder image reference.
    pub image: String,
    /// Named volume holding binary packages.
    pub build_cache: Option<String>,
    /// Mount `~/.ssh` read-only.
    pub ssh: bool,
    /// Mount `~/.netrc` read-only.
    pub netrc: bool,
    /// Arguments passed to the builder's entry point.
    pub args: Vec<String>,
}

impl BuilderRuntime {
    /// Command line for the container run.
    pub fn invocation(&self, home: Option<&Path>) -> StavesResult<Invocation> {
        let mut invocation = Invocation::new(&self.engine)
            .args(["run", "--rm", "--interactive"])
            .inherit_stderr();

        if let Some(volume) = &self.build_cache {
            invocation = invocation.args([
                "--mount".to_string(),
                format!("type=volume,source={volume},target={PACKAGE_CACHE_TARGET}"),
            ]);
        }
        invocation = invocation.args([
            "--mount".to_string(),
            format!("type=bind,source={ENGINE_SOCKET},target=/var/run/docker.sock"),
        ]);

        for (enabled, name) in [(self.ssh, ".ssh"), (self.netrc, ".netrc")] {
            if !enabled {
                continue;
            }
            let home = home.ok_or_else(|| {
                StavesError::config(format!("Cannot mount ~/{name}: home directory is unknown"))
            })?;
            let source = home.join(name);
            for target in CREDENTIAL_HOMES {
                invocation = invocation.args([
                    "--mount".to_string(),
                    format!(
                        "type=bind,source={},target={target}/{name},readonly",
                        source.display()
                    ),
                ]);
            }
        }

        Ok(invocation.arg(&self.image).args(self.args.iter().cloned()))
    }

    /// Run the builder, forwarding `config` on its stdin.
    pub async fn run(&self, runner: &dyn CommandRunner, config: Vec<u8>) -> StavesResult<()> {
        let home: Option<PathBuf> = dirs::home_dir();
        let invocation = self.invocation(home.as_deref())?.stdin(config);

        tracing::info!(image = %self.image, "Running builder");
        runner.run(&invocation).await?.check(&invocation)?;
        Ok(())
    }
}
