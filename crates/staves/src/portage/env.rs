//! `make.conf` variables and named environment profiles.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use staves_common::{HostPaths, StavesResult};

use crate::config::Environment;

/// `FEATURES` every build starts from.
///
/// Turns off Portage's sandboxes and documentation, and keeps a binary
/// package of everything built.
pub const BASELINE_FEATURES: &str = "${FEATURES} -userpriv -usersandbox \
    -ipc-sandbox -network-sandbox -pid-sandbox -sandbox \
    buildpkg binpkg-multi-instance -binpkg-logs \
    -news nodoc noinfo noman";

/// Appends variables to `make.conf` and `env/<profile>`.
#[derive(Debug, Clone)]
pub struct EnvWriter<'a> {
    paths: &'a HostPaths,
}

impl<'a> EnvWriter<'a> {
    /// Create a writer for the given host.
    #[must_use]
    pub const fn new(paths: &'a HostPaths) -> Self {
        Self { paths }
    }

    /// Write global variables and every named profile.
    pub fn write(&self, env: &Environment) -> StavesResult<()> {
        if !env.global.is_empty() {
            self.write_global(&env.global)?;
        }
        for (name, vars) in &env.profiles {
            self.write_profile(name, vars)?;
        }
        Ok(())
    }

    /// Append the baseline `FEATURES` to `make.conf`.
    pub fn write_baseline(&self) -> StavesResult<()> {
        let vars = BTreeMap::from([("FEATURES".to_string(), BASELINE_FEATURES.to_string())]);
        self.write_global(&vars)
    }

    /// Append variables to `make.conf`.
    pub fn write_global(&self, vars: &BTreeMap<String, String>) -> StavesResult<()> {
        std::fs::create_dir_all(self.paths.env_dir())?;
        append_vars(&self.paths.make_conf(), vars)
    }

    /// Append variables to the named profile.
    pub fn write_profile(&self, name: &str, vars: &BTreeMap<String, String>) -> StavesResult<()> {
        let dir = self.paths.env_dir();
        std::fs::create_dir_all(&dir)?;
        append_vars(&dir.join(name), vars)
    }
}

fn append_vars(path: &Path, vars: &BTreeMap<String, String>) -> StavesResult<()> {
    tracing::debug!(path = %path.display(), count = vars.len(), "Writing environment");

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for (key, value) in vars {
        writeln!(file, "{key}=\"{value}\"")?;
    }
    Ok(())
}
