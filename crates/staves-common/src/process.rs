//! External command execution.
//!
//! Every collaborator (package manager, repository tools, container engine)
//! is invoked through [`CommandRunner`]. Environment variables are attached
//! to the [`Invocation`] itself; the process environment is never mutated.

use std::fmt;
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{StavesError, StavesResult};

/// A single external command to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment variables for this invocation only.
    pub env: Vec<(String, String)>,
    /// Bytes written to the child's stdin.
    pub stdin: Option<Vec<u8>>,
    /// Whether stderr is captured (`true`) or passed through.
    pub capture_stderr: bool,
}

impl Invocation {
    /// Create a new invocation that captures stderr.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            capture_stderr: true,
            ..Self::default()
        }
    }

    /// Add a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for this invocation.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Feed bytes to the child's stdin.
    #[must_use]
    pub fn stdin(mut self, data: Vec<u8>) -> Self {
        self.stdin = Some(data);
        self
    }

    /// Let the child write to our stderr directly.
    #[must_use]
    pub const fn inherit_stderr(mut self) -> Self {
        self.capture_stderr = false;
        self
    }

    /// Look up an environment variable set on this invocation.
    #[must_use]
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Result of running an [`Invocation`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` if terminated by a signal.
    pub code: Option<i32>,
    /// Captured stderr (empty when stderr was inherited).
    pub stderr: String,
}

impl CommandOutput {
    /// A successful, silent result.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            code: Some(0),
            stderr: String::new(),
        }
    }

    /// A failed result with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the command exited successfully.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Convert a non-zero exit into [`StavesError::CommandFailed`].
    pub fn check(self, invocation: &Invocation) -> StavesResult<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(StavesError::CommandFailed {
            command: invocation.to_string(),
            code: self.code,
            stderr: self.stderr,
        })
    }
}

/// Runs external commands to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation and wait for it to exit.
    ///
    /// A non-zero exit is not an error at this level; only failing to start
    /// the process is.
    async fn run(&self, invocation: &Invocation) -> StavesResult<CommandOutput>;
}

/// Runs commands on the host with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> StavesResult<CommandOutput> {
        tracing::debug!(command = %invocation, "Executing command");

        let spawn_err = |source| StavesError::Spawn {
            program: invocation.program.clone(),
            source,
        };

        let mut command = tokio::process::Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::inherit())
            .stderr(if invocation.capture_stderr {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::inherit()
            });

        let mut child = command.spawn().map_err(spawn_err)?;

        // Stdin is fed while stderr is drained, so neither pipe can fill up
        // and block the other side.
        let pipe = child.stdin.take();
        let feed = async {
            let (Some(mut pipe), Some(data)) = (pipe, invocation.stdin.as_deref()) else {
                return Ok(());
            };
            match pipe.write_all(data).await {
                // The child exited without reading everything; its exit
                // status and stderr tell why.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::debug!(program = %invocation.program, "Stdin closed early");
                    Ok(())
                }
                // Dropping the pipe closes it so the child sees EOF.
                result => result,
            }
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(spawn_err)?;
        fed.map_err(spawn_err)?;

        Ok(CommandOutput {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Records invocations instead of running them.
///
/// Each call pops the next scripted result; once the script is exhausted
/// every command succeeds. Used by tests.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    script: Mutex<Vec<(String, CommandOutput)>>,
}

impl RecordingRunner {
    /// Create a runner where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next invocation whose rendered command line contains
    /// `needle` return `output`.
    #[must_use]
    pub fn respond(self, needle: impl Into<String>, output: CommandOutput) -> Self {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((needle.into(), output));
        self
    }

    /// All invocations seen so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Rendered command lines seen so far.
    #[must_use]
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> StavesResult<CommandOutput> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(invocation.clone());

        let rendered = invocation.to_string();
        let mut script = self
            .script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let output = script
            .iter()
            .position(|(needle, _)| rendered.contains(needle.as_str()))
            .map_or_else(CommandOutput::ok, |idx| script.remove(idx).1);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_display() {
        let inv = Invocation::new("emaint").args(["sync", "--repo", "guru"]);
        assert_eq!(inv.to_string(), "emaint sync --repo guru");
    }

    #[test]
    fn invocation_env_is_local() {
        let inv = Invocation::new("emerge").env("MAKEOPTS", "-j3 -l2");
        assert_eq!(inv.env_var("MAKEOPTS"), Some("-j3 -l2"));
        assert!(std::env::var("MAKEOPTS").map_or(true, |v| v != "-j3 -l2"));
    }

    #[test]
    fn check_converts_failure() {
        let inv = Invocation::new("false");
        let err = CommandOutput::failed(1, "nope").check(&inv).unwrap_err();
        assert!(matches!(err, StavesError::CommandFailed { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn system_runner_reports_exit_code() {
        let runner = SystemRunner;
        let ok = runner.run(&Invocation::new("true")).await.unwrap();
        assert!(ok.success());

        let failed = runner
            .run(&Invocation::new("sh").args(["-c", "echo oops >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(failed.code, Some(3));
        assert_eq!(failed.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn system_runner_passes_env_and_stdin() {
        let runner = SystemRunner;
        let out = runner
            .run(
                &Invocation::new("sh")
                    .args(["-c", "read line; [ \"$line\" = \"$EXPECTED\" ]"])
                    .env("EXPECTED", "hello")
                    .stdin(b"hello\n".to_vec()),
            )
            .await
            .unwrap();
        assert!(out.success());
    }

    fn large_input() -> Vec<u8> {
        vec![b'x'; 4 * 1024 * 1024]
    }

    #[tokio::test]
    async fn system_runner_reports_early_exit_with_pending_stdin() {
        let out = SystemRunner
            .run(
                &Invocation::new("sh")
                    .args(["-c", "echo 'Cannot connect to the Docker daemon' >&2; exit 1"])
                    .stdin(large_input()),
            )
            .await
            .unwrap();
        assert_eq!(out.code, Some(1));
        assert_eq!(out.stderr.trim(), "Cannot connect to the Docker daemon");
    }

    #[tokio::test]
    async fn system_runner_drains_stderr_while_feeding_stdin() {
        let invocation = Invocation::new("sh")
            .args(["-c", "head -c 200000 /dev/zero >&2; cat >/dev/null"])
            .stdin(large_input());
        let run = SystemRunner.run(&invocation);
        let out = tokio::time::timeout(std::time::Duration::from_secs(30), run)
            .await
            .expect("command blocked on a full pipe")
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stderr.len(), 200_000);
    }

    #[tokio::test]
    async fn system_runner_missing_program() {
        let err = SystemRunner
            .run(&Invocation::new("staves-definitely-missing-binary"))
            .await
            .unwrap_err();
        assert!(matches!(err, StavesError::Spawn { .. }));
    }

    #[tokio::test]
    async fn recording_runner_scripts_failures() {
        let runner = RecordingRunner::new().respond("--onlydeps", CommandOutput::failed(1, "x"));
        let a = runner
            .run(&Invocation::new("emerge").arg("--onlydeps"))
            .await
            .unwrap();
        let b = runner
            .run(&Invocation::new("emerge").arg("--onlydeps"))
            .await
            .unwrap();
        assert!(!a.success());
        assert!(b.success());
        assert_eq!(runner.calls().len(), 2);
    }
}
