//! Running external tools.
//!
//! Every migration step shells out to `vcd`, `ovftool` or `gcloud`. The
//! [`CommandRunner`] trait is the seam between the migration logic and the
//! process table, so the driver can be exercised without the real tools.

use std::fmt;
use std::process::Command;

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Placeholder shown in place of secrets.
pub const REDACTED: &str = "****";

/// What to do with a child's output.
///
/// Inherited children share the terminal's stdin so they can prompt the
/// operator. Captured children read from `/dev/null`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Stream stdout and stderr to the terminal.
    #[default]
    Inherit,
    /// Capture stdout and stderr.
    Capture,
}

/// A program and its arguments.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    secrets: Vec<String>,
    mode: OutputMode,
    read_only: bool,
}

impl Invocation {
    /// Start building an invocation of `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secrets: Vec::new(),
            mode: OutputMode::Inherit,
            read_only: false,
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Mark a string that must never appear in logs or errors.
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// Capture the child's output instead of streaming it.
    pub fn capture(mut self) -> Self {
        self.mode = OutputMode::Capture;
        self
    }

    /// Mark the invocation as having no side effects on either platform.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Replace every secret in `text` with [`REDACTED`].
    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push_str(&format!("{arg:?}"));
            } else {
                line.push_str(arg);
            }
        }
        f.write_str(&self.redact(&line))
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invocation({self})")
    }
}

/// Result of running an [`Invocation`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` if the child was killed by a signal.
    pub status: Option<i32>,
    /// Captured stdout; empty for [`OutputMode::Inherit`].
    pub stdout: String,
    /// Captured stderr; empty for [`OutputMode::Inherit`].
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with the given exit code and stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(0)
    }

    /// Turn a non-zero exit into [`Error::CommandFailed`].
    pub fn check(self, invocation: &Invocation) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let mut output = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&self.stderr);
        }
        Err(Error::CommandFailed {
            command: invocation.to_string(),
            status: self.status,
            output: invocation.redact(&output),
        })
    }
}

/// Something that can run external programs.
pub trait CommandRunner {
    /// Run `invocation` to completion.
    ///
    /// A non-zero exit is not an error at this level; callers decide via
    /// [`CommandOutput::check`].
    fn run(&mut self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Runs programs with [`std::process::Command`].
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!(command = %invocation, "running");

        let mut command = Command::new(invocation.program());
        command.args(invocation.arguments());

        let spawn_error = |source: std::io::Error| Error::Spawn {
            program: invocation.program().to_string(),
            source,
        };

        match invocation.mode() {
            OutputMode::Inherit => {
                let status = command.status().map_err(spawn_error)?;
                Ok(CommandOutput {
                    status: status.code(),
                    ..CommandOutput::default()
                })
            }
            OutputMode::Capture => {
                let output = command.output().map_err(spawn_error)?;
                Ok(CommandOutput {
                    status: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
        }
    }
}

/// Runs read-only invocations and only logs the rest.
///
/// Skipped invocations report success with empty output.
#[derive(Debug, Default)]
pub struct DryRunner<R> {
    inner: R,
}

impl<R: CommandRunner> DryRunner<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: CommandRunner> CommandRunner for DryRunner<R> {
    fn run(&mut self, invocation: &Invocation) -> Result<CommandOutput> {
        if invocation.is_read_only() {
            return self.inner.run(invocation);
        }
        info!(command = %invocation, "dry run, skipping");
        Ok(CommandOutput::success(""))
    }
}
