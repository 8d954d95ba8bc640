//! External tool invocation
//!
//! Every external program the lane calls (`voms-proxy-info`,
//! `voms-proxy-init`, campaign generator scripts, `condor_submit`) goes
//! through the [`CommandRunner`] trait so the orchestration can be tested
//! without the grid tooling installed.
//!
//! Calls are synchronous and have no timeout of their own; they inherit
//! whatever the invoked tool does.

mod mock;

pub use mock::MockRunner;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// How the child's standard streams are wired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Capture stdout/stderr for parsing
    Capture,
    /// Share the terminal; needed for interactive prompts such as the
    /// grid passphrase asked by `voms-proxy-init`
    Inherit,
}

/// A fully-described external program call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path
    pub program: String,
    /// Arguments, passed verbatim
    pub args: Vec<String>,
    /// Working directory of the child process only
    pub current_dir: Option<PathBuf>,
    /// Stream wiring
    pub streams: StreamMode,
}

impl Invocation {
    /// Create a captured invocation of `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            streams: StreamMode::Capture,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the child inside `dir`
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Let the child share the terminal
    pub fn inherit_streams(mut self) -> Self {
        self.streams = StreamMode::Inherit;
        self
    }

    /// Command line for diagnostics
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Result of a finished external call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` if the process was killed by a signal
    pub code: Option<i32>,
    /// Captured stdout (empty when streams are inherited)
    pub stdout: String,
    /// Captured stderr (empty when streams are inherited)
    pub stderr: String,
}

impl ToolOutput {
    /// Successful exit with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed exit with the given code and stderr
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Errors from external tool calls
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {}: {stderr}", code_label(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn code_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "a signal".to_string(),
    }
}

/// Executes external programs
pub trait CommandRunner: Send + Sync {
    /// Run the invocation to completion. Only launch failures are errors;
    /// a non-zero exit is reported through [`ToolOutput::code`].
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError>;

    /// Run the invocation and treat a non-zero exit as [`ToolError::Failed`]
    fn run_checked(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        let output = self.run(invocation)?;
        if output.is_success() {
            Ok(output)
        } else {
            Err(ToolError::Failed {
                command: invocation.display(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs programs on the local host with `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(ref dir) = invocation.current_dir {
            command.current_dir(dir);
        }

        tracing::debug!(command = %invocation, "running external tool");

        let spawn_err = |source| ToolError::Spawn {
            program: invocation.program.clone(),
            source,
        };

        match invocation.streams {
            StreamMode::Capture => {
                let output = command
                    .stdin(Stdio::null())
                    .output()
                    .map_err(spawn_err)?;
                Ok(ToolOutput {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            StreamMode::Inherit => {
                let status = command.status().map_err(spawn_err)?;
                Ok(ToolOutput {
                    code: status.code(),
                    ..ToolOutput::default()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display() {
        let inv = Invocation::new("voms-proxy-info")
            .args(["-timeleft", "-file"])
            .arg("/tmp/x509up_u1000");
        assert_eq!(inv.display(), "voms-proxy-info -timeleft -file /tmp/x509up_u1000");
        assert_eq!(inv.streams, StreamMode::Capture);
    }

    #[test]
    fn test_run_checked_maps_nonzero_exit() {
        let runner = MockRunner::new(|_| ToolOutput::failure(3, "no proxy\n"));
        let err = runner
            .run_checked(&Invocation::new("voms-proxy-info"))
            .unwrap_err();

        match err {
            ToolError::Failed { command, code, stderr } => {
                assert_eq!(command, "voms-proxy-info");
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "no proxy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_failed_error_message_for_signal() {
        let err = ToolError::Failed {
            command: "condor_submit a.jdl".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("exited with a signal"));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_stdout() {
        let output = SystemRunner
            .run(&Invocation::new("sh").args(["-c", "echo 42"]))
            .unwrap();
        assert!(output.is_success());
        assert_eq!(output.stdout.trim(), "42");
    }

    #[test]
    fn test_system_runner_spawn_failure() {
        let err = SystemRunner
            .run(&Invocation::new("definitely-not-a-real-tool-xyz"))
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }
}
