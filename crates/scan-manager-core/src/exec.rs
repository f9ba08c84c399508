// crates/scan-manager-core/src/exec.rs
// ============================================================================
// Module: External Tool Adapter
// Description: Common subprocess invocation for gpg, sendmail, wget, and
//              report-format filters.
// Purpose: Capture stdout, discard stderr, bound the runtime, and
//          normalize exit status for every external collaborator.
// Dependencies: std::process, std::thread, thiserror
// ============================================================================

//! ## Overview
//! Every external tool the manager spawns goes through this adapter. The
//! child's stdout is captured (or redirected to a file for large report
//! artifacts), stderr is discarded, and a caller-supplied timeout bounds the
//! wait. Exit status is normalized to a code or a signal marker so callers
//! can map it to their own outcome (gpg's 0/1/other trust mapping, filter
//! success, mail acceptance). External subprocesses are uncancelable once
//! started; completion is awaited up to the timeout.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::Child;
use std::process::Command;
use std::process::Stdio;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Poll interval while waiting for a child to finish.
const WAIT_POLL: Duration = Duration::from_millis(20);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// External tool invocation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// The program could not be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying error message.
        message: String,
    },
    /// Pipe plumbing to or from the child failed.
    #[error("tool io error for {program}: {message}")]
    Io {
        /// Program the pipe belonged to.
        program: String,
        /// Underlying error message.
        message: String,
    },
    /// The child ran past the configured timeout and was killed.
    #[error("{program} timed out after {seconds}s")]
    Timeout {
        /// Program that was killed.
        program: String,
        /// Timeout that was exceeded.
        seconds: u64,
    },
}

// ============================================================================
// SECTION: Exit Normalization
// ============================================================================

/// Normalized exit status of a finished tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolExit {
    /// Process exited with a code.
    Code(i32),
    /// Process was terminated by a signal.
    Signal,
}

impl ToolExit {
    /// Whether the tool exited with code 0.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Code(0))
    }
}

/// Captured result of a tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Normalized exit status.
    pub exit: ToolExit,
    /// Everything the child wrote to stdout.
    pub stdout: Vec<u8>,
}

// ============================================================================
// SECTION: Tool Command
// ============================================================================

/// A single external tool invocation.
///
/// # Invariants
/// - `timeout` bounds the whole run; an overrunning child is killed.
/// - Stderr is always discarded; diagnostics belong to the caller's log.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    /// Program path or name.
    program: PathBuf,
    /// Positional arguments.
    args: Vec<String>,
    /// Working directory for the child.
    cwd: Option<PathBuf>,
    /// Bytes piped to the child's stdin, if any.
    stdin: Option<Vec<u8>>,
    /// Maximum wall-clock runtime.
    timeout: Duration,
}

impl ToolCommand {
    /// Creates a command for `program` with the given timeout.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdin: None,
            timeout,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the child's working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Pipes `bytes` to the child's stdin.
    #[must_use]
    pub fn stdin_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }

    /// Runs the tool, capturing stdout in memory.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] on spawn failure, pipe failure, or timeout.
    pub fn run(&self) -> Result<ToolOutput, ExecError> {
        let mut child = self.spawn(Stdio::piped())?;
        let reader = self.start_stdout_reader(&mut child)?;
        self.feed_stdin(&mut child)?;
        let exit = self.await_exit(&mut child)?;
        let stdout = reader
            .join()
            .map_err(|_| self.io_error("stdout reader thread failed"))?
            .map_err(|err| self.io_error(&err.to_string()))?;
        Ok(ToolOutput {
            exit,
            stdout,
        })
    }

    /// Runs the tool with stdout redirected to `path`. Used for artifacts
    /// too large to buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] on spawn failure, pipe failure, or timeout.
    pub fn run_to_file(&self, path: &Path) -> Result<ToolExit, ExecError> {
        let file = File::create(path).map_err(|err| self.io_error(&err.to_string()))?;
        let mut child = self.spawn(Stdio::from(file))?;
        self.feed_stdin(&mut child)?;
        self.await_exit(&mut child)
    }

    /// Spawns the child with the requested stdout disposition.
    fn spawn(&self, stdout: Stdio) -> Result<Child, ExecError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        command.stdin(if self.stdin.is_some() { Stdio::piped() } else { Stdio::null() });
        command.stdout(stdout);
        command.stderr(Stdio::null());
        command.spawn().map_err(|err| ExecError::Spawn {
            program: self.program.display().to_string(),
            message: err.to_string(),
        })
    }

    /// Starts the thread draining the child's stdout pipe.
    fn start_stdout_reader(
        &self,
        child: &mut Child,
    ) -> Result<JoinHandle<std::io::Result<Vec<u8>>>, ExecError> {
        let mut stdout =
            child.stdout.take().ok_or_else(|| self.io_error("stdout unavailable"))?;
        Ok(thread::spawn(move || {
            let mut buffer = Vec::new();
            stdout.read_to_end(&mut buffer)?;
            Ok(buffer)
        }))
    }

    /// Writes the configured stdin bytes, if any, and closes the pipe.
    fn feed_stdin(&self, child: &mut Child) -> Result<(), ExecError> {
        let Some(bytes) = &self.stdin else {
            return Ok(());
        };
        let mut stdin =
            child.stdin.take().ok_or_else(|| self.io_error("stdin unavailable"))?;
        stdin.write_all(bytes).map_err(|err| self.io_error(&err.to_string()))?;
        drop(stdin);
        Ok(())
    }

    /// Polls the child until exit or deadline; kills on deadline.
    fn await_exit(&self, child: &mut Child) -> Result<ToolExit, ExecError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Ok(status.code().map_or(ToolExit::Signal, ToolExit::Code));
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ExecError::Timeout {
                            program: self.program.display().to_string(),
                            seconds: self.timeout.as_secs(),
                        });
                    }
                    thread::sleep(WAIT_POLL);
                }
                Err(err) => return Err(self.io_error(&err.to_string())),
            }
        }
    }

    /// Builds an [`ExecError::Io`] for this command.
    fn io_error(&self, message: &str) -> ExecError {
        ExecError::Io {
            program: self.program.display().to_string(),
            message: message.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use std::time::Duration;

    use super::ExecError;
    use super::ToolCommand;
    use super::ToolExit;

    #[test]
    fn captures_stdout_and_exit_code() {
        let output = ToolCommand::new("sh", Duration::from_secs(5))
            .arg("-c")
            .arg("printf hello; exit 3")
            .run()
            .unwrap();
        assert_eq!(output.stdout, b"hello");
        assert_eq!(output.exit, ToolExit::Code(3));
        assert!(!output.exit.success());
    }

    #[test]
    fn pipes_stdin_through() {
        let output = ToolCommand::new("cat", Duration::from_secs(5))
            .stdin_bytes(b"payload".to_vec())
            .run()
            .unwrap();
        assert_eq!(output.stdout, b"payload");
        assert!(output.exit.success());
    }

    #[test]
    fn kills_overrunning_children() {
        let result = ToolCommand::new("sleep", Duration::from_millis(100)).arg("30").run();
        assert!(matches!(result, Err(ExecError::Timeout { .. })));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let result =
            ToolCommand::new("/nonexistent/tool-for-test", Duration::from_secs(1)).run();
        assert!(matches!(result, Err(ExecError::Spawn { .. })));
    }
}
