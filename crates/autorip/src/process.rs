//! Supervised execution of external tools.
//!
//! Every external invocation (makemkvcon, the encoder, eject) goes through
//! [`run_supervised`]: the child is started in its own process group, its
//! output captured, and it is killed if it outlives the configured wall-clock
//! limit.

use std::ffi::OsString;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Lines of stderr kept in failure messages.
const STDERR_TAIL_LINES: usize = 5;

/// Error type for supervised process execution
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// Process exited with non-zero status
    #[error("{program} failed with exit code {code}{}", format_tail(.stderr_tail))]
    Failed {
        program: String,
        code: i32,
        stderr_tail: String,
    },

    /// Process was terminated by a signal
    #[error("{program} was terminated by a signal")]
    Terminated { program: String },

    /// Wall-clock limit reached; the child was killed
    #[error("{program} exceeded the {}s time limit and was killed", .limit.as_secs())]
    TimedOut { program: String, limit: Duration },

    /// IO error while supervising the child
    #[error("IO error while running {program}: {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },
}

fn format_tail(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(": {}", tail)
    }
}

/// An external command plus how it should be supervised.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<OsString>,
    /// Run through `nice -n <value>` (Unix only)
    pub nice: Option<i32>,
    /// Kill the child after this long; `None` waits forever
    pub timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            nice: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn nice(mut self, nice: i32) -> Self {
        self.nice = Some(nice);
        self
    }

    /// A zero duration means no limit.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() { None } else { Some(timeout) };
        self
    }

    /// Program and arguments actually executed, after the `nice` wrapper.
    pub fn argv(&self) -> (OsString, Vec<OsString>) {
        match self.nice {
            Some(nice) if cfg!(unix) => {
                let mut args = vec![
                    OsString::from("-n"),
                    OsString::from(nice.to_string()),
                    OsString::from(&self.program),
                ];
                args.extend(self.args.iter().cloned());
                (OsString::from("nice"), args)
            }
            _ => (OsString::from(&self.program), self.args.clone()),
        }
    }

    fn build(&self) -> Command {
        let (program, args) = self.argv();
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group: a Ctrl-C in the terminal reaches only us, so the
        // in-flight tool can finish while we shut down.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

/// Captured result of a successful run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Runs the command to completion, enforcing its timeout.
///
/// Non-zero exit, signal termination and timeout are all errors; on timeout
/// the child is killed and reaped before returning.
pub async fn run_supervised(command: &ToolCommand) -> Result<ToolOutput, ProcessError> {
    let program = command.program.clone();
    let started = Instant::now();

    let mut child = command.build().spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;
    debug!(program = %program, pid = ?child.id(), "started external tool");

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(out) = stdout.as_mut() {
            let _ = out.read_to_end(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(err) = stderr.as_mut() {
            let _ = err.read_to_end(&mut buf).await;
        }
        buf
    });

    let status = match command.timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!(program = %program, limit_secs = limit.as_secs(), "time limit reached, killing");
                if let Err(e) = child.kill().await {
                    warn!(program = %program, error = %e, "failed to kill timed out process");
                }
                stdout_task.abort();
                stderr_task.abort();
                return Err(ProcessError::TimedOut { program, limit });
            }
        },
        None => child.wait().await,
    }
    .map_err(|source| ProcessError::Io {
        program: program.clone(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
    let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();
    let elapsed = started.elapsed();

    if status.success() {
        debug!(program = %program, elapsed_secs = elapsed.as_secs(), "external tool finished");
        return Ok(ToolOutput {
            stdout,
            stderr,
            elapsed,
        });
    }

    match status.code() {
        Some(code) => Err(ProcessError::Failed {
            program,
            code,
            stderr_tail: tail(&stderr, STDERR_TAIL_LINES),
        }),
        None => Err(ProcessError::Terminated { program }),
    }
}

/// Last `lines` non-empty lines, joined with ` | `.
fn tail(text: &str, lines: usize) -> String {
    let kept: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join(" | ")
}

/// Whether `program` can be started at all.
pub async fn is_available(program: &str, probe_args: &[&str]) -> bool {
    let command = ToolCommand::new(program)
        .args(probe_args.iter().copied())
        .timeout(Duration::from_secs(15));
    match run_supervised(&command).await {
        Ok(_) => true,
        // Started but disliked the probe arguments: it exists.
        Err(ProcessError::Failed { .. }) => true,
        Err(_) => false,
    }
}
