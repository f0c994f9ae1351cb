//! Subprocess adapter for the media engine and external scripts.

use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Maximum amount of stderr kept in an error, from the end of the stream.
const MAX_DIAGNOSTIC_BYTES: usize = 4096;

/// A program and its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Last argument, which is the output path for every invocation built here.
    pub fn last_arg(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs engine invocations with a wall-clock bound.
///
/// Implementations must not retry.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn run(&self, invocation: &Invocation, timeout: Duration) -> MediaResult<EngineOutput>;
}

/// Engine backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessEngine;

impl ProcessEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaEngine for ProcessEngine {
    async fn run(&self, invocation: &Invocation, timeout: Duration) -> MediaResult<EngineOutput> {
        let program = &invocation.program;
        which::which(program).map_err(|_| MediaError::EngineNotFound(program.clone()))?;

        debug!("Running: {}", invocation);
        let started = Instant::now();

        // The child is killed if the timeout drops the future
        let output = Command::new(program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, output).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "{} timed out after {} seconds, killing process",
                    program,
                    timeout.as_secs()
                );
                return Err(MediaError::Timeout {
                    program: program.clone(),
                    secs: timeout.as_secs(),
                });
            }
        };

        histogram!("vedit_engine_duration_seconds", "program" => program.clone())
            .record(started.elapsed().as_secs_f64());

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(EngineOutput { stdout, stderr })
        } else {
            Err(MediaError::engine_failed(
                program.clone(),
                tail(&stderr, MAX_DIAGNOSTIC_BYTES),
                output.status.code(),
            ))
        }
    }
}

/// Keep the last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// Check that a program is available in PATH.
pub fn check_program(program: &str) -> MediaResult<std::path::PathBuf> {
    which::which(program).map_err(|_| MediaError::EngineNotFound(program.to_string()))
}
