//! The build/test boundary: the [`BuildStrategy`] trait and
//! [`CommandBuildStrategy`], its shell-command-backed implementation.
//!
//! A strategy is bound to one working directory and knows how to (1) compile
//! the project there and (2) run its test suite and report per-test
//! outcomes. Both are bounded by a timeout; a test process that outlives it
//! is killed and reported as *aborted* — a hang is not a failing suite, and
//! it is never retried.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use culprit_git::DiffFile;

use crate::config::BuildConfig;
use crate::model::{Compilable, TestId, TestResult};

// ---------------------------------------------------------------------------
// TestRun / BuildStrategy
// ---------------------------------------------------------------------------

/// The outcome of one test-suite invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestRun {
    /// The suite ran to completion (passing or not).
    Completed(TestResult),
    /// The test process was forcibly terminated after the timeout.
    Aborted,
}

/// Project-specific build and test execution.
///
/// Implementations are bound to a working directory whose contents the
/// caller controls (checkout, delta application). Object-safe so the engine
/// can hold `&dyn BuildStrategy`.
pub trait BuildStrategy {
    /// Compile the project in the working directory.
    fn build(&self) -> Compilable;

    /// Run the test suite in the working directory.
    ///
    /// # Errors
    ///
    /// Fails only on environment problems (the command could not be
    /// spawned); a failing or hanging suite is a [`TestRun`] value, not an
    /// error.
    fn run_test(&self) -> Result<TestRun>;

    /// Whether `file` is part of the test sources rather than the code under
    /// test. Callers use this to keep the newest test sources in place
    /// regardless of which delta is applied.
    fn is_test_file(&self, file: &DiffFile) -> bool;
}

// ---------------------------------------------------------------------------
// CommandBuildStrategy
// ---------------------------------------------------------------------------

/// A [`BuildStrategy`] that runs configured shell commands via `sh -c`.
///
/// The test command's stdout is parsed line by line: `pass <test-id>` and
/// `fail <test-id>` (case-insensitive status token, remainder of the line is
/// the id) feed the suite result; every other line is ignored. The command's
/// exit code is deliberately not consulted — runners exit non-zero when any
/// test fails, and that is still a completed run.
pub struct CommandBuildStrategy {
    work_dir: PathBuf,
    config: BuildConfig,
}

impl CommandBuildStrategy {
    /// Create a strategy running in `work_dir` with the given commands.
    #[must_use]
    pub fn new(work_dir: impl Into<PathBuf>, config: BuildConfig) -> Self {
        Self {
            work_dir: work_dir.into(),
            config,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }
}

impl BuildStrategy for CommandBuildStrategy {
    fn build(&self) -> Compilable {
        if let Some(build_file) = &self.config.build_file
            && !self.work_dir.join(build_file).exists()
        {
            return Compilable::NoBuildFile;
        }
        let command = self.config.build_command.trim();
        if command.is_empty() {
            // Nothing to compile for this project.
            return Compilable::Yes;
        }
        match run_command(command, &self.work_dir, self.timeout()) {
            Ok(CommandOutcome::Exited { code: Some(0), .. }) => Compilable::Yes,
            Ok(CommandOutcome::Exited { code, stderr, .. }) => {
                tracing::debug!(?code, stderr = stderr.trim(), "build failed");
                Compilable::No
            }
            Ok(CommandOutcome::TimedOut) => {
                tracing::warn!(command, "build killed by timeout; verdict unknown");
                Compilable::Unknown
            }
            Err(err) => {
                tracing::warn!(command, %err, "build could not be run");
                Compilable::Unknown
            }
        }
    }

    fn run_test(&self) -> Result<TestRun> {
        let command = self.config.test_command.trim();
        if command.is_empty() {
            return Ok(TestRun::Completed(TestResult::empty()));
        }
        match run_command(command, &self.work_dir, self.timeout())
            .with_context(|| format!("spawn test command `{command}`"))?
        {
            CommandOutcome::TimedOut => {
                tracing::warn!(command, timeout_seconds = self.config.timeout_seconds,
                    "test process killed by timeout");
                Ok(TestRun::Aborted)
            }
            CommandOutcome::Exited { stdout, .. } => {
                Ok(TestRun::Completed(parse_suite(&stdout)?))
            }
        }
    }

    fn is_test_file(&self, file: &DiffFile) -> bool {
        self.config
            .test_paths
            .iter()
            .any(|prefix| file.path().starts_with(prefix))
    }
}

/// Parse `pass <id>` / `fail <id>` lines into a suite result.
fn parse_suite(stdout: &str) -> Result<TestResult> {
    let mut all = BTreeSet::new();
    let mut failed = BTreeSet::new();
    for line in stdout.lines() {
        let Some((status, id)) = line.trim().split_once(char::is_whitespace) else {
            continue;
        };
        let id = id.trim();
        if id.is_empty() {
            continue;
        }
        if status.eq_ignore_ascii_case("pass") {
            all.insert(TestId::new(id));
        } else if status.eq_ignore_ascii_case("fail") {
            all.insert(TestId::new(id));
            failed.insert(TestId::new(id));
        }
    }
    Ok(TestResult::new(all, failed)?)
}

// ---------------------------------------------------------------------------
// Command execution with timeout
// ---------------------------------------------------------------------------

enum CommandOutcome {
    Exited {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    TimedOut,
}

/// Run a shell command with a timeout, capturing all output.
///
/// Polls `try_wait` and kills the child once the deadline passes; the kill
/// path does not attempt to read the pipes.
fn run_command(command: &str, working_dir: &Path, timeout: Duration) -> Result<CommandOutcome> {
    let start = Instant::now();

    let mut child = Command::new("sh")
        .args(["-c", command])
        .current_dir(working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn `sh -c {command:?}` in {}", working_dir.display()))?;

    loop {
        match child.try_wait().context("wait for command")? {
            Some(status) => {
                let stdout = child
                    .stdout
                    .take()
                    .map(|mut s| {
                        let mut buf = String::new();
                        std::io::Read::read_to_string(&mut s, &mut buf).unwrap_or(0);
                        buf
                    })
                    .unwrap_or_default();
                let stderr = child
                    .stderr
                    .take()
                    .map(|mut s| {
                        let mut buf = String::new();
                        std::io::Read::read_to_string(&mut s, &mut buf).unwrap_or(0);
                        buf
                    })
                    .unwrap_or_default();
                return Ok(CommandOutcome::Exited {
                    code: status.code(),
                    stdout,
                    stderr,
                });
            }
            None => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(CommandOutcome::TimedOut);
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
}
