//! Error types for git operations.
//!
//! [`GitError`] is the single error type returned by all
//! [`VersionControl`](crate::VersionControl) trait methods. It uses rich enum
//! variants so callers can match on specific failure modes (bad commit id,
//! failed command, unparseable output) without parsing error messages.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`VersionControl`](crate::VersionControl) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// A commit id string could not be parsed or was otherwise invalid.
    #[error("invalid commit id `{value}`: {reason}")]
    InvalidCommitId {
        /// The raw value that failed validation.
        value: String,
        /// Why validation failed.
        reason: String,
    },

    /// A git command exited with a non-zero status.
    #[error("`{command}` failed in {}: {stderr}", dir.display())]
    CommandFailed {
        /// The command that was run (e.g. `"git checkout --force"`).
        command: String,
        /// The directory the command ran in.
        dir: PathBuf,
        /// Captured stderr, trimmed.
        stderr: String,
    },

    /// Output from a git command did not match the expected shape.
    ///
    /// This indicates either repository corruption or a version skew in the
    /// `git` binary's output format — both are fatal to the caller.
    #[error("unparseable {what} output: {line:?}")]
    UnparseableOutput {
        /// Which operation produced the output (`"diff"`, `"log"`, ...).
        what: &'static str,
        /// The offending line.
        line: String,
    },

    /// An I/O error occurred (file system, process spawn, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
