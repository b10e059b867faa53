//! The [`VersionControl`] trait — the single abstraction boundary between
//! culprit and git.
//!
//! The engine interacts with version control exclusively through this trait.
//! The trait is object-safe so callers can use `&dyn VersionControl` or
//! `Box<dyn VersionControl>`.
//!
//! Method groups correspond to what the mining and trial pipelines need:
//!
//! | Group       | Methods                                | Used by            |
//! |-------------|----------------------------------------|--------------------|
//! | History     | `log`, `diff_files`                    | graph construction |
//! | Working dir | `checkout_commit`, `discard_file_change`, `is_dirty` | trials |
//! | Worktrees   | `add_worktree`, `remove_worktree`      | secondary tree     |

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::GitError;
use crate::types::{CommitId, DiffFile, LogEntry};

/// The version-control abstraction used by the culprit engine.
///
/// An implementation is bound to one *primary* working directory (the
/// repository checkout the trials mutate). Secondary read-only checkouts are
/// provisioned through [`add_worktree`](Self::add_worktree).
///
/// # Object safety
///
/// This trait is object-safe: no generic methods, no `Self` in return
/// position outside of `Result`.
pub trait VersionControl {
    /// The primary working directory this instance operates on.
    fn root(&self) -> &Path;

    /// Resolve a possibly-abbreviated commit id to its full form.
    ///
    /// Fails if the id is unknown or ambiguous. Log and diff operations only
    /// ever hand back full ids, so resolving user-supplied range endpoints
    /// once up front lets everything downstream compare ids by equality.
    fn resolve(&self, commit: &CommitId) -> Result<CommitId, GitError>;

    /// Reset the primary working directory to `commit` (detached), discarding
    /// local modifications to tracked files.
    fn checkout_commit(&self, commit: &CommitId) -> Result<(), GitError>;

    /// Restore one tracked file in the primary working directory to the state
    /// of the currently checked-out commit.
    ///
    /// Restoring a file that is already pristine is a no-op. `path` is
    /// relative to [`root`](Self::root).
    fn discard_file_change(&self, path: &Path) -> Result<(), GitError>;

    /// Return `true` if any *tracked* file in the primary working directory
    /// differs from the checked-out commit.
    ///
    /// Untracked files (build artifacts and the like) are ignored; the trial
    /// engine removes the files it adds itself.
    fn is_dirty(&self) -> Result<bool, GitError>;

    /// The set of files that differ between `from` and `to`, seen from `to`'s
    /// perspective: `Added` means present only in `to`, `Deleted` means
    /// present only in `from`.
    ///
    /// Rename detection is disabled: a rename surfaces as one `Added` plus
    /// one `Deleted` entry, so applying or reverting entries stays a
    /// per-path operation.
    fn diff_files(
        &self,
        from: &CommitId,
        to: &CommitId,
    ) -> Result<BTreeSet<DiffFile>, GitError>;

    /// The commit log reachable from `from`, children before parents, each
    /// entry carrying the commit's full id and its parents' full ids.
    fn log(&self, from: &CommitId) -> Result<Vec<LogEntry>, GitError>;

    /// Create a detached checkout of `commit` at `dest`.
    ///
    /// `dest` must not exist yet and must lie *outside* the primary working
    /// directory. The checkout shares the object store with the primary
    /// repository, so it is cheap.
    fn add_worktree(&self, commit: &CommitId, dest: &Path) -> Result<(), GitError>;

    /// Remove a checkout previously created by
    /// [`add_worktree`](Self::add_worktree). Removing a path that is not a
    /// registered worktree is an error.
    fn remove_worktree(&self, dest: &Path) -> Result<(), GitError>;
}
