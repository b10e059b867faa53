//! [`DeltaRevision`] — a hypothetical working-tree state: a base commit with
//! a chosen subset of another commit's file differences applied on top.
//!
//! The lifecycle is a strict state machine:
//!
//! ```text
//! Created → CheckedOut → DeltaApplied → Tested → Restored
//!                              ↑______________________|
//! ```
//!
//! and after `Restored` a new delta may be applied. The hard invariant is
//! that the primary working directory is bit-identical to "base, nothing
//! applied" immediately before every apply and after every restore — restore
//! inverts apply per file through the VCS discard primitive, so it works
//! even when an apply failed halfway.
//!
//! Two directories are involved: the *primary* tree (the repository itself,
//! checked out at base, the one that is mutated and built) and a *secondary*
//! detached worktree checked out at the successor, so reading "the
//! successor's version of file X" never touches the primary tree mid-trial.
//! All uses of one primary tree are serialized by `&mut self`.

use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use culprit_git::{ChangeKind, DiffFile, VersionControl};
use tempfile::TempDir;

use crate::build::{BuildStrategy, TestRun};
use crate::model::{Compilable, Revision, TestResult};

// ---------------------------------------------------------------------------
// DeltaState
// ---------------------------------------------------------------------------

/// Where a [`DeltaRevision`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaState {
    /// Constructed; no working tree touched yet.
    Created,
    /// Primary tree at base, secondary worktree at successor.
    CheckedOut,
    /// The chosen delta has been copied/deleted into the primary tree.
    DeltaApplied,
    /// Build and test ran against the mutated primary tree.
    Tested,
    /// The primary tree is pristine again; ready for the next delta.
    Restored,
}

// ---------------------------------------------------------------------------
// DeltaRevision
// ---------------------------------------------------------------------------

/// One reusable trial harness for a (base, successor) revision pair.
pub struct DeltaRevision<'a> {
    base: Arc<Revision>,
    successor: Arc<Revision>,
    vcs: &'a dyn VersionControl,
    strategy: &'a dyn BuildStrategy,
    state: DeltaState,
    scratch: Option<Scratch>,
    total_delta: BTreeSet<DiffFile>,
    delta: BTreeSet<DiffFile>,
    compilable: Option<Compilable>,
    test_aborted: bool,
    test_result: Option<TestResult>,
}

/// The secondary worktree and the temp dir that owns its location.
struct Scratch {
    _dir: TempDir,
    worktree: std::path::PathBuf,
}

impl<'a> DeltaRevision<'a> {
    /// Create a trial harness. No I/O happens until
    /// [`checkout_base_and_successor`](Self::checkout_base_and_successor).
    #[must_use]
    pub fn new(
        base: Arc<Revision>,
        successor: Arc<Revision>,
        vcs: &'a dyn VersionControl,
        strategy: &'a dyn BuildStrategy,
    ) -> Self {
        Self {
            base,
            successor,
            vcs,
            strategy,
            state: DeltaState::Created,
            scratch: None,
            total_delta: BTreeSet::new(),
            delta: BTreeSet::new(),
            compilable: None,
            test_aborted: false,
            test_result: None,
        }
    }

    /// The base revision (owner of the primary tree's content).
    #[must_use]
    pub fn base(&self) -> &Arc<Revision> {
        &self.base
    }

    /// The successor revision (source of applied file content).
    #[must_use]
    pub fn successor(&self) -> &Arc<Revision> {
        &self.successor
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DeltaState {
        self.state
    }

    /// The full diff from base to successor (successor's perspective).
    /// Empty until checked out.
    #[must_use]
    pub fn total_delta(&self) -> &BTreeSet<DiffFile> {
        &self.total_delta
    }

    /// The currently chosen delta.
    #[must_use]
    pub fn delta(&self) -> &BTreeSet<DiffFile> {
        &self.delta
    }

    /// The trial's build verdict, once tested.
    #[must_use]
    pub fn compilable(&self) -> Option<Compilable> {
        self.compilable
    }

    /// Whether the trial's test run was killed by the timeout.
    #[must_use]
    pub fn test_aborted(&self) -> bool {
        self.test_aborted
    }

    /// The trial's suite result, if the build succeeded and the run
    /// completed.
    #[must_use]
    pub fn test_result(&self) -> Option<&TestResult> {
        self.test_result.as_ref()
    }

    /// Reset the primary tree to base and provision the secondary worktree
    /// at the successor, then record the total delta between the two.
    ///
    /// # Errors
    ///
    /// Any VCS failure here is fatal to the trial set for this pair.
    pub fn checkout_base_and_successor(&mut self) -> Result<()> {
        ensure!(
            self.state == DeltaState::Created,
            "checkout_base_and_successor called in state {:?}",
            self.state
        );

        self.vcs
            .checkout_commit(self.base.commit())
            .with_context(|| format!("checkout base {}", self.base.commit()))?;

        let dir = TempDir::new().context("create scratch dir for secondary worktree")?;
        let worktree = dir.path().join("successor");
        self.vcs
            .add_worktree(self.successor.commit(), &worktree)
            .with_context(|| format!("checkout successor {}", self.successor.commit()))?;
        self.scratch = Some(Scratch {
            _dir: dir,
            worktree,
        });

        self.total_delta = self
            .vcs
            .diff_files(self.base.commit(), self.successor.commit())
            .context("diff base..successor")?;
        self.state = DeltaState::CheckedOut;
        Ok(())
    }

    /// Choose the delta for the next trial. Pure state update, no I/O.
    ///
    /// # Errors
    ///
    /// Fails if called in the wrong state, if the subset is empty, or if it
    /// is not contained in the total delta — all caller defects.
    pub fn set_delta(&mut self, delta: BTreeSet<DiffFile>) -> Result<()> {
        ensure!(
            matches!(self.state, DeltaState::CheckedOut | DeltaState::Restored),
            "set_delta called in state {:?}",
            self.state
        );
        ensure!(!delta.is_empty(), "empty delta: the bare base is not a trial");
        if let Some(stray) = delta.difference(&self.total_delta).next() {
            bail!("delta entry {stray} is not part of the base..successor diff");
        }
        self.delta = delta;
        Ok(())
    }

    /// Copy/delete the chosen delta's files into the primary tree.
    ///
    /// Only paths named in the delta are touched. The state moves to
    /// `DeltaApplied` up front, so that
    /// [`restore_base_revision`](Self::restore_base_revision) can run even
    /// if a copy fails partway through.
    pub fn apply_delta(&mut self) -> Result<()> {
        ensure!(
            matches!(self.state, DeltaState::CheckedOut | DeltaState::Restored),
            "apply_delta called in state {:?}",
            self.state
        );
        ensure!(!self.delta.is_empty(), "apply_delta called before set_delta");
        let scratch = self
            .scratch
            .as_ref()
            .context("apply_delta called without a secondary worktree")?;

        self.state = DeltaState::DeltaApplied;
        for file in &self.delta {
            let target = self.vcs.root().join(file.path());
            match file.kind {
                // Exists in the successor: bring that version in.
                ChangeKind::Added | ChangeKind::Modified => {
                    let source = scratch.worktree.join(file.path());
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)
                            .with_context(|| format!("create directories for {file}"))?;
                    }
                    fs::copy(&source, &target).with_context(|| format!("apply {file}"))?;
                }
                // Exists only in the base: take it out.
                ChangeKind::Deleted => {
                    fs::remove_file(&target).with_context(|| format!("apply {file}"))?;
                }
            }
            tracing::debug!(%file, "applied");
        }
        Ok(())
    }

    /// Build the mutated primary tree and, if it compiles, run the suite.
    ///
    /// A test process killed by the timeout records `test_aborted` and no
    /// result; it is not a failing trial.
    pub fn run_test(&mut self) -> Result<()> {
        ensure!(
            self.state == DeltaState::DeltaApplied,
            "run_test called in state {:?}",
            self.state
        );

        let compilable = self.strategy.build();
        self.compilable = Some(compilable);
        if compilable == Compilable::Yes {
            match self.strategy.run_test().context("run trial suite")? {
                TestRun::Completed(result) => self.test_result = Some(result),
                TestRun::Aborted => self.test_aborted = true,
            }
        }
        self.state = DeltaState::Tested;
        Ok(())
    }

    /// Return the primary tree to base's pristine state, inverting
    /// [`apply_delta`](Self::apply_delta) exactly, and clear the trial's
    /// delta and outcome fields.
    ///
    /// # Errors
    ///
    /// Fails on VCS/file-system errors, or if tracked files still differ
    /// from base afterwards — the latter is an invariant violation, not a
    /// recoverable condition.
    pub fn restore_base_revision(&mut self) -> Result<()> {
        ensure!(
            matches!(self.state, DeltaState::DeltaApplied | DeltaState::Tested),
            "restore_base_revision called in state {:?}",
            self.state
        );

        for file in &self.delta {
            let target = self.vcs.root().join(file.path());
            match file.kind {
                // The file exists in base: the VCS has its pristine content.
                ChangeKind::Modified | ChangeKind::Deleted => {
                    self.vcs
                        .discard_file_change(file.path())
                        .with_context(|| format!("revert {file}"))?;
                }
                // Not in base: the apply created it, so deletion restores.
                ChangeKind::Added => {
                    if target.exists() {
                        fs::remove_file(&target).with_context(|| format!("revert {file}"))?;
                    }
                    // Clean up a directory the apply may have created; only
                    // an empty one will actually go away.
                    if let Some(parent) = target.parent() {
                        let _ = fs::remove_dir(parent);
                    }
                }
            }
            tracing::debug!(%file, "reverted");
        }

        if self
            .vcs
            .is_dirty()
            .context("verify primary tree after restore")?
        {
            bail!(
                "primary tree still differs from base {} after restore",
                self.base.commit()
            );
        }

        self.delta.clear();
        self.compilable = None;
        self.test_aborted = false;
        self.test_result = None;
        self.state = DeltaState::Restored;
        Ok(())
    }
}

impl Drop for DeltaRevision<'_> {
    fn drop(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            // Best-effort: the temp dir goes away regardless; this just
            // unregisters the worktree from the repository.
            if let Err(err) = self.vcs.remove_worktree(&scratch.worktree) {
                tracing::warn!(%err, "failed to remove secondary worktree");
            }
        }
    }
}
