//! Shared test infrastructure — real git repositories in temp directories.
//!
//! Provides [`TestRepo`], a self-contained repository for integration tests.
//! Each instance gets a unique temp dir, runs real git commands, and cleans
//! up on drop. Commit helpers write a `TESTLOG` file (or any other files the
//! test wants) so that a `cat TESTLOG`-style test command can script per-
//! commit suite outcomes without running a real build.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use culprit_git::CommitId;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// TestRepo
// ---------------------------------------------------------------------------

/// A self-contained git repository in a temporary directory.
///
/// Implements `Drop` via the held [`TempDir`].
pub struct TestRepo {
    _dir: TempDir,
    root: PathBuf,
}

impl TestRepo {
    /// Create a fresh repository on branch `main` with commit identity
    /// configured and signing disabled.
    ///
    /// # Panics
    /// Panics if any git command fails.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let root = dir.path().to_path_buf();

        git_ok(&root, &["init"]);
        git_ok(&root, &["config", "user.name", "Test"]);
        git_ok(&root, &["config", "user.email", "test@localhost"]);
        git_ok(&root, &["config", "commit.gpgsign", "false"]);
        git_ok(&root, &["checkout", "-B", "main"]);

        Self { _dir: dir, root }
    }

    /// Absolute path to the repository root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run a git command in the repo, panicking on failure.
    pub fn git(&self, args: &[&str]) -> String {
        git_ok(&self.root, args)
    }

    /// Write `files`, remove `removals`, stage everything, and commit.
    /// Returns the new commit's id.
    pub fn commit(&self, files: &[(&str, &str)], removals: &[&str], msg: &str) -> CommitId {
        for (path, content) in files {
            let full = self.root.join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).expect("create parent dirs");
            }
            fs::write(full, content).expect("write file");
        }
        for path in removals {
            fs::remove_file(self.root.join(path)).expect("remove file");
        }
        self.git(&["add", "--all"]);
        self.git(&["commit", "-m", msg]);
        self.head()
    }

    /// The current HEAD commit id.
    #[must_use]
    pub fn head(&self) -> CommitId {
        self.git(&["rev-parse", "HEAD"]).trim().parse().expect("valid HEAD id")
    }

    /// Create and check out a branch at the given commit.
    pub fn branch(&self, name: &str, at: &CommitId) {
        self.git(&["checkout", "-b", name, at.as_str()]);
    }

    /// Check out an existing branch.
    pub fn checkout_branch(&self, name: &str) {
        self.git(&["checkout", name]);
    }

    /// Merge `other` into the current branch with a merge commit.
    /// Returns the merge commit's id.
    pub fn merge(&self, other: &str, msg: &str) -> CommitId {
        self.git(&["merge", "--no-ff", other, "-m", msg]);
        self.head()
    }

    /// Read a file from the working tree.
    #[must_use]
    pub fn read(&self, path: &str) -> String {
        fs::read_to_string(self.root.join(path)).expect("read file")
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

fn git_ok(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}

// ---------------------------------------------------------------------------
// Tree snapshots
// ---------------------------------------------------------------------------

/// Capture every file (path → bytes) under `root`, skipping `.git`.
///
/// Used to assert the byte-identity invariant of the trial lifecycle.
#[must_use]
pub fn snapshot(root: &Path) -> std::collections::BTreeMap<PathBuf, Vec<u8>> {
    let mut files = std::collections::BTreeMap::new();
    walk(root, root, &mut files);
    files
}

fn walk(root: &Path, dir: &Path, files: &mut std::collections::BTreeMap<PathBuf, Vec<u8>>) {
    for entry in fs::read_dir(dir).expect("read dir") {
        let entry = entry.expect("dir entry");
        let path = entry.path();
        if path.file_name().is_some_and(|n| n == ".git") {
            continue;
        }
        if path.is_dir() {
            walk(root, &path, files);
        } else {
            let rel = path.strip_prefix(root).expect("under root").to_path_buf();
            files.insert(rel, fs::read(&path).expect("read file"));
        }
    }
}
