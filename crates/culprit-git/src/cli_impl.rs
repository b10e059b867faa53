//! [`GitCli`] — the `git`-binary-backed [`VersionControl`] implementation.
//!
//! Every operation shells out to `git` with `current_dir` pinned to the
//! primary working directory and maps non-zero exits to
//! [`GitError::CommandFailed`] with trimmed stderr. Nothing here interprets
//! repository state beyond parsing the two line-oriented outputs the trait
//! needs (`diff --name-status`, `rev-list --parents`).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use crate::error::GitError;
use crate::repo::VersionControl;
use crate::types::{ChangeKind, CommitId, DiffFile, LogEntry};

/// A [`VersionControl`] implementation that drives the `git` CLI.
///
/// Bound to one primary working directory. Cloning is cheap; instances hold
/// no process state.
#[derive(Clone, Debug)]
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    /// Create an instance operating on the repository at `root`.
    ///
    /// The path is not validated here; the first operation fails with a
    /// [`GitError::CommandFailed`] if it is not a git work tree.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Run `git <args>` in the primary working directory, capturing output.
    fn git(&self, args: &[&str]) -> Result<String, GitError> {
        tracing::debug!(dir = %self.root.display(), "git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                dir: self.root.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl VersionControl for GitCli {
    fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, commit: &CommitId) -> Result<CommitId, GitError> {
        let revspec = format!("{commit}^{{commit}}");
        let out = self.git(&["rev-parse", "--verify", &revspec])?;
        let full = out.trim();
        CommitId::from_str(full).map_err(|_| GitError::UnparseableOutput {
            what: "rev-parse",
            line: full.to_owned(),
        })
    }

    fn checkout_commit(&self, commit: &CommitId) -> Result<(), GitError> {
        self.git(&["checkout", "--force", "--detach", commit.as_str()])?;
        Ok(())
    }

    fn discard_file_change(&self, path: &Path) -> Result<(), GitError> {
        let path = path.to_string_lossy();
        self.git(&["checkout", "--", &path])?;
        Ok(())
    }

    fn is_dirty(&self) -> Result<bool, GitError> {
        let out = self.git(&["status", "--porcelain", "--untracked-files=no"])?;
        Ok(!out.trim().is_empty())
    }

    fn diff_files(
        &self,
        from: &CommitId,
        to: &CommitId,
    ) -> Result<BTreeSet<DiffFile>, GitError> {
        let out = self.git(&[
            "diff",
            "--name-status",
            "--no-renames",
            from.as_str(),
            to.as_str(),
        ])?;

        let mut files = BTreeSet::new();
        for line in out.lines().filter(|l| !l.trim().is_empty()) {
            let Some((status, path)) = line.split_once('\t') else {
                return Err(GitError::UnparseableOutput {
                    what: "diff",
                    line: line.to_owned(),
                });
            };
            // With --no-renames the status column is a single letter.
            // `T` (typechange) is content-bearing on both sides, so it is a
            // modification for delta purposes.
            let kind = match status {
                "A" => ChangeKind::Added,
                "M" | "T" => ChangeKind::Modified,
                "D" => ChangeKind::Deleted,
                _ => {
                    return Err(GitError::UnparseableOutput {
                        what: "diff",
                        line: line.to_owned(),
                    });
                }
            };
            files.insert(DiffFile::new(kind, path));
        }
        Ok(files)
    }

    fn log(&self, from: &CommitId) -> Result<Vec<LogEntry>, GitError> {
        let out = self.git(&["rev-list", "--parents", "--topo-order", from.as_str()])?;

        let mut entries = Vec::new();
        for line in out.lines().filter(|l| !l.trim().is_empty()) {
            let mut ids = line.split_whitespace().map(|tok| {
                CommitId::from_str(tok).map_err(|_| GitError::UnparseableOutput {
                    what: "rev-list",
                    line: line.to_owned(),
                })
            });
            let commit = ids.next().ok_or_else(|| GitError::UnparseableOutput {
                what: "rev-list",
                line: line.to_owned(),
            })??;
            let parents = ids.collect::<Result<Vec<_>, _>>()?;
            entries.push(LogEntry { commit, parents });
        }
        Ok(entries)
    }

    fn add_worktree(&self, commit: &CommitId, dest: &Path) -> Result<(), GitError> {
        let dest = dest.to_string_lossy();
        self.git(&["worktree", "add", "--detach", &dest, commit.as_str()])?;
        Ok(())
    }

    fn remove_worktree(&self, dest: &Path) -> Result<(), GitError> {
        let dest = dest.to_string_lossy();
        self.git(&["worktree", "remove", "--force", &dest])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    /// A throwaway git repository for exercising the CLI backend.
    struct Fixture {
        _dir: TempDir,
        repo: GitCli,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().expect("create temp dir");
            let repo = GitCli::new(dir.path());
            git(dir.path(), &["init", "-b", "main"]);
            git(dir.path(), &["config", "user.name", "Test"]);
            git(dir.path(), &["config", "user.email", "test@localhost"]);
            git(dir.path(), &["config", "commit.gpgsign", "false"]);
            Self { _dir: dir, repo }
        }

        fn commit(&self, files: &[(&str, &str)], removals: &[&str], msg: &str) -> CommitId {
            let root = self.repo.root();
            for (path, content) in files {
                let full = root.join(path);
                if let Some(parent) = full.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(full, content).unwrap();
            }
            for path in removals {
                fs::remove_file(root.join(path)).unwrap();
            }
            git(root, &["add", "--all"]);
            git(root, &["commit", "-m", msg]);
            let head = git(root, &["rev-parse", "HEAD"]);
            head.trim().parse().unwrap()
        }
    }

    fn git(dir: &Path, args: &[&str]) -> String {
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

    #[test]
    fn diff_reports_added_modified_deleted() {
        let fx = Fixture::new();
        let first = fx.commit(&[("a.txt", "one\n"), ("b.txt", "two\n")], &[], "first");
        let second = fx.commit(&[("a.txt", "changed\n"), ("c.txt", "new\n")], &["b.txt"], "second");

        let diff = fx.repo.diff_files(&first, &second).unwrap();
        let rendered: Vec<String> = diff.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["M a.txt", "D b.txt", "A c.txt"]);
    }

    #[test]
    fn log_lists_children_before_parents_with_parent_ids() {
        let fx = Fixture::new();
        let first = fx.commit(&[("a.txt", "one\n")], &[], "first");
        let second = fx.commit(&[("a.txt", "two\n")], &[], "second");

        let entries = fx.repo.log(&second).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].commit, second);
        assert_eq!(entries[0].parents, vec![first.clone()]);
        assert_eq!(entries[1].commit, first);
        assert!(entries[1].parents.is_empty());
    }

    #[test]
    fn checkout_and_discard_restore_file_content() {
        let fx = Fixture::new();
        let first = fx.commit(&[("a.txt", "one\n")], &[], "first");
        fx.commit(&[("a.txt", "two\n")], &[], "second");

        fx.repo.checkout_commit(&first).unwrap();
        assert_eq!(fs::read_to_string(fx.repo.root().join("a.txt")).unwrap(), "one\n");

        fs::write(fx.repo.root().join("a.txt"), "scribbled\n").unwrap();
        assert!(fx.repo.is_dirty().unwrap());

        fx.repo.discard_file_change(Path::new("a.txt")).unwrap();
        assert_eq!(fs::read_to_string(fx.repo.root().join("a.txt")).unwrap(), "one\n");
        assert!(!fx.repo.is_dirty().unwrap());
    }

    #[test]
    fn worktree_provides_second_checkout_and_removes_cleanly() {
        let fx = Fixture::new();
        let first = fx.commit(&[("a.txt", "one\n")], &[], "first");
        fx.commit(&[("a.txt", "two\n")], &[], "second");

        let side = TempDir::new().unwrap();
        let dest = side.path().join("successor");
        fx.repo.add_worktree(&first, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "one\n");
        // Primary tree is untouched.
        assert_eq!(
            fs::read_to_string(fx.repo.root().join("a.txt")).unwrap(),
            "two\n"
        );

        fx.repo.remove_worktree(&dest).unwrap();
        assert!(!dest.exists());
    }

    #[test]
    fn resolve_expands_abbreviated_ids() {
        let fx = Fixture::new();
        let full = fx.commit(&[("a.txt", "one\n")], &[], "first");
        let short: CommitId = full.as_str()[..8].parse().unwrap();
        assert_eq!(fx.repo.resolve(&short).unwrap(), full);

        let unknown: CommitId = "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef".parse().unwrap();
        assert!(fx.repo.resolve(&unknown).is_err());
    }

    #[test]
    fn failed_command_carries_stderr() {
        let fx = Fixture::new();
        fx.commit(&[("a.txt", "one\n")], &[], "first");
        let missing: CommitId = "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef".parse().unwrap();
        let err = fx.repo.checkout_commit(&missing).unwrap_err();
        match err {
            GitError::CommandFailed { command, stderr, .. } => {
                assert!(command.starts_with("git checkout"));
                assert!(!stderr.is_empty());
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }
}
