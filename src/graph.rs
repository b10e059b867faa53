//! The history graph: topological construction over a commit range, and
//! flip detection between each revision and its parents.
//!
//! A [`Revision`] holds strong references to its already-constructed
//! parents, so construction order matters: the builder runs Kahn's algorithm
//! over the range-restricted raw log and only constructs a commit once every
//! in-range parent exists. A naive single pass over the log (children before
//! parents) would try to reference parents that are not built yet.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use culprit_git::{CommitId, DiffFile, VersionControl};

use crate::build::BuildStrategy;
use crate::model::{Revision, TestId, TestOutcome};

// ---------------------------------------------------------------------------
// HistoryGraphBuilder
// ---------------------------------------------------------------------------

/// Builds a [`HistoryGraph`] for the commits reachable from a range start
/// down to a range end.
pub struct HistoryGraphBuilder<'a> {
    vcs: &'a dyn VersionControl,
    strategy: &'a dyn BuildStrategy,
}

impl<'a> HistoryGraphBuilder<'a> {
    /// Create a builder over the given VCS and build strategy.
    #[must_use]
    pub fn new(vcs: &'a dyn VersionControl, strategy: &'a dyn BuildStrategy) -> Self {
        Self { vcs, strategy }
    }

    /// Build the graph for `[start, end]`.
    ///
    /// `start` is the newest commit of the range, `end` the oldest. Commits
    /// in the log below `end` — and parents of in-range commits that lie
    /// outside the range — are permanently ignored; they never block
    /// construction and never appear in the graph.
    ///
    /// # Errors
    ///
    /// Any VCS failure is fatal: an incomplete log or failed checkout would
    /// otherwise produce a silently-wrong graph. A raw log in which some
    /// commit never becomes constructible is a programming-error guard.
    pub fn build(&self, start: &CommitId, end: &CommitId) -> Result<HistoryGraph> {
        let start = self.vcs.resolve(start)?;
        let end = self.vcs.resolve(end)?;

        self.vcs
            .checkout_commit(&start)
            .with_context(|| format!("checkout range start {start}"))?;

        // Raw graph: commit id → parent ids, children listed before parents.
        // Cut the log off once the range end is seen; everything below it is
        // out of range.
        let log = self.vcs.log(&start).context("read commit log")?;
        let mut raw: Vec<(CommitId, Vec<CommitId>)> = Vec::new();
        let mut saw_end = false;
        for entry in log {
            let is_end = entry.commit == end;
            raw.push((entry.commit, entry.parents));
            if is_end {
                saw_end = true;
                break;
            }
        }
        if !saw_end {
            bail!("range end {end} is not reachable from {start}");
        }
        tracing::info!(
            start = %start.short(),
            end = %end.short(),
            commits = raw.len(),
            "building history graph"
        );

        let in_range: BTreeSet<&CommitId> = raw.iter().map(|(id, _)| id).collect();

        // Pending count per commit = number of parents inside the range, and
        // the reverse adjacency used to decrement children when a parent is
        // constructed.
        let mut pending: BTreeMap<&CommitId, usize> = BTreeMap::new();
        let mut children: BTreeMap<&CommitId, Vec<&CommitId>> = BTreeMap::new();
        for (id, parents) in &raw {
            let in_range_parents = parents.iter().filter(|p| in_range.contains(p));
            let mut count = 0;
            for parent in in_range_parents {
                count += 1;
                children.entry(parent).or_default().push(id);
            }
            pending.insert(id, count);
        }

        // Kahn's construction, oldest-first so iteration is deterministic.
        let mut ready: VecDeque<&CommitId> = raw
            .iter()
            .rev()
            .filter(|(id, _)| pending[id] == 0)
            .map(|(id, _)| id)
            .collect();
        let parent_ids: BTreeMap<&CommitId, &Vec<CommitId>> =
            raw.iter().map(|(id, parents)| (id, parents)).collect();

        let mut graph = HistoryGraph::default();
        while let Some(id) = ready.pop_front() {
            self.vcs
                .checkout_commit(id)
                .with_context(|| format!("checkout commit {id}"))?;

            let mut parents: Vec<(Arc<Revision>, BTreeSet<DiffFile>)> = Vec::new();
            for parent_id in parent_ids[id].iter().filter(|p| in_range.contains(p)) {
                let parent = graph
                    .get(parent_id)
                    .cloned()
                    .with_context(|| format!("parent {parent_id} constructed before child {id}"))?;
                let diff = self
                    .vcs
                    .diff_files(parent_id, id)
                    .with_context(|| format!("diff {parent_id}..{id}"))?;
                parents.push((parent, diff));
            }

            let revision = Revision::evaluate(id.clone(), parents, self.strategy)?;
            graph.push(Arc::new(revision));

            for &child in children.get(id).into_iter().flatten() {
                let count = pending
                    .get_mut(child)
                    .with_context(|| format!("pending count for {child}"))?;
                *count -= 1;
                if *count == 0 {
                    ready.push_back(child);
                }
            }
        }

        if graph.len() != raw.len() {
            // Unreachable for any log a real VCS can emit; a cycle in the
            // raw graph is the only way here.
            bail!(
                "history graph construction stalled: {} of {} commits never became ready",
                raw.len() - graph.len(),
                raw.len()
            );
        }
        Ok(graph)
    }
}

// ---------------------------------------------------------------------------
// HistoryGraph
// ---------------------------------------------------------------------------

/// The constructed graph: revisions in topological order (every included
/// parent precedes its children) plus a commit-id index.
///
/// Append-only during construction, immutable after.
#[derive(Debug, Default)]
pub struct HistoryGraph {
    order: Vec<Arc<Revision>>,
    index: BTreeMap<CommitId, usize>,
}

impl HistoryGraph {
    fn push(&mut self, revision: Arc<Revision>) {
        self.index
            .insert(revision.commit().clone(), self.order.len());
        self.order.push(revision);
    }

    /// Number of revisions in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the graph is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate in topological order. Restartable — iteration borrows.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Revision>> {
        self.order.iter()
    }

    /// Look up a revision by commit id.
    #[must_use]
    pub fn get(&self, commit: &CommitId) -> Option<&Arc<Revision>> {
        self.index.get(commit).map(|&i| &self.order[i])
    }

    /// The position of a commit in topological order.
    #[must_use]
    pub fn position(&self, commit: &CommitId) -> Option<usize> {
        self.index.get(commit).copied()
    }

    /// All flips among (revision, parent) pairs.
    ///
    /// A pair qualifies only if both sides compiled and neither test run was
    /// aborted; anything else is unusable evidence and is silently skipped.
    /// For qualifying pairs the suites are compared over the union of both
    /// test sets — a test absent on either side never counts as a flip. Each
    /// pair yields at most one [`Flip`], aggregating both directions.
    ///
    /// Ordered ascending by diff-file count (then by commit ids), so callers
    /// take the cheapest flips first.
    #[must_use]
    pub fn all_flips(&self) -> Vec<Flip> {
        let mut flips = Vec::new();
        for child in &self.order {
            let Some(child_result) = child.test_result() else {
                continue;
            };
            for (parent, diff) in child.parents() {
                let Some(parent_result) = parent.test_result() else {
                    continue;
                };
                let mut to_pass = BTreeSet::new();
                let mut to_fail = BTreeSet::new();
                for test in parent_result.all_tests().union(child_result.all_tests()) {
                    match (parent_result.outcome(test), child_result.outcome(test)) {
                        (TestOutcome::Fail, TestOutcome::Pass) => {
                            to_pass.insert(test.clone());
                        }
                        (TestOutcome::Pass, TestOutcome::Fail) => {
                            to_fail.insert(test.clone());
                        }
                        _ => {}
                    }
                }
                if !to_pass.is_empty() || !to_fail.is_empty() {
                    flips.push(Flip {
                        parent: Arc::clone(parent),
                        child: Arc::clone(child),
                        to_pass,
                        to_fail,
                        diff_files: diff.clone(),
                    });
                }
            }
        }
        flips.sort_by(|a, b| {
            a.diff_files
                .len()
                .cmp(&b.diff_files.len())
                .then_with(|| a.child.commit().cmp(b.child.commit()))
                .then_with(|| a.parent.commit().cmp(b.parent.commit()))
        });
        flips
    }
}

// ---------------------------------------------------------------------------
// Flip
// ---------------------------------------------------------------------------

/// A parent/child commit pair where at least one test's outcome differs.
#[derive(Clone, Debug)]
pub struct Flip {
    parent: Arc<Revision>,
    child: Arc<Revision>,
    to_pass: BTreeSet<TestId>,
    to_fail: BTreeSet<TestId>,
    diff_files: BTreeSet<DiffFile>,
}

impl Flip {
    /// The older side of the pair.
    #[must_use]
    pub fn parent(&self) -> &Arc<Revision> {
        &self.parent
    }

    /// The newer side of the pair.
    #[must_use]
    pub fn child(&self) -> &Arc<Revision> {
        &self.child
    }

    /// Tests failing in the parent and passing in the child.
    #[must_use]
    pub fn to_pass(&self) -> &BTreeSet<TestId> {
        &self.to_pass
    }

    /// Tests passing in the parent and failing in the child.
    #[must_use]
    pub fn to_fail(&self) -> &BTreeSet<TestId> {
        &self.to_fail
    }

    /// The files that changed from parent to child (child's perspective).
    #[must_use]
    pub fn diff_files(&self) -> &BTreeSet<DiffFile> {
        &self.diff_files
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use culprit_git::{ChangeKind, GitError, LogEntry};

    use super::*;
    use crate::build::TestRun;
    use crate::model::{Compilable, TestResult};

    fn cid(s: &str) -> CommitId {
        s.parse().unwrap()
    }

    fn tid(s: &str) -> TestId {
        TestId::new(s)
    }

    fn suite(all: &[&str], failed: &[&str]) -> TestResult {
        TestResult::new(
            all.iter().map(|t| tid(t)).collect(),
            failed.iter().map(|t| tid(t)).collect(),
        )
        .unwrap()
    }

    fn testable(commit: &str, result: TestResult) -> Arc<Revision> {
        Arc::new(
            Revision::from_parts(cid(commit), vec![], Compilable::Yes, false, Some(result))
                .unwrap(),
        )
    }

    fn child_of(
        commit: &str,
        parent: &Arc<Revision>,
        diff: &[(&str, ChangeKind)],
        compilable: Compilable,
        aborted: bool,
        result: Option<TestResult>,
    ) -> Arc<Revision> {
        let diff: BTreeSet<_> = diff
            .iter()
            .map(|(path, kind)| DiffFile::new(*kind, *path))
            .collect();
        Arc::new(
            Revision::from_parts(
                cid(commit),
                vec![(Arc::clone(parent), diff)],
                compilable,
                aborted,
                result,
            )
            .unwrap(),
        )
    }

    fn graph_of(revisions: &[&Arc<Revision>]) -> HistoryGraph {
        let mut graph = HistoryGraph::default();
        for r in revisions {
            graph.push(Arc::clone(r));
        }
        graph
    }

    /// A scripted VCS: fixed log, empty diffs, no-op checkouts. Lets the
    /// construction algorithm run without a repository on disk.
    struct FakeVcs {
        entries: Vec<LogEntry>,
    }

    impl FakeVcs {
        fn new(entries: &[(&str, &[&str])]) -> Self {
            Self {
                entries: entries
                    .iter()
                    .map(|(id, parents)| LogEntry {
                        commit: cid(id),
                        parents: parents.iter().map(|p| cid(p)).collect(),
                    })
                    .collect(),
            }
        }
    }

    impl VersionControl for FakeVcs {
        fn root(&self) -> &Path {
            Path::new(".")
        }
        fn resolve(&self, commit: &CommitId) -> Result<CommitId, GitError> {
            Ok(commit.clone())
        }
        fn checkout_commit(&self, _commit: &CommitId) -> Result<(), GitError> {
            Ok(())
        }
        fn discard_file_change(&self, _path: &Path) -> Result<(), GitError> {
            unimplemented!("not exercised")
        }
        fn is_dirty(&self) -> Result<bool, GitError> {
            Ok(false)
        }
        fn diff_files(
            &self,
            _from: &CommitId,
            _to: &CommitId,
        ) -> Result<BTreeSet<DiffFile>, GitError> {
            Ok([DiffFile::new(ChangeKind::Modified, "file.rs")].into())
        }
        fn log(&self, _from: &CommitId) -> Result<Vec<LogEntry>, GitError> {
            Ok(self.entries.clone())
        }
        fn add_worktree(&self, _commit: &CommitId, _dest: &Path) -> Result<(), GitError> {
            unimplemented!("not exercised")
        }
        fn remove_worktree(&self, _dest: &Path) -> Result<(), GitError> {
            unimplemented!("not exercised")
        }
    }

    /// Nothing builds — revisions carry no test evidence, which is all the
    /// construction tests need.
    struct NoBuild;

    impl BuildStrategy for NoBuild {
        fn build(&self) -> Compilable {
            Compilable::NoBuildFile
        }
        fn run_test(&self) -> anyhow::Result<TestRun> {
            unreachable!("nothing compiles")
        }
        fn is_test_file(&self, _file: &DiffFile) -> bool {
            false
        }
    }

    #[test]
    fn construction_orders_parents_first_and_ignores_out_of_range_parents() {
        // c3 → {c2, cccccc (outside the log)}, c2 → c1, c1 → c0 (below the
        // range end, cut off).
        let vcs = FakeVcs::new(&[
            ("cccc33", &["bbbb22", "cccccc"]),
            ("bbbb22", &["aaaa11"]),
            ("aaaa11", &["000000"]),
        ]);
        let graph = HistoryGraphBuilder::new(&vcs, &NoBuild)
            .build(&cid("cccc33"), &cid("aaaa11"))
            .unwrap();

        assert_eq!(graph.len(), 3);
        assert!(graph.position(&cid("aaaa11")) < graph.position(&cid("bbbb22")));
        assert!(graph.position(&cid("bbbb22")) < graph.position(&cid("cccc33")));
        // The out-of-range parent neither blocks nor appears.
        assert!(graph.get(&cid("cccccc")).is_none());
        assert_eq!(graph.get(&cid("cccc33")).unwrap().parents().len(), 1);
        assert!(graph.get(&cid("aaaa11")).unwrap().parents().is_empty());
    }

    #[test]
    fn merge_shaped_log_constructs_every_commit_once() {
        let vcs = FakeVcs::new(&[
            ("dddd44", &["bbbb22", "cccc33"]),
            ("cccc33", &["aaaa11"]),
            ("bbbb22", &["aaaa11"]),
            ("aaaa11", &[]),
        ]);
        let graph = HistoryGraphBuilder::new(&vcs, &NoBuild)
            .build(&cid("dddd44"), &cid("aaaa11"))
            .unwrap();

        assert_eq!(graph.len(), 4);
        let merge = graph.get(&cid("dddd44")).unwrap();
        assert_eq!(merge.parents().len(), 2);
        for (parent, _) in merge.parents() {
            assert!(graph.position(parent.commit()) < graph.position(&cid("dddd44")));
        }
    }

    #[test]
    fn cyclic_raw_log_fails_loudly_instead_of_spinning() {
        // No real VCS can emit this; the stall guard is a programming-error
        // check, not a recoverable path.
        let vcs = FakeVcs::new(&[("bbbb22", &["aaaa11"]), ("aaaa11", &["bbbb22"])]);
        let err = HistoryGraphBuilder::new(&vcs, &NoBuild)
            .build(&cid("bbbb22"), &cid("aaaa11"))
            .unwrap_err();
        assert!(err.to_string().contains("stalled"), "error: {err}");
    }

    #[test]
    fn crossing_flip_yields_one_flip_with_both_directions() {
        let parent = testable("aaaa11", suite(&["t1", "t2"], &["t2"]));
        let child = child_of(
            "bbbb22",
            &parent,
            &[("x.rs", ChangeKind::Modified)],
            Compilable::Yes,
            false,
            Some(suite(&["t1", "t2"], &["t1"])),
        );
        let flips = graph_of(&[&parent, &child]).all_flips();

        assert_eq!(flips.len(), 1);
        let flip = &flips[0];
        assert_eq!(flip.parent().commit(), &cid("aaaa11"));
        assert_eq!(flip.child().commit(), &cid("bbbb22"));
        assert_eq!(flip.to_pass(), &[tid("t2")].into());
        assert_eq!(flip.to_fail(), &[tid("t1")].into());
        assert_eq!(flip.diff_files().len(), 1);
    }

    #[test]
    fn unusable_evidence_is_silently_skipped() {
        let parent = testable("aaaa11", suite(&["t1"], &["t1"]));
        for (compilable, aborted) in [
            (Compilable::No, false),
            (Compilable::Unknown, false),
            (Compilable::NoBuildFile, false),
            (Compilable::Yes, true),
        ] {
            let child = child_of(
                "bbbb22",
                &parent,
                &[("x.rs", ChangeKind::Modified)],
                compilable,
                aborted,
                None,
            );
            assert!(
                graph_of(&[&parent, &child]).all_flips().is_empty(),
                "pair with child {compilable:?}/aborted={aborted} must not flip"
            );
        }
    }

    #[test]
    fn absent_tests_are_never_coerced_to_pass_or_fail() {
        // t1 fails in the parent and is absent in the child: not a flip.
        let parent = testable("aaaa11", suite(&["t1"], &["t1"]));
        let child = child_of(
            "bbbb22",
            &parent,
            &[("x.rs", ChangeKind::Deleted)],
            Compilable::Yes,
            false,
            Some(suite(&[], &[])),
        );
        assert!(graph_of(&[&parent, &child]).all_flips().is_empty());
    }

    #[test]
    fn identical_suites_yield_no_flip() {
        let parent = testable("aaaa11", suite(&["t1", "t2"], &["t2"]));
        let child = child_of(
            "bbbb22",
            &parent,
            &[("x.rs", ChangeKind::Modified)],
            Compilable::Yes,
            false,
            Some(suite(&["t1", "t2"], &["t2"])),
        );
        assert!(graph_of(&[&parent, &child]).all_flips().is_empty());
    }

    #[test]
    fn flips_are_ordered_by_diff_file_count() {
        let p1 = testable("aaaa11", suite(&["t1"], &["t1"]));
        let wide = child_of(
            "bbbb22",
            &p1,
            &[
                ("a.rs", ChangeKind::Modified),
                ("b.rs", ChangeKind::Modified),
                ("c.rs", ChangeKind::Added),
            ],
            Compilable::Yes,
            false,
            Some(suite(&["t1"], &[])),
        );
        let narrow = child_of(
            "cccc33",
            &wide,
            &[("a.rs", ChangeKind::Modified)],
            Compilable::Yes,
            false,
            Some(suite(&["t1"], &["t1"])),
        );
        let flips = graph_of(&[&p1, &wide, &narrow]).all_flips();
        assert_eq!(flips.len(), 2);
        assert_eq!(flips[0].child().commit(), &cid("cccc33"));
        assert_eq!(flips[0].diff_files().len(), 1);
        assert_eq!(flips[1].child().commit(), &cid("bbbb22"));
        assert_eq!(flips[1].diff_files().len(), 3);
    }
}
