//! Pure value types: test outcomes, build verdicts, and the [`Revision`]
//! node the history graph is made of.
//!
//! Everything here is immutable after construction. The two validating
//! constructors ([`TestResult::new`], [`Revision::from_parts`]) are the only
//! places the data-model invariants are enforced; the rest of the engine can
//! then rely on them unconditionally.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use culprit_git::{CommitId, DiffFile};

use crate::build::{BuildStrategy, TestRun};

// ---------------------------------------------------------------------------
// TestId / TestOutcome
// ---------------------------------------------------------------------------

/// The name of one test, as reported by the project's test runner.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestId(String);

impl TestId {
    /// Wrap a test name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The test name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestId({})", self.0)
    }
}

/// The outcome of one test in one revision's suite.
///
/// `Absent` means the suite did not contain the test at all. It is a real
/// third state: when two revisions are compared, a test missing on one side
/// must never be coerced to pass or fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TestOutcome {
    /// The test ran and passed.
    Pass,
    /// The test ran and failed.
    Fail,
    /// The suite does not contain this test.
    Absent,
}

impl TestOutcome {
    /// Stable lowercase token for report rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Absent => "absent",
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TestResult
// ---------------------------------------------------------------------------

/// The result of one full test-suite run: every test that ran, and the
/// failing subset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestResult {
    all_tests: BTreeSet<TestId>,
    failed_tests: BTreeSet<TestId>,
}

impl TestResult {
    /// Build a result from the full suite and its failing subset.
    ///
    /// # Errors
    ///
    /// Fails if `failed_tests` is not a subset of `all_tests` — a runner that
    /// reports a failure for a test it never listed is lying about one of the
    /// two sets.
    pub fn new(
        all_tests: BTreeSet<TestId>,
        failed_tests: BTreeSet<TestId>,
    ) -> Result<Self, InvalidTestResult> {
        if let Some(stray) = failed_tests.difference(&all_tests).next() {
            return Err(InvalidTestResult {
                test: stray.clone(),
            });
        }
        Ok(Self {
            all_tests,
            failed_tests,
        })
    }

    /// An empty suite (no tests ran).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            all_tests: BTreeSet::new(),
            failed_tests: BTreeSet::new(),
        }
    }

    /// Every test that ran.
    #[must_use]
    pub fn all_tests(&self) -> &BTreeSet<TestId> {
        &self.all_tests
    }

    /// The failing subset.
    #[must_use]
    pub fn failed_tests(&self) -> &BTreeSet<TestId> {
        &self.failed_tests
    }

    /// The tri-state outcome of `test` in this run.
    #[must_use]
    pub fn outcome(&self, test: &TestId) -> TestOutcome {
        if self.failed_tests.contains(test) {
            TestOutcome::Fail
        } else if self.all_tests.contains(test) {
            TestOutcome::Pass
        } else {
            TestOutcome::Absent
        }
    }
}

/// A failing test was reported that the suite never listed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidTestResult {
    /// The offending test id.
    pub test: TestId,
}

impl fmt::Display for InvalidTestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed test `{}` is not part of the reported suite",
            self.test
        )
    }
}

impl std::error::Error for InvalidTestResult {}

// ---------------------------------------------------------------------------
// Compilable
// ---------------------------------------------------------------------------

/// The build verdict for one revision of the project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Compilable {
    /// The build succeeded.
    Yes,
    /// The build ran and failed. An expected outcome, not an error.
    No,
    /// The build could not be run (spawn failure, build timeout).
    Unknown,
    /// The revision predates the project's build setup; there is nothing to
    /// build. Expected for pre-adoption commits, not an error.
    NoBuildFile,
}

impl Compilable {
    /// Stable lowercase token for report rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Unknown => "unknown",
            Self::NoBuildFile => "no-build-file",
        }
    }
}

impl fmt::Display for Compilable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Revision
// ---------------------------------------------------------------------------

/// One commit in the history graph: its build/test evidence plus strong
/// references to its already-constructed parents and the per-parent diffs.
///
/// Immutable once constructed. The graph builder guarantees parents exist
/// before any child, so the parent references form a DAG by construction.
#[derive(Debug)]
pub struct Revision {
    commit: CommitId,
    parents: Vec<(Arc<Revision>, BTreeSet<DiffFile>)>,
    compilable: Compilable,
    test_aborted: bool,
    test_result: Option<TestResult>,
}

impl Revision {
    /// Construct from already-known fields.
    ///
    /// # Errors
    ///
    /// Fails unless `test_result` is present exactly when the build succeeded
    /// and the test run was not aborted.
    pub fn from_parts(
        commit: CommitId,
        parents: Vec<(Arc<Revision>, BTreeSet<DiffFile>)>,
        compilable: Compilable,
        test_aborted: bool,
        test_result: Option<TestResult>,
    ) -> Result<Self, InvalidRevision> {
        let should_have_result = compilable == Compilable::Yes && !test_aborted;
        if test_result.is_some() != should_have_result {
            return Err(InvalidRevision {
                commit,
                compilable,
                test_aborted,
                has_result: test_result.is_some(),
            });
        }
        Ok(Self {
            commit,
            parents,
            compilable,
            test_aborted,
            test_result,
        })
    }

    /// Construct eagerly by invoking the build strategy.
    ///
    /// The caller must already have checked out `commit` in the strategy's
    /// working directory; this method only runs the build and, on success,
    /// the test suite.
    pub fn evaluate(
        commit: CommitId,
        parents: Vec<(Arc<Revision>, BTreeSet<DiffFile>)>,
        strategy: &dyn BuildStrategy,
    ) -> Result<Self> {
        let compilable = strategy.build();
        let (test_aborted, test_result) = if compilable == Compilable::Yes {
            match strategy
                .run_test()
                .with_context(|| format!("test run for commit {commit}"))?
            {
                TestRun::Completed(result) => (false, Some(result)),
                TestRun::Aborted => (true, None),
            }
        } else {
            (false, None)
        };
        tracing::debug!(
            commit = %commit.short(),
            %compilable,
            test_aborted,
            tests = test_result.as_ref().map_or(0, |r| r.all_tests().len()),
            "evaluated revision"
        );
        Ok(Self {
            commit,
            parents,
            compilable,
            test_aborted,
            test_result,
        })
    }

    /// The commit this revision represents.
    #[must_use]
    pub fn commit(&self) -> &CommitId {
        &self.commit
    }

    /// Parents included in the graph, each with the diff from that parent to
    /// this revision (newer-side perspective).
    #[must_use]
    pub fn parents(&self) -> &[(Arc<Revision>, BTreeSet<DiffFile>)] {
        &self.parents
    }

    /// The diff against one specific parent, if that parent is in the graph.
    #[must_use]
    pub fn diff_against(&self, parent: &CommitId) -> Option<&BTreeSet<DiffFile>> {
        self.parents
            .iter()
            .find(|(p, _)| p.commit() == parent)
            .map(|(_, diff)| diff)
    }

    /// The build verdict.
    #[must_use]
    pub fn compilable(&self) -> Compilable {
        self.compilable
    }

    /// Whether the test process was forcibly terminated.
    #[must_use]
    pub fn test_aborted(&self) -> bool {
        self.test_aborted
    }

    /// The suite result, present iff the build succeeded and the run was not
    /// aborted.
    #[must_use]
    pub fn test_result(&self) -> Option<&TestResult> {
        self.test_result.as_ref()
    }

    /// Whether this revision is usable evidence for flip detection.
    #[must_use]
    pub fn is_testable(&self) -> bool {
        self.compilable == Compilable::Yes && !self.test_aborted
    }
}

/// The test-result-presence invariant was violated.
#[derive(Clone, Debug)]
pub struct InvalidRevision {
    /// The commit being constructed.
    pub commit: CommitId,
    /// Its build verdict.
    pub compilable: Compilable,
    /// Whether the test run was aborted.
    pub test_aborted: bool,
    /// Whether a test result was supplied.
    pub has_result: bool,
}

impl fmt::Display for InvalidRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "revision {}: test result {} with compilable={} test_aborted={}",
            self.commit,
            if self.has_result {
                "present"
            } else {
                "missing"
            },
            self.compilable,
            self.test_aborted
        )
    }
}

impl std::error::Error for InvalidRevision {}
