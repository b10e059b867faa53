//! DeltaSearch — drives the full sweep: flip filtering and ordering,
//! subset enumeration, trial execution, and result recording.
//!
//! For a flip with n changed files the sweep explores every subset size
//! r in 1..=n−1: r = 0 is the unchanged base and r = n duplicates the
//! successor outright, both uninformative. Trial count therefore grows as
//! 2^n − 2 per flip, which is why flips above the configured file ceiling
//! are dropped and the rest are processed cheapest-first — trials are
//! expensive, the sweep may be interrupted, and every completed trial's
//! rows are already durable.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use culprit_git::{DiffFile, VersionControl};

use crate::build::BuildStrategy;
use crate::combi::CombinationGenerator;
use crate::config::SearchConfig;
use crate::delta::DeltaRevision;
use crate::graph::{Flip, HistoryGraph};
use crate::model::{Compilable, TestId, TestResult};
use crate::report::{Classification, RecordSink, TrialRecord};

// ---------------------------------------------------------------------------
// SearchSummary
// ---------------------------------------------------------------------------

/// Aggregate counts for one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SearchSummary {
    /// Flips the sweep ran trials for.
    pub flips_searched: usize,
    /// Flips dropped for exceeding the diff-file ceiling.
    pub flips_skipped: usize,
    /// Trials executed.
    pub trials: u64,
    /// Report rows written.
    pub rows: u64,
}

// ---------------------------------------------------------------------------
// DeltaSearch
// ---------------------------------------------------------------------------

/// The sweep driver. One instance per repository; trials run sequentially
/// because they share the primary working directory.
pub struct DeltaSearch<'a> {
    vcs: &'a dyn VersionControl,
    strategy: &'a dyn BuildStrategy,
    config: SearchConfig,
}

impl<'a> DeltaSearch<'a> {
    /// Create a sweep driver with explicit configuration.
    #[must_use]
    pub fn new(
        vcs: &'a dyn VersionControl,
        strategy: &'a dyn BuildStrategy,
        config: SearchConfig,
    ) -> Self {
        Self {
            vcs,
            strategy,
            config,
        }
    }

    /// Run the sweep over every flip in the graph, recording rows into
    /// `sink`.
    ///
    /// Rows already recorded stay valid if a later flip fails — each flip's
    /// trial set is independent of the next.
    pub fn run(&self, graph: &HistoryGraph, sink: &mut dyn RecordSink) -> Result<SearchSummary> {
        // all_flips is already ordered ascending by diff-file count.
        let all = graph.all_flips();
        let total = all.len();
        let flips: Vec<Flip> = all
            .into_iter()
            .filter(|flip| flip.diff_files().len() <= self.config.max_delta_files)
            .collect();
        let mut summary = SearchSummary {
            flips_skipped: total - flips.len(),
            ..SearchSummary::default()
        };
        if summary.flips_skipped > 0 {
            tracing::info!(
                skipped = summary.flips_skipped,
                ceiling = self.config.max_delta_files,
                "dropped flips above the diff-file ceiling"
            );
        }

        for flip in &flips {
            self.search_flip(flip, sink, &mut summary)
                .with_context(|| {
                    format!(
                        "search flip {}..{}",
                        flip.parent().commit().short(),
                        flip.child().commit().short()
                    )
                })?;
            summary.flips_searched += 1;
        }
        tracing::info!(
            flips = summary.flips_searched,
            trials = summary.trials,
            rows = summary.rows,
            "sweep complete"
        );
        Ok(summary)
    }

    /// Run all trials for one flip.
    ///
    /// The trial base is the flip's *child* (the commit that changed the
    /// outcome) and file content is taken from the *parent*: each trial
    /// reverts a subset of the commit's changes and asks which subset moves
    /// the outcome back.
    fn search_flip(
        &self,
        flip: &Flip,
        sink: &mut dyn RecordSink,
        summary: &mut SearchSummary,
    ) -> Result<()> {
        let mut revision = DeltaRevision::new(
            Arc::clone(flip.child()),
            Arc::clone(flip.parent()),
            self.vcs,
            self.strategy,
        );
        revision.checkout_base_and_successor()?;

        // Test sources stay at the base (newest) version: the suite itself
        // must not vary across trials, only the code under test.
        let pool: Vec<DiffFile> = revision
            .total_delta()
            .iter()
            .filter(|file| !self.strategy.is_test_file(file))
            .cloned()
            .collect();
        let n = pool.len();
        if n < 2 {
            tracing::info!(
                child = %flip.child().commit().short(),
                files = n,
                "flip has no informative proper subsets"
            );
            return Ok(());
        }
        tracing::info!(
            parent = %flip.parent().commit().short(),
            child = %flip.child().commit().short(),
            files = n,
            trials = 2u128.saturating_pow(n.min(100) as u32).saturating_sub(2),
            to_pass = flip.to_pass().len(),
            to_fail = flip.to_fail().len(),
            "searching flip"
        );

        for size in 1..n {
            for subset in CombinationGenerator::new(pool.clone(), size)? {
                summary.trials += 1;
                let trial = summary.trials;
                if let Err(err) = self.one_trial(&mut revision, subset, trial, sink, summary) {
                    // Leave the primary tree pristine for whatever runs next.
                    let _ = revision.restore_base_revision();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Apply one subset, build/test, record, restore.
    fn one_trial(
        &self,
        revision: &mut DeltaRevision<'_>,
        subset: Vec<DiffFile>,
        trial: u64,
        sink: &mut dyn RecordSink,
        summary: &mut SearchSummary,
    ) -> Result<()> {
        revision.set_delta(subset.into_iter().collect())?;
        revision.apply_delta()?;
        revision.run_test()?;

        let compilable = revision.compilable().unwrap_or(Compilable::Unknown);
        tracing::debug!(
            trial,
            %compilable,
            aborted = revision.test_aborted(),
            files = revision.delta().len(),
            "trial complete"
        );
        summary.rows += record_trial(revision, trial, compilable, sink)?;

        revision.restore_base_revision()
    }
}

/// Emit the rows for one tested trial: one per (reverted file × test), or
/// one per file when the trial produced no suite result.
fn record_trial(
    revision: &DeltaRevision<'_>,
    trial: u64,
    compilable: Compilable,
    sink: &mut dyn RecordSink,
) -> Result<u64> {
    let base = revision.base();
    let successor = revision.successor();
    // Both flip sides are testable by the flip filtering policy.
    let base_result = base.test_result().context("flip base has a test result")?;
    let successor_result = successor
        .test_result()
        .context("flip successor has a test result")?;

    let mut rows = 0;
    let template = |file: &DiffFile| TrialRecord {
        trial,
        base: base.commit().clone(),
        successor: successor.commit().clone(),
        path: file.path().display().to_string(),
        revert: file.kind,
        compilable,
        test_aborted: revision.test_aborted(),
        test: None,
        trial_outcome: None,
        base_outcome: None,
        successor_outcome: None,
        classification: None,
    };

    match revision.test_result() {
        Some(trial_result) => {
            let tests = test_universe(trial_result, base_result, successor_result);
            for file in revision.delta() {
                for &test in &tests {
                    let trial_outcome = trial_result.outcome(test);
                    let base_outcome = base_result.outcome(test);
                    let successor_outcome = successor_result.outcome(test);
                    sink.record(&TrialRecord {
                        test: Some(test.clone()),
                        trial_outcome: Some(trial_outcome),
                        base_outcome: Some(base_outcome),
                        successor_outcome: Some(successor_outcome),
                        classification: Some(Classification::classify(
                            trial_outcome,
                            base_outcome,
                            successor_outcome,
                        )),
                        ..template(file)
                    })?;
                    rows += 1;
                }
            }
        }
        None => {
            // Build failure or aborted suite: keep the verdict, one row per
            // reverted file.
            for file in revision.delta() {
                sink.record(&template(file))?;
                rows += 1;
            }
        }
    }
    Ok(rows)
}

/// The union of the three suites, so tests that appear or disappear across
/// the flip are still compared as `absent` rather than dropped.
fn test_universe<'t>(
    trial: &'t TestResult,
    base: &'t TestResult,
    successor: &'t TestResult,
) -> BTreeSet<&'t TestId> {
    let mut tests: BTreeSet<&TestId> = base.all_tests().iter().collect();
    tests.extend(successor.all_tests());
    tests.extend(trial.all_tests());
    tests
}
