//! Trial result rows and the sinks they are recorded into.
//!
//! One trial produces one row per (reverted file × test), denormalized so
//! the report is a flat tab-delimited table. Rows are flushed as they are
//! written: trials are independent, so everything recorded before a later
//! fatal error remains valid.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use culprit_git::{ChangeKind, CommitId};

use crate::model::{Compilable, TestId, TestOutcome};

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// How one test's outcome in a trial relates to the same test's outcome in
/// the base and successor revisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Matches the base but not the successor.
    ReproducesBase,
    /// Matches the successor but not the base — this delta carries the
    /// behavior change for this test.
    ReproducesSuccessor,
    /// Base and successor agree and the trial matches them.
    MatchesBoth,
    /// Matches neither side.
    Novel,
}

impl Classification {
    /// Compare a trial outcome against both endpoints.
    #[must_use]
    pub fn classify(trial: TestOutcome, base: TestOutcome, successor: TestOutcome) -> Self {
        match (trial == base, trial == successor) {
            (true, true) => Self::MatchesBoth,
            (true, false) => Self::ReproducesBase,
            (false, true) => Self::ReproducesSuccessor,
            (false, false) => Self::Novel,
        }
    }

    /// Stable lowercase token for report rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReproducesBase => "base",
            Self::ReproducesSuccessor => "successor",
            Self::MatchesBoth => "both",
            Self::Novel => "novel",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TrialRecord
// ---------------------------------------------------------------------------

/// One report row.
///
/// The per-test fields are `None` for trials whose build failed (or whose
/// test run was aborted): the compile verdict is still worth a row per
/// reverted file, but there is nothing to classify.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrialRecord {
    /// Trial number, unique within one sweep.
    pub trial: u64,
    /// The trial's base commit (the flip's child).
    pub base: CommitId,
    /// The commit file content was taken from (the flip's parent).
    pub successor: CommitId,
    /// One file of the applied delta.
    pub path: String,
    /// The kind of change applied for `path`, from the successor's
    /// perspective (i.e. the revert direction).
    pub revert: ChangeKind,
    /// The trial's build verdict.
    pub compilable: Compilable,
    /// Whether the trial's test process was killed by the timeout.
    pub test_aborted: bool,
    /// The test this row describes.
    pub test: Option<TestId>,
    /// The test's outcome in the trial / base / successor.
    pub trial_outcome: Option<TestOutcome>,
    /// Outcome in the base revision.
    pub base_outcome: Option<TestOutcome>,
    /// Outcome in the successor revision.
    pub successor_outcome: Option<TestOutcome>,
    /// Relation of the trial outcome to the two endpoints.
    pub classification: Option<Classification>,
}

impl TrialRecord {
    /// The TSV header row.
    pub const HEADER: &'static str = "trial\tbase\tsuccessor\tpath\trevert\tcompilable\t\
         aborted\ttest\ttrial_result\tbase_result\tsuccessor_result\tclassification";

    /// Render as one TSV line (no trailing newline). Absent per-test fields
    /// render as `-`.
    #[must_use]
    pub fn tsv(&self) -> String {
        fn dash<T: fmt::Display>(value: Option<T>) -> String {
            value.map_or_else(|| "-".to_owned(), |v| v.to_string())
        }
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.trial,
            self.base,
            self.successor,
            self.path,
            self.revert.letter(),
            self.compilable,
            self.test_aborted,
            dash(self.test.as_ref()),
            dash(self.trial_outcome),
            dash(self.base_outcome),
            dash(self.successor_outcome),
            dash(self.classification),
        )
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Where trial rows go. Object-safe so the sweep takes `&mut dyn RecordSink`.
pub trait RecordSink {
    /// Record one row. Implementations must make the row durable before
    /// returning — the sweep may be interrupted at any point.
    fn record(&mut self, record: &TrialRecord) -> Result<()>;
}

/// Tab-delimited file sink; writes the header on creation and flushes every
/// row.
pub struct TsvSink {
    writer: BufWriter<File>,
}

impl TsvSink {
    /// Create (truncate) the report file and write the header.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create report directory {}", parent.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("create report {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", TrialRecord::HEADER).context("write report header")?;
        writer.flush().context("flush report header")?;
        Ok(Self { writer })
    }
}

impl RecordSink for TsvSink {
    fn record(&mut self, record: &TrialRecord) -> Result<()> {
        writeln!(self.writer, "{}", record.tsv()).context("write report row")?;
        self.writer.flush().context("flush report row")
    }
}

/// In-memory sink for tests and summaries.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Every recorded row, in order.
    pub records: Vec<TrialRecord>,
}

impl RecordSink for MemorySink {
    fn record(&mut self, record: &TrialRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}
