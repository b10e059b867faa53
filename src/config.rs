//! culprit repository configuration (`culprit.toml`).
//!
//! Defines the typed configuration for the project under study: how to build
//! and test it, and how the delta sweep is bounded. Missing fields use
//! sensible defaults; a missing file means all defaults (no error). Legacy
//! global option fields live nowhere — configuration is an explicit value
//! passed to the constructors that need it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level culprit configuration.
///
/// Parsed from `culprit.toml` in the studied repository's root (or a path
/// given on the command line).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct CulpritConfig {
    /// How to build and test the project.
    #[serde(default)]
    pub build: BuildConfig,

    /// Delta-sweep bounds and output.
    #[serde(default)]
    pub search: SearchConfig,
}

impl CulpritConfig {
    /// Load configuration from `path`.
    ///
    /// A missing file yields all defaults; a present-but-invalid file is an
    /// error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// BuildConfig
// ---------------------------------------------------------------------------

/// How to build and test the project under study.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// A file whose absence marks a revision as predating the build setup
    /// (e.g. `"Cargo.toml"`, `"pom.xml"`). `None` disables the probe.
    #[serde(default)]
    pub build_file: Option<String>,

    /// Shell command that compiles the project; exit 0 means compilable.
    /// Empty means there is nothing to compile.
    #[serde(default)]
    pub build_command: String,

    /// Shell command that runs the suite, printing one `pass <test-id>` or
    /// `fail <test-id>` line per test. Empty means an empty suite.
    #[serde(default)]
    pub test_command: String,

    /// Kill the build or test process after this many seconds
    /// (default: one hour).
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Path prefixes (relative to the repository root) holding test sources.
    /// Files under these prefixes are never part of a delta — trials always
    /// run against the newest test sources.
    #[serde(default)]
    pub test_paths: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build_file: None,
            build_command: String::new(),
            test_command: String::new(),
            timeout_seconds: default_timeout_seconds(),
            test_paths: Vec::new(),
        }
    }
}

const fn default_timeout_seconds() -> u64 {
    3600
}

// ---------------------------------------------------------------------------
// SearchConfig
// ---------------------------------------------------------------------------

/// Bounds and output location for the delta sweep.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Skip flips touching more than this many files. Trial count grows as
    /// 2^n − 2, so the default keeps a single flip under 126 trials.
    #[serde(default = "default_max_delta_files")]
    pub max_delta_files: usize,

    /// Where the trial report is written.
    #[serde(default = "default_report")]
    pub report: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_delta_files: default_max_delta_files(),
            report: default_report(),
        }
    }
}

const fn default_max_delta_files() -> usize {
    7
}

fn default_report() -> PathBuf {
    PathBuf::from("culprit-report.tsv")
}

impl fmt::Display for SearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max_delta_files={} report={}",
            self.max_delta_files,
            self.report.display()
        )
    }
}
