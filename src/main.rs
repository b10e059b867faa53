use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use culprit::build::CommandBuildStrategy;
use culprit::config::CulpritConfig;
use culprit::graph::{HistoryGraph, HistoryGraphBuilder};
use culprit::report::TsvSink;
use culprit::search::DeltaSearch;
use culprit::telemetry;
use culprit_git::{CommitId, GitCli};

/// Test-flip miner and file-level delta debugger
///
/// culprit walks a commit range of a git repository, builds and tests every
/// commit, and finds "flips": commits where a test's outcome differs from a
/// parent. For each flip it then reverts every proper subset of the commit's
/// changed files and rebuilds/retests, isolating which file(s) actually
/// carried the behavior change.
///
/// The project under study is described in `culprit.toml` (build command,
/// test command, timeout, test-source paths). The test command must print
/// one `pass <test-id>` or `fail <test-id>` line per test.
///
/// QUICK START:
///
///   culprit flips --repo . --start HEAD-ish --end <older-commit>
///   culprit search --repo . --start <newest> --end <oldest>
///
/// The search writes a tab-delimited report, one row per
/// (trial, reverted file, test); rows are flushed as they are produced, so
/// an interrupted sweep keeps everything it finished.
#[derive(Parser)]
#[command(name = "culprit")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(
    after_help = "See 'culprit <command> --help' for more information on a specific command."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the flips in a commit range
    ///
    /// Builds and tests every commit in the range and prints each
    /// parent/child pair where at least one test's outcome differs.
    Flips(FlipsArgs),

    /// Run the delta sweep over a commit range
    ///
    /// Finds the flips, then for each one reverts file subsets and retests,
    /// writing one report row per (trial, reverted file, test).
    Search(SearchArgs),
}

#[derive(Args, Debug)]
struct RangeArgs {
    /// Path to the repository under study
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Newest commit of the range
    #[arg(long)]
    start: String,

    /// Oldest commit of the range
    #[arg(long)]
    end: String,

    /// Configuration file (default: <repo>/culprit.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FlipsArgs {
    #[command(flatten)]
    range: RangeArgs,

    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[command(flatten)]
    range: RangeArgs,

    /// Where to write the report (overrides the configured path)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Skip flips touching more than this many files (overrides config)
    #[arg(long)]
    max_delta_files: Option<usize>,
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Flips(args) => run_flips(&args),
        Commands::Search(args) => run_search(&args),
    }
}

/// Everything both subcommands need to get going.
struct Session {
    vcs: GitCli,
    config: CulpritConfig,
    start: CommitId,
    end: CommitId,
}

impl Session {
    fn open(range: &RangeArgs) -> Result<Self> {
        let config_path = range
            .config
            .clone()
            .unwrap_or_else(|| range.repo.join("culprit.toml"));
        let config = CulpritConfig::load(&config_path)?;
        let start: CommitId = range
            .start
            .parse()
            .with_context(|| format!("range start {:?}", range.start))?;
        let end: CommitId = range
            .end
            .parse()
            .with_context(|| format!("range end {:?}", range.end))?;
        Ok(Self {
            vcs: GitCli::new(&range.repo),
            config,
            start,
            end,
        })
    }

    fn build_graph(&self, strategy: &CommandBuildStrategy) -> Result<HistoryGraph> {
        HistoryGraphBuilder::new(&self.vcs, strategy).build(&self.start, &self.end)
    }
}

fn run_flips(args: &FlipsArgs) -> Result<()> {
    let session = Session::open(&args.range)?;
    let strategy = CommandBuildStrategy::new(&args.range.repo, session.config.build.clone());
    let graph = session.build_graph(&strategy)?;
    let flips = graph.all_flips();

    if args.json {
        let rows: Vec<serde_json::Value> = flips
            .iter()
            .map(|flip| {
                serde_json::json!({
                    "parent": flip.parent().commit().to_string(),
                    "child": flip.child().commit().to_string(),
                    "files": flip.diff_files().len(),
                    "to_pass": flip.to_pass().iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "to_fail": flip.to_fail().iter().map(ToString::to_string).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for flip in &flips {
            println!(
                "{}..{}  files={} to_pass={} to_fail={}",
                flip.parent().commit().short(),
                flip.child().commit().short(),
                flip.diff_files().len(),
                flip.to_pass().len(),
                flip.to_fail().len(),
            );
        }
        println!(
            "{} commits, {} flip(s)",
            graph.len(),
            flips.len()
        );
    }
    Ok(())
}

fn run_search(args: &SearchArgs) -> Result<()> {
    let session = Session::open(&args.range)?;
    let strategy = CommandBuildStrategy::new(&args.range.repo, session.config.build.clone());
    let graph = session.build_graph(&strategy)?;

    let mut search_config = session.config.search.clone();
    if let Some(report) = &args.report {
        search_config.report.clone_from(report);
    }
    if let Some(ceiling) = args.max_delta_files {
        search_config.max_delta_files = ceiling;
    }

    let report_path = search_config.report.clone();
    let mut sink = TsvSink::create(&report_path)?;
    let summary = DeltaSearch::new(&session.vcs, &strategy, search_config).run(&graph, &mut sink)?;

    println!(
        "{} flip(s) searched ({} skipped), {} trial(s), {} row(s) -> {}",
        summary.flips_searched,
        summary.flips_skipped,
        summary.trials,
        summary.rows,
        report_path.display()
    );
    Ok(())
}
