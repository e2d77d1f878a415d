// crates/cli/src/args.rs
//! Command-line surface.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use session_scope_core::IndexerConfig;
use session_scope_types::ScanScope;

#[derive(Debug, Parser)]
#[command(name = "session-scope", version, about = "Index and query date-partitioned session logs")]
pub struct Cli {
    /// Root of the YEAR/MONTH/DAY log tree.
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Where the persistent summary index lives.
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Parallel file workers.
    #[arg(long, global = true, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: Option<u16>,

    /// Config file to read instead of the default location.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Summarize every session in a scope, newest first.
    Refresh(ScopeArgs),
    /// Compute active duration for one file, or every file in a scope.
    Enrich {
        path: Option<PathBuf>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// List files in a scope containing TERM (case-insensitive).
    Search {
        term: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Sessions per day of a month.
    Calendar {
        #[arg(value_name = "YYYY-MM", value_parser = parse_month)]
        month: NaiveDate,
        /// Bucket by last in-content timestamp instead of directory.
        #[arg(long)]
        updated: bool,
    },
    /// Files whose last in-content timestamp falls on DAY (local time).
    UpdatedDay {
        #[arg(value_name = "YYYY-MM-DD")]
        day: NaiveDate,
    },
    /// Session count per working directory.
    Cwds(ScopeArgs),
    /// Attach a comment to a session; omit the text to clear it.
    Annotate { path: PathBuf, comment: Option<String> },
    /// Delete both cache tiers.
    ResetCache,
}

#[derive(Debug, Clone, Default, Args)]
#[group(multiple = false)]
pub struct ScopeArgs {
    #[arg(long)]
    pub today: bool,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub day: Option<NaiveDate>,
    #[arg(long, value_name = "YYYY-MM", value_parser = parse_month)]
    pub month: Option<NaiveDate>,
    #[arg(long)]
    pub all: bool,
}

impl ScopeArgs {
    /// Today when nothing is given.
    pub fn scope(&self) -> ScanScope {
        if self.all {
            ScanScope::All
        } else if let Some(day) = self.day {
            ScanScope::Day(day)
        } else if let Some(month) = self.month {
            ScanScope::Month(month)
        } else {
            ScanScope::Today
        }
    }
}

pub fn parse_month(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
        .map_err(|_| format!("expected YYYY-MM, got {raw:?}"))
}

impl Cli {
    /// Flags win over whatever the file and environment produced.
    pub fn apply_overrides(&self, mut config: IndexerConfig) -> IndexerConfig {
        if let Some(root) = &self.root {
            config.sessions_root = root.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if let Some(workers) = self.workers {
            config.workers = Some(usize::from(workers));
        }
        config
    }
}
