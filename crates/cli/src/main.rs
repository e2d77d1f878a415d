// crates/cli/src/main.rs
//! `session-scope`: refresh, enrich, search and calendar queries over a
//! date-partitioned session log tree. Results go to stdout as JSON; logs go
//! to stderr.

mod args;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use session_scope_core::IndexerConfig;
use session_scope_db::{files_for_updated_day, SessionIndex};
use session_scope_search::search_paths;
use session_scope_types::{sort_by_recency, CalendarDimension};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let index = SessionIndex::open(config).context("failed to open summary index")?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    run(cli.command, &index, &cancel).await
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn,session_scope=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Flags > environment > config file > defaults.
fn load_config(cli: &Cli) -> Result<IndexerConfig> {
    let config = match &cli.config {
        Some(path) => IndexerConfig::load_from(path)?.apply_env_with(|key| std::env::var(key).ok())?,
        None => IndexerConfig::load()?,
    };
    Ok(cli.apply_overrides(config))
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            cancel.cancel();
        }
    });
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(command: Command, index: &SessionIndex, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::Refresh(scope) => {
            let mut summaries = index.refresh(scope.scope()).await?;
            sort_by_recency(&mut summaries);
            print_json(&summaries)
        }
        Command::Enrich { path: Some(path), .. } => {
            match index.enrich(&path, cancel).await? {
                Some(summary) => print_json(&summary),
                None => anyhow::bail!("{} does not exist", path.display()),
            }
        }
        Command::Enrich { path: None, scope } => {
            let files = index.scope_files(scope.scope()).await?;
            let total = files.len();
            let enriched = index.enrich_many(files, cancel).await?;
            print_json(&serde_json::json!({ "files": total, "enriched": enriched }))
        }
        Command::Search { term, scope } => {
            let files = index.scope_files(scope.scope()).await?;
            let workers = index.config().worker_count();
            let matches: Vec<PathBuf> = search_paths(files, &term, cancel, workers).await;
            if cancel.is_cancelled() {
                info!(matches = matches.len(), "search cancelled, results are partial");
            }
            print_json(&matches)
        }
        Command::Calendar { month, updated } => {
            let dimension = if updated {
                CalendarDimension::Updated
            } else {
                CalendarDimension::Created
            };
            let counts = index.compute_calendar_counts(month, dimension).await?;
            print_json(&counts)
        }
        Command::UpdatedDay { day } => {
            let updated = index.build_updated_index().await?;
            print_json(&files_for_updated_day(day, &updated))
        }
        Command::Cwds(scope) => {
            let files = index.scope_files(scope.scope()).await?;
            print_json(&index.aggregate_working_directories(files).await)
        }
        Command::Annotate { path, comment } => match index.annotate(&path, comment).await? {
            Some(summary) => print_json(&summary),
            None => anyhow::bail!("{} does not exist", path.display()),
        },
        Command::ResetCache => {
            index.reset_all_caches()?;
            eprintln!("summary caches cleared");
            Ok(())
        }
    }
}
