// crates/db/examples/bench_refresh.rs
// Timing for a full-tree refresh against the configured sessions root.
//
// Run with: cargo run --example bench_refresh -p session-scope-db --release
//
// Uses a throwaway cache directory so the real summary index is untouched:
//   Cold refresh (every file parsed)
//   Warm refresh (in-process tier answers)
//   Reopened refresh (persistent tier answers, then promotes)

use std::time::Instant;

use session_scope_core::IndexerConfig;
use session_scope_db::SessionIndex;
use session_scope_types::ScanScope;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = IndexerConfig::load()?;
    if !config.sessions_root.is_dir() {
        eprintln!(
            "Error: {} does not exist. Set SESSION_SCOPE_ROOT to a session log tree.",
            config.sessions_root.display()
        );
        std::process::exit(1);
    }

    let scratch = tempfile::TempDir::new()?;
    config.cache_dir = Some(scratch.path().to_path_buf());

    println!("=== session-scope refresh benchmark ===");
    println!("Root:    {}", config.sessions_root.display());
    println!("Workers: {}", config.worker_count());
    println!();

    let index = SessionIndex::open(config.clone())?;

    let start = Instant::now();
    let cold = index.refresh(ScanScope::All).await?;
    let cold_ms = start.elapsed().as_secs_f64() * 1000.0;
    println!("Cold:     {:>6} sessions in {:>8.1}ms", cold.len(), cold_ms);

    let start = Instant::now();
    let warm = index.refresh(ScanScope::All).await?;
    let warm_ms = start.elapsed().as_secs_f64() * 1000.0;
    println!("Warm:     {:>6} sessions in {:>8.1}ms", warm.len(), warm_ms);

    let reopened = SessionIndex::open(config)?;
    let start = Instant::now();
    let disk = reopened.refresh(ScanScope::All).await?;
    let disk_ms = start.elapsed().as_secs_f64() * 1000.0;
    println!("Reopened: {:>6} sessions in {:>8.1}ms", disk.len(), disk_ms);

    let bytes: u64 = cold.iter().map(|s| s.file_size).sum();
    println!();
    println!(
        "Parsed {:.1} MiB, {:.1} MiB/s cold",
        bytes as f64 / (1024.0 * 1024.0),
        bytes as f64 / (1024.0 * 1024.0) / (cold_ms / 1000.0).max(0.001)
    );

    Ok(())
}
