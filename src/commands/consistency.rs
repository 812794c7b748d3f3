//! Consistency command implementation

use anyhow::{Context, Result};
use momentum_screener::{Config, RunCycle, SqliteRunStore};
use std::path::PathBuf;
use tracing::{info, warn};

pub fn run(config_path: String) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let store = SqliteRunStore::open(
        &config.data.store_path,
        config.data.json_backup_path.as_ref().map(PathBuf::from),
    )
    .with_context(|| format!("Failed to open run store {}", config.data.store_path))?;

    let Some(report) = RunCycle::new(&config).stored_report(&store)? else {
        warn!("No stored runs in {}", config.data.store_path);
        return Ok(());
    };

    let stored = report.run_dates.iter().flatten().count();
    println!("\n{}", "=".repeat(70));
    println!(
        "CONSISTENCY REPORT ({} of {} window slots filled)",
        stored, report.window_size
    );
    println!("{}", "=".repeat(70));

    for (category, symbols) in &report.categories {
        println!("\n{} ({})", category, symbols.len());
        for symbol in symbols {
            if let Some(record) = report.get(symbol) {
                println!(
                    "  {:<8} freq {}/{}  streak {}  score {:>6.1}  {}",
                    record.symbol,
                    record.frequency,
                    report.window_size,
                    record.longest_streak,
                    record.consistency_score,
                    record.trend
                );
            }
        }
    }

    let changes = &report.changes;
    let join = |symbols: &[momentum_screener::Symbol]| {
        symbols.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
    };
    println!("\n{}", "-".repeat(70));
    println!("New entries: {}", join(&changes.new_entries));
    println!("Dropped:     {}", join(&changes.dropped));
    println!("Continuing:  {}", join(&changes.continuing));
    println!("{}", "=".repeat(70));

    Ok(())
}
