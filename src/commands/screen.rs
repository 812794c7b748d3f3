//! Screen command implementation

use anyhow::{Context, Result};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use momentum_screener::data::{self, CsvDataProvider, MarketDataProvider};
use momentum_screener::{Config, CycleOutcome, Money, Portfolio, RunCycle, SqliteRunStore};
use std::path::PathBuf;
use tracing::{info, warn};

pub fn run(
    config_path: String,
    date_override: Option<String>,
    portfolio_override: Option<String>,
    top: usize,
    output: Option<String>,
) -> Result<()> {
    info!("Starting screening cycle");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(portfolio) = portfolio_override {
        info!("Overriding portfolio file to: {}", portfolio);
        config.data.portfolio_file = Some(portfolio);
    }

    let provider = CsvDataProvider::from_config(&config.data)
        .with_context(|| format!("Failed to prepare data from {}", config.data.data_dir))?;

    let portfolio = match &config.data.portfolio_file {
        Some(path) => data::load_portfolio(path)
            .with_context(|| format!("Failed to load portfolio {}", path))?,
        None => Portfolio::new(),
    };
    let invested = portfolio
        .values()
        .try_fold(Money::ZERO, |total, holding| total.checked_add(holding.cost_basis()?));
    match invested {
        Some(total) => info!(
            "Portfolio holds {} positions, cost basis {}",
            portfolio.len(),
            total
        ),
        None => warn!(
            "Portfolio holds {} positions, cost basis exceeds the decimal range",
            portfolio.len()
        ),
    }

    let run_date = match date_override {
        Some(date) => NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .with_context(|| format!("Invalid date: {}", date))?,
        None => provider
            .benchmark_series()
            .ok()
            .and_then(|series| series.last_date())
            .unwrap_or_else(|| chrono::Local::now().date_naive()),
    };

    let store = SqliteRunStore::open(
        &config.data.store_path,
        config.data.json_backup_path.as_ref().map(PathBuf::from),
    )
    .with_context(|| format!("Failed to open run store {}", config.data.store_path))?;

    let progress_bar = ProgressBar::new(provider.universe().len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}] {msg}")
            .context("Invalid progress template")?
            .progress_chars("█░ "),
    );

    let cycle = RunCycle::new(&config).with_progress(progress_bar);
    let outcome = cycle.execute(&provider, &store, &portfolio, run_date)?;

    print_summary(&outcome, top);

    if let Some(path) = output {
        std::fs::write(&path, serde_json::to_string_pretty(&outcome)?)
            .with_context(|| format!("Failed to write {}", path))?;
        info!("Cycle outcome written to: {}", path);
    }

    info!("Screening cycle completed successfully");
    Ok(())
}

fn print_summary(outcome: &CycleOutcome, top: usize) {
    let run = &outcome.run;
    let funnel = &run.funnel;

    println!("\n{}", "=".repeat(78));
    println!("SCREENING RUN {}", run.run_date);
    println!("{}", "=".repeat(78));
    println!(
        "Evaluated: {}  Admitted: {} ({:.1}%)",
        funnel.evaluated,
        funnel.admitted,
        funnel.admission_rate()
    );
    for (stage, count) in &funnel.rejected {
        println!("  rejected at {:<15} {}", stage, count);
    }

    println!(
        "\n{:<4} {:<8} {:>9} {:>9} {:>7} {:>9} {:>6} {:>8}",
        "#", "Symbol", "Price", "Stop", "Risk%", "Target", "R/R", "Score"
    );
    for (i, c) in run.candidates.iter().take(top).enumerate() {
        println!(
            "{:<4} {:<8} {:>9.2} {:>9.2} {:>7.2} {:>9.2} {:>6.2} {:>8.1}",
            i + 1,
            c.symbol,
            c.current_price(),
            c.stop_loss.stop_price,
            c.stop_loss.risk_percentage,
            c.take_profit.target_price,
            c.risk_reward_ratio,
            c.final_score()
        );
    }

    let changes = &outcome.consistency.changes;
    println!("\n{}", "-".repeat(78));
    println!(
        "New entries: {}  Dropped: {}  Continuing: {}",
        changes.new_entries.len(),
        changes.dropped.len(),
        changes.continuing.len()
    );

    let plan = &outcome.plan;
    if !plan.holdings.is_empty() {
        println!("\n{}", "-".repeat(78));
        println!("PORTFOLIO REVIEW");
        for rec in &plan.holdings {
            let target = rec
                .refreshed_take_profit
                .map(|tp| format!("{:.2}", tp.target_price))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<8} {:<16} score {:>5.0}  health {:>3.0}  target {:>9}  {}",
                rec.symbol, rec.action, rec.advanced_score.total, rec.health.score, target, rec.reason
            );
        }
    }

    if !plan.opportunities.is_empty() {
        println!("\n{}", "-".repeat(78));
        println!("OPPORTUNITIES");
        for opp in plan.opportunities.iter().take(top) {
            println!(
                "{:<8} {:<10} score {:>5.0}  {:<18} {}",
                opp.symbol, opp.confidence, opp.advanced_score.total, opp.category, opp.trend
            );
        }
    }

    if !plan.watchlist.is_empty() {
        let names: Vec<&str> = plan.watchlist.iter().map(|w| w.symbol.as_str()).collect();
        println!("\nWatchlist: {}", names.join(", "));
    }
    println!("{}", "=".repeat(78));
}
