//! Momentum screener - main entry point
//!
//! This binary provides two subcommands:
//! - screen: Run a full screening cycle and print the rotation plan
//! - consistency: Report run-over-run consistency from stored runs

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "momentum-screener")]
#[command(about = "Momentum screening with consistency tracking and portfolio rotation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Screen the universe, update consistency, and review the portfolio
    Screen {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/screener.json")]
        config: String,

        /// Run date (YYYY-MM-DD), defaults to the benchmark's last bar
        #[arg(long)]
        date: Option<String>,

        /// Portfolio file (overrides config file)
        #[arg(short, long)]
        portfolio: Option<String>,

        /// Number of ranked candidates to show
        #[arg(short, long, default_value = "20")]
        top: usize,

        /// Write the full cycle outcome as JSON to this path
        #[arg(long)]
        output: Option<String>,
    },

    /// Show consistency categories from stored runs
    Consistency {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/screener.json")]
        config: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true)
        .with_writer(std::io::stderr);

    // File layer - same format but without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Screen { .. } => "screen",
        Commands::Consistency { .. } => "consistency",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Screen {
            config,
            date,
            portfolio,
            top,
            output,
        } => commands::screen::run(config, date, portfolio, top, output),

        Commands::Consistency { config } => commands::consistency::run(config),
    }
}
