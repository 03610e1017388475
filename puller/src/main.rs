// Puller binary entry point
// Single scheduled run: no required arguments, always ends with a summary line.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use common::bootstrap;
use common::calendar;
use common::config::Settings;
use common::orchestrator::RunOutcome;
use common::telemetry;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Download newly published exchange data files over SFTP
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Directory holding default.toml / local.toml
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Evaluate the business-day gate for this date (YYYY-MM-DD) instead of today
    #[arg(long)]
    date: Option<NaiveDate>,
}

fn main() -> ExitCode {
    // A missing .env file is fine; settings may come from the environment directly
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let settings = match Settings::load_from_path(&cli.config_dir) {
        Ok(settings) => settings,
        Err(e) => {
            tracing_subscriber::fmt().with_target(false).init();
            error!(error = %e, config_dir = %cli.config_dir.display(), "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match telemetry::init_logging(
        &settings.observability.log_level,
        &settings.storage.log_dir,
        settings.observability.json,
    ) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = match run(&settings, cli.date) {
        Ok(outcome) => {
            info!(status = %outcome.status, "Run finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Unexpected error in main execution: {:#}", e);
            ExitCode::FAILURE
        }
    };

    info!("Script execution completed");
    code
}

fn run(settings: &Settings, date: Option<NaiveDate>) -> Result<RunOutcome> {
    let orchestrator =
        bootstrap::build_orchestrator(settings).context("Failed to build orchestrator")?;
    let date = date.unwrap_or_else(|| calendar::today(settings.calendar.timezone));
    Ok(orchestrator.run(date))
}
