// Telemetry module for structured logging and run counters

use anyhow::{Context, Result};
use metrics::{counter, describe_counter};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Prefix of the daily log file written under the log directory
pub const LOG_FILE_PREFIX: &str = "exchange_data_download.log";

/// Initialize logging to the console and to a daily-rolling file in `log_dir`.
///
/// `RUST_LOG` takes precedence over `log_level`. The returned guard flushes
/// the file writer when dropped and must be held for the life of the process.
pub fn init_logging(log_level: &str, log_dir: &Path, json: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_ansi(false)
                    .with_writer(file_writer),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false))
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(file_writer),
            )
            .try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    describe_metrics();

    tracing::info!(
        log_level = log_level,
        log_dir = %log_dir.display(),
        json = json,
        "Logging initialized"
    );

    Ok(guard)
}

const FILES_FETCHED: &str = "files_fetched_total";
const BYTES_FETCHED: &str = "bytes_fetched_total";
const FILES_FAILED: &str = "files_failed_total";
const ENDPOINT_FAILOVER: &str = "endpoint_failover_total";
const RUNS: &str = "runs_total";

/// Every counter this module records, with its description
const COUNTERS: [(&str, &str); 5] = [
    (FILES_FETCHED, "Files downloaded and recorded in the ledger"),
    (BYTES_FETCHED, "Bytes written to local artifacts"),
    (FILES_FAILED, "Files whose download failed"),
    (ENDPOINT_FAILOVER, "Connection attempts that moved to a lower-priority endpoint"),
    (RUNS, "Completed runs by terminal status"),
];

fn describe_metrics() {
    for (name, description) in COUNTERS {
        describe_counter!(name, description);
    }
}

#[inline]
pub fn record_file_fetched(endpoint: &str, bytes: u64) {
    counter!(FILES_FETCHED, "endpoint" => endpoint.to_string()).increment(1);
    counter!(BYTES_FETCHED, "endpoint" => endpoint.to_string()).increment(bytes);
}

#[inline]
pub fn record_file_failed(endpoint: &str) {
    counter!(FILES_FAILED, "endpoint" => endpoint.to_string()).increment(1);
}

#[inline]
pub fn record_failover(endpoint: &str) {
    counter!(ENDPOINT_FAILOVER, "endpoint" => endpoint.to_string()).increment(1);
}

#[inline]
pub fn record_run(status: &str) {
    counter!(RUNS, "status" => status.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_recorded_counter_is_described() {
        let described: Vec<&str> = COUNTERS.iter().map(|(name, _)| *name).collect();
        for name in [FILES_FETCHED, BYTES_FETCHED, FILES_FAILED, ENDPOINT_FAILOVER, RUNS] {
            assert!(described.contains(&name), "{} has no description", name);
        }
        assert!(COUNTERS.iter().all(|(_, description)| !description.is_empty()));
    }

    #[test]
    fn test_metrics_recording() {
        // No recorder installed; recording must still be a no-op rather than a panic
        record_file_fetched("primary", 1024);
        record_file_failed("backup");
        record_failover("backup");
        record_run("completed");
    }

    #[test]
    fn test_init_logging_installs_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_dir = dir.path().join("logs");

        let first = init_logging("info", &log_dir, false);
        assert!(first.is_ok());
        assert!(log_dir.is_dir());

        let second = init_logging("info", &log_dir, false);
        assert!(second.is_err());
    }
}
