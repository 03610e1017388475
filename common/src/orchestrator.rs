// Run orchestration
//
// One run: gate check → connect → list → dedup → fetch loop → summary.
// Per-file and per-endpoint failures are contained; the session is closed on
// every path that opened one.

use crate::calendar::CalendarGate;
use crate::catalog::RemoteCatalog;
use crate::fetch::FetchExecutor;
use crate::ledger::Ledger;
use crate::models::{DownloadedArtifact, EndpointConfig, RemoteFileRef};
use crate::sftp::{ActiveSession, ConnectionManager, EndpointSession};
use crate::telemetry;
use chrono::NaiveDate;
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// Terminal status of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    SkippedNonBusinessDay { reason: String },
    NoEndpointAvailable,
    NoCandidates,
    Completed { downloads: usize },
    CompletedWithFailures { downloads: usize, failures: usize },
}

impl RunStatus {
    /// Stable label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::SkippedNonBusinessDay { .. } => "skipped",
            RunStatus::NoEndpointAvailable => "no_endpoint",
            RunStatus::NoCandidates => "no_candidates",
            RunStatus::Completed { .. } => "completed",
            RunStatus::CompletedWithFailures { .. } => "completed_with_failures",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::SkippedNonBusinessDay { reason } => write!(f, "skipped: {}", reason),
            RunStatus::NoEndpointAvailable => write!(f, "no endpoint available"),
            RunStatus::NoCandidates => write!(f, "no candidates"),
            RunStatus::Completed { downloads } => {
                write!(f, "completed with {} downloads", downloads)
            }
            RunStatus::CompletedWithFailures {
                downloads,
                failures,
            } => write!(
                f,
                "completed with {} downloads and {} failures",
                downloads, failures
            ),
        }
    }
}

/// Aggregate result of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Remote entries matching the expected extension
    pub candidates: usize,
    /// Candidates skipped because the ledger already had them
    pub already_processed: usize,
    pub fetched: usize,
    pub failed: usize,
    pub artifacts: Vec<DownloadedArtifact>,
    /// Endpoint the run connected to, if any
    pub endpoint: Option<String>,
}

impl RunOutcome {
    fn terminal(status: RunStatus, endpoint: Option<String>) -> Self {
        Self {
            status,
            candidates: 0,
            already_processed: 0,
            fetched: 0,
            failed: 0,
            artifacts: Vec::new(),
            endpoint,
        }
    }
}

/// Orchestrator composes the gate, connection, listing, fetch and ledger into one run
pub struct Orchestrator {
    gate: CalendarGate,
    connections: ConnectionManager,
    catalog: RemoteCatalog,
    executor: FetchExecutor,
    endpoints: Vec<EndpointConfig>,
    ledger_path: PathBuf,
}

impl Orchestrator {
    pub fn new(
        gate: CalendarGate,
        connections: ConnectionManager,
        catalog: RemoteCatalog,
        executor: FetchExecutor,
        endpoints: Vec<EndpointConfig>,
        ledger_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            gate,
            connections,
            catalog,
            executor,
            endpoints,
            ledger_path: ledger_path.into(),
        }
    }

    #[instrument(skip(self))]
    pub fn run(&self, date: NaiveDate) -> RunOutcome {
        info!("{}", "=".repeat(50));
        info!("Starting Exchange Data Download Process");
        info!("{}", "=".repeat(50));

        let decision = self.gate.evaluate(date);
        if let Some(reason) = decision.skip_reason() {
            info!(reason = %reason, "Not a business day. Exiting without processing.");
            return self.finish(RunOutcome::terminal(
                RunStatus::SkippedNonBusinessDay { reason },
                None,
            ));
        }

        let mut ledger = Ledger::load(&self.ledger_path);

        let ActiveSession {
            endpoint,
            mut session,
        } = match self.connections.connect(&self.endpoints) {
            Ok(active) => active,
            Err(e) => {
                for (name, cause) in &e.attempts {
                    error!(endpoint = %name, error = %cause, "Endpoint unavailable");
                }
                error!(error = %e, "Could not connect to any server. Exiting.");
                return self.finish(RunOutcome::terminal(RunStatus::NoEndpointAvailable, None));
            }
        };

        let outcome = self.process(session.as_mut(), endpoint, &mut ledger);

        if let Err(e) = session.close() {
            warn!(error = %e, endpoint = %endpoint.name, "Failed to close SFTP session");
        }

        self.finish(outcome)
    }

    /// Listing and fetch phases against a connected endpoint
    fn process(
        &self,
        session: &mut dyn EndpointSession,
        endpoint: &EndpointConfig,
        ledger: &mut Ledger,
    ) -> RunOutcome {
        let endpoint_name = Some(endpoint.name.clone());

        let candidates = match self.catalog.list_candidates(session, &endpoint.remote_dir) {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, endpoint = %endpoint.name, operation = "list", "Error listing files");
                return RunOutcome::terminal(RunStatus::NoCandidates, endpoint_name);
            }
        };

        if candidates.is_empty() {
            warn!(
                endpoint = %endpoint.name,
                extension = %self.catalog.extension(),
                "No {} files found on server",
                self.catalog.extension()
            );
            return RunOutcome::terminal(RunStatus::NoCandidates, endpoint_name);
        }

        let total = candidates.len();
        let work: Vec<RemoteFileRef> = candidates
            .into_iter()
            .filter(|file| {
                let known = ledger.contains(&file.filename);
                if known {
                    info!(filename = %file.filename, "Skipping already processed file");
                }
                !known
            })
            .collect();
        let already_processed = total - work.len();

        let mut artifacts = Vec::with_capacity(work.len());
        let mut failed = 0;

        for (index, file) in work.iter().enumerate() {
            // The same name can be listed twice; the first success wins
            if ledger.contains(&file.filename) {
                info!(filename = %file.filename, "Skipping already processed file");
                continue;
            }

            info!(index = index, filename = %file.filename, "Processing {}...", file.filename);
            match self.executor.fetch(session, file) {
                Ok(artifact) => {
                    if let Err(e) = ledger.mark_processed(&file.filename) {
                        error!(
                            error = %e,
                            filename = %file.filename,
                            operation = "mark_processed",
                            "Error marking file as processed"
                        );
                    }
                    telemetry::record_file_fetched(&endpoint.name, artifact.size);
                    artifacts.push(artifact);
                }
                Err(e) => {
                    error!(
                        error = %e,
                        filename = %file.filename,
                        endpoint = %endpoint.name,
                        operation = "fetch",
                        "ERROR: Failed to download {}",
                        file.filename
                    );
                    telemetry::record_file_failed(&endpoint.name);
                    failed += 1;
                }
            }
        }

        let downloads = artifacts.len();
        let status = if failed > 0 {
            RunStatus::CompletedWithFailures {
                downloads,
                failures: failed,
            }
        } else {
            RunStatus::Completed { downloads }
        };

        RunOutcome {
            status,
            candidates: total,
            already_processed,
            fetched: downloads,
            failed,
            artifacts,
            endpoint: endpoint_name,
        }
    }

    /// Emit the run summary
    fn finish(&self, outcome: RunOutcome) -> RunOutcome {
        match outcome.status {
            RunStatus::Completed { .. } | RunStatus::CompletedWithFailures { .. } => {
                info!(
                    "COMPLETED: Download process finished. Downloaded {} new files of {} candidates.",
                    outcome.fetched, outcome.candidates
                );
                if outcome.fetched == 0 && outcome.failed == 0 {
                    info!("INFO: No new files to download (all files already processed)");
                } else if outcome.fetched > 0 {
                    info!("LOCATION: Files saved to: {}", self.executor.local_dir().display());
                }
            }
            _ => {}
        }

        info!(
            status = %outcome.status,
            endpoint = ?outcome.endpoint,
            candidates = outcome.candidates,
            already_processed = outcome.already_processed,
            fetched = outcome.fetched,
            failed = outcome.failed,
            "Run summary"
        );
        telemetry::record_run(outcome.status.as_str());
        outcome
    }
}
