// Single-file download to local storage

use crate::errors::{FetchError, TransferError};
use crate::models::{DownloadedArtifact, RemoteFileRef};
use crate::sftp::EndpointSession;
use chrono::{Duration, Local, NaiveDateTime};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

/// Timestamp layout embedded in local filenames
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Upper bound on one-second bumps when a timestamped name is already taken
const MAX_NAME_ATTEMPTS: u32 = 3600;

/// Clock supplies the capture timestamp for local filenames
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// `{stem}_{YYYYMMDD_HHMMSS}{ext}`
pub fn timestamped_filename(filename: &str, captured_at: NaiveDateTime) -> Option<String> {
    let path = Path::new(filename);
    let stem = path.file_stem()?.to_str()?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    Some(format!(
        "{}_{}{}",
        stem,
        captured_at.format(TIMESTAMP_FORMAT),
        extension
    ))
}

/// FetchExecutor downloads one candidate under a collision-free local name
pub struct FetchExecutor {
    local_dir: PathBuf,
    clock: Box<dyn Clock>,
}

impl FetchExecutor {
    pub fn new(local_dir: impl Into<PathBuf>, clock: Box<dyn Clock>) -> Self {
        Self {
            local_dir: local_dir.into(),
            clock,
        }
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Download `file` byte-for-byte and verify a non-empty artifact landed on disk.
    ///
    /// On failure any partial local file is removed and the error names the
    /// remote file; nothing is retried.
    #[instrument(skip(self, session), fields(endpoint = %file.endpoint, filename = %file.filename))]
    pub fn fetch(
        &self,
        session: &mut dyn EndpointSession,
        file: &RemoteFileRef,
    ) -> Result<DownloadedArtifact, FetchError> {
        fs::create_dir_all(&self.local_dir).map_err(|source| FetchError::LocalDirectory {
            path: self.local_dir.display().to_string(),
            source,
        })?;

        let (local_filename, local_path, local_file) = self.create_local_file(&file.filename)?;

        info!(
            "Downloading file: {} -> {}",
            file.filename, local_filename
        );

        if let Err(e) = transfer(session, file, local_file) {
            discard(&local_path);
            return Err(e);
        }

        let size = match verify(&file.filename, &local_path) {
            Ok(size) => size,
            Err(e) => {
                discard(&local_path);
                return Err(e);
            }
        };

        let artifact = DownloadedArtifact {
            remote_filename: file.filename.clone(),
            local_filename,
            local_path,
            size,
            success: true,
        };
        info!(
            size = artifact.size,
            "SUCCESS: Downloaded {} ({:.2} MB)",
            artifact.local_filename,
            artifact.size_mb()
        );
        Ok(artifact)
    }

    /// Create the local file with create-new semantics, bumping the timestamp
    /// one second at a time while the name is taken
    fn create_local_file(&self, filename: &str) -> Result<(String, PathBuf, File), FetchError> {
        let name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| FetchError::InvalidName(filename.to_string()))?;

        let mut captured_at = self.clock.now();
        for _ in 0..MAX_NAME_ATTEMPTS {
            let local_filename = timestamped_filename(name, captured_at)
                .ok_or_else(|| FetchError::InvalidName(filename.to_string()))?;
            let local_path = self.local_dir.join(&local_filename);

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&local_path)
            {
                Ok(handle) => return Ok((local_filename, local_path, handle)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %local_path.display(), "Local name taken, advancing timestamp");
                    captured_at += Duration::seconds(1);
                }
                Err(source) => {
                    return Err(FetchError::LocalFile {
                        filename: filename.to_string(),
                        path: local_path.display().to_string(),
                        source,
                    })
                }
            }
        }

        Err(FetchError::LocalFile {
            filename: filename.to_string(),
            path: self.local_dir.display().to_string(),
            source: std::io::Error::new(
                ErrorKind::AlreadyExists,
                "no free timestamped name available",
            ),
        })
    }
}

fn transfer(
    session: &mut dyn EndpointSession,
    file: &RemoteFileRef,
    local_file: File,
) -> Result<(), FetchError> {
    let transfer_error = |source| FetchError::Transfer {
        filename: file.filename.clone(),
        source,
    };

    let mut writer = BufWriter::new(local_file);
    let bytes = session
        .fetch(&file.remote_path, &mut writer)
        .map_err(transfer_error)?;

    let io_error = |e: std::io::Error| {
        transfer_error(TransferError::Io {
            path: file.remote_path.clone(),
            reason: e.to_string(),
        })
    };
    writer.flush().map_err(io_error)?;
    let local_file = writer.into_inner().map_err(|e| io_error(e.into_error()))?;
    local_file.sync_all().map_err(io_error)?;

    debug!(bytes = bytes, "Transfer finished");
    Ok(())
}

/// The transfer call succeeding is not enough; the artifact must exist and be non-empty
fn verify(filename: &str, local_path: &Path) -> Result<u64, FetchError> {
    match fs::metadata(local_path) {
        Ok(meta) if meta.len() > 0 => Ok(meta.len()),
        Ok(_) => {
            error!(path = %local_path.display(), "ERROR: Downloaded file is empty");
            Err(FetchError::Empty {
                filename: filename.to_string(),
                path: local_path.display().to_string(),
            })
        }
        Err(_) => {
            error!(path = %local_path.display(), "ERROR: File not found after download");
            Err(FetchError::Missing {
                filename: filename.to_string(),
                path: local_path.display().to_string(),
            })
        }
    }
}

fn discard(local_path: &Path) {
    match fs::remove_file(local_path) {
        Ok(()) => debug!(path = %local_path.display(), "Removed incomplete download"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, path = %local_path.display(), "Failed to remove incomplete download"),
    }
}
