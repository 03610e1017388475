// ssh2-backed endpoint session

use super::EndpointSession;
use crate::errors::TransferError;
use ssh2::{Session, Sftp};
use std::io::Write;
use std::net::TcpStream;
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};

/// SFTP session wrapper bound to one endpoint
pub struct SftpSession {
    endpoint: String,
    session: Session,
    sftp: Option<Sftp>,
    working_dir: String,
    _tcp: TcpStream,
}

impl SftpSession {
    pub(crate) fn new(endpoint: &str, session: Session, sftp: Sftp, tcp: TcpStream) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            session,
            sftp: Some(sftp),
            working_dir: ".".to_string(),
            _tcp: tcp,
        }
    }

    fn sftp(&self) -> Result<&Sftp, TransferError> {
        self.sftp
            .as_ref()
            .ok_or_else(|| TransferError::Channel("session already closed".to_string()))
    }

    fn disconnect(&mut self) -> Result<(), TransferError> {
        // Drop the channel before tearing down the session it belongs to
        if self.sftp.take().is_none() {
            return Ok(());
        }
        self.session
            .disconnect(None, "run complete", None)
            .map_err(|e| TransferError::Close(e.to_string()))
    }
}

impl EndpointSession for SftpSession {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    fn change_dir(&mut self, remote_dir: &str) -> Result<(), TransferError> {
        let stat = self.sftp()?.stat(Path::new(remote_dir)).map_err(|e| {
            error!(error = %e, remote_dir = %remote_dir, "Remote directory not accessible");
            TransferError::Directory {
                path: remote_dir.to_string(),
                reason: e.to_string(),
            }
        })?;

        if !stat.is_dir() {
            return Err(TransferError::Directory {
                path: remote_dir.to_string(),
                reason: "not a directory".to_string(),
            });
        }

        debug!(remote_dir = %remote_dir, "Changed remote working directory");
        self.working_dir = remote_dir.to_string();
        Ok(())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint, remote_dir = %self.working_dir))]
    fn list_dir(&mut self) -> Result<Vec<String>, TransferError> {
        let entries = self
            .sftp()?
            .readdir(Path::new(&self.working_dir))
            .map_err(|e| TransferError::Directory {
                path: self.working_dir.clone(),
                reason: e.to_string(),
            })?;

        Ok(entries
            .into_iter()
            .filter_map(|(path, _stat)| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|s| s.to_string())
            })
            .collect())
    }

    #[instrument(skip(self, sink), fields(endpoint = %self.endpoint))]
    fn fetch(&mut self, remote_path: &str, sink: &mut dyn Write) -> Result<u64, TransferError> {
        let mut remote_file = self.sftp()?.open(Path::new(remote_path)).map_err(|e| {
            error!(error = %e, remote_path = %remote_path, "Failed to open remote file");
            TransferError::FileNotFound(format!("{}: {}", remote_path, e))
        })?;

        let bytes = std::io::copy(&mut remote_file, sink).map_err(|e| TransferError::Io {
            path: remote_path.to_string(),
            reason: e.to_string(),
        })?;

        debug!(remote_path = %remote_path, bytes = bytes, "Remote file streamed");
        Ok(bytes)
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    fn close(&mut self) -> Result<(), TransferError> {
        self.disconnect()?;
        info!("SFTP connections closed");
        Ok(())
    }
}

impl Drop for SftpSession {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!(error = %e, endpoint = %self.endpoint, "Failed to close SFTP session on drop");
        }
    }
}
