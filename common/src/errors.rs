// Error handling framework
// Per-file and per-endpoint errors are recoverable; only NoEndpointAvailable ends a run early.

use thiserror::Error;

/// Holiday calendar lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("Holiday calendar '{calendar}' unavailable: {reason}")]
    CalendarUnavailable { calendar: String, reason: String },

    #[error("Malformed holiday entry '{entry}' in calendar '{calendar}': {reason}")]
    MalformedEntry {
        calendar: String,
        entry: String,
        reason: String,
    },
}

/// Single-endpoint connection errors; these trigger failover to the next endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Missing credentials for {endpoint} server")]
    MissingCredentials { endpoint: String },

    #[error("SFTP connection failed: {0}")]
    Connection(String),

    #[error("SSH handshake failed: {0}")]
    Handshake(String),

    #[error("Host key mismatch for {endpoint}: expected {expected}, got {actual}")]
    HostKeyMismatch {
        endpoint: String,
        expected: String,
        actual: String,
    },

    #[error("SFTP authentication failed: {0}")]
    Authentication(String),
}

/// Every configured endpoint failed to connect
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Could not connect to any server ({} attempted)", attempts.len())]
pub struct NoEndpointAvailable {
    /// Endpoint name paired with the failure it produced, in attempt order
    pub attempts: Vec<(String, ConnectError)>,
}

/// Failures raised by an open endpoint session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Failed to open SFTP channel: {0}")]
    Channel(String),

    #[error("Remote directory not accessible: {path}: {reason}")]
    Directory { path: String, reason: String },

    #[error("Remote file not found: {0}")]
    FileNotFound(String),

    #[error("Transfer failed for {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to close session: {0}")]
    Close(String),
}

/// Remote directory listing errors; the run continues in a "no candidates" state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Error listing files in {remote_dir} on {endpoint}: {source}")]
pub struct ListingError {
    pub endpoint: String,
    pub remote_dir: String,
    #[source]
    pub source: TransferError,
}

/// Per-file download errors; the file stays eligible for the next run
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to prepare local directory {path}: {source}")]
    LocalDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create local file {path} for {filename}: {source}")]
    LocalFile {
        filename: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error downloading {filename}: {source}")]
    Transfer {
        filename: String,
        #[source]
        source: TransferError,
    },

    #[error("File not found after download: {path}")]
    Missing { filename: String, path: String },

    #[error("Downloaded file is empty: {path}")]
    Empty { filename: String, path: String },

    #[error("Remote filename has no usable stem: {0}")]
    InvalidName(String),
}

impl FetchError {
    /// Remote filename the failure relates to, when known
    pub fn filename(&self) -> Option<&str> {
        match self {
            FetchError::LocalFile { filename, .. }
            | FetchError::Transfer { filename, .. }
            | FetchError::Missing { filename, .. }
            | FetchError::Empty { filename, .. } => Some(filename),
            FetchError::InvalidName(name) => Some(name),
            FetchError::LocalDirectory { .. } => None,
        }
    }
}

/// Ledger read/write errors; always logged, never fatal
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to read ledger {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to append to ledger {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Filename cannot be recorded in ledger: {0:?}")]
    InvalidEntry(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Missing required setting: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_endpoint_available_reports_attempt_count() {
        let err = NoEndpointAvailable {
            attempts: vec![
                ("primary".to_string(), ConnectError::Connection("refused".to_string())),
                (
                    "backup".to_string(),
                    ConnectError::MissingCredentials {
                        endpoint: "backup".to_string(),
                    },
                ),
            ],
        };
        assert!(err.to_string().contains("2 attempted"));
    }

    #[test]
    fn test_fetch_error_exposes_filename() {
        let err = FetchError::Empty {
            filename: "b.zip".to_string(),
            path: "/tmp/b_20240102_030405.zip".to_string(),
        };
        assert_eq!(err.filename(), Some("b.zip"));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_listing_error_keeps_endpoint_context() {
        let err = ListingError {
            endpoint: "backup".to_string(),
            remote_dir: "/outgoing".to_string(),
            source: TransferError::Directory {
                path: "/outgoing".to_string(),
                reason: "permission denied".to_string(),
            },
        };
        let text = err.to_string();
        assert!(text.contains("backup"));
        assert!(text.contains("/outgoing"));
    }
}
