use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Endpoint Models
// ============================================================================

/// EndpointAuth represents SFTP authentication methods
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointAuth {
    Password {
        username: String,
        password: String,
    },
    SshKey {
        username: String,
        private_key_path: String,
        passphrase: Option<String>,
    },
}

impl EndpointAuth {
    pub fn username(&self) -> &str {
        match self {
            EndpointAuth::Password { username, .. } | EndpointAuth::SshKey { username, .. } => {
                username
            }
        }
    }

    /// True when a username and a secret (password or key path) are both present
    pub fn is_complete(&self) -> bool {
        match self {
            EndpointAuth::Password { username, password } => {
                !username.is_empty() && !password.is_empty()
            }
            EndpointAuth::SshKey {
                username,
                private_key_path,
                ..
            } => !username.is_empty() && !private_key_path.is_empty(),
        }
    }
}

// Secrets never reach the logs
impl fmt::Debug for EndpointAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointAuth::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            EndpointAuth::SshKey {
                username,
                private_key_path,
                ..
            } => f
                .debug_struct("SshKey")
                .field("username", username)
                .field("private_key_path", private_key_path)
                .finish(),
        }
    }
}

/// EndpointConfig is one configured remote SFTP location.
/// The order of a list of configs is the failover priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Identifier used in logs, e.g. "primary" or "backup"
    pub name: String,
    pub host: String,
    pub port: u16,
    pub auth: EndpointAuth,
    pub remote_dir: String,
    /// Expected SHA-256 host key fingerprint (hex, colon separated)
    #[serde(default)]
    pub host_key_sha256: Option<String>,
}

// ============================================================================
// Run Models
// ============================================================================

/// RemoteFileRef is a candidate file discovered on an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileRef {
    pub filename: String,
    pub remote_path: String,
    pub endpoint: String,
}

impl RemoteFileRef {
    pub fn new(endpoint: &str, remote_dir: &str, filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            remote_path: join_remote_path(remote_dir, filename),
            endpoint: endpoint.to_string(),
        }
    }
}

/// Join a remote directory and filename with exactly one `/`
pub fn join_remote_path(remote_dir: &str, filename: &str) -> String {
    let dir = remote_dir.trim_end_matches('/');
    if dir.is_empty() && remote_dir.starts_with('/') {
        format!("/{}", filename)
    } else if dir.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", dir, filename)
    }
}

/// DownloadedArtifact describes a file written to local storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedArtifact {
    pub remote_filename: String,
    pub local_filename: String,
    pub local_path: PathBuf,
    pub size: u64,
    pub success: bool,
}

impl DownloadedArtifact {
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }
}
