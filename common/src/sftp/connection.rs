// SFTP connection establishment and authentication

use super::manager::Connector;
use super::{EndpointSession, SftpSession};
use crate::errors::ConnectError;
use crate::models::{EndpointAuth, EndpointConfig};
use ssh2::Session;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Opens authenticated SFTP sessions with bounded network timeouts
#[derive(Debug, Clone)]
pub struct SftpConnector {
    timeout: Duration,
}

impl SftpConnector {
    pub fn new(timeout_seconds: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    fn open_tcp(&self, endpoint: &EndpointConfig) -> Result<TcpStream, ConnectError> {
        let addrs = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|e| {
                ConnectError::Connection(format!(
                    "Failed to resolve {}:{}: {}",
                    endpoint.host, endpoint.port, e
                ))
            })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(tcp) => return Ok(tcp),
                Err(e) => last_error = Some(e),
            }
        }

        Err(ConnectError::Connection(format!(
            "Failed to connect to {}:{}: {}",
            endpoint.host,
            endpoint.port,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }
}

impl Connector for SftpConnector {
    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint.name, host = %endpoint.host, port = %endpoint.port))]
    fn connect(&self, endpoint: &EndpointConfig) -> Result<Box<dyn EndpointSession>, ConnectError> {
        if !endpoint.auth.is_complete() {
            return Err(ConnectError::MissingCredentials {
                endpoint: endpoint.name.clone(),
            });
        }

        info!("Connecting to {} server: {}", endpoint.name, endpoint.host);

        let tcp = self.open_tcp(endpoint)?;

        tcp.set_read_timeout(Some(self.timeout)).map_err(|e| {
            ConnectError::Connection(format!("Failed to set read timeout: {}", e))
        })?;
        tcp.set_write_timeout(Some(self.timeout)).map_err(|e| {
            ConnectError::Connection(format!("Failed to set write timeout: {}", e))
        })?;

        let mut sess = Session::new().map_err(|e| {
            ConnectError::Connection(format!("Failed to create SSH session: {}", e))
        })?;

        sess.set_tcp_stream(tcp.try_clone().map_err(|e| {
            ConnectError::Connection(format!("Failed to clone TCP stream: {}", e))
        })?);
        sess.set_timeout(u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX));

        sess.handshake().map_err(|e| {
            error!(error = %e, "SSH handshake failed");
            ConnectError::Handshake(e.to_string())
        })?;

        verify_host_key(&sess, endpoint)?;
        authenticate(&sess, &endpoint.auth)?;

        if !sess.authenticated() {
            return Err(ConnectError::Authentication(
                "session not authenticated".to_string(),
            ));
        }

        let sftp = sess.sftp().map_err(|e| {
            ConnectError::Connection(format!("Failed to open SFTP channel: {}", e))
        })?;

        info!("Successfully connected to {} server", endpoint.name);
        Ok(Box::new(SftpSession::new(&endpoint.name, sess, sftp, tcp)))
    }
}

/// Colon-separated lowercase hex, the form used for `host_key_sha256`
pub fn format_fingerprint(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn normalize_fingerprint(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Log the server's host key and compare it with the configured fingerprint
fn verify_host_key(sess: &Session, endpoint: &EndpointConfig) -> Result<(), ConnectError> {
    let key_type = sess.host_key().map(|(_, t)| t);
    let actual = sess
        .host_key_hash(ssh2::HashType::Sha256)
        .map(format_fingerprint);

    debug!(host_key_type = ?key_type, hash = ?actual, "Server host key");

    let Some(expected) = endpoint.host_key_sha256.as_deref() else {
        return Ok(());
    };

    let actual = actual.unwrap_or_default();
    if normalize_fingerprint(expected) != normalize_fingerprint(&actual) {
        error!(expected = %expected, actual = %actual, "Host key fingerprint mismatch");
        return Err(ConnectError::HostKeyMismatch {
            endpoint: endpoint.name.clone(),
            expected: expected.to_string(),
            actual,
        });
    }

    info!(hash = %actual, "Host key verified");
    Ok(())
}

fn authenticate(sess: &Session, auth: &EndpointAuth) -> Result<(), ConnectError> {
    match auth {
        EndpointAuth::Password { username, password } => {
            debug!(username = %username, "Authenticating with password");
            sess.userauth_password(username, password).map_err(|e| {
                ConnectError::Authentication(format!(
                    "Password authentication failed for user {}: {}",
                    username, e
                ))
            })
        }
        EndpointAuth::SshKey {
            username,
            private_key_path,
            passphrase,
        } => {
            debug!(username = %username, key_path = %private_key_path, "Authenticating with SSH key");
            sess.userauth_pubkey_file(
                username,
                None,
                Path::new(private_key_path),
                passphrase.as_deref(),
            )
            .map_err(|e| {
                ConnectError::Authentication(format!(
                    "SSH key authentication failed for user {}: {}",
                    username, e
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(auth: EndpointAuth) -> EndpointConfig {
        EndpointConfig {
            name: "primary".to_string(),
            host: "127.0.0.1".to_string(),
            port: 1,
            auth,
            remote_dir: "/outgoing".to_string(),
            host_key_sha256: None,
        }
    }

    #[test]
    fn test_missing_credentials_fail_before_network() {
        let connector = SftpConnector::new(1);
        let result = connector.connect(&endpoint(EndpointAuth::Password {
            username: "edi".to_string(),
            password: String::new(),
        }));
        assert!(matches!(
            result,
            Err(ConnectError::MissingCredentials { endpoint }) if endpoint == "primary"
        ));
    }

    #[test]
    fn test_fingerprint_formatting_and_normalization() {
        assert_eq!(format_fingerprint(&[0xab, 0x01, 0xff]), "ab:01:ff");
        assert_eq!(normalize_fingerprint("AB:01:FF"), normalize_fingerprint("ab01ff"));
    }
}
