// SFTP endpoint module
// EndpointSession is the transfer capability the rest of the crate depends on;
// the ssh2-backed implementation lives in session.rs and connection.rs.

mod connection;
mod manager;
mod session;

pub use connection::{format_fingerprint, SftpConnector};
pub use manager::{ActiveSession, ConnectionManager, Connector};
pub use session::SftpSession;

use crate::errors::TransferError;
use std::io::Write;

/// An open, authenticated handle to one remote endpoint.
///
/// Owned by the caller for the duration of a run and released with `close`.
/// Implementations are used from one thread at a time.
pub trait EndpointSession {
    /// Name of the endpoint this session is bound to
    fn endpoint(&self) -> &str;

    /// Change the working directory used by `list_dir`
    fn change_dir(&mut self, remote_dir: &str) -> Result<(), TransferError>;

    /// Entry names in the working directory
    fn list_dir(&mut self) -> Result<Vec<String>, TransferError>;

    /// Stream the file at `remote_path` into `sink`, returning the bytes copied
    fn fetch(&mut self, remote_path: &str, sink: &mut dyn Write) -> Result<u64, TransferError>;

    /// Release the underlying transport
    fn close(&mut self) -> Result<(), TransferError>;
}
