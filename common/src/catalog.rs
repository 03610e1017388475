// Remote listing and extension filtering

use crate::errors::ListingError;
use crate::models::RemoteFileRef;
use crate::sftp::EndpointSession;
use tracing::{info, instrument};

pub const DEFAULT_EXTENSION: &str = ".zip";

/// RemoteCatalog lists a remote directory and keeps files with the expected suffix
#[derive(Debug, Clone)]
pub struct RemoteCatalog {
    extension: String,
}

impl Default for RemoteCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION)
    }
}

impl RemoteCatalog {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Exact, case-sensitive suffix match
    pub fn matches(&self, filename: &str) -> bool {
        filename.ends_with(&self.extension)
    }

    /// Candidates in `remote_dir`, in server listing order.
    ///
    /// No matching entries is an empty list, not an error.
    #[instrument(skip(self, session), fields(endpoint = %session.endpoint(), extension = %self.extension))]
    pub fn list_candidates(
        &self,
        session: &mut dyn EndpointSession,
        remote_dir: &str,
    ) -> Result<Vec<RemoteFileRef>, ListingError> {
        let endpoint = session.endpoint().to_string();
        let listing_error = |source| ListingError {
            endpoint: endpoint.clone(),
            remote_dir: remote_dir.to_string(),
            source,
        };

        session.change_dir(remote_dir).map_err(listing_error)?;
        let entries = session.list_dir().map_err(listing_error)?;

        let candidates: Vec<RemoteFileRef> = entries
            .iter()
            .filter(|name| self.matches(name))
            .map(|name| RemoteFileRef::new(&endpoint, remote_dir, name))
            .collect();

        info!(
            count = candidates.len(),
            "Found {} {} files on server",
            candidates.len(),
            self.extension
        );
        for candidate in &candidates {
            info!(filename = %candidate.filename, "Available file");
        }

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_match_is_case_sensitive() {
        let catalog = RemoteCatalog::default();
        assert!(catalog.matches("a.zip"));
        assert!(!catalog.matches("a.ZIP"));
        assert!(!catalog.matches("a.zip.part"));
        assert!(!catalog.matches("c.txt"));
    }

    #[test]
    fn test_custom_extension() {
        let catalog = RemoteCatalog::new(".csv.gz");
        assert!(catalog.matches("options_20240102.csv.gz"));
        assert!(!catalog.matches("options_20240102.csv"));
        assert_eq!(catalog.extension(), ".csv.gz");
    }
}
