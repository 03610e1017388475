// Processed-files ledger
//
// Append-only newline-delimited file of remote filenames that were fetched
// successfully. This module is the only code that touches the backing file.

use crate::errors::PersistenceError;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Ledger is the dedup authority for remote filenames
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: HashSet<String>,
}

impl Ledger {
    /// Load the ledger from `path`, creating an empty file when none exists.
    ///
    /// Never fails: a read error yields an empty ledger and a warning, since a
    /// redundant download is recoverable and a run that cannot start is not.
    #[instrument(skip_all, fields(ledger = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            if let Err(e) = create_empty(&path) {
                warn!(error = %e, path = %path.display(), "Failed to create ledger file");
            } else {
                info!(path = %path.display(), "Created empty ledger");
            }
            return Self {
                path,
                entries: HashSet::new(),
            };
        }

        match read_entries(&path) {
            Ok(entries) => {
                debug!(count = entries.len(), "Loaded processed files");
                Self { path, entries }
            }
            Err(e) => {
                warn!(error = %e, "Error loading processed files, starting with an empty ledger");
                Self {
                    path,
                    entries: HashSet::new(),
                }
            }
        }
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entries.contains(filename)
    }

    /// Record `filename` as processed, appending it to the backing file right away.
    ///
    /// The in-memory set is updated even when the name cannot be persisted, so
    /// the current run will not fetch the same name twice.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn mark_processed(&mut self, filename: &str) -> Result<(), PersistenceError> {
        if filename.is_empty() {
            return Err(PersistenceError::InvalidEntry(filename.to_string()));
        }

        self.entries.insert(filename.to_string());
        // A line break would split the entry into two names on reload
        if filename.contains(['\n', '\r']) {
            return Err(PersistenceError::InvalidEntry(filename.to_string()));
        }

        append_entry(&self.path, filename).map_err(|source| PersistenceError::Write {
            path: self.path.display().to_string(),
            source,
        })?;

        info!(filename = %filename, "Marked file as processed");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn create_empty(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}

fn read_entries(path: &Path) -> Result<HashSet<String>, PersistenceError> {
    let contents = fs::read_to_string(path).map_err(|source| PersistenceError::Read {
        path: path.display().to_string(),
        source,
    })?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn append_entry(path: &Path, filename: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(format!("{}\n", filename).as_bytes())?;
    file.flush()?;
    file.sync_data()
}
