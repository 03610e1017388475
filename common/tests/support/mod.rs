// Shared test doubles for the remote side of a run
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use common::errors::{ConnectError, TransferError};
use common::fetch::Clock;
use common::models::{EndpointAuth, EndpointConfig};
use common::sftp::{Connector, EndpointSession};
use mockall::mock;
use std::collections::HashSet;
use std::io::Write;
use std::sync::{Arc, Mutex};

// ============================================================================
// Fake remote endpoint
// ============================================================================

/// Directory contents and call log of one fake SFTP server
#[derive(Debug, Default)]
pub struct RemoteState {
    pub files: Vec<(String, Vec<u8>)>,
    pub unreadable_dir: bool,
    pub broken: HashSet<String>,
    pub calls: Vec<String>,
    pub closed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    pub fn with_files(files: &[(&str, &[u8])]) -> Self {
        let remote = Self::default();
        remote.state.lock().unwrap().files = files
            .iter()
            .map(|(name, data)| (name.to_string(), data.to_vec()))
            .collect();
        remote
    }

    pub fn break_file(&self, name: &str) {
        self.state.lock().unwrap().broken.insert(name.to_string());
    }

    pub fn make_unreadable(&self) {
        self.state.lock().unwrap().unreadable_dir = true;
    }

    pub fn session(&self, endpoint: &str) -> Box<dyn EndpointSession> {
        Box::new(FakeSession {
            endpoint: endpoint.to_string(),
            state: self.state.clone(),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("get ").map(str::to_string))
            .collect()
    }

    pub fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }
}

pub struct FakeSession {
    endpoint: String,
    state: Arc<Mutex<RemoteState>>,
}

impl EndpointSession for FakeSession {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn change_dir(&mut self, remote_dir: &str) -> Result<(), TransferError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("cd {}", remote_dir));
        if state.unreadable_dir {
            return Err(TransferError::Directory {
                path: remote_dir.to_string(),
                reason: "permission denied".to_string(),
            });
        }
        Ok(())
    }

    fn list_dir(&mut self) -> Result<Vec<String>, TransferError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("ls".to_string());
        Ok(state.files.iter().map(|(name, _)| name.clone()).collect())
    }

    fn fetch(&mut self, remote_path: &str, sink: &mut dyn Write) -> Result<u64, TransferError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("get {}", remote_path));

        let name = remote_path.rsplit('/').next().unwrap_or(remote_path);
        if state.broken.contains(name) {
            return Err(TransferError::Io {
                path: remote_path.to_string(),
                reason: "connection reset".to_string(),
            });
        }
        let data = state
            .files
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.clone())
            .ok_or_else(|| TransferError::FileNotFound(remote_path.to_string()))?;

        sink.write_all(&data).map_err(|e| TransferError::Io {
            path: remote_path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(data.len() as u64)
    }

    fn close(&mut self) -> Result<(), TransferError> {
        self.state.lock().unwrap().closed += 1;
        Ok(())
    }
}

// ============================================================================
// Mock connector
// ============================================================================

mock! {
    pub Connector {}

    impl Connector for Connector {
        fn connect(&self, endpoint: &EndpointConfig) -> Result<Box<dyn EndpointSession>, ConnectError>;
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Clock frozen at a fixed instant
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

pub fn frozen_clock() -> Box<dyn Clock> {
    Box::new(FixedClock(
        NaiveDate::from_ymd_opt(2024, 6, 10)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap(),
    ))
}

pub fn endpoint(name: &str, remote_dir: &str) -> EndpointConfig {
    EndpointConfig {
        name: name.to_string(),
        host: format!("{}.sftp.example.com", name),
        port: 22,
        auth: EndpointAuth::Password {
            username: "edi".to_string(),
            password: "secret".to_string(),
        },
        remote_dir: remote_dir.to_string(),
        host_key_sha256: None,
    }
}

/// Monday 2024-06-10, a regular trading day
pub fn business_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}
