// Property-based tests for single-file downloads and endpoint failover

mod support;

use common::errors::{ConnectError, FetchError};
use common::fetch::{timestamped_filename, FetchExecutor};
use common::models::RemoteFileRef;
use common::sftp::ConnectionManager;
use mockall::Sequence;
use proptest::prelude::*;
use std::fs;
use support::{endpoint, frozen_clock, FakeRemote, MockConnector};
use tempfile::TempDir;

fn remote_ref(name: &str) -> RemoteFileRef {
    RemoteFileRef::new("primary", "/outgoing", name)
}

// ============================================================================
// FetchExecutor
// ============================================================================

#[test]
fn test_repeated_fetch_of_same_name_never_collides() {
    let dir = TempDir::new().unwrap();
    let remote = FakeRemote::with_files(&[("options.zip", &b"PK\x03\x04"[..])]);
    let mut session = remote.session("primary");
    let executor = FetchExecutor::new(dir.path(), frozen_clock());

    let first = executor.fetch(session.as_mut(), &remote_ref("options.zip")).unwrap();
    let second = executor.fetch(session.as_mut(), &remote_ref("options.zip")).unwrap();

    assert_eq!(first.local_filename, "options_20240610_093000.zip");
    assert_eq!(second.local_filename, "options_20240610_093001.zip");
    assert_ne!(first.local_path, second.local_path);
    assert!(first.local_path.exists());
    assert!(second.local_path.exists());
}

#[test]
fn test_fetch_creates_local_directory() {
    let dir = TempDir::new().unwrap();
    let local_dir = dir.path().join("Options_Pulls").join("2024");
    let remote = FakeRemote::with_files(&[("a.zip", &b"data"[..])]);
    let mut session = remote.session("primary");

    let artifact = FetchExecutor::new(&local_dir, frozen_clock())
        .fetch(session.as_mut(), &remote_ref("a.zip"))
        .unwrap();

    assert!(local_dir.is_dir());
    assert_eq!(artifact.size, 4);
    assert!(artifact.success);
    assert_eq!(artifact.remote_filename, "a.zip");
}

#[test]
fn test_transfer_error_leaves_no_partial_file() {
    let dir = TempDir::new().unwrap();
    let remote = FakeRemote::with_files(&[("a.zip", &b"data"[..])]);
    remote.break_file("a.zip");
    let mut session = remote.session("primary");

    let result = FetchExecutor::new(dir.path(), frozen_clock())
        .fetch(session.as_mut(), &remote_ref("a.zip"));

    match result {
        Err(e @ FetchError::Transfer { .. }) => {
            assert_eq!(e.filename(), Some("a.zip"));
            assert!(e.to_string().contains("a.zip"));
        }
        other => panic!("expected transfer error, got {:?}", other),
    }
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_zero_byte_transfer_is_rejected() {
    let dir = TempDir::new().unwrap();
    let remote = FakeRemote::with_files(&[("empty.zip", &b""[..])]);
    let mut session = remote.session("primary");

    let result = FetchExecutor::new(dir.path(), frozen_clock())
        .fetch(session.as_mut(), &remote_ref("empty.zip"));

    assert!(matches!(result, Err(FetchError::Empty { .. })));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_missing_remote_file_is_a_fetch_error() {
    let dir = TempDir::new().unwrap();
    let remote = FakeRemote::default();
    let mut session = remote.session("primary");

    let result = FetchExecutor::new(dir.path(), frozen_clock())
        .fetch(session.as_mut(), &remote_ref("gone.zip"));

    assert!(matches!(result, Err(FetchError::Transfer { .. })));
}

/// *For any* payload, the local artifact holds exactly the remote bytes.
#[test]
fn property_transfer_is_byte_for_byte() {
    proptest!(ProptestConfig::with_cases(32), |(
        payload in prop::collection::vec(any::<u8>(), 1..4096)
    )| {
        let dir = TempDir::new().unwrap();
        let remote = FakeRemote::with_files(&[("blob.zip", &payload[..])]);
        let mut session = remote.session("primary");

        let artifact = FetchExecutor::new(dir.path(), frozen_clock())
            .fetch(session.as_mut(), &remote_ref("blob.zip"))
            .unwrap();

        prop_assert_eq!(artifact.size, payload.len() as u64);
        prop_assert_eq!(fs::read(&artifact.local_path).unwrap(), payload);
    });
}

/// *For any* stem and extension, the local name is `{stem}_{YYYYMMDD_HHMMSS}{ext}`.
#[test]
fn property_local_name_layout() {
    proptest!(|(
        stem in "[A-Za-z0-9_-]{1,20}",
        ext in prop_oneof![Just(".zip"), Just(".csv"), Just("")]
    )| {
        let clock_time = chrono::NaiveDate::from_ymd_opt(2025, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 58)
            .unwrap();
        let name = timestamped_filename(&format!("{}{}", stem, ext), clock_time).unwrap();
        prop_assert_eq!(name, format!("{}_20251231_235958{}", stem, ext));
    });
}

// ============================================================================
// ConnectionManager
// ============================================================================

#[test]
fn test_first_successful_endpoint_wins() {
    let remote = FakeRemote::default();
    let mut connector = MockConnector::new();
    connector
        .expect_connect()
        .withf(|e| e.name == "primary")
        .times(1)
        .returning(move |e| Ok(remote.session(&e.name)));
    connector
        .expect_connect()
        .withf(|e| e.name == "backup")
        .times(0);

    let endpoints = vec![endpoint("primary", "/a"), endpoint("backup", "/b")];
    let active = ConnectionManager::new(Box::new(connector))
        .connect(&endpoints)
        .ok()
        .unwrap();

    assert_eq!(active.endpoint.name, "primary");
    assert_eq!(active.session.endpoint(), "primary");
}

#[test]
fn test_exhausted_endpoints_report_every_attempt_in_order() {
    let mut seq = Sequence::new();
    let mut connector = MockConnector::new();
    connector
        .expect_connect()
        .withf(|e| e.name == "primary")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(ConnectError::Handshake("timed out".to_string())));
    connector
        .expect_connect()
        .withf(|e| e.name == "backup")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|e| {
            Err(ConnectError::MissingCredentials {
                endpoint: e.name.clone(),
            })
        });

    let endpoints = vec![endpoint("primary", "/a"), endpoint("backup", "/b")];
    let err = ConnectionManager::new(Box::new(connector))
        .connect(&endpoints)
        .err()
        .unwrap();

    let names: Vec<&str> = err.attempts.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["primary", "backup"]);
    assert!(matches!(err.attempts[1].1, ConnectError::MissingCredentials { .. }));
}

#[test]
fn test_empty_endpoint_list_is_no_endpoint() {
    let connector = MockConnector::new();
    let result = ConnectionManager::new(Box::new(connector)).connect(&[]);
    assert!(matches!(result, Err(e) if e.attempts.is_empty()));
}
