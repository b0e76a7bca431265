mod common;

use std::time::Duration;

use chrono::{Local, TimeZone};
use common::{exit_one, sample_table, store_in, ScriptedQuery};
use meshlogger::metrics;
use meshlogger::poller::{PollSettings, PollState, Poller};
use meshlogger::position::{Position, SelfReportSource};
use meshlogger::storage::{HistoryLog, NodeStore, Timestamp};
use tokio_util::sync::CancellationToken;

fn settings() -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(10),
        startup_delay: Duration::ZERO,
        max_nodes: 50,
        dashboard: false,
    }
}

fn at(secs: i64) -> Timestamp {
    Local.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

#[tokio::test]
async fn heard_nodes_flow_into_both_files() {
    let dir = tempfile::tempdir().unwrap();
    let query = ScriptedQuery::new(vec![Ok(sample_table()), Ok(sample_table()), Err(exit_one())]);
    let mut poller = Poller::new(settings(), query, SelfReportSource::new(None), store_in(&dir));

    let first = poller.cycle(at(0)).await.unwrap();
    assert_eq!(first.parsed, 4);
    assert_eq!(first.admitted, 2);
    // Our own position comes from the previous listing, so none yet.
    assert!(!poller.position().has_fix());

    let second = poller.cycle(at(10)).await.unwrap();
    assert!(second.position_changed);
    assert_eq!(poller.position(), &Position::new(42.3601, -71.0589, Some(15.0)));

    // Third listing fails: nothing is admitted, nothing crashes.
    let err = poller.cycle(at(20)).await.unwrap_err();
    assert!(err.is_transient());

    let history = HistoryLog::read_rows(dir.path().join("log.csv")).unwrap();
    assert_eq!(history.len(), 4);
    assert!(history[..2].iter().all(|r| r.our_latitude.is_none()));
    assert!(history[2..].iter().all(|r| r.our_latitude == Some(42.3601)));
    assert_eq!(history[0].snr.as_deref(), Some("6.25"));
    assert_eq!(history[0].node_altitude.as_deref(), Some("120"));
    assert!(history.iter().all(|r| r.rssi.is_none()));

    let snapshot = HistoryLog::read_rows(dir.path().join("latest.csv")).unwrap();
    let ids: Vec<&str> = snapshot.iter().map(|r| r.node_id.as_str()).collect();
    assert_eq!(ids, vec!["!c0ffee01", "!deadbeef"]);
    assert!(snapshot.iter().all(|r| r.timestamp == "2025-06-01T12:00:10.000000"));
    assert_eq!(poller.store().tracked_count(), 2);
}

#[tokio::test]
async fn snapshot_honours_max_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let query = ScriptedQuery::new(vec![Ok(sample_table())]);
    let mut poller = Poller::new(
        PollSettings {
            max_nodes: 1,
            ..settings()
        },
        query,
        SelfReportSource::new(None),
        store_in(&dir),
    );
    let report = poller.cycle(at(0)).await.unwrap();
    assert_eq!(report.snapshot_rows, 1);
    assert_eq!(poller.store().tracked_count(), 2);
    let snapshot = HistoryLog::read_rows(dir.path().join("latest.csv")).unwrap();
    assert_eq!(snapshot.len(), 1);
}

#[tokio::test]
async fn loop_retries_after_failures_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let query = ScriptedQuery::new(vec![Err(exit_one()), Ok(sample_table())]);
    let mut poller = Poller::new(settings(), query, SelfReportSource::new(Some("baf0".into())), store_in(&dir));

    let cancel = CancellationToken::new();
    let stop = {
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        }
    };
    let (summary, _) = tokio::join!(poller.run(cancel), stop);

    assert!(summary.cycles >= 2);
    assert!(summary.failed_cycles >= 1);
    assert_eq!(summary.tracked, 2);
    assert_eq!(poller.state(), PollState::Stopped);
}

#[tokio::test]
async fn snapshot_failure_keeps_history_and_loop_running() {
    let dir = tempfile::tempdir().unwrap();
    let web = dir.path().join("web");
    let store = NodeStore::open(dir.path().join("log.csv"), web.join("latest.csv"), None).unwrap();
    // The snapshot directory turns into a plain file after startup.
    std::fs::remove_dir_all(&web).unwrap();
    std::fs::write(&web, b"not a directory").unwrap();

    let query = ScriptedQuery::new(vec![Ok(sample_table()), Ok(sample_table())]);
    let mut poller = Poller::new(settings(), query, SelfReportSource::new(None), store);
    let before = metrics::snapshot().persist_failures;

    let cancel = CancellationToken::new();
    let stop = {
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        }
    };
    let (summary, _) = tokio::join!(poller.run(cancel), stop);

    assert!(summary.cycles > 2);
    assert_eq!(summary.failed_cycles, summary.cycles);
    assert_eq!(summary.tracked, 2);
    assert!(metrics::snapshot().persist_failures >= before + 2);
    let history = HistoryLog::read_rows(dir.path().join("log.csv")).unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(poller.state(), PollState::Stopped);
}

#[cfg(unix)]
mod with_cli {
    use super::*;
    use meshlogger::meshtastic::MeshtasticCli;
    use std::os::unix::fs::PermissionsExt;

    fn fake_cli(dir: &tempfile::TempDir, body: &str) -> String {
        let path = dir.path().join("meshtastic");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn real_process_output_is_admitted() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = common::fixture_root().join("nodes_table.txt");
        let program = fake_cli(&dir, &format!("cat '{}'", fixture.display()));
        let cli = MeshtasticCli::new(program, None, Duration::from_secs(5));
        let mut poller = Poller::new(settings(), cli, SelfReportSource::new(None), store_in(&dir));
        let report = poller.cycle(at(0)).await.unwrap();
        assert_eq!(report.admitted, 2);
    }

    #[tokio::test]
    async fn exit_code_one_skips_admission() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_cli(&dir, "echo 'No device' >&2; exit 1");
        let cli = MeshtasticCli::new(program, None, Duration::from_secs(5));
        let mut poller = Poller::new(settings(), cli, SelfReportSource::new(None), store_in(&dir));
        assert!(poller.cycle(at(0)).await.is_err());
        assert_eq!(poller.store().tracked_count(), 0);
        assert!(HistoryLog::read_rows(dir.path().join("log.csv")).unwrap().is_empty());
    }
}
