//! # Storage Module - Node State Store
//!
//! [`NodeStore`] keeps the latest known state of every node heard with a usable
//! link and drives the two files built from it:
//!
//! ```text
//! log.csv     ← history: one row per admitted observation, append-only
//! latest.csv  ← snapshot: one row per node, most recently seen first, rewritten
//!               every cycle and capped at `max_nodes`
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshlogger::meshtastic::parse_node_table;
//! use meshlogger::position::Position;
//! use meshlogger::storage::NodeStore;
//!
//! # fn main() -> meshlogger::error::Result<()> {
//! let mut store = NodeStore::open("log.csv", "latest.csv", None)?;
//! let nodes = parse_node_table("│ 1 │ ... │");
//! let here = Position::default();
//! store.admit(&nodes, chrono::Local::now(), &here)?;
//! store.write_snapshot(50, &here)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Admission
//!
//! Only observations with an SNR value are admitted. The device keeps listing
//! nodes long after it last heard them; a reading with a signal report is what
//! marks "heard just now". Admitting a node appends its history row first and
//! updates memory second, so every tracked node has at least one history row.
//!
//! ## Ordering
//!
//! Records are indexed by `(last_seen, first-insertion order)`. Snapshot order is
//! newest first; nodes seen in the same cycle keep the order they were first
//! discovered in.

pub mod history;
pub mod snapshot;

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Local};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::StorageConfig;
use crate::error::Result;
use crate::meshtastic::{clean_value, NodeId, NodeObservation};
use crate::position::Position;

pub use history::HistoryLog;
pub use snapshot::SnapshotFile;

/// Wall-clock time of an admission.
pub type Timestamp = DateTime<Local>;

/// Column names shared by the history log and the snapshot.
pub const COLUMNS: [&str; 13] = [
    "timestamp",
    "node_id",
    "short_name",
    "long_name",
    "node_latitude",
    "node_longitude",
    "node_altitude",
    "rssi",
    "snr",
    "hw_model",
    "our_latitude",
    "our_longitude",
    "our_altitude",
];

/// ISO-8601 local time with microseconds, e.g. `2025-06-01T14:03:22.120331`.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// One CSV row of either file. Numeric node fields have their units stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    pub timestamp: String,
    pub node_id: String,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub node_latitude: Option<String>,
    pub node_longitude: Option<String>,
    pub node_altitude: Option<String>,
    pub rssi: Option<String>,
    pub snr: Option<String>,
    pub hw_model: Option<String>,
    pub our_latitude: Option<f64>,
    pub our_longitude: Option<f64>,
    pub our_altitude: Option<f64>,
}

fn cleaned(v: &Option<String>) -> Option<String> {
    v.as_deref().map(clean_value)
}

impl NodeRow {
    pub fn from_observation(obs: &NodeObservation, at: &Timestamp, ours: &Position) -> Self {
        NodeRow {
            timestamp: format_timestamp(at),
            node_id: obs.id.to_string(),
            short_name: obs.short_name.clone(),
            long_name: obs.long_name.clone(),
            node_latitude: cleaned(&obs.latitude),
            node_longitude: cleaned(&obs.longitude),
            node_altitude: cleaned(&obs.altitude),
            rssi: obs.rssi.clone(),
            snr: cleaned(&obs.snr),
            hw_model: obs.hw_model.clone(),
            our_latitude: ours.latitude,
            our_longitude: ours.longitude,
            our_altitude: ours.altitude,
        }
    }

    pub fn from_record(rec: &SeenNodeRecord, ours: &Position) -> Self {
        NodeRow {
            timestamp: format_timestamp(&rec.last_seen),
            node_id: rec.id.to_string(),
            short_name: rec.short_name.clone(),
            long_name: rec.long_name.clone(),
            node_latitude: cleaned(&rec.latitude),
            node_longitude: cleaned(&rec.longitude),
            node_altitude: cleaned(&rec.altitude),
            rssi: None,
            snr: cleaned(&rec.snr),
            hw_model: rec.hw_model.clone(),
            our_latitude: ours.latitude,
            our_longitude: ours.longitude,
            our_altitude: ours.altitude,
        }
    }
}

/// Latest state of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct SeenNodeRecord {
    pub id: NodeId,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub hw_model: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub altitude: Option<String>,
    pub snr: Option<String>,
    pub last_heard: Option<String>,
    pub last_seen: Timestamp,
    /// First-insertion order, kept across updates.
    seq: u64,
}

impl SeenNodeRecord {
    fn from_observation(obs: &NodeObservation, now: Timestamp, seq: u64) -> Self {
        SeenNodeRecord {
            id: obs.id.clone(),
            long_name: obs.long_name.clone(),
            short_name: obs.short_name.clone(),
            hw_model: obs.hw_model.clone(),
            latitude: obs.latitude.clone(),
            longitude: obs.longitude.clone(),
            altitude: obs.altitude.clone(),
            snr: obs.snr.clone(),
            last_heard: obs.last_heard.clone(),
            last_seen: now,
            seq,
        }
    }

    fn recency_key(&self) -> (Timestamp, Reverse<u64>) {
        (self.last_seen, Reverse(self.seq))
    }
}

pub struct NodeStore {
    records: HashMap<NodeId, SeenNodeRecord>,
    /// Ascending iteration = least recently seen first.
    recency: BTreeMap<(Timestamp, Reverse<u64>), NodeId>,
    next_seq: u64,
    memory_cap: Option<usize>,
    history: HistoryLog,
    snapshot: SnapshotFile,
}

impl NodeStore {
    /// Open the history log (creating it with a header if needed) and reset the
    /// snapshot to an empty table.
    pub fn open(
        history_path: impl AsRef<Path>,
        snapshot_path: impl AsRef<Path>,
        memory_cap: Option<usize>,
    ) -> Result<Self> {
        let history = HistoryLog::open(history_path)?;
        let snapshot = SnapshotFile::new(snapshot_path);
        snapshot.write(&[])?;
        info!(
            "Node store ready: history={} snapshot={} memory_cap={}",
            history.path().display(),
            snapshot.path().display(),
            memory_cap.map_or_else(|| "unbounded".to_string(), |n| n.to_string())
        );
        Ok(NodeStore {
            records: HashMap::new(),
            recency: BTreeMap::new(),
            next_seq: 0,
            memory_cap,
            history,
            snapshot,
        })
    }

    pub fn from_config(cfg: &StorageConfig) -> Result<Self> {
        Self::open(&cfg.history_file, &cfg.snapshot_file, cfg.memory_cap())
    }

    /// Admit every observation carrying an SNR: append its history row, then
    /// upsert its record with `last_seen = now`. Returns the number admitted.
    ///
    /// An IO error stops the batch; rows appended before it stay admitted.
    pub fn admit(
        &mut self,
        observations: &[NodeObservation],
        now: Timestamp,
        ours: &Position,
    ) -> Result<usize> {
        let mut admitted = 0;
        for obs in observations.iter().filter(|o| o.snr.is_some()) {
            self.history
                .append(&NodeRow::from_observation(obs, &now, ours))?;
            self.upsert(obs, now);
            admitted += 1;
        }
        if admitted > 0 {
            self.history.sync()?;
        }
        self.evict_over_cap();
        Ok(admitted)
    }

    fn upsert(&mut self, obs: &NodeObservation, now: Timestamp) {
        let seq = match self.records.get(&obs.id) {
            Some(existing) => {
                self.recency.remove(&existing.recency_key());
                existing.seq
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                seq
            }
        };
        let record = SeenNodeRecord::from_observation(obs, now, seq);
        self.recency.insert(record.recency_key(), obs.id.clone());
        self.records.insert(obs.id.clone(), record);
    }

    fn evict_over_cap(&mut self) {
        let Some(cap) = self.memory_cap else {
            return;
        };
        while self.records.len() > cap {
            match self.recency.pop_first() {
                Some((_, id)) => {
                    self.records.remove(&id);
                    debug!("Evicted least recently seen node {}", id);
                }
                None => break,
            }
        }
    }

    /// Records ordered most recently seen first.
    pub fn iter_recent(&self) -> impl Iterator<Item = &SeenNodeRecord> + '_ {
        self.recency
            .values()
            .rev()
            .filter_map(move |id| self.records.get(id))
    }

    /// Rewrite the snapshot with the `max_nodes` most recent records, each tagged
    /// with `ours` as it is now. Returns the number of rows written.
    pub fn write_snapshot(&self, max_nodes: usize, ours: &Position) -> Result<usize> {
        let rows: Vec<NodeRow> = self
            .iter_recent()
            .take(max_nodes)
            .map(|rec| NodeRow::from_record(rec, ours))
            .collect();
        self.snapshot.write(&rows)?;
        Ok(rows.len())
    }

    pub fn get(&self, id: &NodeId) -> Option<&SeenNodeRecord> {
        self.records.get(id)
    }

    pub fn tracked_count(&self) -> usize {
        self.records.len()
    }

    pub fn history_path(&self) -> &Path {
        self.history.path()
    }

    pub fn snapshot_path(&self) -> &Path {
        self.snapshot.path()
    }
}
