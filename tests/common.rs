//! Test utilities & fixtures.
//! Provides the captured `meshtastic --nodes` table under `tests/fixtures` and
//! scripted stand-ins for the device query.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use meshlogger::error::{LoggerError, Result};
use meshlogger::meshtastic::NodeQuery;
use meshlogger::storage::NodeStore;

/// Return the path to the static fixture directory.
pub fn fixture_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Node table with two heard nodes, the local radio, a stale entry and three
/// rows the parser must drop.
pub fn sample_table() -> String {
    std::fs::read_to_string(fixture_root().join("nodes_table.txt")).expect("fixture")
}

/// Store writing into `dir`.
#[allow(dead_code)]
pub fn store_in(dir: &tempfile::TempDir) -> NodeStore {
    NodeStore::open(dir.path().join("log.csv"), dir.path().join("latest.csv"), None)
        .expect("store")
}

/// Replays canned replies, then keeps failing with a non-zero exit.
#[allow(dead_code)]
pub struct ScriptedQuery {
    replies: VecDeque<Result<String>>,
    pub calls: usize,
}

#[allow(dead_code)]
impl ScriptedQuery {
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: replies.into(),
            calls: 0,
        }
    }
}

impl NodeQuery for ScriptedQuery {
    async fn fetch_nodes(&mut self) -> Result<String> {
        self.calls += 1;
        self.replies.pop_front().unwrap_or_else(|| {
            Err(LoggerError::QueryStatus {
                code: Some(1),
                stderr: "script exhausted".into(),
            })
        })
    }
}

/// Process exit status 1 from the CLI.
#[allow(dead_code)]
pub fn exit_one() -> LoggerError {
    LoggerError::QueryStatus {
        code: Some(1),
        stderr: "Error: No Serial Meshtastic device detected".into(),
    }
}
