//! # Poll Loop
//!
//! One [`Poller`] owns the node store, the position provider, the device query
//! and (optionally) the dashboard. Every cycle runs strictly in order:
//!
//! ```text
//! refresh position → query device → parse → admit → write snapshot → render → sleep
//! ```
//!
//! A failing step ends its cycle early and the loop goes straight to sleeping.
//! Nothing that goes wrong inside a cycle leaves [`Poller::run`]; only the
//! cancellation token stops it, and it reacts to that mid-query and mid-sleep.
//! The position source gets the same token so a blocking GPS read ends early.

use std::time::Duration;

use chrono::Local;
use log::{debug, error, info, trace, warn};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::display::{self, Dashboard, Frame};
use crate::error::Result;
use crate::meshtastic::{HeaderCheck, NodeObservation, NodeQuery, NODE_TABLE};
use crate::metrics;
use crate::position::{refresh_position, Position, PositionSource};
use crate::storage::{NodeStore, Timestamp};

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Rendering,
    Sleeping,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub startup_delay: Duration,
    pub max_nodes: usize,
    pub dashboard: bool,
}

impl PollSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.poll.interval_secs),
            startup_delay: Duration::from_secs(config.poll.startup_delay_secs),
            max_nodes: config.storage.max_nodes,
            dashboard: config.poll.dashboard,
        }
    }
}

/// What one completed cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub parsed: usize,
    pub admitted: usize,
    pub snapshot_rows: usize,
    pub position_changed: bool,
}

/// Returned by [`Poller::run`] once it has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub tracked: usize,
}

pub struct Poller<Q, P> {
    settings: PollSettings,
    query: Q,
    position_source: P,
    store: NodeStore,
    ours: Position,
    /// Observations parsed in the last successful query.
    latest: Vec<NodeObservation>,
    state: PollState,
    schema_checked: bool,
    dashboard: Option<Dashboard>,
    cycles: u64,
    failed_cycles: u64,
}

impl<Q: NodeQuery, P: PositionSource> Poller<Q, P> {
    pub fn new(settings: PollSettings, query: Q, position_source: P, store: NodeStore) -> Self {
        let dashboard = settings.dashboard.then(Dashboard::new);
        Self {
            settings,
            query,
            position_source,
            store,
            ours: Position::default(),
            latest: Vec::new(),
            state: PollState::Idle,
            schema_checked: false,
            dashboard,
            cycles: 0,
            failed_cycles: 0,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn position(&self) -> &Position {
        &self.ours
    }

    /// Poll until `cancel` fires, then report.
    pub async fn run(&mut self, cancel: CancellationToken) -> PollSummary {
        self.position_source.bind_cancel(&cancel);
        info!(
            "Polling every {}s using {} position, snapshot capped at {} nodes",
            self.settings.interval.as_secs(),
            self.position_source.name(),
            self.settings.max_nodes
        );

        if !self.settings.startup_delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.stop(),
                _ = tokio::time::sleep(self.settings.startup_delay) => {}
            }
        }

        loop {
            let now = Local::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.cycle(now) => outcome,
            };
            self.cycles += 1;
            metrics::inc_cycles();
            match outcome {
                Ok(report) => trace!("Cycle {} done: {:?}", self.cycles, report),
                Err(e) => {
                    self.failed_cycles += 1;
                    if e.is_transient() {
                        metrics::inc_query_failures();
                        warn!("Cycle {} skipped: {}", self.cycles, e);
                    } else {
                        metrics::inc_persist_failures();
                        error!("Cycle {} failed to persist: {}", self.cycles, e);
                    }
                }
            }

            self.state = PollState::Sleeping;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }
        self.stop()
    }

    /// One full cycle at wall-clock `now`. The first failing step ends it.
    pub async fn cycle(&mut self, now: Timestamp) -> Result<CycleReport> {
        self.state = PollState::Polling;
        let position_changed =
            refresh_position(&mut self.position_source, &self.latest, &mut self.ours);

        let text = self.query.fetch_nodes().await?;
        self.check_schema(&text);
        let observations = NODE_TABLE.parse(&text);
        metrics::add_observations_parsed(observations.len());
        if observations.is_empty() {
            debug!("Node query returned no data rows");
        }

        let admitted = self.store.admit(&observations, now, &self.ours)?;
        metrics::add_observations_admitted(admitted);
        self.latest = observations;

        let snapshot_rows = self.store.write_snapshot(self.settings.max_nodes, &self.ours)?;

        self.state = PollState::Rendering;
        self.render(now);

        Ok(CycleReport {
            parsed: self.latest.len(),
            admitted,
            snapshot_rows,
            position_changed,
        })
    }

    fn check_schema(&mut self, text: &str) {
        if self.schema_checked {
            return;
        }
        match NODE_TABLE.check_header(text) {
            HeaderCheck::Missing => {}
            HeaderCheck::Fits { columns } => {
                debug!("Node table header has {} columns", columns);
                self.schema_checked = true;
            }
            HeaderCheck::TooNarrow { columns, required } => {
                warn!(
                    "Node table header has {} columns, expected at least {}; rows will be skipped",
                    columns, required
                );
                self.schema_checked = true;
            }
        }
    }

    fn render(&mut self, now: Timestamp) {
        let Some(dashboard) = self.dashboard.as_mut() else {
            return;
        };
        let (width, height) = dashboard.size();
        let text = display::render(&Frame {
            store: &self.store,
            ours: &self.ours,
            history_file: self.store.history_path(),
            width,
            height,
            now,
        });
        if let Err(e) = dashboard.present(&text) {
            debug!("Dashboard draw failed: {}", e);
        }
    }

    fn stop(&mut self) -> PollSummary {
        self.state = PollState::Stopped;
        let summary = PollSummary {
            cycles: self.cycles,
            failed_cycles: self.failed_cycles,
            tracked: self.store.tracked_count(),
        };
        let counters = metrics::snapshot();
        info!(
            "Poller stopped after {} cycles ({} failed), {} nodes tracked",
            summary.cycles, summary.failed_cycles, summary.tracked
        );
        debug!(
            "Counters: {:?}, admission ratio {}",
            counters,
            counters
                .admission_ratio()
                .map_or_else(|| "n/a".to_string(), |r| format!("{:.0}%", r * 100.0))
        );
        summary
    }
}
