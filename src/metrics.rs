//! Process-wide poll counters.
//!
//! Relaxed atomics bumped by the poll loop; read back with [`snapshot`] for the
//! stop summary.
use std::sync::atomic::{AtomicU64, Ordering};

static CYCLES: AtomicU64 = AtomicU64::new(0);
static QUERY_FAILURES: AtomicU64 = AtomicU64::new(0);
static OBSERVATIONS_PARSED: AtomicU64 = AtomicU64::new(0);
static OBSERVATIONS_ADMITTED: AtomicU64 = AtomicU64::new(0);
static PERSIST_FAILURES: AtomicU64 = AtomicU64::new(0);

pub fn inc_cycles() {
    CYCLES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_query_failures() {
    QUERY_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn add_observations_parsed(n: usize) {
    OBSERVATIONS_PARSED.fetch_add(n as u64, Ordering::Relaxed);
}

pub fn add_observations_admitted(n: usize) {
    OBSERVATIONS_ADMITTED.fetch_add(n as u64, Ordering::Relaxed);
}

pub fn inc_persist_failures() {
    PERSIST_FAILURES.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub cycles: u64,
    pub query_failures: u64,
    pub observations_parsed: u64,
    pub observations_admitted: u64,
    pub persist_failures: u64,
}

impl Snapshot {
    /// Share of parsed rows that made it past the signal-quality filter.
    pub fn admission_ratio(&self) -> Option<f64> {
        if self.observations_parsed == 0 {
            None
        } else {
            Some(self.observations_admitted as f64 / self.observations_parsed as f64)
        }
    }
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        cycles: CYCLES.load(Ordering::Relaxed),
        query_failures: QUERY_FAILURES.load(Ordering::Relaxed),
        observations_parsed: OBSERVATIONS_PARSED.load(Ordering::Relaxed),
        observations_admitted: OBSERVATIONS_ADMITTED.load(Ordering::Relaxed),
        persist_failures: PERSIST_FAILURES.load(Ordering::Relaxed),
    }
}
