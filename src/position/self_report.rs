//! Position from the radio's own entry in the node table.

use super::{Position, PositionError, PositionSource};
use crate::meshtastic::{clean_value, NodeObservation};

/// Markers in the "since" column the CLI prints for the local node.
const IMMEDIATE_MARKERS: [&str; 3] = ["now", "sec ago", "secs ago"];

pub struct SelfReportSource {
    /// Lowercased identity hint.
    identity: Option<String>,
}

impl SelfReportSource {
    pub fn new(identity: Option<String>) -> Self {
        Self {
            identity: identity
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty()),
        }
    }

    /// Whether `node` looks like the local radio.
    pub fn is_own_node(&self, node: &NodeObservation) -> bool {
        match &self.identity {
            Some(hint) => {
                node.id.as_str().to_lowercase().contains(hint.as_str())
                    || node
                        .short_name
                        .as_deref()
                        .map_or(false, |s| s.to_lowercase().contains(hint.as_str()))
            }
            None => node
                .since
                .as_deref()
                .or(node.last_heard.as_deref())
                .map(str::to_lowercase)
                .map_or(false, |s| IMMEDIATE_MARKERS.iter().any(|m| s.contains(m))),
        }
    }
}

impl PositionSource for SelfReportSource {
    fn name(&self) -> &'static str {
        "device"
    }

    /// `latest` is the table parsed in the previous cycle, since the position is
    /// refreshed before the device is queried. The first cycle therefore has no
    /// table to look at and yields `Ok(None)`.
    fn refresh(&mut self, latest: &[NodeObservation]) -> Result<Option<Position>, PositionError> {
        let own = latest
            .iter()
            .find(|n| self.is_own_node(n) && n.latitude.is_some() && n.longitude.is_some());
        let Some(node) = own else {
            return Ok(None);
        };
        Ok(Some(Position {
            latitude: coordinate(node.latitude.as_deref(), "latitude")?,
            longitude: coordinate(node.longitude.as_deref(), "longitude")?,
            altitude: coordinate(node.altitude.as_deref(), "altitude")?,
        }))
    }
}

fn coordinate(raw: Option<&str>, field: &'static str) -> Result<Option<f64>, PositionError> {
    raw.map(|raw| {
        clean_value(raw)
            .parse::<f64>()
            .map_err(|_| PositionError::BadCoordinate {
                field,
                value: raw.to_string(),
            })
    })
    .transpose()
}
