//! # Position Module
//!
//! "Where are we right now". Two providers implement [`PositionSource`]:
//!
//! - [`gps::GpsSource`] reads NMEA sentences from a serial GPS receiver.
//! - [`self_report::SelfReportSource`] picks our own node out of the device's node
//!   table and uses the position the radio reports for itself.
//!
//! One provider is active per process; GPS wins when its port opens
//! ([`ActiveSource::from_config`]). Providers return explicit results and
//! [`refresh_position`] applies the retain-previous policy: a miss or an error
//! leaves the last known position untouched.

pub mod gps;
pub mod nmea;
pub mod self_report;

use log::{debug, trace};
#[cfg(feature = "serial")]
use log::warn;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::meshtastic::NodeObservation;

pub use gps::GpsSource;
pub use nmea::NmeaError;
pub use self_report::SelfReportSource;

/// Latitude/longitude in decimal degrees, altitude in metres. Each part may be
/// missing independently.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, altitude: Option<f64>) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            altitude,
        }
    }

    /// Both horizontal coordinates are known.
    pub fn has_fix(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Overwrite the parts present in `update`, keep the rest.
    pub fn merge(&mut self, update: Position) {
        if update.latitude.is_some() {
            self.latitude = update.latitude;
        }
        if update.longitude.is_some() {
            self.longitude = update.longitude;
        }
        if update.altitude.is_some() {
            self.altitude = update.altitude;
        }
    }
}

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("nmea error: {0}")]
    Nmea(#[from] NmeaError),

    #[error("invalid {field} value {value:?}")]
    BadCoordinate { field: &'static str, value: String },
}

/// A provider of our current position.
pub trait PositionSource {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Try to obtain a fresh position. `latest` is the most recently parsed node
    /// table. `Ok(None)` means no new information this time.
    fn refresh(&mut self, latest: &[NodeObservation]) -> Result<Option<Position>, PositionError>;

    /// Hand over the loop's stop token. Sources whose refresh blocks check it
    /// between reads; the rest ignore it.
    fn bind_cancel(&mut self, _cancel: &CancellationToken) {}
}

/// The provider selected at startup.
pub enum ActiveSource {
    #[cfg(feature = "serial")]
    Gps(GpsSource<gps::SerialReader>),
    SelfReport(SelfReportSource),
}

impl ActiveSource {
    /// GPS when `[gps].port` is set and opens, otherwise the device self-report.
    pub fn from_config(config: &Config) -> Self {
        let self_report = || {
            ActiveSource::SelfReport(SelfReportSource::new(config.meshtastic.my_node.clone()))
        };
        match config.gps.port.as_deref().filter(|p| !p.is_empty()) {
            #[cfg(feature = "serial")]
            Some(port) => match GpsSource::open(port, &config.gps) {
                Ok(source) => ActiveSource::Gps(source),
                Err(e) => {
                    warn!("GPS connection failed on {}: {} (using device position)", port, e);
                    self_report()
                }
            },
            #[cfg(not(feature = "serial"))]
            Some(port) => {
                log::warn!(
                    "GPS port {} configured but serial support is not compiled in",
                    port
                );
                self_report()
            }
            None => self_report(),
        }
    }
}

impl PositionSource for ActiveSource {
    fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "serial")]
            ActiveSource::Gps(s) => s.name(),
            ActiveSource::SelfReport(s) => s.name(),
        }
    }

    fn refresh(&mut self, latest: &[NodeObservation]) -> Result<Option<Position>, PositionError> {
        match self {
            #[cfg(feature = "serial")]
            ActiveSource::Gps(s) => s.refresh(latest),
            ActiveSource::SelfReport(s) => s.refresh(latest),
        }
    }

    fn bind_cancel(&mut self, cancel: &CancellationToken) {
        match self {
            #[cfg(feature = "serial")]
            ActiveSource::Gps(s) => s.bind_cancel(cancel),
            ActiveSource::SelfReport(s) => s.bind_cancel(cancel),
        }
    }
}

/// Refresh `current` from `source`, keeping the previous value on a miss or
/// error. Returns true when the position changed.
pub fn refresh_position<S: PositionSource + ?Sized>(
    source: &mut S,
    latest: &[NodeObservation],
    current: &mut Position,
) -> bool {
    match source.refresh(latest) {
        Ok(Some(update)) => {
            let before = *current;
            current.merge(update);
            trace!("{} position update: {:?}", source.name(), current);
            before != *current
        }
        Ok(None) => false,
        Err(e) => {
            debug!("{} position unavailable: {}", source.name(), e);
            false
        }
    }
}
