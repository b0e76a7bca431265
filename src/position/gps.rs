//! Serial GPS provider.
//!
//! Reads at most `max_lines` lines per refresh so a quiet or chatty receiver can
//! never stall the poll loop; each read is bounded by the port timeout. Once the
//! bound cancel token fires no further line is read.

use std::io::{BufRead, ErrorKind};

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use super::nmea::parse_gga;
use super::{Position, PositionError, PositionSource};
use crate::meshtastic::NodeObservation;

#[cfg(feature = "serial")]
pub type SerialReader = std::io::BufReader<Box<dyn serialport::SerialPort>>;

/// GPS position provider over any line-oriented reader.
pub struct GpsSource<R> {
    reader: R,
    max_lines: usize,
    label: String,
    cancel: Option<CancellationToken>,
}

impl<R: BufRead> GpsSource<R> {
    pub fn from_reader(reader: R, max_lines: usize, label: impl Into<String>) -> Self {
        Self {
            reader,
            max_lines: max_lines.max(1),
            label: label.into(),
            cancel: None,
        }
    }

    fn stopping(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }
}

#[cfg(feature = "serial")]
impl GpsSource<SerialReader> {
    /// Open the receiver's serial port (8N1 at the configured baud rate).
    pub fn open(port_name: &str, cfg: &crate::config::GpsConfig) -> Result<Self, PositionError> {
        use std::time::Duration;

        let mut builder = serialport::new(port_name, cfg.baud_rate)
            .timeout(Duration::from_millis(cfg.read_timeout_ms));
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        let port = builder
            .open()
            .map_err(|e| PositionError::Io(std::io::Error::new(ErrorKind::Other, e)))?;
        info!("GPS connected on {} at {} baud", port_name, cfg.baud_rate);
        Ok(Self::from_reader(
            std::io::BufReader::new(port),
            cfg.max_lines,
            port_name,
        ))
    }
}

impl<R: BufRead> PositionSource for GpsSource<R> {
    fn name(&self) -> &'static str {
        "gps"
    }

    fn bind_cancel(&mut self, cancel: &CancellationToken) {
        self.cancel = Some(cancel.clone());
    }

    fn refresh(&mut self, _latest: &[NodeObservation]) -> Result<Option<Position>, PositionError> {
        let mut buf = Vec::with_capacity(96);
        let mut last_err = None;
        for _ in 0..self.max_lines {
            if self.stopping() {
                debug!("GPS read on {} abandoned, shutdown in progress", self.label);
                return Ok(None);
            }
            buf.clear();
            match self.reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    continue
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    debug!("GPS read interrupted, likely shutdown in progress");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            let line = String::from_utf8_lossy(&buf);
            match parse_gga(&line) {
                Ok(Some(fix)) => return Ok(Some(fix)),
                Ok(None) => {}
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) => Err(e.into()),
            None => Ok(None),
        }
    }
}

impl<R> Drop for GpsSource<R> {
    fn drop(&mut self) {
        debug!("Releasing GPS reader {}", self.label);
    }
}
