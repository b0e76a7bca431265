//! Minimal NMEA 0183 decoding: GGA fix sentences only.
//!
//! ```text
//! $GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47
//!        time   lat      N lon       E q sats hdop alt
//! ```

use thiserror::Error;

use super::Position;

/// Fix-quality values accepted as a usable fix (GPS, DGPS).
const VALID_FIX: [&str; 2] = ["1", "2"];

#[derive(Debug, Error, PartialEq)]
pub enum NmeaError {
    #[error("truncated GGA sentence ({fields} fields)")]
    Truncated { fields: usize },

    #[error("invalid {field} value {value:?}")]
    BadNumber { field: &'static str, value: String },
}

/// Decode a `$GPGGA` / `$GNGGA` sentence.
///
/// Returns `Ok(None)` for other sentence types and for GGA sentences without a
/// valid fix.
pub fn parse_gga(sentence: &str) -> Result<Option<Position>, NmeaError> {
    let sentence = sentence.trim();
    if !(sentence.starts_with("$GPGGA") || sentence.starts_with("$GNGGA")) {
        return Ok(None);
    }
    let parts: Vec<&str> = sentence.split(',').collect();
    if parts.len() <= 10 {
        return Err(NmeaError::Truncated {
            fields: parts.len(),
        });
    }
    if !VALID_FIX.contains(&parts[6]) {
        return Ok(None);
    }

    let mut fix = Position::default();
    if !parts[2].is_empty() && !parts[3].is_empty() {
        let lat = degrees_minutes(parts[2], 2, "latitude")?;
        fix.latitude = Some(if parts[3] == "S" { -lat } else { lat });
    }
    if !parts[4].is_empty() && !parts[5].is_empty() {
        let lon = degrees_minutes(parts[4], 3, "longitude")?;
        fix.longitude = Some(if parts[5] == "W" { -lon } else { lon });
    }
    if !parts[9].is_empty() {
        fix.altitude = Some(number(parts[9], "altitude")?);
    }
    Ok(Some(fix))
}

/// `ddmm.mmmm` (or `dddmm.mmmm`) to decimal degrees.
fn degrees_minutes(value: &str, degree_digits: usize, field: &'static str) -> Result<f64, NmeaError> {
    let bad = || NmeaError::BadNumber {
        field,
        value: value.to_string(),
    };
    let (deg, min) = match (value.get(..degree_digits), value.get(degree_digits..)) {
        (Some(d), Some(m)) if !m.is_empty() => (d, m),
        _ => return Err(bad()),
    };
    let deg: f64 = deg.parse().map_err(|_| bad())?;
    let min: f64 = min.parse().map_err(|_| bad())?;
    Ok(deg + min / 60.0)
}

fn number(value: &str, field: &'static str) -> Result<f64, NmeaError> {
    value.parse().map_err(|_| NmeaError::BadNumber {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Option<f64>, b: f64) -> bool {
        a.map_or(false, |a| (a - b).abs() < 1e-6)
    }

    #[test]
    fn decodes_north_east_fix() {
        let fix = parse_gga("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47")
            .unwrap()
            .unwrap();
        assert!(close(fix.latitude, 48.0 + 7.038 / 60.0));
        assert!(close(fix.longitude, 11.0 + 31.0 / 60.0));
        assert!(close(fix.altitude, 545.4));
    }

    #[test]
    fn south_and_west_are_negative() {
        let fix = parse_gga("$GNGGA,000000,4221.600,S,07103.000,W,2,05,1.0,15.0,M,0,M,,")
            .unwrap()
            .unwrap();
        assert!(close(fix.latitude, -(42.0 + 21.6 / 60.0)));
        assert!(close(fix.longitude, -(71.0 + 3.0 / 60.0)));
    }

    #[test]
    fn no_fix_and_other_sentences_are_ignored() {
        assert_eq!(
            parse_gga("$GPGGA,123519,4807.038,N,01131.000,E,0,00,,,M,,M,,"),
            Ok(None)
        );
        assert_eq!(parse_gga("$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A"), Ok(None));
        assert_eq!(parse_gga("garbage"), Ok(None));
    }

    #[test]
    fn empty_fields_are_left_out() {
        let fix = parse_gga("$GPGGA,123519,,,,,1,08,0.9,,M,,M,,").unwrap().unwrap();
        assert_eq!(fix, Position::default());
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(matches!(
            parse_gga("$GPGGA,123519,48x7.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,"),
            Err(NmeaError::BadNumber { field: "latitude", .. })
        ));
        assert!(matches!(
            parse_gga("$GPGGA,123519,4807.038,N"),
            Err(NmeaError::Truncated { fields: 4 })
        ));
    }
}
