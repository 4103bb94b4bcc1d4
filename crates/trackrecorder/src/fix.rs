//! Fix records and the persisted line codec.
//!
//! A [`FixRecord`] is one positional sample plus its per-field uncertainty.
//! The receiver reports fields individually and may omit any of them before
//! it has determined a value, so everything besides the timestamp and fix
//! mode is optional: an absent field means "unchanged from the previous
//! sample", never zero.
//!
//! Records persist as one JSON object per line. Older log files carry no
//! `timesec` field; for those the display time string is parsed instead,
//! through an isolated fallback that normal decoding never touches.

use chrono::{DateTime, Local, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Receiver fix quality, numbered as gpsd numbers its TPV `mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
pub enum FixMode {
    /// Mode not yet reported by the receiver.
    #[default]
    Unknown,

    /// Receiver is up but holds no fix.
    NoFix,

    /// Two-dimensional fix (no trustworthy altitude).
    TwoD,

    /// Full three-dimensional fix.
    ThreeD,
}

impl FixMode {
    /// Whether the receiver holds at least a 2-D fix.
    ///
    /// Only fixes that pass this gate are worth persisting; below it the
    /// position fields are leftovers or absent.
    #[must_use]
    pub fn has_fix(self) -> bool {
        matches!(self, Self::TwoD | Self::ThreeD)
    }
}

impl From<u8> for FixMode {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::NoFix,
            2 => Self::TwoD,
            3 => Self::ThreeD,
            _ => Self::Unknown,
        }
    }
}

impl From<FixMode> for u8 {
    fn from(mode: FixMode) -> Self {
        match mode {
            FixMode::Unknown => 0,
            FixMode::NoFix => 1,
            FixMode::TwoD => 2,
            FixMode::ThreeD => 3,
        }
    }
}

impl std::fmt::Display for FixMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::NoFix => write!(f, "no fix"),
            Self::TwoD => write!(f, "2D"),
            Self::ThreeD => write!(f, "3D"),
        }
    }
}

/// One positional sample with per-field uncertainty.
///
/// Distances and altitudes are metres, speeds metres per second, angles
/// degrees. `time_sec` is seconds since local midnight — elapsed-time math
/// between two records assumes they fall on the same day (see
/// [`SessionSummary::commit`](crate::summary::SessionSummary::commit)).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FixRecord {
    /// Display time string as the receiver reported it.
    #[serde(rename = "gpstime")]
    pub gps_time: String,

    /// Seconds since local midnight.
    #[serde(rename = "timesec")]
    pub time_sec: i64,

    /// Fix quality at the moment of sampling.
    pub mode: FixMode,

    /// Latitude, degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    /// Longitude, degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    /// Latitude error estimate, metres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_latitude: Option<f64>,

    /// Longitude error estimate, metres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_longitude: Option<f64>,

    /// Altitude, metres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,

    /// Altitude error estimate, metres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_altitude: Option<f64>,

    /// Speed over ground, metres per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,

    /// Speed error estimate, metres per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_speed: Option<f64>,

    /// Climb rate, metres per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub climb: Option<f64>,

    /// Climb error estimate, metres per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_climb: Option<f64>,

    /// Marks the first record of a recording session.
    #[serde(rename = "start_record")]
    pub session_start: bool,
}

impl FixRecord {
    /// Whether both coordinates have been reported.
    #[must_use]
    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Larger of the two horizontal error estimates, metres.
    ///
    /// Unreported estimates count as zero, so an error-free record never
    /// widens a jitter threshold.
    #[must_use]
    pub fn horizontal_error(&self) -> f64 {
        self.error_longitude
            .unwrap_or(0.0)
            .max(self.error_latitude.unwrap_or(0.0))
    }

    /// Fold a partial device update into this record.
    ///
    /// Only fields the device actually reported this cycle are overwritten;
    /// everything else keeps its previous value. A reported time string also
    /// refreshes `time_sec`, unless the string does not parse, in which case
    /// the previous timestamp is kept.
    pub fn apply_update(&mut self, update: &FixUpdate) {
        if let Some(time) = &update.time {
            self.gps_time.clone_from(time);
            if let Some(secs) = local_seconds(time) {
                self.time_sec = secs;
            }
        }
        if let Some(mode) = update.mode {
            self.mode = mode;
        }
        if let Some(latitude) = update.latitude {
            self.latitude = Some(latitude);
        }
        if let Some(longitude) = update.longitude {
            self.longitude = Some(longitude);
        }
        if let Some(error_latitude) = update.error_latitude {
            self.error_latitude = Some(error_latitude);
        }
        if let Some(error_longitude) = update.error_longitude {
            self.error_longitude = Some(error_longitude);
        }
        if let Some(altitude) = update.altitude {
            self.altitude = Some(altitude);
        }
        if let Some(error_altitude) = update.error_altitude {
            self.error_altitude = Some(error_altitude);
        }
        if let Some(speed) = update.speed {
            self.speed = Some(speed);
        }
        if let Some(error_speed) = update.error_speed {
            self.error_speed = Some(error_speed);
        }
        if let Some(climb) = update.climb {
            self.climb = Some(climb);
        }
        if let Some(error_climb) = update.error_climb {
            self.error_climb = Some(error_climb);
        }
    }
}

/// One cycle's worth of reported fields from the device.
///
/// Every field is optional; the sampler folds these into the shared current
/// fix with [`FixRecord::apply_update`]. `time_error` rides along for status
/// reporting but is not part of the persisted record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixUpdate {
    /// RFC 3339 time string, when the receiver reported one.
    pub time: Option<String>,

    /// Fix quality, when reported.
    pub mode: Option<FixMode>,

    /// Latitude, degrees.
    pub latitude: Option<f64>,

    /// Longitude, degrees.
    pub longitude: Option<f64>,

    /// Latitude error estimate, metres.
    pub error_latitude: Option<f64>,

    /// Longitude error estimate, metres.
    pub error_longitude: Option<f64>,

    /// Altitude, metres.
    pub altitude: Option<f64>,

    /// Altitude error estimate, metres.
    pub error_altitude: Option<f64>,

    /// Speed over ground, metres per second.
    pub speed: Option<f64>,

    /// Speed error estimate, metres per second.
    pub error_speed: Option<f64>,

    /// Climb rate, metres per second.
    pub climb: Option<f64>,

    /// Climb error estimate, metres per second.
    pub error_climb: Option<f64>,

    /// Estimated time error, seconds.
    pub time_error: Option<f64>,
}

/// Wire shape of a persisted line: everything optional, so sparse and
/// legacy lines deserialize before the required pieces are checked.
#[derive(Debug, Deserialize)]
struct WireRecord {
    gpstime: Option<String>,
    timesec: Option<i64>,
    #[serde(default)]
    mode: FixMode,
    latitude: Option<f64>,
    longitude: Option<f64>,
    error_latitude: Option<f64>,
    error_longitude: Option<f64>,
    altitude: Option<f64>,
    error_altitude: Option<f64>,
    speed: Option<f64>,
    error_speed: Option<f64>,
    climb: Option<f64>,
    error_climb: Option<f64>,
    #[serde(default)]
    start_record: bool,
}

/// Serialize a record as one log line (no trailing newline).
///
/// # Errors
///
/// Returns [`Error::Json`] when serialization fails (non-finite floats are
/// the only realistic cause).
pub fn encode_line(fix: &FixRecord) -> Result<String> {
    Ok(serde_json::to_string(fix)?)
}

/// Parse one log line into a [`FixRecord`].
///
/// # Errors
///
/// Returns [`Error::MalformedRecord`] for blank lines, invalid JSON, and
/// records carrying neither `timesec` nor a parseable `gpstime`.
pub fn decode_line(line: &str) -> Result<FixRecord> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::malformed("empty line"));
    }
    let wire: WireRecord =
        serde_json::from_str(line).map_err(|err| Error::malformed(err.to_string()))?;
    let time_sec = match wire.timesec {
        Some(secs) => secs,
        None => wire
            .gpstime
            .as_deref()
            .and_then(legacy_seconds)
            .ok_or_else(|| Error::malformed("neither timesec nor a parseable gpstime"))?,
    };
    Ok(FixRecord {
        gps_time: wire.gpstime.unwrap_or_default(),
        time_sec,
        mode: wire.mode,
        latitude: wire.latitude,
        longitude: wire.longitude,
        error_latitude: wire.error_latitude,
        error_longitude: wire.error_longitude,
        altitude: wire.altitude,
        error_altitude: wire.error_altitude,
        speed: wire.speed,
        error_speed: wire.error_speed,
        climb: wire.climb,
        error_climb: wire.error_climb,
        session_start: wire.start_record,
    })
}

fn seconds_of(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight())
}

/// Seconds since *local* midnight for a live RFC 3339 device time.
pub(crate) fn local_seconds(time: &str) -> Option<i64> {
    let parsed = DateTime::parse_from_rfc3339(time).ok()?;
    Some(seconds_of(parsed.with_timezone(&Local).time()))
}

/// Fallback for legacy lines without `timesec`: take the clock components
/// of the display string as written, matching how old logs were produced.
fn legacy_seconds(time: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(time) {
        return Some(seconds_of(parsed.time()));
    }
    NaiveTime::parse_from_str(time, "%H:%M:%S%.f")
        .ok()
        .map(seconds_of)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_fix() -> FixRecord {
        FixRecord {
            gps_time: "2017-06-10T14:20:00.000Z".to_string(),
            time_sec: 51_600,
            mode: FixMode::ThreeD,
            latitude: Some(51.501),
            longitude: Some(-0.102),
            error_latitude: Some(17.0),
            error_longitude: Some(15.0),
            altitude: Some(12.3),
            error_altitude: Some(23.0),
            speed: Some(1.2),
            error_speed: Some(0.5),
            climb: Some(0.1),
            error_climb: Some(0.7),
            session_start: true,
        }
    }

    #[test]
    fn test_round_trip_full_record() {
        let fix = full_fix();
        let line = encode_line(&fix).expect("encode");
        let decoded = decode_line(&line).expect("decode");
        assert_eq!(decoded, fix);
    }

    #[test]
    fn test_round_trip_sparse_record() {
        let fix = FixRecord {
            gps_time: "2017-06-10T14:20:00.000Z".to_string(),
            time_sec: 51_600,
            mode: FixMode::TwoD,
            ..FixRecord::default()
        };
        let line = encode_line(&fix).expect("encode");
        // Absent fields are omitted, not written as null or zero.
        assert!(!line.contains("latitude"));
        assert!(!line.contains("altitude"));
        let decoded = decode_line(&line).expect("decode");
        assert_eq!(decoded, fix);
        assert!(decoded.latitude.is_none());
    }

    #[test]
    fn test_decode_legacy_line_without_timesec() {
        let line = r#"{"gpstime": "2017-06-10T14:20:00.000Z", "latitude": 51.5, "longitude": -0.1, "start_record": false}"#;
        let fix = decode_line(line).expect("decode legacy");
        assert_eq!(fix.time_sec, 14 * 3600 + 20 * 60);
        assert_eq!(fix.mode, FixMode::Unknown);
        assert_eq!(fix.latitude, Some(51.5));
    }

    #[test]
    fn test_decode_legacy_bare_clock_time() {
        let line = r#"{"gpstime": "06:01:30", "latitude": 51.5, "longitude": -0.1}"#;
        let fix = decode_line(line).expect("decode legacy");
        assert_eq!(fix.time_sec, 6 * 3600 + 60 + 30);
    }

    #[test]
    fn test_decode_rejects_record_without_any_time() {
        let line = r#"{"latitude": 51.5, "longitude": -0.1}"#;
        let err = decode_line(line).expect_err("no timestamp");
        assert!(err.is_malformed());

        let line = r#"{"gpstime": "not a time", "latitude": 51.5}"#;
        assert!(decode_line(line).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_line("").is_err());
        assert!(decode_line("   ").is_err());
        assert!(decode_line("{truncated").is_err());
        assert!(decode_line("plain text").is_err());
    }

    #[test]
    fn test_fix_mode_from_u8() {
        assert_eq!(FixMode::from(0), FixMode::Unknown);
        assert_eq!(FixMode::from(1), FixMode::NoFix);
        assert_eq!(FixMode::from(2), FixMode::TwoD);
        assert_eq!(FixMode::from(3), FixMode::ThreeD);
        assert_eq!(FixMode::from(17), FixMode::Unknown);
    }

    #[test]
    fn test_fix_mode_gate() {
        assert!(!FixMode::Unknown.has_fix());
        assert!(!FixMode::NoFix.has_fix());
        assert!(FixMode::TwoD.has_fix());
        assert!(FixMode::ThreeD.has_fix());
    }

    #[test]
    fn test_fix_mode_round_trips_on_wire() {
        let fix = FixRecord {
            time_sec: 10,
            mode: FixMode::ThreeD,
            ..FixRecord::default()
        };
        let decoded = decode_line(&encode_line(&fix).expect("encode")).expect("decode");
        assert_eq!(decoded.mode, FixMode::ThreeD);
    }

    #[test]
    fn test_sticky_update_leaves_unreported_fields() {
        let mut fix = full_fix();
        let update = FixUpdate {
            latitude: Some(52.0),
            speed: Some(3.4),
            ..FixUpdate::default()
        };
        fix.apply_update(&update);
        assert_eq!(fix.latitude, Some(52.0));
        assert_eq!(fix.speed, Some(3.4));
        // Everything the device did not report keeps its previous value.
        assert_eq!(fix.longitude, Some(-0.102));
        assert_eq!(fix.altitude, Some(12.3));
        assert_eq!(fix.mode, FixMode::ThreeD);
        assert_eq!(fix.time_sec, 51_600);
    }

    #[test]
    fn test_update_time_refreshes_timesec() {
        let mut fix = FixRecord::default();
        let time = "2017-06-10T14:20:00.000Z";
        fix.apply_update(&FixUpdate {
            time: Some(time.to_string()),
            ..FixUpdate::default()
        });
        assert_eq!(fix.gps_time, time);
        let expected = seconds_of(
            DateTime::parse_from_rfc3339(time)
                .expect("test time parses")
                .with_timezone(&Local)
                .time(),
        );
        assert_eq!(fix.time_sec, expected);
        assert!((0..86_400).contains(&fix.time_sec));
    }

    #[test]
    fn test_unparseable_update_time_keeps_previous_timesec() {
        let mut fix = FixRecord {
            time_sec: 51_600,
            ..FixRecord::default()
        };
        fix.apply_update(&FixUpdate {
            time: Some("n/a".to_string()),
            ..FixUpdate::default()
        });
        assert_eq!(fix.gps_time, "n/a");
        assert_eq!(fix.time_sec, 51_600);
    }

    #[test]
    fn test_horizontal_error_takes_larger_axis() {
        let mut fix = full_fix();
        assert!((fix.horizontal_error() - 17.0).abs() < f64::EPSILON);
        fix.error_latitude = None;
        assert!((fix.horizontal_error() - 15.0).abs() < f64::EPSILON);
        fix.error_longitude = None;
        assert!(fix.horizontal_error().abs() < f64::EPSILON);
    }

    #[test]
    fn test_has_position_requires_both_axes() {
        let mut fix = FixRecord::default();
        assert!(!fix.has_position());
        fix.latitude = Some(51.5);
        assert!(!fix.has_position());
        fix.longitude = Some(-0.1);
        assert!(fix.has_position());
    }
}
