//! gpsd JSON wire protocol types.
//!
//! gpsd streams newline-delimited JSON objects, each tagged with a `class`
//! field. Only the report classes the recorder consumes are modeled here;
//! unknown classes fail to parse and are skipped by the client. Fields the
//! receiver has not yet determined are simply absent from the JSON, which is
//! why nearly everything below is optional.

use serde::Deserialize;

/// The `?WATCH` command that subscribes to JSON report streaming.
pub const WATCH_ENABLE: &str = r#"?WATCH={"enable":true,"json":true}"#;

/// The `?WATCH` command that unsubscribes from report streaming.
pub const WATCH_DISABLE: &str = r#"?WATCH={"enable":false}"#;

/// A single report line from gpsd, dispatched on its `class` tag.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "class")]
pub enum Report {
    /// Time-position-velocity report.
    #[serde(rename = "TPV")]
    Tpv(Tpv),

    /// Satellite sky view.
    #[serde(rename = "SKY")]
    Sky(Sky),

    /// Version banner sent on connect.
    #[serde(rename = "VERSION")]
    Version(Version),

    /// Device inventory sent when watching begins.
    #[serde(rename = "DEVICES")]
    Devices(Devices),

    /// Echo of the current watch state.
    #[serde(rename = "WATCH")]
    Watch(Watch),
}

impl Report {
    /// Parse one report line.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error when the line is not valid JSON or
    /// carries an unknown `class`.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

/// Time-position-velocity report.
///
/// Error estimates follow gpsd's naming: `epx` is the *longitude* error and
/// `epy` the *latitude* error, both in metres; `epv` altitude error in
/// metres; `ept` time error in seconds; `eps`/`epc` speed and climb errors
/// in metres per second.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Tpv {
    /// Originating device path, if gpsd reports one.
    pub device: Option<String>,

    /// Fix mode: 0 = unknown, 1 = no fix, 2 = 2-D, 3 = 3-D.
    pub mode: Option<u8>,

    /// UTC time as an RFC 3339 string.
    pub time: Option<String>,

    /// Estimated time error, seconds.
    pub ept: Option<f64>,

    /// Latitude, degrees.
    pub lat: Option<f64>,

    /// Longitude, degrees.
    pub lon: Option<f64>,

    /// Longitude error estimate, metres.
    pub epx: Option<f64>,

    /// Latitude error estimate, metres.
    pub epy: Option<f64>,

    /// Altitude, metres.
    pub alt: Option<f64>,

    /// Altitude error estimate, metres.
    pub epv: Option<f64>,

    /// Speed over ground, metres per second.
    pub speed: Option<f64>,

    /// Speed error estimate, metres per second.
    pub eps: Option<f64>,

    /// Climb rate, metres per second.
    pub climb: Option<f64>,

    /// Climb error estimate, metres per second.
    pub epc: Option<f64>,
}

/// Satellite sky view.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Sky {
    /// Originating device path, if gpsd reports one.
    pub device: Option<String>,

    /// Satellites currently visible to the receiver.
    pub satellites: Option<Vec<Satellite>>,
}

impl Sky {
    /// Number of satellites in view.
    #[must_use]
    pub fn seen(&self) -> u32 {
        self.satellites
            .as_ref()
            .map_or(0, |sats| u32::try_from(sats.len()).unwrap_or(u32::MAX))
    }

    /// Number of satellites participating in the fix.
    #[must_use]
    pub fn used(&self) -> u32 {
        self.satellites.as_ref().map_or(0, |sats| {
            u32::try_from(sats.iter().filter(|s| s.used).count()).unwrap_or(u32::MAX)
        })
    }
}

/// One satellite entry in a sky view.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Satellite {
    /// Pseudo-random noise id of the satellite.
    #[serde(rename = "PRN")]
    pub prn: Option<i32>,

    /// Signal strength, dB-Hz.
    pub ss: Option<f64>,

    /// Whether this satellite is used in the current fix.
    #[serde(default)]
    pub used: bool,
}

/// Version banner gpsd emits immediately after a client connects.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Version {
    /// Public release name.
    pub release: Option<String>,

    /// Internal revision.
    pub rev: Option<String>,

    /// Protocol major version.
    pub proto_major: Option<u32>,

    /// Protocol minor version.
    pub proto_minor: Option<u32>,
}

/// Device inventory report.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Devices {
    /// Devices gpsd currently manages.
    pub devices: Option<Vec<DeviceInfo>>,
}

/// One managed device.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct DeviceInfo {
    /// Device node path.
    pub path: Option<String>,

    /// Driver gpsd selected for the device.
    pub driver: Option<String>,
}

/// Echo of the watch state after a `?WATCH` command.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Watch {
    /// Whether streaming is enabled.
    pub enable: Option<bool>,

    /// Whether JSON reports are selected.
    pub json: Option<bool>,
}
