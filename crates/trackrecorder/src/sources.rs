//! Concrete fix sources: the gpsd adapter and a simulated track.

use std::sync::Mutex;
use std::time::Duration;

use chrono::Local;
use tracing::debug;

use crate::fix::{FixMode, FixUpdate};
use crate::sampler::{FixSource, SkyUpdate, SourceError, SourceEvent, SourceResult};
use trackrecorder_gpsd::{GpsdClient, GpsdError, Report, Tpv};

impl From<GpsdError> for SourceError {
    fn from(err: GpsdError) -> Self {
        match err {
            GpsdError::Disconnected => Self::StreamEnded,
            GpsdError::Connect { .. } => Self::Unavailable(err.to_string()),
            GpsdError::Io(io) => Self::Io(io),
        }
    }
}

/// [`FixSource`] backed by a gpsd instance over TCP.
#[derive(Debug)]
pub struct GpsdFixSource {
    client: GpsdClient,
}

impl GpsdFixSource {
    /// Connect to gpsd at `addr` (host:port). `read_timeout` bounds every
    /// poll, and therefore how quickly the sampler observes its quit flag.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] when the connection is refused.
    pub fn connect(addr: &str, read_timeout: Duration) -> SourceResult<Self> {
        let client = GpsdClient::connect(addr, read_timeout)?;
        Ok(Self { client })
    }
}

fn update_from_tpv(tpv: Tpv) -> FixUpdate {
    FixUpdate {
        time: tpv.time,
        mode: tpv.mode.map(FixMode::from),
        latitude: tpv.lat,
        longitude: tpv.lon,
        // gpsd names the errors by axis: epy is latitude, epx longitude.
        error_latitude: tpv.epy,
        error_longitude: tpv.epx,
        altitude: tpv.alt,
        error_altitude: tpv.epv,
        speed: tpv.speed,
        error_speed: tpv.eps,
        climb: tpv.climb,
        error_climb: tpv.epc,
        time_error: tpv.ept,
    }
}

impl FixSource for GpsdFixSource {
    fn watch(&self, enable: bool) -> SourceResult<()> {
        Ok(self.client.watch(enable)?)
    }

    fn next_event(&self) -> SourceResult<Option<SourceEvent>> {
        match self.client.next_report()? {
            Some(Report::Tpv(tpv)) => Ok(Some(SourceEvent::Fix(update_from_tpv(tpv)))),
            Some(Report::Sky(sky)) => Ok(Some(SourceEvent::Sky(SkyUpdate {
                seen: sky.seen(),
                used: sky.used(),
            }))),
            // Handshake chatter: version banner, device inventory, watch echo.
            Some(_) | None => Ok(None),
        }
    }

    fn restart(&self) -> SourceResult<()> {
        debug!("reconnecting to gpsd");
        Ok(self.client.reconnect()?)
    }
}

/// Parameters for the simulated track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedTrack {
    /// Starting latitude, degrees.
    pub start_lat: f64,

    /// Starting longitude, degrees.
    pub start_lon: f64,

    /// Constant altitude, metres.
    pub altitude: f64,

    /// Ground speed heading due north, metres per second.
    pub speed: f64,

    /// Wall-clock pacing between emitted fixes.
    pub interval: Duration,
}

impl Default for SimulatedTrack {
    fn default() -> Self {
        Self {
            start_lat: 51.50,
            start_lon: -0.10,
            altitude: 11.0,
            speed: 2.5,
            interval: Duration::from_millis(1000),
        }
    }
}

/// Metres of northward travel per degree of latitude.
const METRES_PER_DEGREE_LAT: f64 = 111_195.0;

#[derive(Debug, Default)]
struct SimState {
    watching: bool,
    step: u64,
}

/// Deterministic [`FixSource`] walking a straight northward track.
///
/// Used for development without a receiver and by the run loop's tests.
/// Emits one 3-D fix per interval while watched; while unwatched it just
/// paces and yields nothing, like a silent device.
#[derive(Debug)]
pub struct SimulatedSource {
    track: SimulatedTrack,
    state: Mutex<SimState>,
}

impl SimulatedSource {
    /// Create a simulated source for the given track.
    #[must_use]
    pub fn new(track: SimulatedTrack) -> Self {
        Self {
            track,
            state: Mutex::new(SimState::default()),
        }
    }
}

impl FixSource for SimulatedSource {
    fn watch(&self, enable: bool) -> SourceResult<()> {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.watching = enable;
        Ok(())
    }

    fn next_event(&self) -> SourceResult<Option<SourceEvent>> {
        std::thread::sleep(self.track.interval);
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !state.watching {
            return Ok(None);
        }

        let travelled = self.track.speed * self.track.interval.as_secs_f64() * state.step as f64;
        let lat = self.track.start_lat + travelled / METRES_PER_DEGREE_LAT;
        state.step += 1;

        Ok(Some(SourceEvent::Fix(FixUpdate {
            time: Some(Local::now().to_rfc3339()),
            mode: Some(FixMode::ThreeD),
            latitude: Some(lat),
            longitude: Some(self.track.start_lon),
            error_latitude: Some(5.0),
            error_longitude: Some(5.0),
            altitude: Some(self.track.altitude),
            error_altitude: Some(8.0),
            speed: Some(self.track.speed),
            error_speed: Some(0.5),
            climb: Some(0.0),
            error_climb: Some(0.5),
            time_error: Some(0.005),
        })))
    }

    fn restart(&self) -> SourceResult<()> {
        Ok(())
    }
}
