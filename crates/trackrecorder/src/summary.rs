//! Cumulative session statistics.
//!
//! A [`SessionSummary`] folds committed fix records into running distance,
//! time, and elevation totals plus lazily grown split buckets: seconds spent
//! in each completed kilometre and mile, and distance covered in each elapsed
//! hour. Distance is measured between *anchors* — the last fix accepted as
//! real movement — with hops below the noise threshold discarded so receiver
//! wander does not accumulate.

use serde::Serialize;
use tracing::debug;

use crate::filter::NoiseFilter;
use crate::fix::FixRecord;

/// Kilometres to statute miles.
pub const KM_TO_MILES: f64 = 0.621_371;

/// Mean Earth radius in kilometres, as used by the haversine step.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres between two points given in decimal
/// degrees.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Break a second count into whole hours, minutes, and seconds.
///
/// Negative inputs clamp to zero; they can only arise from the documented
/// midnight-rollover limitation of [`SessionSummary::commit`].
#[must_use]
pub fn hms(secs: f64) -> (u64, u64, u64) {
    let total = if secs.is_finite() && secs > 0.0 {
        secs as u64
    } else {
        0
    };
    (total / 3600, (total % 3600) / 60, total % 60)
}

/// Geographic bounding box of a set of retained records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoBounds {
    /// Southernmost latitude, degrees.
    pub min_lat: f64,
    /// Northernmost latitude, degrees.
    pub max_lat: f64,
    /// Westernmost longitude, degrees.
    pub min_lon: f64,
    /// Easternmost longitude, degrees.
    pub max_lon: f64,
}

impl GeoBounds {
    fn widen(&mut self, lat: f64, lon: f64) {
        self.min_lat = self.min_lat.min(lat);
        self.max_lat = self.max_lat.max(lat);
        self.min_lon = self.min_lon.min(lon);
        self.max_lon = self.max_lon.max(lon);
    }
}

/// Running statistics for one recording session.
///
/// Built either live, from fixes committed as they are written to the log,
/// or by replaying a persisted log file. All distance fields grow
/// monotonically within a session; split buckets grow lazily and never
/// shrink.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    /// Number of records committed.
    pub records: u64,

    /// Cumulative distance, kilometres.
    pub km: f64,

    /// Cumulative distance, statute miles.
    pub miles: f64,

    /// Cumulative moving time, seconds.
    pub secs: f64,

    /// Lowest altitude seen, metres. `None` until a record carries one.
    pub min_height: Option<f64>,

    /// Highest altitude seen, metres.
    pub max_height: Option<f64>,

    /// Seconds spent in each completed kilometre; the last entry is the
    /// kilometre currently in progress.
    pub split_time_km: Vec<f64>,

    /// Seconds spent in each completed mile.
    pub split_time_miles: Vec<f64>,

    /// Kilometres covered in each elapsed hour.
    pub split_km_hour: Vec<f64>,

    /// Miles covered in each elapsed hour.
    pub split_mile_hour: Vec<f64>,

    /// Times a recording was started into this summary.
    pub sessions_recorded: u64,

    /// Records retained for export; replay decides which fixes land here.
    pub points: Vec<FixRecord>,

    /// Running sum of latitude error estimates, metres.
    pub sigma_lat_error: f64,

    /// Running sum of longitude error estimates, metres.
    pub sigma_lon_error: f64,

    /// Running sum of altitude error estimates, metres.
    pub sigma_alt_error: f64,

    /// Last fix accepted as real movement; baseline for the next distance.
    #[serde(skip)]
    anchor: Option<FixRecord>,

    /// Last fix committed, accepted or not.
    #[serde(skip)]
    last_seen: Option<FixRecord>,
}

impl SessionSummary {
    /// Create an empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into the summary. This is the sole mutation entry
    /// point; it never fails, however sparse the record.
    ///
    /// Returns whether the record became the new anchor, either by seeding
    /// an empty session or by being accepted as real movement. Records
    /// rejected as jitter leave the anchor and all distance fields untouched
    /// but still count toward `records` and the error sums.
    ///
    /// Elapsed time is the plain difference of the two seconds-since-local-
    /// midnight timestamps, so a session crossing midnight under-counts (or
    /// produces a negative delta). Known limitation, kept from the on-disk
    /// format's same-day assumption.
    pub fn commit(&mut self, fix: &FixRecord, filter: &NoiseFilter) -> bool {
        if fix.session_start {
            self.sessions_recorded += 1;
            self.anchor = None;
            self.last_seen = None;
        }

        let advanced = self.accumulate_distance(fix, filter);

        if let Some(altitude) = fix.altitude {
            self.min_height = Some(self.min_height.map_or(altitude, |h| h.min(altitude)));
            self.max_height = Some(self.max_height.map_or(altitude, |h| h.max(altitude)));
        }

        self.sigma_lat_error += fix.error_latitude.unwrap_or(0.0);
        self.sigma_lon_error += fix.error_longitude.unwrap_or(0.0);
        self.sigma_alt_error += fix.error_altitude.unwrap_or(0.0);

        self.last_seen = Some(fix.clone());
        self.records += 1;
        advanced
    }

    /// Distance/noise step. Skipped entirely for fixes without a position;
    /// the first positioned fix of a session just becomes the anchor.
    fn accumulate_distance(&mut self, fix: &FixRecord, filter: &NoiseFilter) -> bool {
        if !fix.has_position() {
            return false;
        }
        let Some(anchor) = &self.anchor else {
            self.anchor = Some(fix.clone());
            return true;
        };

        let (lat1, lon1) = (anchor.latitude.unwrap_or(0.0), anchor.longitude.unwrap_or(0.0));
        let (lat2, lon2) = (fix.latitude.unwrap_or(0.0), fix.longitude.unwrap_or(0.0));
        let delta_km = haversine_km(lat1, lon1, lat2, lon2);

        if filter.is_jitter(delta_km, anchor, fix) {
            debug!(
                delta_km,
                threshold_km = filter.threshold_km(anchor, fix),
                "discarding hop as jitter"
            );
            return false;
        }

        self.km += delta_km;
        self.miles += delta_km * KM_TO_MILES;

        let km_bucket = self.km.floor() as usize;
        let mile_bucket = self.miles.floor() as usize;
        grow_to(&mut self.split_time_km, km_bucket);
        grow_to(&mut self.split_time_miles, mile_bucket);

        let delta_secs = (fix.time_sec - anchor.time_sec) as f64;
        self.secs += delta_secs;

        // A negative running total is only possible across midnight; clamp
        // the bucket index rather than panic.
        let hour_bucket = (self.secs / 3600.0).max(0.0).floor() as usize;
        grow_to(&mut self.split_km_hour, hour_bucket);
        grow_to(&mut self.split_mile_hour, hour_bucket);

        self.split_km_hour[hour_bucket] += delta_km;
        self.split_mile_hour[hour_bucket] += delta_km * KM_TO_MILES;
        self.split_time_km[km_bucket] += delta_secs;
        self.split_time_miles[mile_bucket] += delta_secs;

        debug!(
            delta_km,
            delta_secs, total_km = self.km, "accumulated movement"
        );
        self.anchor = Some(fix.clone());
        true
    }

    /// Retain a record in the exported point sequence.
    pub fn retain(&mut self, fix: FixRecord) {
        self.points.push(fix);
    }

    /// The current anchor, if the session has one.
    #[must_use]
    pub fn anchor(&self) -> Option<&FixRecord> {
        self.anchor.as_ref()
    }

    /// The most recently committed record.
    #[must_use]
    pub fn last_seen(&self) -> Option<&FixRecord> {
        self.last_seen.as_ref()
    }

    /// Forget the last committed record so live sampling does not diff
    /// against replayed history.
    pub fn clear_last_seen(&mut self) {
        self.last_seen = None;
    }

    /// Average moving speed in km/h, or `None` before any time has
    /// accumulated.
    #[must_use]
    pub fn average_speed_kmh(&self) -> Option<f64> {
        if self.secs > 0.0 {
            Some(self.km / (self.secs / 3600.0))
        } else {
            None
        }
    }

    /// Mean horizontal error estimate in metres across all committed
    /// records, averaging the two axes.
    #[must_use]
    pub fn mean_horizontal_error(&self) -> Option<f64> {
        if self.records > 0 {
            Some((self.sigma_lat_error + self.sigma_lon_error) / 2.0 / self.records as f64)
        } else {
            None
        }
    }

    /// Bounding box of the retained points, or `None` when no retained
    /// point carries a position.
    #[must_use]
    pub fn bounds(&self) -> Option<GeoBounds> {
        let mut bounds: Option<GeoBounds> = None;
        for point in &self.points {
            let (Some(lat), Some(lon)) = (point.latitude, point.longitude) else {
                continue;
            };
            match &mut bounds {
                Some(b) => b.widen(lat, lon),
                None => {
                    bounds = Some(GeoBounds {
                        min_lat: lat,
                        max_lat: lat,
                        min_lon: lon,
                        max_lon: lon,
                    });
                }
            }
        }
        bounds
    }
}

/// Zero-fill `splits` until `index` is a valid position.
fn grow_to(splits: &mut Vec<f64>, index: usize) {
    while splits.len() <= index {
        splits.push(0.0);
    }
}
