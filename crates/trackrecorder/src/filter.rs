//! Jitter rejection for position deltas.
//!
//! A stationary receiver still wanders by a few metres between samples, and
//! naively summing those deltas inflates the recorded distance. The filter
//! rejects any movement smaller than a threshold derived from the reported
//! error estimates at both ends.
//!
//! The threshold is rough and unscientific: the sum of the larger horizontal
//! error on each end, divided by a tunable constant. The divisor is a
//! configuration knob, not a calibrated quantity.

use crate::fix::FixRecord;

/// Default divisor applied to the combined error estimates.
pub const DEFAULT_DIVISOR: f64 = 4.0;

/// Classifies a position delta as jitter or real movement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseFilter {
    divisor: f64,
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DIVISOR)
    }
}

impl NoiseFilter {
    /// Create a filter with the given error divisor.
    ///
    /// A larger divisor shrinks the rejection threshold, admitting smaller
    /// movements as real.
    #[must_use]
    pub fn new(divisor: f64) -> Self {
        Self { divisor }
    }

    /// The divisor this filter was built with.
    #[must_use]
    pub fn divisor(&self) -> f64 {
        self.divisor
    }

    /// Rejection threshold in kilometres for a hop between two fixes.
    ///
    /// Unreported error estimates contribute nothing, so two error-free
    /// fixes always produce a threshold of zero.
    #[must_use]
    pub fn threshold_km(&self, from: &FixRecord, to: &FixRecord) -> f64 {
        (from.horizontal_error() + to.horizontal_error()) / self.divisor / 1000.0
    }

    /// Whether a distance of `distance_km` between `from` and `to` is small
    /// enough to be receiver wander rather than movement.
    #[must_use]
    pub fn is_jitter(&self, distance_km: f64, from: &FixRecord, to: &FixRecord) -> bool {
        distance_km < self.threshold_km(from, to)
    }
}
