//! Trajectory segments delivered by the particle transport.

use crate::address::StsAddress;
use crate::link::Origin;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Straight piece of a charged-particle trajectory inside one sensor.
///
/// Coordinates are sensor-local [cm]. The segment is assumed to be fully
/// contained in the sensor volume.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrajectorySegment {
    /// Sensor address.
    pub address: StsAddress,
    /// Entry point [cm].
    pub entry: [f64; 3],
    /// Exit point [cm].
    pub exit: [f64; 3],
    /// Momentum at entry [GeV/c].
    pub momentum: [f64; 3],
    /// Deposited energy [GeV].
    pub energy_loss: f64,
    /// PDG particle code.
    pub pdg: i32,
    /// Time at the segment midpoint, relative to the event start [ns].
    pub time: f64,
    /// Provenance of the segment.
    pub origin: Origin,
}

impl TrajectorySegment {
    /// Path length [cm].
    #[must_use]
    pub fn length(&self) -> f64 {
        let d = self.direction();
        (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
    }

    /// Exit minus entry [cm].
    #[inline]
    #[must_use]
    pub fn direction(&self) -> [f64; 3] {
        [
            self.exit[0] - self.entry[0],
            self.exit[1] - self.entry[1],
            self.exit[2] - self.entry[2],
        ]
    }

    /// Point at fraction `t` ∈ [0, 1] from entry to exit.
    #[inline]
    #[must_use]
    pub fn point_at(&self, t: f64) -> [f64; 3] {
        let d = self.direction();
        [
            self.entry[0] + t * d[0],
            self.entry[1] + t * d[1],
            self.entry[2] + t * d[2],
        ]
    }

    /// Midpoint [cm].
    #[inline]
    #[must_use]
    pub fn midpoint(&self) -> [f64; 3] {
        self.point_at(0.5)
    }

    /// Absolute momentum [GeV/c].
    #[must_use]
    pub fn momentum_magnitude(&self) -> f64 {
        let p = &self.momentum;
        (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt()
    }
}
