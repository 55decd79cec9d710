//! Analog signals pending digitization.

use crate::link::{Match, Origin};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Charge arriving in one readout channel at a given time.
///
/// A signal lives in its module's channel buffer until it is released for
/// digitization. While buffered it may absorb later signals in the same
/// channel that arrive within the dead time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Signal {
    /// Module channel.
    pub channel: u16,
    /// Arrival time [ns].
    pub time: f64,
    /// Collected charge [e].
    pub charge: f64,
    /// Contributing trajectory segments, weighted by charge.
    pub provenance: Match,
}

impl Signal {
    /// Creates a signal produced by a trajectory segment.
    #[must_use]
    pub fn new(channel: u16, time: f64, charge: f64, origin: Origin) -> Self {
        Self {
            channel,
            time,
            charge,
            provenance: Match::single(origin, charge),
        }
    }

    /// Creates a signal without provenance (noise).
    #[must_use]
    pub fn noise(channel: u16, time: f64, charge: f64) -> Self {
        Self {
            channel,
            time,
            charge,
            provenance: Match::new(),
        }
    }

    /// Creates a signal with an explicit provenance list.
    #[must_use]
    pub fn with_provenance(channel: u16, time: f64, charge: f64, provenance: Match) -> Self {
        Self {
            channel,
            time,
            charge,
            provenance,
        }
    }

    /// Absorbs an interfering signal: earliest time, summed charge,
    /// unioned provenance.
    pub fn merge(&mut self, other: &Signal) {
        self.time = self.time.min(other.time);
        self.charge += other.charge;
        self.provenance.add_match(&other.provenance);
    }

    /// True if the signal carries no link to a trajectory segment.
    #[must_use]
    pub fn is_noise(&self) -> bool {
        self.provenance.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_merge_keeps_earliest_time() {
        let mut s1 = Signal::new(5, 120.0, 1000.0, Origin::new(0, 0, 1));
        let s2 = Signal::new(5, 100.0, 500.0, Origin::new(0, 0, 2));
        s1.merge(&s2);
        assert_relative_eq!(s1.time, 100.0);
        assert_relative_eq!(s1.charge, 1500.0);
        assert_eq!(s1.provenance.len(), 2);
    }

    #[test]
    fn test_noise_has_no_provenance() {
        let s = Signal::noise(3, 10.0, 4000.0);
        assert!(s.is_noise());
    }
}
