//! Strip clusters.

use crate::address::{Side, StsAddress};
use crate::link::Match;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A run of neighbouring channels on one sensor side, read out close in time.
///
/// Created empty by the cluster finder, then filled by cluster analysis.
/// Member digis are stored as indices into the input digi slice, ordered
/// by ascending channel; a run wrapping round the side edge lists the high
/// channels first.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cluster {
    /// Module address with the side field set.
    pub address: StsAddress,
    /// Sensor side of all member channels.
    pub side: Side,
    /// Indices of member digis.
    pub digis: Vec<usize>,
    /// Total charge [e].
    pub charge: f64,
    /// Position in module channel units.
    pub position: f64,
    /// Position error in channel units.
    pub position_error: f64,
    /// Cluster time [ns].
    pub time: f64,
    /// Time error [ns].
    pub time_error: f64,
    /// Contributing trajectory segments.
    pub provenance: Match,
}

impl Cluster {
    /// Creates an empty cluster for a module side.
    #[must_use]
    pub fn new(module: StsAddress, side: Side) -> Self {
        Self {
            address: module.with_side(side),
            side,
            ..Default::default()
        }
    }

    /// Creates a cluster with pre-allocated member capacity.
    #[must_use]
    pub fn with_capacity(module: StsAddress, side: Side, capacity: usize) -> Self {
        let mut cluster = Self::new(module, side);
        cluster.digis.reserve(capacity);
        cluster
    }

    /// Adds a member digi index.
    pub fn push(&mut self, digi: usize) {
        self.digis.push(digi);
    }

    /// Number of member digis.
    #[must_use]
    pub fn size(&self) -> usize {
        self.digis.len()
    }

    /// Returns true if the cluster has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digis.is_empty()
    }

    /// Iterates over member digi indices.
    pub fn iter(&self) -> impl Iterator<Item = &usize> {
        self.digis.iter()
    }

    /// Stores the analysis results.
    pub fn set_properties(
        &mut self,
        charge: f64,
        position: f64,
        position_error: f64,
        time: f64,
        time_error: f64,
    ) {
        self.charge = charge;
        self.position = position;
        self.position_error = position_error;
        self.time = time;
        self.time_error = time_error;
    }

    /// Module address (side field cleared).
    #[must_use]
    pub fn module_address(&self) -> StsAddress {
        self.address.module_address()
    }
}
