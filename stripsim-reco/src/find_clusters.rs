//! Cluster finding in one module.
//!
//! Digis are fed in time order. Each channel is either empty or holds one
//! open digi; a cluster is closed when a later digi in the same or a
//! neighbouring channel can no longer belong to it. Runs of open channels
//! never cross the front/back boundary, but may wrap round the edge of a
//! side when round-the-edge connectivity is enabled.

use crate::config::TimeCut;
use crate::error::Result;
use log::debug;
use std::f64::consts::SQRT_2;
use stripsim_core::{Cluster, ModuleParams, Side, StsAddress};

#[derive(Debug, Clone, Copy, PartialEq)]
enum ChannelState {
    Empty,
    Open { digi: usize, time: f64 },
}

/// Counters of a cluster builder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterBuilderStatistics {
    /// Digis offered.
    pub processed: usize,
    /// Digis rejected as duplicates in an open channel.
    pub ignored: usize,
    /// Clusters emitted.
    pub clusters: usize,
}

impl ClusterBuilderStatistics {
    /// Adds another set of counters.
    pub fn merge(&mut self, other: &ClusterBuilderStatistics) {
        self.processed += other.processed;
        self.ignored += other.ignored;
        self.clusters += other.clusters;
    }
}

/// Cluster finding state of one module.
#[derive(Debug, Clone)]
pub struct ClusterBuilder {
    module: StsAddress,
    nof_channels: u16,
    channels_per_side: u16,
    connect_edge: [bool; 2],
    windows: Vec<f64>,
    states: Vec<ChannelState>,
    clusters: Vec<Cluster>,
    stats: ClusterBuilderStatistics,
}

impl ClusterBuilder {
    /// Creates an empty builder for a module.
    ///
    /// The matching window of a channel is `cut` applied to
    /// `√2 · time_resolution`; a disabled cut gives an unlimited window.
    #[must_use]
    pub fn new(
        module: StsAddress,
        params: &ModuleParams,
        cut: &TimeCut,
        connect_edge: [bool; 2],
    ) -> Self {
        let nof_channels = params.nof_channels();
        let windows = (0..nof_channels)
            .map(|channel| {
                let sigma = SQRT_2 * params.asic(channel).time_resolution;
                cut.window(sigma).unwrap_or(f64::INFINITY)
            })
            .collect();
        Self {
            module: module.module_address(),
            nof_channels,
            channels_per_side: params.channels_per_side(),
            connect_edge,
            windows,
            states: vec![ChannelState::Empty; usize::from(nof_channels)],
            clusters: Vec::new(),
            stats: ClusterBuilderStatistics::default(),
        }
    }

    /// Module address.
    #[must_use]
    pub fn module(&self) -> StsAddress {
        self.module
    }

    /// Matching window of a channel [ns].
    #[must_use]
    pub fn window(&self, channel: u16) -> f64 {
        self.windows[usize::from(channel)]
    }

    /// Feeds one digi. Returns `false` if the digi was ignored because its
    /// channel is still open within the matching window.
    ///
    /// # Errors
    /// Returns [`stripsim_core::Error::ChannelOutOfRange`] for a channel
    /// outside the module.
    pub fn process_digi(&mut self, channel: u16, time: f64, index: usize) -> Result<bool> {
        if channel >= self.nof_channels {
            return Err(stripsim_core::Error::ChannelOutOfRange {
                channel,
                nof_channels: self.nof_channels,
            }
            .into());
        }
        self.stats.processed += 1;

        if let ChannelState::Open { time: open, .. } = self.state(channel) {
            if time - open <= self.window(channel) {
                debug!(
                    "{}: ignoring digi {index} in open channel {channel} (dt = {:.1} ns)",
                    self.module,
                    time - open
                );
                self.stats.ignored += 1;
                return Ok(false);
            }
            self.finalize_cluster(channel);
        }

        for neighbour in [self.left(channel), self.right(channel)].into_iter().flatten() {
            if let ChannelState::Open { time: open, .. } = self.state(neighbour) {
                if time - open > self.window(neighbour) {
                    self.finalize_cluster(neighbour);
                }
            }
        }

        self.states[usize::from(channel)] = ChannelState::Open { digi: index, time };
        Ok(true)
    }

    /// Closes the run of open channels containing `seed` and emits it as a
    /// cluster. Does nothing if `seed` is empty.
    pub fn finalize_cluster(&mut self, seed: u16) {
        if self.state(seed) == ChannelState::Empty {
            return;
        }
        let limit = self.channels_per_side;
        let mut size: u16 = 1;

        let mut first = seed;
        while size < limit {
            match self.left(first) {
                Some(left) if self.is_open(left) => {
                    first = left;
                    size += 1;
                }
                _ => break,
            }
        }
        let mut last = seed;
        while size < limit {
            match self.right(last) {
                Some(right) if self.is_open(right) => {
                    last = right;
                    size += 1;
                }
                _ => break,
            }
        }

        let side = self.side_of(seed);
        let mut cluster = Cluster::with_capacity(self.module, side, usize::from(size));
        let mut channel = first;
        for _ in 0..size {
            if let ChannelState::Open { digi, .. } = self.state(channel) {
                cluster.push(digi);
            }
            self.states[usize::from(channel)] = ChannelState::Empty;
            match self.right(channel) {
                Some(next) => channel = next,
                None => break,
            }
        }
        debug_assert_eq!(channel, self.right(last).unwrap_or(last));
        self.stats.clusters += 1;
        self.clusters.push(cluster);
    }

    /// Finalizes every open channel and returns all clusters of the unit.
    pub fn finish(&mut self) -> Vec<Cluster> {
        for channel in 0..self.nof_channels {
            self.finalize_cluster(channel);
        }
        std::mem::take(&mut self.clusters)
    }

    /// Drops open channels and pending clusters, abandoning the unit.
    pub fn reset(&mut self) {
        self.states.fill(ChannelState::Empty);
        self.clusters.clear();
    }

    /// Counters since creation.
    #[must_use]
    pub fn statistics(&self) -> &ClusterBuilderStatistics {
        &self.stats
    }

    #[inline]
    fn state(&self, channel: u16) -> ChannelState {
        self.states[usize::from(channel)]
    }

    #[inline]
    fn is_open(&self, channel: u16) -> bool {
        self.state(channel) != ChannelState::Empty
    }

    #[inline]
    fn side_of(&self, channel: u16) -> Side {
        Side::from_index(usize::from(channel / self.channels_per_side))
    }

    fn left(&self, channel: u16) -> Option<u16> {
        let start = channel - channel % self.channels_per_side;
        if channel > start {
            Some(channel - 1)
        } else if self.connect_edge[self.side_of(channel).index()] {
            Some(start + self.channels_per_side - 1)
        } else {
            None
        }
    }

    fn right(&self, channel: u16) -> Option<u16> {
        let start = channel - channel % self.channels_per_side;
        let end = start + self.channels_per_side - 1;
        if channel < end {
            Some(channel + 1)
        } else if self.connect_edge[self.side_of(channel).index()] {
            Some(start)
        } else {
            None
        }
    }
}
