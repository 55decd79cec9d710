//! Per-channel buffer of analog signals awaiting digitization.
//!
//! A signal stays buffered until the readout horizon has passed it by more
//! than the channel's readout margin, so that no later signal can still be
//! merged into it.

use crate::error::Result;
use log::debug;
use stripsim_core::{Match, ModuleParams, Signal};

/// How far a flush may reach.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlushHorizon {
    /// Release everything (end of event or end of run).
    All,
    /// Release signals with `time ≤ readout_time − margin(channel)`.
    ReadoutTime(f64),
}

/// What happened to a signal offered to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Stored as an independent signal.
    Inserted,
    /// Merged into an interfering signal.
    Merged,
    /// Dropped because the channel is dead.
    DiscardedDead,
}

/// Signal counters of one buffer.
///
/// `added = inserted + merged + discarded_dead` and
/// `inserted = flushed + pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStatistics {
    /// Signals offered.
    pub added: usize,
    /// Signals stored independently.
    pub inserted: usize,
    /// Signals merged into an existing one.
    pub merged: usize,
    /// Signals dropped on dead channels.
    pub discarded_dead: usize,
    /// Signals released for digitization.
    pub flushed: usize,
}

impl BufferStatistics {
    /// Adds another set of counters.
    pub fn merge(&mut self, other: &BufferStatistics) {
        self.added += other.added;
        self.inserted += other.inserted;
        self.merged += other.merged;
        self.discarded_dead += other.discarded_dead;
        self.flushed += other.flushed;
    }
}

#[derive(Debug, Clone, Copy)]
struct ChannelTiming {
    dead_time: f64,
    margin: f64,
    active: bool,
}

/// Time-ordered signal lists for every channel of a module.
#[derive(Debug, Clone)]
pub struct ChannelSignalBuffer {
    channels: Vec<Vec<Signal>>,
    timing: Vec<ChannelTiming>,
    stats: BufferStatistics,
}

impl ChannelSignalBuffer {
    /// Creates an empty buffer for a module.
    #[must_use]
    pub fn new(params: &ModuleParams) -> Self {
        let timing = (0..params.nof_channels())
            .map(|channel| {
                let asic = params.asic(channel);
                ChannelTiming {
                    dead_time: asic.dead_time,
                    margin: asic.readout_margin(),
                    active: params.is_channel_active(channel),
                }
            })
            .collect();
        Self {
            channels: vec![Vec::new(); usize::from(params.nof_channels())],
            timing,
            stats: BufferStatistics::default(),
        }
    }

    /// Offers a signal to a channel.
    ///
    /// A signal closer than the dead time to a buffered one is merged into
    /// it (earliest time, summed charge, joined provenance); otherwise it is
    /// inserted in time order.
    ///
    /// # Errors
    /// Returns an error if the channel is outside the module.
    pub fn add_signal(
        &mut self,
        channel: u16,
        time: f64,
        charge: f64,
        provenance: Match,
    ) -> Result<AddOutcome> {
        let slot = usize::from(channel);
        let Some(timing) = self.timing.get(slot).copied() else {
            return Err(stripsim_core::Error::ChannelOutOfRange {
                channel,
                nof_channels: u16::try_from(self.channels.len()).unwrap_or(u16::MAX),
            }
            .into());
        };
        self.stats.added += 1;

        if !timing.active {
            debug!("discarding signal on dead channel {channel} at t = {time:.1} ns");
            self.stats.discarded_dead += 1;
            return Ok(AddOutcome::DiscardedDead);
        }

        let signal = Signal::with_provenance(channel, time, charge, provenance);
        let list = &mut self.channels[slot];
        if let Some(pos) = list
            .iter()
            .position(|s| (s.time - time).abs() < timing.dead_time)
        {
            list[pos].merge(&signal);
            list.sort_by(|a, b| a.time.total_cmp(&b.time));
            self.stats.merged += 1;
            return Ok(AddOutcome::Merged);
        }

        let pos = list.partition_point(|s| s.time <= time);
        list.insert(pos, signal);
        self.stats.inserted += 1;
        Ok(AddOutcome::Inserted)
    }

    /// Removes and returns all signals released by the horizon, ordered by
    /// channel and, within a channel, by time.
    pub fn flush(&mut self, horizon: FlushHorizon) -> Vec<Signal> {
        let mut released = Vec::new();
        for (list, timing) in self.channels.iter_mut().zip(&self.timing) {
            let n = match horizon {
                FlushHorizon::All => list.len(),
                FlushHorizon::ReadoutTime(t) => {
                    let safe_time = t - timing.margin;
                    list.partition_point(|s| s.time <= safe_time)
                }
            };
            released.extend(list.drain(..n));
        }
        self.stats.flushed += released.len();
        released
    }

    /// Drops all buffered signals without releasing them.
    pub fn clear(&mut self) {
        for list in &mut self.channels {
            list.clear();
        }
    }

    /// Signals currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.iter().map(Vec::len).sum()
    }

    /// True if no signal is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(Vec::is_empty)
    }

    /// Buffered signals of one channel, in time order.
    #[must_use]
    pub fn channel(&self, channel: u16) -> &[Signal] {
        self.channels
            .get(usize::from(channel))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Counters since creation.
    #[must_use]
    pub fn statistics(&self) -> &BufferStatistics {
        &self.stats
    }
}
