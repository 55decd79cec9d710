//! Run-level digitization over all modules of the setup.
//!
//! Segments of a processing unit are partitioned by module; each module is
//! then transported, buffered and read out independently on the rayon pool.

use crate::buffer::{BufferStatistics, FlushHorizon};
use crate::config::{DigitizeConfig, RunMode};
use crate::error::Result;
use crate::module::{ModuleStatistics, SimModule};
use crate::physics::{mean_lorentz_shift, ChargeCarrier};
use log::{debug, info, warn};
use rayon::prelude::*;
use stripsim_core::{sort_digis, DetectorContext, Digi, Side, StripLayout, TrajectorySegment};

/// Counters of a digitization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigitizeStatistics {
    /// Processing units (events) seen.
    pub events: usize,
    /// Segments on sensors missing from the setup.
    pub segments_unknown_sensor: usize,
    /// Summed module counters.
    pub modules: ModuleStatistics,
    /// Summed buffer counters.
    pub signals: BufferStatistics,
}

/// Digitizer for a whole setup.
#[derive(Debug)]
pub struct Digitize<'a> {
    ctx: &'a DetectorContext,
    config: DigitizeConfig,
    modules: Vec<SimModule>,
    last_event_time: f64,
    events: usize,
    unknown_sensor: usize,
}

impl<'a> Digitize<'a> {
    /// Prepares module states for a run.
    ///
    /// # Errors
    /// Returns a configuration error if the configuration is invalid or any
    /// sensor of the setup has no derived parameters.
    pub fn new(ctx: &'a DetectorContext, config: DigitizeConfig) -> Result<Self> {
        config.validate()?;
        for sensor in ctx.sensors() {
            ctx.sensor_dssd(sensor.address)?;
        }
        if config.noise && config.mode == RunMode::Event {
            warn!("noise generation needs time-based mode; only noise smearing is applied");
        }
        let modules = ctx
            .modules()
            .iter()
            .map(|m| {
                SimModule::new(
                    m.address,
                    m.params.clone(),
                    config.seed,
                    config.dead_channel_fraction,
                    &config.dead_channels,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        info!(
            "digitizer ready: {} modules, {} sensors, mode {:?}",
            modules.len(),
            ctx.nof_sensors(),
            config.mode
        );
        Ok(Self {
            ctx,
            config,
            modules,
            last_event_time: 0.0,
            events: 0,
            unknown_sensor: 0,
        })
    }

    /// Configuration of the run.
    #[must_use]
    pub fn config(&self) -> &DigitizeConfig {
        &self.config
    }

    /// Module states in setup order.
    #[must_use]
    pub fn modules(&self) -> &[SimModule] {
        &self.modules
    }

    /// Processes the segments of one event starting at `event_time` [ns].
    ///
    /// Returns the digis read out by this event, sorted by module, time and
    /// channel. In time-based mode signals that may still interfere with
    /// later events stay buffered.
    ///
    /// # Errors
    /// Returns the first fatal error of any module.
    pub fn process_event(
        &mut self,
        event_time: f64,
        segments: &[TrajectorySegment],
    ) -> Result<Vec<Digi>> {
        let ctx = self.ctx;
        let mut by_module: Vec<Vec<&TrajectorySegment>> = vec![Vec::new(); self.modules.len()];
        for segment in segments {
            match ctx.sensor(segment.address) {
                Ok(sensor) => by_module[sensor.module].push(segment),
                Err(_) => {
                    debug!("skipping segment on unknown sensor {}", segment.address);
                    self.unknown_sensor += 1;
                }
            }
        }

        let config = &self.config;
        let time_based = config.mode == RunMode::TimeBased;
        let noise_from = self.last_event_time;
        let horizon = if time_based {
            FlushHorizon::ReadoutTime(event_time)
        } else {
            FlushHorizon::All
        };

        let per_module = self
            .modules
            .par_iter_mut()
            .zip(by_module.par_iter())
            .map(|(module, segments)| {
                if time_based && config.noise {
                    module.generate_noise(noise_from, event_time)?;
                }
                for segment in segments {
                    let sensor = ctx.sensor_dssd(segment.address)?;
                    module.process_segment(sensor, &config.physics, segment, event_time)?;
                }
                module.read_out(horizon, config.noise)
            })
            .collect::<Result<Vec<_>>>()?;

        self.last_event_time = self.last_event_time.max(event_time);
        self.events += 1;
        let mut digis: Vec<Digi> = per_module.into_iter().flatten().collect();
        sort_digis(&mut digis);
        debug!("event {} at {event_time} ns: {} digis", self.events, digis.len());
        Ok(digis)
    }

    /// Releases everything still buffered (end of run).
    ///
    /// # Errors
    /// Returns the first fatal error of any module.
    pub fn finish(&mut self) -> Result<Vec<Digi>> {
        let noise = self.config.noise;
        let per_module = self
            .modules
            .par_iter_mut()
            .map(|module| module.read_out(FlushHorizon::All, noise))
            .collect::<Result<Vec<_>>>()?;
        let mut digis: Vec<Digi> = per_module.into_iter().flatten().collect();
        sort_digis(&mut digis);
        let stats = self.statistics();
        info!(
            "digitization finished: {} events, {} segments, {} digis ({} noise)",
            stats.events, stats.modules.segments, stats.modules.digis, stats.modules.noise_digis
        );
        Ok(digis)
    }

    /// Drops all buffered signals, abandoning the current processing unit.
    pub fn abort(&mut self) {
        for module in &mut self.modules {
            module.reset();
        }
    }

    /// Counters summed over all modules.
    #[must_use]
    pub fn statistics(&self) -> DigitizeStatistics {
        let mut stats = DigitizeStatistics {
            events: self.events,
            segments_unknown_sensor: self.unknown_sensor,
            ..Default::default()
        };
        for module in &self.modules {
            stats.modules.merge(module.statistics());
            stats.signals.merge(module.buffer_statistics());
        }
        stats
    }
}

/// Stores the mean Lorentz shift of every sensor as its reconstruction
/// correction. The back side of an orthogonal sensor measures y and gets
/// no correction.
///
/// # Errors
/// Returns an error if a sensor has no derived parameters.
pub fn set_lorentz_corrections(ctx: &mut DetectorContext) -> Result<()> {
    let corrections: Vec<_> = ctx
        .sensors()
        .iter()
        .map(|sensor| {
            let d = sensor.geometry.dz;
            let shift = |side: Side| match (sensor.geometry.layout, side) {
                (StripLayout::Orthogonal { .. }, Side::Back) => 0.0,
                _ => mean_lorentz_shift(&sensor.conditions, d, ChargeCarrier::for_side(side)),
            };
            (sensor.address, [shift(Side::Front), shift(Side::Back)])
        })
        .collect();
    for (address, shift) in corrections {
        debug!("{address}: Lorentz correction {:.2e} / {:.2e} cm", shift[0], shift[1]);
        ctx.set_lorentz_correction(address, shift)?;
    }
    Ok(())
}
