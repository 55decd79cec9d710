//! A simulated read-out module: signal buffer, digitizer and random stream.

use crate::buffer::{BufferStatistics, ChannelSignalBuffer, FlushHorizon};
use crate::config::PhysicsSettings;
use crate::digitizer::Digitizer;
use crate::error::Result;
use crate::transport::ChargeTransport;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use stripsim_core::{Digi, ModuleParams, SensorDssd, StsAddress, TrajectorySegment};

/// Counters of one module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleStatistics {
    /// Segments transported.
    pub segments: usize,
    /// Charge points lost outside the active area.
    pub charges_outside: usize,
    /// Noise signals generated.
    pub noise_signals: usize,
    /// Released signals below threshold.
    pub below_threshold: usize,
    /// Digis produced.
    pub digis: usize,
    /// Digis without physics provenance.
    pub noise_digis: usize,
}

impl ModuleStatistics {
    /// Adds another set of counters.
    pub fn merge(&mut self, other: &ModuleStatistics) {
        self.segments += other.segments;
        self.charges_outside += other.charges_outside;
        self.noise_signals += other.noise_signals;
        self.below_threshold += other.below_threshold;
        self.digis += other.digis;
        self.noise_digis += other.noise_digis;
    }
}

/// Seed of a module's random stream, derived from the run seed and the
/// module address.
#[must_use]
pub fn module_seed(run_seed: u64, address: StsAddress) -> u64 {
    run_seed ^ u64::from(address.raw()).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Digitization state owned by one module.
#[derive(Debug, Clone)]
pub struct SimModule {
    address: StsAddress,
    params: ModuleParams,
    buffer: ChannelSignalBuffer,
    rng: ChaCha8Rng,
    stats: ModuleStatistics,
}

impl SimModule {
    /// Creates the module, flags the listed dead channels and draws its
    /// random ones.
    ///
    /// # Errors
    /// Returns an error if the dead-channel map cannot be applied.
    pub fn new(
        address: StsAddress,
        mut params: ModuleParams,
        run_seed: u64,
        dead_channel_fraction: f64,
        dead_channels: &[u16],
    ) -> Result<Self> {
        let mut rng = ChaCha8Rng::seed_from_u64(module_seed(run_seed, address));
        params.set_dead_channels(dead_channels.iter().copied())?;
        if dead_channel_fraction > 0.0 {
            let dead: Vec<u16> = (0..params.nof_channels())
                .filter(|_| rng.gen_bool(dead_channel_fraction))
                .collect();
            params.set_dead_channels(dead)?;
        }
        let buffer = ChannelSignalBuffer::new(&params);
        Ok(Self {
            address,
            params,
            buffer,
            rng,
            stats: ModuleStatistics::default(),
        })
    }

    /// Module address.
    #[must_use]
    pub fn address(&self) -> StsAddress {
        self.address
    }

    /// Module parameters including the dead-channel map.
    #[must_use]
    pub fn params(&self) -> &ModuleParams {
        &self.params
    }

    /// Signal buffer.
    #[must_use]
    pub fn buffer(&self) -> &ChannelSignalBuffer {
        &self.buffer
    }

    /// Transports a segment on one of the module's sensors into the buffer.
    /// Signal times are offset by `event_time`.
    ///
    /// # Errors
    /// Returns an error if sampling fails or a channel is out of range.
    pub fn process_segment(
        &mut self,
        sensor: &SensorDssd,
        physics: &PhysicsSettings,
        segment: &TrajectorySegment,
        event_time: f64,
    ) -> Result<()> {
        let transport = ChargeTransport::new(sensor, physics);
        let charges = transport.produce_charge(segment, &mut self.rng)?;
        self.stats.segments += 1;
        self.stats.charges_outside += charges.outside();
        for signal in transport.signals(&charges, event_time + segment.time, segment.origin) {
            self.buffer
                .add_signal(signal.channel, signal.time, signal.charge, signal.provenance)?;
        }
        Ok(())
    }

    /// Generates noise in `[t1, t2)`.
    ///
    /// # Errors
    /// Returns an error if a noise distribution cannot be built.
    pub fn generate_noise(&mut self, t1: f64, t2: f64) -> Result<usize> {
        let digitizer = Digitizer::new(self.address, &self.params, false);
        let n = digitizer.generate_noise(&mut self.buffer, t1, t2, &mut self.rng)?;
        self.stats.noise_signals += n;
        Ok(n)
    }

    /// Releases signals up to the horizon and digitizes them.
    ///
    /// # Errors
    /// Returns an error for out-of-range channels or bad distributions.
    pub fn read_out(&mut self, horizon: FlushHorizon, noise_smearing: bool) -> Result<Vec<Digi>> {
        let digitizer = Digitizer::new(self.address, &self.params, noise_smearing);
        let released = self.buffer.flush(horizon);
        let mut digis = Vec::with_capacity(released.len());
        for signal in released {
            match digitizer.digitize(signal, &mut self.rng)? {
                Some(digi) => {
                    if digi.is_noise() {
                        self.stats.noise_digis += 1;
                    }
                    digis.push(digi);
                }
                None => self.stats.below_threshold += 1,
            }
        }
        self.stats.digis += digis.len();
        Ok(digis)
    }

    /// Discards everything still buffered.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Module counters.
    #[must_use]
    pub fn statistics(&self) -> &ModuleStatistics {
        &self.stats
    }

    /// Buffer counters.
    #[must_use]
    pub fn buffer_statistics(&self) -> &BufferStatistics {
        self.buffer.statistics()
    }
}
