//! Read-out ASIC and module parameters.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_lossless)]

use crate::error::{Error, Result};
use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters of one read-out ASIC, shared by all its channels.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AsicParams {
    /// Number of ADC levels.
    pub nof_adc: u16,
    /// Dynamic range above threshold [e].
    pub dyn_range: f64,
    /// Threshold [e].
    pub threshold: f64,
    /// Time resolution (Gaussian sigma) [ns].
    pub time_resolution: f64,
    /// Single-channel dead time [ns].
    pub dead_time: f64,
    /// Equivalent noise charge (RMS) [e].
    pub noise: f64,
    /// Noise rate at zero threshold [1/ns].
    pub zero_noise_rate: f64,
}

impl Default for AsicParams {
    fn default() -> Self {
        Self {
            nof_adc: 32,
            dyn_range: 75_000.0,
            threshold: 3_000.0,
            time_resolution: 5.0,
            dead_time: 800.0,
            noise: 1_000.0,
            zero_noise_rate: 3.9789e-3,
        }
    }
}

impl AsicParams {
    /// Checks that all parameters are physical.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] for the first offending value.
    pub fn validate(&self) -> Result<()> {
        if self.nof_adc == 0 {
            return Err(Error::invalid("nof_adc", "must be positive"));
        }
        if !(self.dyn_range > 0.0) {
            return Err(Error::invalid("dyn_range", "must be positive"));
        }
        if !(self.threshold >= 0.0) {
            return Err(Error::invalid("threshold", "must not be negative"));
        }
        if !(self.time_resolution > 0.0) {
            return Err(Error::invalid("time_resolution", "must be positive"));
        }
        if !(self.dead_time >= 0.0) {
            return Err(Error::invalid("dead_time", "must not be negative"));
        }
        if !(self.noise >= 0.0) {
            return Err(Error::invalid("noise", "must not be negative"));
        }
        if !(self.zero_noise_rate >= 0.0) {
            return Err(Error::invalid("zero_noise_rate", "must not be negative"));
        }
        Ok(())
    }

    /// Charge corresponding to one ADC step [e].
    #[inline]
    #[must_use]
    pub fn charge_per_adc(&self) -> f64 {
        self.dyn_range / f64::from(self.nof_adc)
    }

    /// ADC code for a charge, or `None` below threshold.
    #[must_use]
    pub fn charge_to_adc(&self, charge: f64) -> Option<u16> {
        if charge < self.threshold {
            return None;
        }
        let adc = ((charge - self.threshold) / self.charge_per_adc()).floor();
        let max = f64::from(self.nof_adc - 1);
        Some(adc.clamp(0.0, max) as u16)
    }

    /// Charge at the centre of an ADC bin [e].
    #[inline]
    #[must_use]
    pub fn adc_to_charge(&self, adc: u16) -> f64 {
        self.threshold + self.charge_per_adc() * (f64::from(adc) + 0.5)
    }

    /// Variance of the charge from ADC quantization [e²].
    #[inline]
    #[must_use]
    pub fn quantization_variance(&self) -> f64 {
        let step = self.charge_per_adc();
        step * step / 12.0
    }

    /// Rate of noise signals above threshold [1/ns].
    #[must_use]
    pub fn noise_rate(&self) -> f64 {
        if self.noise <= 0.0 {
            return 0.0;
        }
        let ratio = self.threshold / self.noise;
        0.5 * self.zero_noise_rate * (-0.5 * ratio * ratio).exp()
    }

    /// Interval before the readout time during which a signal may still be
    /// merged with a later one [ns].
    #[inline]
    #[must_use]
    pub fn readout_margin(&self) -> f64 {
        5.0 * self.time_resolution + self.dead_time
    }
}

/// Parameters of one read-out module: its ASICs and dead channels.
///
/// Channels `[0, n/2)` read the front side, `[n/2, n)` the back side.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModuleParams {
    nof_channels: u16,
    channels_per_asic: u16,
    asics: Vec<AsicParams>,
    dead_channels: BTreeSet<u16>,
}

impl ModuleParams {
    /// Standard module: 2048 channels read by 16 ASICs of 128 channels.
    pub const DEFAULT_CHANNELS: u16 = 2048;
    /// Channels served by one ASIC.
    pub const DEFAULT_CHANNELS_PER_ASIC: u16 = 128;

    /// Creates module parameters with identical ASICs.
    ///
    /// # Errors
    /// Returns an error if the channel counts are inconsistent or the ASIC
    /// parameters are invalid.
    pub fn new(nof_channels: u16, channels_per_asic: u16, asic: AsicParams) -> Result<Self> {
        if nof_channels == 0 || nof_channels % 2 != 0 {
            return Err(Error::invalid(
                "nof_channels",
                format!("{nof_channels} is not a positive even number"),
            ));
        }
        if channels_per_asic == 0 || nof_channels % channels_per_asic != 0 {
            return Err(Error::invalid(
                "channels_per_asic",
                format!("{channels_per_asic} does not divide {nof_channels}"),
            ));
        }
        asic.validate()?;
        let nof_asics = (nof_channels / channels_per_asic) as usize;
        Ok(Self {
            nof_channels,
            channels_per_asic,
            asics: vec![asic; nof_asics],
            dead_channels: BTreeSet::new(),
        })
    }

    /// Standard module layout with the given ASIC parameters.
    ///
    /// # Errors
    /// Returns an error if the ASIC parameters are invalid.
    pub fn with_asic(asic: AsicParams) -> Result<Self> {
        Self::new(
            Self::DEFAULT_CHANNELS,
            Self::DEFAULT_CHANNELS_PER_ASIC,
            asic,
        )
    }

    /// Number of channels.
    #[inline]
    #[must_use]
    pub fn nof_channels(&self) -> u16 {
        self.nof_channels
    }

    /// Number of channels per sensor side.
    #[inline]
    #[must_use]
    pub fn channels_per_side(&self) -> u16 {
        self.nof_channels / 2
    }

    /// Number of ASICs.
    #[inline]
    #[must_use]
    pub fn nof_asics(&self) -> usize {
        self.asics.len()
    }

    /// Parameters of the ASIC reading `channel`.
    ///
    /// # Panics
    /// Panics if the channel is outside the module; callers check channel
    /// ranges at the module boundary.
    #[inline]
    #[must_use]
    pub fn asic(&self, channel: u16) -> &AsicParams {
        &self.asics[(channel / self.channels_per_asic) as usize]
    }

    /// Replaces the parameters of one ASIC.
    ///
    /// # Errors
    /// Returns an error for an unknown ASIC or invalid parameters.
    pub fn set_asic(&mut self, index: usize, asic: AsicParams) -> Result<()> {
        asic.validate()?;
        let nof_asics = self.asics.len();
        let slot = self.asics.get_mut(index).ok_or_else(|| {
            Error::invalid("asic", format!("index {index} >= {nof_asics}"))
        })?;
        *slot = asic;
        Ok(())
    }

    /// All ASIC parameter sets.
    #[must_use]
    pub fn asics(&self) -> &[AsicParams] {
        &self.asics
    }

    /// Checks a channel number against the module size.
    ///
    /// # Errors
    /// Returns [`Error::ChannelOutOfRange`].
    #[inline]
    pub fn check_channel(&self, channel: u16) -> Result<()> {
        if channel >= self.nof_channels {
            return Err(Error::ChannelOutOfRange {
                channel,
                nof_channels: self.nof_channels,
            });
        }
        Ok(())
    }

    /// Marks channels as permanently dead.
    ///
    /// # Errors
    /// Returns [`Error::ChannelOutOfRange`] for channels outside the module.
    pub fn set_dead_channels<I: IntoIterator<Item = u16>>(&mut self, channels: I) -> Result<()> {
        for channel in channels {
            self.check_channel(channel)?;
            self.dead_channels.insert(channel);
        }
        Ok(())
    }

    /// Dead channel set.
    #[must_use]
    pub fn dead_channels(&self) -> &BTreeSet<u16> {
        &self.dead_channels
    }

    /// True unless the channel is flagged dead.
    #[inline]
    #[must_use]
    pub fn is_channel_active(&self, channel: u16) -> bool {
        !self.dead_channels.contains(&channel)
    }

    /// Largest readout margin over all ASICs [ns].
    #[must_use]
    pub fn max_readout_margin(&self) -> f64 {
        self.asics
            .iter()
            .map(AsicParams::readout_margin)
            .fold(0.0, f64::max)
    }
}
