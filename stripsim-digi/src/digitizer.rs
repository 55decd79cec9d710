//! Conversion of released analog signals into digis, and noise generation.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use crate::buffer::ChannelSignalBuffer;
use crate::error::{Error, Result};
use crate::physics::poisson;
use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};
use stripsim_core::{Digi, Match, ModuleParams, Signal, StsAddress};

/// Threshold, ADC and time-stamp response of a module's read-out.
#[derive(Debug, Clone, Copy)]
pub struct Digitizer<'a> {
    address: StsAddress,
    params: &'a ModuleParams,
    noise_smearing: bool,
}

impl<'a> Digitizer<'a> {
    /// Creates a digitizer for a module.
    ///
    /// With `noise_smearing`, a Gaussian of the channel noise is added to
    /// every physics signal before the threshold is applied.
    #[must_use]
    pub fn new(address: StsAddress, params: &'a ModuleParams, noise_smearing: bool) -> Self {
        Self {
            address,
            params,
            noise_smearing,
        }
    }

    /// Digitizes one signal; `None` if its charge is below threshold.
    ///
    /// # Errors
    /// Returns an error for a channel outside the module.
    pub fn digitize<R: Rng + ?Sized>(&self, signal: Signal, rng: &mut R) -> Result<Option<Digi>> {
        self.params.check_channel(signal.channel)?;
        let asic = self.params.asic(signal.channel);

        let mut charge = signal.charge;
        if self.noise_smearing && asic.noise > 0.0 && !signal.is_noise() {
            charge += gaussian(rng, asic.noise)?;
        }
        let Some(adc) = asic.charge_to_adc(charge) else {
            return Ok(None);
        };

        let time = (signal.time + gaussian(rng, asic.time_resolution)?)
            .round()
            .max(0.0) as u64;
        Ok(Some(Digi::new(
            self.address,
            signal.channel,
            time,
            adc,
            signal.provenance,
        )))
    }

    /// Injects noise signals in `[t1, t2)` into the buffer, channel by
    /// channel. Returns the number of generated signals.
    ///
    /// # Errors
    /// Returns an error if a noise distribution cannot be built.
    pub fn generate_noise<R: Rng + ?Sized>(
        &self,
        buffer: &mut ChannelSignalBuffer,
        t1: f64,
        t2: f64,
        rng: &mut R,
    ) -> Result<usize> {
        if !(t2 > t1) {
            return Ok(0);
        }
        let mut generated = 0;
        for channel in 0..self.params.nof_channels() {
            if !self.params.is_channel_active(channel) {
                continue;
            }
            let asic = self.params.asic(channel);
            let count = poisson(rng, asic.noise_rate() * (t2 - t1))?;
            for _ in 0..count {
                let time = rng.gen_range(t1..t2);
                let charge = noise_charge(rng, asic.noise, asic.threshold)?;
                buffer.add_signal(channel, time, charge, Match::new())?;
                generated += 1;
            }
        }
        Ok(generated)
    }
}

fn gaussian<R: Rng + ?Sized>(rng: &mut R, sigma: f64) -> Result<f64> {
    if sigma <= 0.0 {
        return Ok(0.0);
    }
    let normal = Normal::new(0.0, sigma).map_err(|e| Error::Distribution {
        name: "normal",
        reason: e.to_string(),
    })?;
    Ok(normal.sample(rng))
}

/// Samples a noise charge from a zero-mean Gaussian of width `noise`,
/// truncated below at `threshold`.
///
/// Uses an exponential proposal for the tail beyond the threshold.
///
/// # Errors
/// Returns an error if `noise` is not positive.
pub fn noise_charge<R: Rng + ?Sized>(rng: &mut R, noise: f64, threshold: f64) -> Result<f64> {
    if !(noise > 0.0) {
        return Err(Error::Distribution {
            name: "noise charge",
            reason: format!("noise {noise} is not positive"),
        });
    }
    let a = threshold / noise;
    if a <= 0.0 {
        let normal = Normal::new(0.0, 1.0).map_err(|e| Error::Distribution {
            name: "normal",
            reason: e.to_string(),
        })?;
        loop {
            let z: f64 = normal.sample(rng);
            if z >= a {
                return Ok(z * noise);
            }
        }
    }
    let lambda = 0.5 * (a + (a * a + 4.0).sqrt());
    let exp = Exp::new(lambda).map_err(|e| Error::Distribution {
        name: "exponential",
        reason: e.to_string(),
    })?;
    loop {
        let z = a + exp.sample(rng);
        let u: f64 = rng.gen();
        if u <= (-0.5 * (z - lambda) * (z - lambda)).exp() {
            return Ok(z * noise);
        }
    }
}
