//! Silicon sensor physics: carrier mobility, drift, diffusion, energy loss.
//!
//! Units: cm, ns, V, K, T, GeV. Charge is counted in electrons.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::error::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use stripsim_core::{SensorConditions, Side};

/// Mean energy to create one electron-hole pair in silicon [GeV].
pub const PAIR_CREATION_ENERGY: f64 = 3.571_428_57e-9;

/// Electron mass [GeV].
pub const ELECTRON_MASS: f64 = 0.000_510_999;

/// Atomic mass unit [GeV].
pub const ATOMIC_MASS_UNIT: f64 = 0.931_494_1;

/// Boltzmann constant over elementary charge [V/K].
const K_OVER_E: f64 = 8.617_333e-5;

/// Charge carrier type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeCarrier {
    /// Electrons, collected on the front side (z = +d/2).
    Electron,
    /// Holes, collected on the back side (z = −d/2).
    Hole,
}

impl ChargeCarrier {
    /// Carrier read out on a sensor side.
    #[inline]
    #[must_use]
    pub fn for_side(side: Side) -> Self {
        match side {
            Side::Front => ChargeCarrier::Electron,
            Side::Back => ChargeCarrier::Hole,
        }
    }
}

/// Hall mobility of a carrier in the given field [cm²/(V s)].
///
/// Low-field mobility, saturation velocity and the field exponent are
/// temperature-scaled; the Hall scattering factor is applied at the end.
#[must_use]
pub fn hall_mobility(e_field: f64, temperature: f64, carrier: ChargeCarrier) -> f64 {
    let t = temperature / 300.0;
    let (mu_low, v_sat, beta, r_hall) = match carrier {
        ChargeCarrier::Electron => (
            1417.0 * t.powf(-2.2),
            1.07e7 * t.powf(0.87),
            1.109 * t.powf(0.66),
            1.15,
        ),
        ChargeCarrier::Hole => (
            470.5 * t.powf(-2.5),
            8.37e6 * t.powf(0.52),
            1.213 * t.powf(0.17),
            0.7,
        ),
    };
    let mu = mu_low / (1.0 + (mu_low * e_field.abs() / v_sat).powf(beta)).powf(1.0 / beta);
    r_hall * mu
}

/// Electric field at distance `z` from the back plane of a sensor of
/// thickness `d` [V/cm].
#[inline]
#[must_use]
pub fn electric_field(v_bias: f64, v_fd: f64, d: f64, z: f64) -> f64 {
    (v_bias + v_fd * (2.0 * z / d - 1.0)) / d
}

/// Lorentz shift along x for a carrier created at local depth `z`
/// (z ∈ [−d/2, d/2]) in a magnetic field with y component `b_y` [cm].
///
/// The mobility is evaluated at the mean field along the drift path.
#[must_use]
pub fn lorentz_shift(
    conditions: &SensorConditions,
    d: f64,
    z: f64,
    carrier: ChargeCarrier,
    b_y: f64,
) -> f64 {
    let z_back = (z + 0.5 * d).clamp(0.0, d);
    let field = |depth| electric_field(conditions.v_bias, conditions.v_fd, d, depth);
    let (drift, mean_field) = match carrier {
        ChargeCarrier::Electron => (d - z_back, 0.5 * (field(z_back) + field(d))),
        ChargeCarrier::Hole => (z_back, 0.5 * (field(z_back) + field(0.0))),
    };
    let mu = hall_mobility(mean_field, conditions.temperature, carrier);
    mu * b_y * drift * 1.0e-4
}

/// Lorentz shift averaged over a uniform charge deposit across the full
/// thickness, as seen by the side collecting `carrier` [cm].
#[must_use]
pub fn mean_lorentz_shift(conditions: &SensorConditions, d: f64, carrier: ChargeCarrier) -> f64 {
    const SAMPLES: usize = 64;
    let b_y = conditions.field[1];
    (0..SAMPLES)
        .map(|i| {
            let z = ((i as f64 + 0.5) / SAMPLES as f64 - 0.5) * d;
            lorentz_shift(conditions, d, z, carrier, b_y)
        })
        .sum::<f64>()
        / SAMPLES as f64
}

/// Width of the charge cloud after drifting from local depth `z` to the
/// collecting side [cm].
///
/// Diffusion constant and drift time both scale with the mobility, so the
/// width depends only on the field profile and the temperature.
#[must_use]
pub fn diffusion_width(conditions: &SensorConditions, d: f64, z: f64, carrier: ChargeCarrier) -> f64 {
    let z_back = (z + 0.5 * d).clamp(0.0, d);
    let v_bias = conditions.v_bias;
    let v_fd = conditions.v_fd;
    let ratio = match carrier {
        ChargeCarrier::Electron => (v_bias + v_fd) / (v_bias - v_fd + 2.0 * v_fd * z_back / d),
        ChargeCarrier::Hole => (v_bias - v_fd + 2.0 * v_fd * z_back / d) / (v_bias - v_fd),
    };
    let kt_over_e = K_OVER_E * conditions.temperature;
    d * (kt_over_e / v_fd * ratio.ln()).max(0.0).sqrt()
}

/// Mass and charge of a particle species.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Rest mass [GeV].
    pub mass: f64,
    /// Charge in units of e.
    pub charge: f64,
}

impl Particle {
    /// Looks up a particle by PDG code.
    ///
    /// Nuclei (`10LZZZAAAI`) get A atomic mass units and charge Z.
    /// Unknown codes are treated as pions.
    #[must_use]
    pub fn from_pdg(pdg: i32) -> Self {
        let sign = f64::from(pdg.signum());
        let (mass, charge) = match pdg.abs() {
            11 => (ELECTRON_MASS, -1.0),
            13 => (0.105_658_4, -1.0),
            211 => (0.139_57, 1.0),
            321 => (0.493_677, 1.0),
            2212 => (0.938_272, 1.0),
            code if code > 1_000_000_000 => {
                let z = (code / 10_000) % 1000;
                let a = (code / 10) % 1000;
                return Self {
                    mass: f64::from(a) * ATOMIC_MASS_UNIT,
                    charge: f64::from(z),
                };
            }
            _ => (0.139_57, 1.0),
        };
        Self {
            mass,
            charge: charge * sign,
        }
    }

    /// Kinetic energy for a momentum [GeV].
    #[inline]
    #[must_use]
    pub fn kinetic_energy(&self, momentum: f64) -> f64 {
        (momentum * momentum + self.mass * self.mass).sqrt() - self.mass
    }
}

/// Mean energy loss per unit length in silicon, Bethe-Bloch without density
/// correction [GeV/cm].
#[must_use]
pub fn stopping_power(e_kin: f64, particle: &Particle) -> f64 {
    const K: f64 = 0.307_075; // MeV cm²/mol
    const Z_OVER_A: f64 = 0.498_48;
    const DENSITY: f64 = 2.329; // g/cm³
    const MEAN_EXCITATION: f64 = 173.0e-6; // MeV

    let mass = particle.mass * 1.0e3;
    let gamma = (e_kin * 1.0e3 + mass) / mass;
    let beta2 = 1.0 - 1.0 / (gamma * gamma);
    if beta2 <= 0.0 {
        return 0.0;
    }
    let me = ELECTRON_MASS * 1.0e3;
    let bg2 = beta2 * gamma * gamma;
    let ratio = me / mass;
    let t_max = 2.0 * me * bg2 / (1.0 + 2.0 * gamma * ratio + ratio * ratio);
    let log_term = 0.5 * (2.0 * me * bg2 * t_max / (MEAN_EXCITATION * MEAN_EXCITATION)).ln();
    let z2 = particle.charge * particle.charge;
    let de_dx = K * z2 * Z_OVER_A * DENSITY / beta2 * (log_term - beta2);
    de_dx.max(0.0) * 1.0e-3
}

/// Energy-loss fluctuation model after Urban (compound Poisson of two
/// excitation levels and an ionisation continuum).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UrbanModel {
    mean_ionisation: f64,
    e1: f64,
    e2: f64,
    f1: f64,
    f2: f64,
    e_max: f64,
    r: f64,
}

impl Default for UrbanModel {
    fn default() -> Self {
        Self::for_element(14.0)
    }
}

impl UrbanModel {
    /// Model parameters for a medium of atomic number `z`.
    #[must_use]
    pub fn for_element(z: f64) -> Self {
        let mean_ionisation = 16.0e-9 * z.powf(0.9);
        let f2 = if z > 2.0 { 2.0 / z } else { 0.0 };
        let f1 = 1.0 - f2;
        let e2 = 1.0e-8 * z * z;
        let e1 = (mean_ionisation / e2.powf(f2)).powf(1.0 / f1);
        Self {
            mean_ionisation,
            e1,
            e2,
            f1,
            f2,
            e_max: 1.0e-5,
            r: 0.4,
        }
    }

    /// Samples the energy loss over a step of length `dz` [GeV].
    ///
    /// `dedx` is the mean stopping power [GeV/cm].
    ///
    /// # Errors
    /// Returns [`Error::Distribution`] if a Poisson mean is not finite.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        dz: f64,
        mass: f64,
        e_kin: f64,
        dedx: f64,
    ) -> Result<f64> {
        let gamma = (e_kin + mass) / mass;
        let beta2 = 1.0 - 1.0 / (gamma * gamma);
        let x_aux = 2.0 * ELECTRON_MASS * beta2 * gamma * gamma;
        let denom = (x_aux / self.mean_ionisation).ln() - beta2;

        let excitation = |f: f64, e: f64| {
            if denom <= 0.0 {
                return 0.0;
            }
            (dedx * f / e * ((x_aux / e).ln() - beta2) / denom * (1.0 - self.r)).max(0.0)
        };
        let sigma1 = excitation(self.f1, self.e1);
        let sigma2 = excitation(self.f2, self.e2);
        let i = self.mean_ionisation;
        let sigma3 = dedx * self.e_max * self.r / (i * (self.e_max + i) * ((self.e_max + i) / i).ln());

        let n1 = poisson(rng, sigma1 * dz)?;
        let n2 = poisson(rng, sigma2 * dz)?;
        let n3 = poisson(rng, sigma3.max(0.0) * dz)?;

        let mut loss = n1 as f64 * self.e1 + n2 as f64 * self.e2;
        for _ in 0..n3 {
            let u: f64 = rng.gen();
            loss += i / (1.0 - u * self.e_max / (self.e_max + i));
        }
        Ok(loss)
    }
}

/// Poisson sample; a non-positive mean yields zero.
pub(crate) fn poisson<R: Rng + ?Sized>(rng: &mut R, mean: f64) -> Result<u64> {
    if mean <= 0.0 {
        return Ok(0);
    }
    let dist = Poisson::new(mean).map_err(|e| Error::Distribution {
        name: "poisson",
        reason: e.to_string(),
    })?;
    let n: f64 = dist.sample(rng);
    Ok(n as u64)
}
