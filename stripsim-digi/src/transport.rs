//! Charge generation and transport from a trajectory segment to strips.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::config::{EnergyLossModel, PhysicsSettings};
use crate::error::Result;
use crate::physics::{
    diffusion_width, lorentz_shift, stopping_power, ChargeCarrier, Particle, UrbanModel,
    PAIR_CREATION_ENERGY,
};
use rand::Rng;
use statrs::function::erf::erfc;
use std::f64::consts::SQRT_2;
use stripsim_core::{Origin, SensorDssd, Side, Signal, TrajectorySegment};

/// Charge collected per strip on both sides of one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct StripCharges {
    charges: [Vec<f64>; 2],
    outside: usize,
}

impl StripCharges {
    /// Empty accumulator sized for a sensor.
    #[must_use]
    pub fn new(sensor: &SensorDssd) -> Self {
        Self {
            charges: [
                vec![0.0; usize::from(sensor.nof_strips(Side::Front))],
                vec![0.0; usize::from(sensor.nof_strips(Side::Back))],
            ],
            outside: 0,
        }
    }

    /// Adds charge to a strip.
    #[inline]
    pub fn add(&mut self, side: Side, strip: u16, charge: f64) {
        self.charges[side.index()][usize::from(strip)] += charge;
    }

    /// Strip charges of one side.
    #[must_use]
    pub fn side(&self, side: Side) -> &[f64] {
        &self.charges[side.index()]
    }

    /// Total charge on one side.
    #[must_use]
    pub fn total(&self, side: Side) -> f64 {
        self.charges[side.index()].iter().sum()
    }

    /// Number of charge points lost outside the active area (counted per side).
    #[must_use]
    pub fn outside(&self) -> usize {
        self.outside
    }

    /// Multiplies all strip charges by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for side in &mut self.charges {
            for q in side.iter_mut() {
                *q *= factor;
            }
        }
    }

    /// Applies capacitive cross-talk with coupling coefficient `c` on both sides.
    pub fn apply_cross_talk(&mut self, c: f64) {
        for side in &mut self.charges {
            *side = cross_talk(side, c);
        }
    }
}

/// Convolves strip charges with the 3-tap cross-talk kernel.
///
/// Interior strips keep `1 − 2c` of their charge, the two edge strips
/// `1 − c`; each neighbour receives `c`. Total charge is conserved.
#[must_use]
pub fn cross_talk(charges: &[f64], c: f64) -> Vec<f64> {
    let n = charges.len();
    match n {
        0 => Vec::new(),
        1 => charges.to_vec(),
        _ => (0..n)
            .map(|i| {
                let left = if i > 0 { charges[i - 1] } else { 0.0 };
                let right = if i + 1 < n { charges[i + 1] } else { 0.0 };
                let neighbours = usize::from(i > 0) + usize::from(i + 1 < n);
                (1.0 - c * neighbours as f64) * charges[i] + c * (left + right)
            })
            .collect(),
    }
}

/// Charge transport model for one sensor.
#[derive(Debug, Clone)]
pub struct ChargeTransport<'a> {
    sensor: &'a SensorDssd,
    physics: &'a PhysicsSettings,
    urban: UrbanModel,
}

impl<'a> ChargeTransport<'a> {
    /// Creates the model for a prepared sensor.
    #[must_use]
    pub fn new(sensor: &'a SensorDssd, physics: &'a PhysicsSettings) -> Self {
        Self {
            sensor,
            physics,
            urban: UrbanModel::default(),
        }
    }

    /// Distributes the charge of a segment over the strips of both sides.
    ///
    /// # Errors
    /// Returns an error if the energy-loss sampling fails.
    pub fn produce_charge<R: Rng + ?Sized>(
        &self,
        segment: &TrajectorySegment,
        rng: &mut R,
    ) -> Result<StripCharges> {
        let mut charges = StripCharges::new(self.sensor);
        let total = segment.energy_loss / PAIR_CREATION_ENERGY;
        if total <= 0.0 {
            return Ok(charges);
        }

        match self.physics.energy_loss {
            EnergyLossModel::Ideal => {
                self.deposit(segment.midpoint(), total, &mut charges);
            }
            EnergyLossModel::Uniform => {
                let n = self.nof_steps(segment);
                let q = total / n as f64;
                for i in 0..n {
                    let t = (i as f64 + 0.5) / n as f64;
                    self.deposit(segment.point_at(t), q, &mut charges);
                }
            }
            EnergyLossModel::Urban => {
                let losses = self.sample_losses(segment, rng)?;
                let sampled: f64 = losses.iter().sum();
                let n = losses.len();
                for (i, loss) in losses.iter().enumerate() {
                    let t = (i as f64 + 0.5) / n as f64;
                    let q = if sampled > 0.0 {
                        total * loss / sampled
                    } else {
                        total / n as f64
                    };
                    self.deposit(segment.point_at(t), q, &mut charges);
                }
            }
        }

        if self.physics.cross_talk {
            charges.apply_cross_talk(self.sensor.conditions().cross_talk_coefficient());
        }
        Ok(charges)
    }

    /// Registers every non-empty strip as a signal on its module channel.
    #[must_use]
    pub fn signals(&self, charges: &StripCharges, time: f64, origin: Origin) -> Vec<Signal> {
        let mut signals = Vec::new();
        for side in Side::BOTH {
            for (strip, &q) in charges.side(side).iter().enumerate() {
                if q > 0.0 {
                    let channel = self.sensor.module_channel(strip as u16, side);
                    signals.push(Signal::new(channel, time, q, origin));
                }
            }
        }
        signals
    }

    fn nof_steps(&self, segment: &TrajectorySegment) -> usize {
        ((segment.length() / self.physics.step_size).round() as usize).max(1)
    }

    fn sample_losses<R: Rng + ?Sized>(
        &self,
        segment: &TrajectorySegment,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        let n = self.nof_steps(segment);
        let step = segment.length() / n as f64;
        let particle = Particle::from_pdg(segment.pdg);
        let e_kin = particle.kinetic_energy(segment.momentum_magnitude());
        let dedx = stopping_power(e_kin, &particle);
        (0..n)
            .map(|_| self.urban.sample(rng, step, particle.mass, e_kin, dedx))
            .collect()
    }

    fn deposit(&self, point: [f64; 3], charge: f64, out: &mut StripCharges) {
        let sensor = self.sensor;
        let conditions = sensor.conditions();
        let dz = sensor.geometry().dz;
        for side in Side::BOTH {
            let carrier = ChargeCarrier::for_side(side);
            let mut x = point[0];
            let y = point[1];
            if self.physics.lorentz_shift {
                x += lorentz_shift(conditions, dz, point[2], carrier, conditions.field[1]);
            }
            if !sensor.is_inside(x, y) {
                out.outside += 1;
                continue;
            }
            let coordinate = sensor.readout_coordinate(x, y, side);
            let Some(strip) = sensor.strip_of_coordinate(coordinate, side) else {
                out.outside += 1;
                continue;
            };

            let sigma = if self.physics.diffusion {
                diffusion_width(conditions, dz, point[2], carrier)
            } else {
                0.0
            };
            if sigma <= 0.0 {
                out.add(side, strip, charge);
                continue;
            }

            let pitch = sensor.pitch(side);
            let x_rel = coordinate - (coordinate / pitch).floor() * pitch;
            let cos = sensor.cos_stereo(side);
            let width = SQRT_2 * sigma;
            let frac_left = 0.5 * erfc(x_rel * cos / width);
            let frac_right = 0.5 * erfc((pitch - x_rel) * cos / width);
            let (left, right) = sensor.neighbour_strips(strip, side);

            out.add(side, strip, charge * (1.0 - frac_left - frac_right));
            if let Some(left) = left {
                out.add(side, left, charge * frac_left);
            }
            if let Some(right) = right {
                out.add(side, right, charge * frac_right);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use stripsim_core::{SensorConditions, SensorGeometry, StripLayout, StsAddress};

    fn sensor(field: f64) -> SensorDssd {
        let geometry = SensorGeometry {
            dx: 0.0058 * 1024.0,
            dy: 4.0,
            dz: 0.03,
            layout: StripLayout::Stereo {
                pitch: 0.0058,
                stereo_front: 0.0,
                stereo_back: 7.5,
            },
        };
        let conditions = SensorConditions {
            field: [0.0, field, 0.0],
            ..Default::default()
        };
        SensorDssd::prepare(geometry, conditions, 0, 1024).unwrap()
    }

    fn segment(x: f64, energy_loss: f64) -> TrajectorySegment {
        TrajectorySegment {
            address: StsAddress::default(),
            entry: [x, 0.0, -0.015],
            exit: [x, 0.0, 0.015],
            momentum: [0.0, 0.0, 1.0],
            energy_loss,
            pdg: 211,
            time: 0.0,
            origin: Origin::new(0, 1, 2),
        }
    }

    #[test]
    fn test_cross_talk_kernel() {
        let out = cross_talk(&[0.0, 100.0, 0.0, 0.0], 0.1);
        assert_relative_eq!(out[0], 10.0);
        assert_relative_eq!(out[1], 80.0);
        assert_relative_eq!(out[2], 10.0);
        assert_relative_eq!(out[3], 0.0);
        let edge = cross_talk(&[100.0, 0.0], 0.1);
        assert_relative_eq!(edge[0], 90.0);
        assert_relative_eq!(edge[1], 10.0);
    }

    #[test]
    fn test_ideal_deposit_single_strip() {
        let sensor = sensor(0.0);
        let physics = PhysicsSettings::ideal();
        let transport = ChargeTransport::new(&sensor, &physics);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        // Centre of strip 512 on the front side
        let x = (512.5 * 0.0058) - 0.5 * sensor.geometry().dx;
        let charges = transport.produce_charge(&segment(x, 1.0e-4), &mut rng).unwrap();

        let expected = 1.0e-4 / PAIR_CREATION_ENERGY;
        assert_relative_eq!(charges.side(Side::Front)[512], expected, max_relative = 1e-12);
        assert_relative_eq!(charges.total(Side::Front), expected, max_relative = 1e-12);
        assert_relative_eq!(charges.total(Side::Back), expected, max_relative = 1e-12);
        let signals = transport.signals(&charges, 25.0, Origin::new(0, 1, 2));
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].channel, 512);
        assert!(signals[1].channel >= 1024);
        assert_relative_eq!(signals[0].time, 25.0);
    }

    #[test]
    fn test_diffusion_conserves_charge() {
        let sensor = sensor(0.0);
        let physics = PhysicsSettings {
            energy_loss: EnergyLossModel::Uniform,
            lorentz_shift: false,
            diffusion: true,
            cross_talk: true,
            ..Default::default()
        };
        let transport = ChargeTransport::new(&sensor, &physics);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        // Near a strip boundary so that diffusion shares charge
        let x = 512.0 * 0.0058 + 1.0e-4 - 0.5 * sensor.geometry().dx;
        let charges = transport.produce_charge(&segment(x, 1.0e-4), &mut rng).unwrap();
        let expected = 1.0e-4 / PAIR_CREATION_ENERGY;
        assert_relative_eq!(charges.total(Side::Front), expected, max_relative = 1e-9);
        let front = charges.side(Side::Front);
        assert!(front[511] > 0.0);
        assert!(front[512] > front[511]);
    }

    #[test]
    fn test_urban_renormalised_to_deposit() {
        let sensor = sensor(0.0);
        let physics = PhysicsSettings {
            energy_loss: EnergyLossModel::Urban,
            lorentz_shift: false,
            diffusion: false,
            cross_talk: false,
            ..Default::default()
        };
        let transport = ChargeTransport::new(&sensor, &physics);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let seg = TrajectorySegment {
            exit: [0.02, 0.01, 0.015],
            ..segment(0.0, 8.0e-5)
        };
        let charges = transport.produce_charge(&seg, &mut rng).unwrap();
        let expected = 8.0e-5 / PAIR_CREATION_ENERGY;
        assert_relative_eq!(charges.total(Side::Front), expected, max_relative = 1e-9);
        assert_relative_eq!(charges.total(Side::Back), expected, max_relative = 1e-9);
    }

    #[test]
    fn test_lorentz_shift_moves_charge() {
        let physics = PhysicsSettings {
            lorentz_shift: true,
            ..PhysicsSettings::ideal()
        };
        let x = (512.5 * 0.0058) - 0.5 * 0.0058 * 1024.0;
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let no_field = sensor(0.0);
        let base = ChargeTransport::new(&no_field, &physics)
            .produce_charge(&segment(x, 1.0e-4), &mut rng)
            .unwrap();
        let strong = sensor(5.0);
        let shifted = ChargeTransport::new(&strong, &physics)
            .produce_charge(&segment(x, 1.0e-4), &mut rng)
            .unwrap();
        assert!(base.side(Side::Front)[512] > 0.0);
        // 5 T moves electrons created at mid-depth by more than half a pitch
        assert_relative_eq!(shifted.side(Side::Front)[512], 0.0);
    }

    #[test]
    fn test_charge_outside_is_discarded() {
        let sensor = sensor(0.0);
        let physics = PhysicsSettings::ideal();
        let transport = ChargeTransport::new(&sensor, &physics);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let charges = transport.produce_charge(&segment(10.0, 1.0e-4), &mut rng).unwrap();
        assert_eq!(charges.outside(), 2);
        assert_relative_eq!(charges.total(Side::Front), 0.0);
    }
}
