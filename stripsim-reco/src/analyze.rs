//! Cluster analysis: charge, position, time and their errors.
//!
//! Positions are in module channel units. A single strip is reconstructed
//! at its centre with the uniform error `1/√24`. Two-strip clusters use the
//! charge-weighted head-tail formula; larger clusters take the edge strips
//! against the mean charge of the interior. All errors come from
//! first-order propagation of the per-strip charge variance
//! `width(q)² + noise² + step²/12`.
#![allow(clippy::cast_precision_loss, clippy::many_single_char_names)]

use crate::error::{Error, Result};
use stripsim_core::{Cluster, Digi, LandauWidthTable, Match, ModuleParams, Side};

/// Measurement of one member strip.
#[derive(Debug, Clone, Copy)]
struct StripMeasurement {
    channel: f64,
    charge: f64,
    variance: f64,
    time: f64,
    time_error: f64,
}

/// Computes cluster properties from member digis.
#[derive(Debug, Clone, Copy)]
pub struct ClusterEstimator<'a> {
    params: &'a ModuleParams,
    landau: &'a LandauWidthTable,
}

impl<'a> ClusterEstimator<'a> {
    /// Creates an estimator for the digis of one module.
    #[must_use]
    pub fn new(params: &'a ModuleParams, landau: &'a LandauWidthTable) -> Self {
        Self { params, landau }
    }

    /// Fills charge, position, time, errors and provenance of a cluster.
    /// `digis` is the slice the cluster member indices refer to.
    ///
    /// # Errors
    /// Returns an error if a member index is not in `digis`, a channel is
    /// outside the module or a member lies on the other side.
    pub fn analyze(&self, cluster: &mut Cluster, digis: &[Digi]) -> Result<()> {
        let mut strips = Vec::with_capacity(cluster.size());
        let mut provenance = Match::new();
        for &index in &cluster.digis {
            let digi = digis.get(index).ok_or(Error::MissingDigi {
                index,
                len: digis.len(),
            })?;
            strips.push(self.measure(digi, cluster.side)?);
            provenance.add_match(&digi.provenance);
        }
        cluster.provenance = provenance;

        let start = match cluster.side {
            Side::Front => 0.0,
            Side::Back => f64::from(self.params.channels_per_side()),
        };
        let period = f64::from(self.params.channels_per_side());
        let mut wrapped = false;
        if let [first, .., last] = strips.as_mut_slice() {
            if first.channel > last.channel {
                first.channel -= period;
                wrapped = true;
            }
        }

        let (charge, mut position, position_error, time, time_error) = match strips.as_slice() {
            [] => return Ok(()),
            [single] => size_one(single),
            [first, second] => size_two(first, second),
            [first, middle @ .., last] => size_n(first, middle, last),
        };
        if wrapped && position < start {
            position += period;
        }
        cluster.set_properties(charge, position, position_error, time, time_error);
        Ok(())
    }

    fn measure(&self, digi: &Digi, side: Side) -> Result<StripMeasurement> {
        self.params.check_channel(digi.channel)?;
        let found = Side::from_index(usize::from(digi.channel / self.params.channels_per_side()));
        if found != side {
            return Err(stripsim_core::Error::SideMismatch {
                expected: side,
                found,
            }
            .into());
        }
        let asic = self.params.asic(digi.channel);
        let charge = asic.adc_to_charge(digi.adc);
        let width = self.landau.width(charge);
        Ok(StripMeasurement {
            channel: f64::from(digi.channel),
            charge,
            variance: width * width + asic.noise * asic.noise + asic.quantization_variance(),
            time: digi.time_ns(),
            time_error: asic.time_resolution,
        })
    }
}

fn size_one(strip: &StripMeasurement) -> (f64, f64, f64, f64, f64) {
    (
        strip.charge,
        strip.channel,
        (1.0_f64 / 24.0).sqrt(),
        strip.time,
        strip.time_error,
    )
}

fn size_two(a: &StripMeasurement, b: &StripMeasurement) -> (f64, f64, f64, f64, f64) {
    let (q1, q2) = (a.charge, b.charge);
    let q_max = q1.max(q2);
    let x = a.channel + 0.5 + (q2 - q1) / (3.0 * q_max);

    let (d1, d2) = if q2 >= q1 {
        (-1.0 / (3.0 * q2), q1 / (3.0 * q2 * q2))
    } else {
        (-q2 / (3.0 * q1 * q1), 1.0 / (3.0 * q1))
    };
    let ex = (d1 * d1 * a.variance + d2 * d2 * b.variance).sqrt();

    let time = 0.5 * (a.time + b.time);
    let time_error = 0.5 * (a.time_error * a.time_error + b.time_error * b.time_error).sqrt();
    (q1 + q2, x, ex, time, time_error)
}

fn size_n(
    first: &StripMeasurement,
    middle: &[StripMeasurement],
    last: &StripMeasurement,
) -> (f64, f64, f64, f64, f64) {
    let n_mid = middle.len() as f64;
    let q_mid = middle.iter().map(|s| s.charge).sum::<f64>() / n_mid;
    let var_mid = middle.iter().map(|s| s.variance).sum::<f64>() / (n_mid * n_mid);

    let (q_f, q_l) = (first.charge, last.charge);
    let x = 0.5 * (first.channel + last.channel) + (q_l - q_f) / (2.0 * q_mid);
    let ex2 = (first.variance + last.variance) / (4.0 * q_mid * q_mid)
        + (q_l - q_f) * (q_l - q_f) * var_mid / (4.0 * q_mid.powi(4));

    let n = n_mid + 2.0;
    let all = || std::iter::once(first).chain(middle).chain(std::iter::once(last));
    let time = all().map(|s| s.time).sum::<f64>() / n;
    let time_error = all().map(|s| s.time_error * s.time_error).sum::<f64>().sqrt() / n;
    let charge = all().map(|s| s.charge).sum();
    (charge, x, ex2.sqrt(), time, time_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use stripsim_core::{AsicParams, Origin, StsAddress};

    fn params() -> ModuleParams {
        ModuleParams::new(256, 128, AsicParams::default()).unwrap()
    }

    fn digi(channel: u16, time: u64, adc: u16, index: i32) -> Digi {
        Digi::new(
            StsAddress::default(),
            channel,
            time,
            adc,
            Match::single(Origin::new(0, 0, index), 1.0),
        )
    }

    fn analyze(side: Side, digis: &[Digi]) -> Cluster {
        let params = params();
        let landau = LandauWidthTable::default();
        let estimator = ClusterEstimator::new(&params, &landau);
        let mut cluster = Cluster::new(StsAddress::default(), side);
        for index in 0..digis.len() {
            cluster.push(index);
        }
        estimator.analyze(&mut cluster, digis).unwrap();
        cluster
    }

    #[test]
    fn test_size_one() {
        let cluster = analyze(Side::Front, &[digi(17, 250, 5, 0)]);
        let asic = AsicParams::default();
        assert_relative_eq!(cluster.position, 17.0);
        assert_relative_eq!(cluster.position_error, (1.0_f64 / 24.0).sqrt());
        assert_relative_eq!(cluster.charge, asic.adc_to_charge(5));
        assert_relative_eq!(cluster.time, 250.0);
        assert_relative_eq!(cluster.time_error, asic.time_resolution);
        assert_eq!(cluster.provenance.len(), 1);
    }

    #[test]
    fn test_size_two_between_channels() {
        for (a1, a2) in [(0, 0), (0, 31), (31, 0), (10, 12), (5, 4)] {
            let cluster = analyze(Side::Front, &[digi(40, 100, a1, 0), digi(41, 104, a2, 1)]);
            assert!(cluster.position >= 40.0 && cluster.position <= 41.0);
            assert!(cluster.position_error > 0.0);
            assert_relative_eq!(cluster.time, 102.0);
        }
        let equal = analyze(Side::Front, &[digi(40, 100, 7, 0), digi(41, 100, 7, 1)]);
        assert_relative_eq!(equal.position, 40.5);
        assert_eq!(equal.provenance.len(), 2);
        assert_relative_eq!(equal.time_error, 5.0 / 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_size_two_error_symmetric() {
        let a = analyze(Side::Front, &[digi(40, 0, 3, 0), digi(41, 0, 9, 1)]);
        let b = analyze(Side::Front, &[digi(40, 0, 9, 0), digi(41, 0, 3, 1)]);
        assert_relative_eq!(a.position - 40.5, 40.5 - b.position, epsilon = 1e-12);
        assert_relative_eq!(a.position_error, b.position_error, epsilon = 1e-12);
    }

    #[test]
    fn test_size_n() {
        let digis = [
            digi(60, 100, 2, 0),
            digi(61, 102, 10, 1),
            digi(62, 104, 10, 2),
            digi(63, 106, 2, 3),
        ];
        let cluster = analyze(Side::Front, &digis);
        assert_relative_eq!(cluster.position, 61.5, epsilon = 1e-12);
        assert_relative_eq!(cluster.time, 103.0);
        assert_relative_eq!(cluster.time_error, 2.5, epsilon = 1e-12);
        let asic = AsicParams::default();
        let expected = 2.0 * asic.adc_to_charge(2) + 2.0 * asic.adc_to_charge(10);
        assert_relative_eq!(cluster.charge, expected);

        let skewed = analyze(
            Side::Front,
            &[digi(60, 0, 2, 0), digi(61, 0, 10, 1), digi(62, 0, 6, 2)],
        );
        assert!(skewed.position > 61.0);
    }

    #[test]
    fn test_wrapped_cluster_back_side() {
        // Back side spans channels 128..256; 255 and 128 are neighbours
        let local = |c: &Cluster| (c.position - 128.0).rem_euclid(128.0);
        let cluster = analyze(Side::Back, &[digi(255, 0, 7, 0), digi(128, 0, 7, 1)]);
        assert_relative_eq!(local(&cluster), 127.5);
        assert_relative_eq!(cluster.position, 255.5);

        let leaning_up = analyze(Side::Back, &[digi(255, 0, 2, 0), digi(128, 0, 20, 1)]);
        assert!(local(&leaning_up) > 127.5);
        let leaning_down = analyze(Side::Back, &[digi(255, 0, 20, 0), digi(128, 0, 2, 1)]);
        assert!(local(&leaning_down) < 127.5);
        // Re-wrapped into the side's channel range
        assert!(leaning_down.position > 255.0);

        let front = analyze(Side::Front, &[digi(127, 0, 2, 0), digi(0, 0, 20, 1)]);
        assert!(front.position > 127.5 && front.position < 128.0);
    }

    #[test]
    fn test_side_mismatch_rejected() {
        let params = params();
        let landau = LandauWidthTable::default();
        let estimator = ClusterEstimator::new(&params, &landau);
        let mut cluster = Cluster::new(StsAddress::default(), Side::Front);
        cluster.push(0);
        let digis = [digi(200, 0, 1, 0)];
        assert!(estimator.analyze(&mut cluster, &digis).is_err());
        cluster.digis = vec![5];
        assert!(matches!(
            estimator.analyze(&mut cluster, &digis),
            Err(Error::MissingDigi { index: 5, len: 1 })
        ));
    }
}
