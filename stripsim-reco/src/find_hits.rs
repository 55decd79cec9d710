//! Hit finding on one sensor from front and back clusters.
//!
//! Cluster positions are first converted into coordinates along the readout
//! edge of their side. Orthogonal sensors combine one front and one back
//! coordinate directly. On stereo sensors every strip line is periodic in
//! x (strips are connected round the edge), so each line is tried at all
//! horizontal offsets that can still cross the active area, and every
//! intersection inside the sensor becomes a hit.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::similar_names
)]

use crate::config::ReconstructionConfig;
use crate::error::Result;
use log::debug;
use stripsim_core::{Cluster, Covariance2, Hit, SensorDssd, Side, StsAddress};

/// Counters of hit finding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HitStatistics {
    /// Front/back cluster pairs considered.
    pub pairs: usize,
    /// Pairs failing the time cut.
    pub rejected_time: usize,
    /// Time-compatible pairs without an intersection inside the sensor.
    pub no_intersection: usize,
    /// Clusters on channels without a strip on this sensor.
    pub unconnected: usize,
    /// Hits produced.
    pub hits: usize,
}

impl HitStatistics {
    /// Adds another set of counters.
    pub fn merge(&mut self, other: &HitStatistics) {
        self.pairs += other.pairs;
        self.rejected_time += other.rejected_time;
        self.no_intersection += other.no_intersection;
        self.unconnected += other.unconnected;
        self.hits += other.hits;
    }
}

/// A strip line on one side: readout-edge coordinate, its error and the
/// slope `tan(stereo)`, all with x measured from the left sensor edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripLine {
    /// Intersection with the readout (top) edge [cm].
    pub x: f64,
    /// Error of `x` [cm].
    pub error: f64,
    /// Tangent of the stereo angle.
    pub tan: f64,
}

/// Intersection of a front and a back strip line in edge coordinates
/// (x from the left edge, y from the bottom edge) with its covariance.
///
/// A line reaches `x + (dy − y)·tan` at height `y`. Returns `None` for
/// parallel lines.
#[must_use]
pub fn intersect(front: StripLine, back: StripLine, dy: f64) -> Option<(f64, f64, Covariance2)> {
    let (ef2, eb2) = (front.error * front.error, back.error * back.error);
    if front.tan.abs() < f64::EPSILON {
        if back.tan.abs() < f64::EPSILON {
            return None;
        }
        let h = (front.x - back.x) / back.tan;
        let cov = Covariance2::new(ef2, (ef2 + eb2) / (back.tan * back.tan), -ef2 / back.tan);
        return Some((front.x, dy - h, cov));
    }
    if back.tan.abs() < f64::EPSILON {
        let h = (back.x - front.x) / front.tan;
        let cov = Covariance2::new(eb2, (ef2 + eb2) / (front.tan * front.tan), -eb2 / front.tan);
        return Some((back.x, dy - h, cov));
    }
    let d = front.tan - back.tan;
    if d.abs() < f64::EPSILON {
        return None;
    }
    let h = (back.x - front.x) / d;
    let d2 = d * d;
    let cov = Covariance2::new(
        (back.tan * back.tan * ef2 + front.tan * front.tan * eb2) / d2,
        (ef2 + eb2) / d2,
        -(back.tan * ef2 + front.tan * eb2) / d2,
    );
    Some((front.x + h * front.tan, dy - h, cov))
}

/// Hit finder for one sensor.
#[derive(Debug, Clone, Copy)]
pub struct HitBuilder<'a> {
    address: StsAddress,
    sensor: &'a SensorDssd,
    config: &'a ReconstructionConfig,
}

impl<'a> HitBuilder<'a> {
    /// Creates the hit finder for a prepared sensor.
    #[must_use]
    pub fn new(address: StsAddress, sensor: &'a SensorDssd, config: &'a ReconstructionConfig) -> Self {
        Self {
            address,
            sensor,
            config,
        }
    }

    /// Strip pitch used for positions on a side [cm].
    #[inline]
    fn pitch(&self, side: Side) -> f64 {
        self.config
            .pitch_override
            .unwrap_or_else(|| self.sensor.pitch(side))
    }

    /// Readout-edge coordinate and error of a cluster [cm], corrected for
    /// the sensor's Lorentz shift.
    ///
    /// Returns `None` for a cluster on channels without a strip on this
    /// sensor (channels beyond the strip count, or below the side start on
    /// an orthogonal sensor).
    ///
    /// # Errors
    /// Returns an error if the cluster side disagrees with the channel map.
    pub fn cluster_coordinate(&self, cluster: &Cluster) -> Result<Option<(f64, f64)>> {
        let side = cluster.side;
        let cps = self.sensor.channels_per_side();
        let start = if side == Side::Front { 0 } else { cps };
        let n = f64::from(self.sensor.nof_strips(side));
        let local = cluster.position - f64::from(start);

        let floor = local.floor();
        let orthogonal = self.sensor.is_orthogonal();
        if floor >= n || (orthogonal && floor < 0.0) {
            return Ok(None);
        }
        // Stereo runs may start below the side start when wrapped
        let channel = if orthogonal { floor } else { floor.rem_euclid(n) };
        let frac = local - floor;
        let (strip, found) = self.sensor.strip_of_channel(start + channel as u16)?;
        debug_assert_eq!(found, side);

        let pitch = self.pitch(side);
        let mut x = (f64::from(strip) + frac + 0.5) * pitch - self.sensor.lorentz_shift(side);
        if !orthogonal {
            x = x.rem_euclid(self.sensor.geometry().dx);
        }
        Ok(Some((x, cluster.position_error * pitch)))
    }

    /// Builds the hits of this sensor from the module's clusters.
    ///
    /// `members` are indices into `clusters`; hits refer to clusters by the
    /// same indices.
    ///
    /// # Errors
    /// Returns an error if a cluster position is inconsistent with the
    /// sensor's channel map.
    pub fn build(&self, clusters: &[Cluster], members: &[usize]) -> Result<(Vec<Hit>, HitStatistics)> {
        let mut stats = HitStatistics::default();
        let mut front = Vec::new();
        let mut back = Vec::new();
        for &index in members {
            let cluster = &clusters[index];
            let Some((x, error)) = self.cluster_coordinate(cluster)? else {
                debug!(
                    "{}: cluster {index} at {:.2} has no strip",
                    self.address, cluster.position
                );
                stats.unconnected += 1;
                continue;
            };
            match cluster.side {
                Side::Front => front.push((index, x, error)),
                Side::Back => back.push((index, x, error)),
            }
        }

        let mut hits = Vec::new();
        if self.config.single_cluster_hits {
            for &(index, x, error) in front.iter().chain(&back) {
                hits.push(self.single_cluster_hit(&clusters[index], index, x, error));
            }
            stats.hits = hits.len();
            return Ok((hits, stats));
        }

        for &(fi, xf, ef) in &front {
            let cf = &clusters[fi];
            for &(bi, xb, eb) in &back {
                let cb = &clusters[bi];
                stats.pairs += 1;
                let sigma = cf.time_error.hypot(cb.time_error);
                if !self.config.cluster_time_cut.accepts(cf.time - cb.time, sigma) {
                    stats.rejected_time += 1;
                    continue;
                }
                let before = hits.len();
                let template = Hit {
                    address: self.address,
                    x: 0.0,
                    y: 0.0,
                    covariance: Covariance2::default(),
                    time: 0.5 * (cf.time + cb.time),
                    time_error: 0.5 * sigma,
                    front_cluster: Some(fi),
                    back_cluster: Some(bi),
                    du: ef * self.sensor.cos_stereo(Side::Front),
                    dv: eb * self.sensor.cos_stereo(Side::Back),
                };
                if self.sensor.is_orthogonal() {
                    hits.extend(self.orthogonal_hit(template, (xf, ef), (xb, eb)));
                } else {
                    self.stereo_hits(template, (xf, ef), (xb, eb), &mut hits);
                }
                if hits.len() == before {
                    debug!("{}: clusters {fi}/{bi} do not intersect", self.address);
                    stats.no_intersection += 1;
                }
            }
        }
        stats.hits = hits.len();
        Ok((hits, stats))
    }

    fn orthogonal_hit(&self, template: Hit, front: (f64, f64), back: (f64, f64)) -> Option<Hit> {
        let geometry = self.sensor.geometry();
        let (x, y) = (front.0 - 0.5 * geometry.dx, back.0 - 0.5 * geometry.dy);
        self.sensor.is_inside(x, y).then(|| Hit {
            x,
            y,
            covariance: Covariance2::diagonal(front.1 * front.1, back.1 * back.1),
            ..template
        })
    }

    fn stereo_hits(&self, template: Hit, front: (f64, f64), back: (f64, f64), out: &mut Vec<Hit>) {
        let geometry = self.sensor.geometry();
        let (dx, dy) = (geometry.dx, geometry.dy);
        let tan_front = self.sensor.tan_stereo(Side::Front);
        let tan_back = self.sensor.tan_stereo(Side::Back);

        // Horizontal offsets k for which x − k·dx can still cross the sensor
        let offsets = |x: f64, tan: f64| {
            let n = ((x + dy * tan) / dx).floor() as i64;
            n.min(0)..=n.max(0)
        };
        for kf in offsets(front.0, tan_front) {
            let line_front = StripLine {
                x: front.0 - kf as f64 * dx,
                error: front.1,
                tan: tan_front,
            };
            for kb in offsets(back.0, tan_back) {
                let line_back = StripLine {
                    x: back.0 - kb as f64 * dx,
                    error: back.1,
                    tan: tan_back,
                };
                let Some((x, y, covariance)) = intersect(line_front, line_back, dy) else {
                    continue;
                };
                let (x, y) = (x - 0.5 * dx, y - 0.5 * dy);
                if self.sensor.is_inside(x, y) {
                    out.push(Hit {
                        x,
                        y,
                        covariance,
                        ..template
                    });
                }
            }
        }
    }

    fn single_cluster_hit(&self, cluster: &Cluster, index: usize, x: f64, error: f64) -> Hit {
        let geometry = self.sensor.geometry();
        let side = cluster.side;
        let length = self.sensor.unmeasured_length(side);
        let var_length = length * length / 12.0;
        let measured = error * self.sensor.cos_stereo(side);
        let unmeasured = var_length.sqrt();

        let (hx, hy, covariance) = if self.sensor.is_orthogonal() {
            match side {
                Side::Front => (
                    x - 0.5 * geometry.dx,
                    0.0,
                    Covariance2::diagonal(error * error, var_length),
                ),
                Side::Back => (
                    0.0,
                    x - 0.5 * geometry.dy,
                    Covariance2::diagonal(var_length, error * error),
                ),
            }
        } else {
            // Strip line evaluated at the sensor midline
            let tan = self.sensor.tan_stereo(side);
            let x_mid = (x + 0.5 * geometry.dy * tan).rem_euclid(geometry.dx);
            (
                x_mid - 0.5 * geometry.dx,
                0.0,
                Covariance2::new(error * error + tan * tan * var_length, var_length, -tan * var_length),
            )
        };

        let (front_cluster, back_cluster, du, dv) = match side {
            Side::Front => (Some(index), None, measured, unmeasured),
            Side::Back => (None, Some(index), unmeasured, measured),
        };
        Hit {
            address: self.address,
            x: hx,
            y: hy,
            covariance,
            time: cluster.time,
            time_error: cluster.time_error,
            front_cluster,
            back_cluster,
            du,
            dv,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeCut;
    use approx::assert_relative_eq;
    use stripsim_core::{SensorConditions, SensorGeometry, StripLayout};

    const PITCH: f64 = 0.0058;

    fn stereo(front: f64, back: f64) -> SensorDssd {
        let geometry = SensorGeometry {
            dx: PITCH * 1024.0,
            dy: 2.0,
            dz: 0.03,
            layout: StripLayout::Stereo {
                pitch: PITCH,
                stereo_front: front,
                stereo_back: back,
            },
        };
        SensorDssd::prepare(geometry, SensorConditions::default(), 0, 1024).unwrap()
    }

    fn cluster(side: Side, position: f64, time: f64) -> Cluster {
        let mut cluster = Cluster::new(StsAddress::default(), side);
        cluster.push(0);
        cluster.set_properties(1.0e4, position, 0.2, time, 3.0);
        cluster
    }

    #[test]
    fn test_intersect_general_reduces_to_vertical() {
        let dy = 2.0;
        let front = StripLine {
            x: 1.0,
            error: 0.002,
            tan: 0.0,
        };
        let back = StripLine {
            x: 1.1,
            error: 0.003,
            tan: 7.5_f64.to_radians().tan(),
        };
        let (x, y, cov) = intersect(front, back, dy).unwrap();
        assert_relative_eq!(x, 1.0);
        assert_relative_eq!(cov.xx, 0.002 * 0.002);

        // Nearly vertical front strips through the general formula
        let tilted = StripLine { tan: 1.0e-9, ..front };
        let (xg, yg, covg) = intersect(tilted, back, dy).unwrap();
        assert_relative_eq!(xg, x, epsilon = 1e-6);
        assert_relative_eq!(yg, y, epsilon = 1e-6);
        assert_relative_eq!(covg.xx, cov.xx, max_relative = 1e-5);
        assert_relative_eq!(covg.yy, cov.yy, max_relative = 1e-5);
        assert_relative_eq!(covg.xy, cov.xy, max_relative = 1e-5);
    }

    #[test]
    fn test_intersect_parallel() {
        let line = StripLine {
            x: 0.5,
            error: 0.001,
            tan: 0.1,
        };
        assert!(intersect(line, line, 2.0).is_none());
    }

    #[test]
    fn test_cluster_coordinate_strip_centre() {
        let sensor = stereo(0.0, 7.5);
        let config = ReconstructionConfig::default();
        let builder = HitBuilder::new(StsAddress::default(), &sensor, &config);
        let (x, error) = builder
            .cluster_coordinate(&cluster(Side::Front, 100.0, 0.0))
            .unwrap()
            .unwrap();
        assert_relative_eq!(x, 100.5 * PITCH, epsilon = 1e-12);
        assert_relative_eq!(error, 0.2 * PITCH, epsilon = 1e-12);
        // Back channels start after the front side
        let (xb, _) = builder
            .cluster_coordinate(&cluster(Side::Back, 1024.0 + 3.0, 0.0))
            .unwrap()
            .unwrap();
        assert_relative_eq!(xb, 3.5 * PITCH, epsilon = 1e-12);
        // Position half a channel below the side start folds to the far edge
        let (xw, _) = builder
            .cluster_coordinate(&cluster(Side::Front, -0.25, 0.0))
            .unwrap()
            .unwrap();
        assert_relative_eq!(xw, 1024.25 * PITCH - 1024.0 * PITCH, epsilon = 1e-9);
    }

    #[test]
    fn test_stereo_hit_position() {
        let sensor = stereo(0.0, 7.5);
        let config = ReconstructionConfig::default();
        let builder = HitBuilder::new(StsAddress::default(), &sensor, &config);
        // A point at local (x0, y0) and the strips it fires
        let (x0, y0) = (-0.4, 0.3);
        let front = sensor.readout_coordinate(x0, y0, Side::Front) / PITCH - 0.5;
        let back = sensor.readout_coordinate(x0, y0, Side::Back) / PITCH - 0.5;
        let clusters = vec![
            cluster(Side::Front, front, 10.0),
            cluster(Side::Back, 1024.0 + back.rem_euclid(1024.0), 12.0),
        ];
        let (hits, stats) = builder.build(&clusters, &[0, 1]).unwrap();
        assert_eq!(stats.pairs, 1);
        let hit = hits
            .iter()
            .find(|h| (h.x - x0).abs() < 1e-6)
            .expect("hit at the true position");
        assert_relative_eq!(hit.y, y0, epsilon = 1e-6);
        assert_relative_eq!(hit.time, 11.0);
        assert_eq!(hit.front_cluster, Some(0));
        assert_eq!(hit.back_cluster, Some(1));
    }

    #[test]
    fn test_time_cut_rejects_pair() {
        let sensor = stereo(0.0, 7.5);
        let config = ReconstructionConfig::default().with_cluster_time_cut(TimeCut::absolute(5.0));
        let builder = HitBuilder::new(StsAddress::default(), &sensor, &config);
        let clusters = vec![
            cluster(Side::Front, 500.0, 0.0),
            cluster(Side::Back, 1524.0, 50.0),
        ];
        let (hits, stats) = builder.build(&clusters, &[0, 1]).unwrap();
        assert!(hits.is_empty());
        assert_eq!(stats.rejected_time, 1);
    }

    #[test]
    fn test_single_cluster_hit_on_midline() {
        let sensor = stereo(0.0, 7.5);
        let config = ReconstructionConfig::default().with_single_cluster_hits(true);
        let builder = HitBuilder::new(StsAddress::default(), &sensor, &config);
        let clusters = vec![cluster(Side::Front, 511.5, 0.0), cluster(Side::Back, 1024.0 + 511.5, 0.0)];
        let (hits, _) = builder.build(&clusters, &[0, 1]).unwrap();
        assert_eq!(hits.len(), 2);
        let front = &hits[0];
        assert_relative_eq!(front.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(front.y, 0.0);
        assert_relative_eq!(front.covariance.yy, 4.0 / 12.0);
        assert_relative_eq!(front.covariance.xy, 0.0);
        assert!(!front.is_two_sided());

        let back = &hits[1];
        let tan = 7.5_f64.to_radians().tan();
        assert_relative_eq!(back.x, tan, epsilon = 1e-12);
        assert_relative_eq!(back.covariance.xy, -tan * 4.0 / 12.0, epsilon = 1e-12);
        assert_eq!(back.back_cluster, Some(1));
    }
}
