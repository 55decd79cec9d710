//! Space points reconstructed from strip clusters.

use crate::address::StsAddress;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Symmetric 2×2 covariance of a local (x, y) position [cm²].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Covariance2 {
    /// Var(x).
    pub xx: f64,
    /// Var(y).
    pub yy: f64,
    /// Cov(x, y).
    pub xy: f64,
}

impl Covariance2 {
    /// Creates a covariance from its three independent entries.
    #[inline]
    #[must_use]
    pub fn new(xx: f64, yy: f64, xy: f64) -> Self {
        Self { xx, yy, xy }
    }

    /// Diagonal covariance.
    #[inline]
    #[must_use]
    pub fn diagonal(xx: f64, yy: f64) -> Self {
        Self { xx, yy, xy: 0.0 }
    }

    /// Error on x.
    #[inline]
    #[must_use]
    pub fn sigma_x(&self) -> f64 {
        self.xx.sqrt()
    }

    /// Error on y.
    #[inline]
    #[must_use]
    pub fn sigma_y(&self) -> f64 {
        self.yy.sqrt()
    }

    /// Determinant; positive for a valid covariance.
    #[inline]
    #[must_use]
    pub fn determinant(&self) -> f64 {
        self.xx * self.yy - self.xy * self.xy
    }
}

/// A reconstructed space point in sensor-local coordinates.
///
/// The origin is the centre of the sensor's active area. Promotion to the
/// global frame is done by the caller with the sensor transform.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hit {
    /// Sensor address.
    pub address: StsAddress,
    /// Local x [cm].
    pub x: f64,
    /// Local y [cm].
    pub y: f64,
    /// Position covariance.
    pub covariance: Covariance2,
    /// Hit time [ns].
    pub time: f64,
    /// Time error [ns].
    pub time_error: f64,
    /// Index of the front-side cluster, if any.
    pub front_cluster: Option<usize>,
    /// Index of the back-side cluster, if any.
    pub back_cluster: Option<usize>,
    /// Front-side error perpendicular to the strips [cm].
    pub du: f64,
    /// Back-side error perpendicular to the strips [cm].
    pub dv: f64,
}

impl Hit {
    /// Returns true if both sides contributed.
    #[inline]
    #[must_use]
    pub fn is_two_sided(&self) -> bool {
        self.front_cluster.is_some() && self.back_cluster.is_some()
    }

    /// Local position as a 3-vector on the sensor mid-plane.
    #[inline]
    #[must_use]
    pub fn local_position(&self) -> [f64; 3] {
        [self.x, self.y, 0.0]
    }
}
