//! Width of the energy-loss fluctuation as a function of collected charge.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tabulated Landau width (σ-equivalent, electrons) versus most probable
/// charge (electrons) for a 300 µm silicon sensor.
const DEFAULT_POINTS: [(f64, f64); 9] = [
    (1.0e3, 260.0),
    (2.0e3, 440.0),
    (5.0e3, 900.0),
    (1.0e4, 1_500.0),
    (2.0e4, 2_400.0),
    (3.0e4, 3_200.0),
    (5.0e4, 4_700.0),
    (1.0e5, 8_200.0),
    (2.0e5, 15_000.0),
];

/// Piecewise-linear lookup of the Landau width.
///
/// Charges outside the tabulated range are clamped to the first or last point.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LandauWidthTable {
    points: Vec<(f64, f64)>,
}

impl Default for LandauWidthTable {
    fn default() -> Self {
        Self {
            points: DEFAULT_POINTS.to_vec(),
        }
    }
}

impl LandauWidthTable {
    /// Builds a table from (charge, width) points.
    ///
    /// # Errors
    /// Returns an error if fewer than two points are given or the charges
    /// are not strictly increasing.
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self> {
        if points.len() < 2 {
            return Err(Error::invalid("landau_table", "needs at least two points"));
        }
        if points.windows(2).any(|w| !(w[1].0 > w[0].0)) {
            return Err(Error::invalid(
                "landau_table",
                "charges must be strictly increasing",
            ));
        }
        Ok(Self { points })
    }

    /// Tabulated points.
    #[must_use]
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Landau width for a charge [e].
    #[must_use]
    pub fn width(&self, charge: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if charge <= first.0 {
            return first.1;
        }
        if charge >= last.0 {
            return last.1;
        }
        let upper = self.points.partition_point(|p| p.0 <= charge);
        let (q0, w0) = self.points[upper - 1];
        let (q1, w1) = self.points[upper];
        w0 + (w1 - w0) * (charge - q0) / (q1 - q0)
    }
}
