//! Sensor geometry, operating conditions and strip ⇄ channel mapping.
//!
//! Local coordinates have their origin in the centre of the active volume;
//! x runs along the readout edge, y along the nominal strip direction and
//! z across the sensor thickness. Lengths are in cm, angles in degrees.
//!
//! The readout edge is the top edge (y = +dy/2). A stereo strip is the line
//! `y(x) = dy − (x − x0) / tan(φ)` in corner coordinates, where `x0` is its
//! intersection with the readout edge. Strips leaving the sensor through a
//! vertical edge continue on the opposite edge (horizontal cross-connection
//! through the second metal layer), which makes the strip number periodic.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]

use crate::address::Side;
use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smallest difference between front and back stereo angles for which two
/// strips still intersect [deg].
pub const MIN_STEREO_DIFFERENCE: f64 = 0.5;

/// Angles below this are treated as vertical strips [deg].
const VERTICAL_STRIP_TOLERANCE: f64 = 0.001;

/// Strip layout of a double-sided sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum StripLayout {
    /// Vertical front strips measuring x, horizontal back strips measuring y.
    Orthogonal {
        /// Front strip pitch [cm].
        pitch_front: f64,
        /// Back strip pitch [cm].
        pitch_back: f64,
    },
    /// Both sides measure along the readout edge; strips are inclined by
    /// their side's stereo angle.
    Stereo {
        /// Strip pitch on both sides [cm].
        pitch: f64,
        /// Front stereo angle [deg].
        stereo_front: f64,
        /// Back stereo angle [deg].
        stereo_back: f64,
    },
}

/// Static geometry of a sensor: active area, thickness and strip layout.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorGeometry {
    /// Active width along the readout edge [cm].
    pub dx: f64,
    /// Active height [cm].
    pub dy: f64,
    /// Thickness [cm].
    pub dz: f64,
    /// Strip layout.
    pub layout: StripLayout,
}

impl SensorGeometry {
    /// Stereo sensor with the default 58 µm pitch and 7.5° back stereo angle.
    #[must_use]
    pub fn stereo_default(dx: f64, dy: f64) -> Self {
        Self {
            dx,
            dy,
            dz: 0.03,
            layout: StripLayout::Stereo {
                pitch: 0.0058,
                stereo_front: 0.0,
                stereo_back: 7.5,
            },
        }
    }
}

/// Operating conditions of a sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SensorConditions {
    /// Full depletion voltage [V].
    pub v_fd: f64,
    /// Bias voltage [V].
    pub v_bias: f64,
    /// Temperature [K].
    pub temperature: f64,
    /// Coupling capacitance [pF].
    pub c_coupling: f64,
    /// Inter-strip capacitance [pF].
    pub c_interstrip: f64,
    /// Magnetic field in the sensor centre, local frame [T].
    pub field: [f64; 3],
}

impl Default for SensorConditions {
    fn default() -> Self {
        Self {
            v_fd: 70.0,
            v_bias: 140.0,
            temperature: 268.0,
            c_coupling: 17.5,
            c_interstrip: 1.0,
            field: [0.0; 3],
        }
    }
}

impl SensorConditions {
    /// Checks that the conditions allow charge transport calculations.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] for non-physical values.
    pub fn validate(&self) -> Result<()> {
        if !(self.v_fd > 0.0) {
            return Err(Error::invalid("v_fd", "must be positive"));
        }
        if !(self.v_bias > self.v_fd) {
            return Err(Error::invalid(
                "v_bias",
                format!(
                    "{} V does not exceed depletion voltage {} V",
                    self.v_bias, self.v_fd
                ),
            ));
        }
        if !(self.temperature > 0.0) {
            return Err(Error::invalid("temperature", "must be positive"));
        }
        if self.c_coupling < 0.0 || self.c_interstrip < 0.0 {
            return Err(Error::invalid("capacitance", "must not be negative"));
        }
        Ok(())
    }

    /// Fraction of a strip's charge induced on each neighbour.
    #[must_use]
    pub fn cross_talk_coefficient(&self) -> f64 {
        if self.c_coupling > 0.0 {
            self.c_interstrip / (self.c_interstrip + self.c_coupling)
        } else {
            0.0
        }
    }
}

/// Rigid local → global transform of a sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorTransform {
    /// Rotation matrix (rows).
    pub rotation: [[f64; 3]; 3],
    /// Translation [cm].
    pub translation: [f64; 3],
}

impl Default for SensorTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl SensorTransform {
    /// Identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }

    /// Pure translation.
    #[must_use]
    pub fn translation(t: [f64; 3]) -> Self {
        Self {
            translation: t,
            ..Self::identity()
        }
    }

    /// Maps a local point to the global frame.
    #[must_use]
    pub fn local_to_global(&self, p: [f64; 3]) -> [f64; 3] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            r[0][0] * p[0] + r[0][1] * p[1] + r[0][2] * p[2] + t[0],
            r[1][0] * p[0] + r[1][1] * p[1] + r[1][2] * p[2] + t[1],
            r[2][0] * p[0] + r[2][1] * p[1] + r[2][2] * p[2] + t[2],
        ]
    }

    /// Maps a global point to the local frame.
    #[must_use]
    pub fn global_to_local(&self, p: [f64; 3]) -> [f64; 3] {
        let r = &self.rotation;
        let d = [
            p[0] - self.translation[0],
            p[1] - self.translation[1],
            p[2] - self.translation[2],
        ];
        [
            r[0][0] * d[0] + r[1][0] * d[1] + r[2][0] * d[2],
            r[0][1] * d[0] + r[1][1] * d[1] + r[2][1] * d[2],
            r[0][2] * d[0] + r[1][2] * d[1] + r[2][2] * d[2],
        ]
    }
}

/// A double-sided strip sensor with all derived parameters computed.
///
/// Built once per sensor by [`SensorDssd::prepare`]; immutable afterwards
/// except for the reconstruction Lorentz correction.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDssd {
    geometry: SensorGeometry,
    conditions: SensorConditions,
    index: u16,
    channels_per_side: u16,
    nof_strips: [u16; 2],
    pitch: [f64; 2],
    stereo: [f64; 2],
    tan_stereo: [f64; 2],
    cos_stereo: [f64; 2],
    strip_shift: [i32; 2],
    lorentz_shift: [f64; 2],
}

impl SensorDssd {
    /// Computes derived parameters for a sensor at position `index` in its
    /// module's daisy chain.
    ///
    /// # Errors
    /// Returns a configuration error if dimensions, pitch, stereo angles or
    /// conditions are invalid, or if the strip count does not fit the
    /// module's channels per side.
    pub fn prepare(
        geometry: SensorGeometry,
        conditions: SensorConditions,
        index: u16,
        channels_per_side: u16,
    ) -> Result<Self> {
        if !(geometry.dx > 0.0 && geometry.dy > 0.0 && geometry.dz > 0.0) {
            return Err(Error::invalid(
                "geometry",
                format!(
                    "non-positive dimensions ({}, {}, {})",
                    geometry.dx, geometry.dy, geometry.dz
                ),
            ));
        }
        conditions.validate()?;

        let (pitch, stereo) = match geometry.layout {
            StripLayout::Orthogonal {
                pitch_front,
                pitch_back,
            } => ([pitch_front, pitch_back], [0.0, 0.0]),
            StripLayout::Stereo {
                pitch,
                stereo_front,
                stereo_back,
            } => ([pitch, pitch], [stereo_front, stereo_back]),
        };
        if !(pitch[0] > 0.0 && pitch[1] > 0.0) {
            return Err(Error::invalid("pitch", "must be positive"));
        }

        let mut nof_strips = [0u16; 2];
        let mut tan_stereo = [0.0; 2];
        let mut cos_stereo = [1.0; 2];
        let mut strip_shift = [0i32; 2];

        match geometry.layout {
            StripLayout::Orthogonal { .. } => {
                let lengths = [geometry.dx, geometry.dy];
                for side in 0..2 {
                    let n = (lengths[side] / pitch[side]).round();
                    if n < 1.0 || n > f64::from(channels_per_side) {
                        return Err(Error::invalid(
                            "pitch",
                            format!(
                                "{n} strips on side {side} do not fit {channels_per_side} channels"
                            ),
                        ));
                    }
                    nof_strips[side] = n as u16;
                }
            }
            StripLayout::Stereo { .. } => {
                if (stereo[0] - stereo[1]).abs() < MIN_STEREO_DIFFERENCE {
                    return Err(Error::invalid(
                        "stereo",
                        format!(
                            "front {}° and back {}° differ by less than {MIN_STEREO_DIFFERENCE}°",
                            stereo[0], stereo[1]
                        ),
                    ));
                }
                let n = (geometry.dx / pitch[0]).round();
                if n < 1.0 || n != f64::from(channels_per_side) {
                    return Err(Error::invalid(
                        "pitch",
                        format!(
                            "{n} stereo strips per side, module expects {channels_per_side}"
                        ),
                    ));
                }
                for side in 0..2 {
                    if stereo[side].abs() >= 90.0 {
                        return Err(Error::invalid("stereo", "must be within (-90°, 90°)"));
                    }
                    let angle = stereo[side].to_radians();
                    nof_strips[side] = n as u16;
                    tan_stereo[side] = angle.tan();
                    cos_stereo[side] = angle.cos();
                    strip_shift[side] =
                        (geometry.dy * tan_stereo[side] / pitch[side]).round() as i32;
                }
            }
        }

        Ok(Self {
            geometry,
            conditions,
            index,
            channels_per_side,
            nof_strips,
            pitch,
            stereo,
            tan_stereo,
            cos_stereo,
            strip_shift,
            lorentz_shift: [0.0; 2],
        })
    }

    /// Static geometry.
    #[inline]
    #[must_use]
    pub fn geometry(&self) -> &SensorGeometry {
        &self.geometry
    }

    /// Operating conditions.
    #[inline]
    #[must_use]
    pub fn conditions(&self) -> &SensorConditions {
        &self.conditions
    }

    /// Strip layout.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> StripLayout {
        self.geometry.layout
    }

    /// True for orthogonal strip layouts.
    #[inline]
    #[must_use]
    pub fn is_orthogonal(&self) -> bool {
        matches!(self.geometry.layout, StripLayout::Orthogonal { .. })
    }

    /// Position in the module's daisy chain.
    #[inline]
    #[must_use]
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Module channels per side.
    #[inline]
    #[must_use]
    pub fn channels_per_side(&self) -> u16 {
        self.channels_per_side
    }

    /// Number of strips on a side.
    #[inline]
    #[must_use]
    pub fn nof_strips(&self, side: Side) -> u16 {
        self.nof_strips[side.index()]
    }

    /// Strip pitch on a side [cm].
    #[inline]
    #[must_use]
    pub fn pitch(&self, side: Side) -> f64 {
        self.pitch[side.index()]
    }

    /// Stereo angle of a side [deg].
    #[inline]
    #[must_use]
    pub fn stereo(&self, side: Side) -> f64 {
        self.stereo[side.index()]
    }

    /// Tangent of the stereo angle.
    #[inline]
    #[must_use]
    pub fn tan_stereo(&self, side: Side) -> f64 {
        self.tan_stereo[side.index()]
    }

    /// Cosine of the stereo angle.
    #[inline]
    #[must_use]
    pub fn cos_stereo(&self, side: Side) -> f64 {
        self.cos_stereo[side.index()]
    }

    /// True if the strips of a side are vertical.
    #[inline]
    #[must_use]
    pub fn is_vertical(&self, side: Side) -> bool {
        self.stereo[side.index()].abs() < VERTICAL_STRIP_TOLERANCE
    }

    /// Strip offset between consecutive sensors of the daisy chain.
    #[inline]
    #[must_use]
    pub fn strip_shift(&self, side: Side) -> i32 {
        self.strip_shift[side.index()]
    }

    /// Mean Lorentz shift used to correct reconstructed positions [cm].
    #[inline]
    #[must_use]
    pub fn lorentz_shift(&self, side: Side) -> f64 {
        self.lorentz_shift[side.index()]
    }

    /// Sets the reconstruction Lorentz correction for both sides [cm].
    pub fn set_lorentz_shift(&mut self, shift: [f64; 2]) {
        self.lorentz_shift = shift;
    }

    /// Length of the coordinate a side does *not* measure [cm].
    #[inline]
    #[must_use]
    pub fn unmeasured_length(&self, side: Side) -> f64 {
        if self.is_orthogonal() && side == Side::Back {
            self.geometry.dx
        } else {
            self.geometry.dy
        }
    }

    /// True if a local point lies in the active area.
    #[inline]
    #[must_use]
    pub fn is_inside(&self, x: f64, y: f64) -> bool {
        const GUARD: f64 = 1.0e-9;
        x.abs() <= 0.5 * self.geometry.dx + GUARD && y.abs() <= 0.5 * self.geometry.dy + GUARD
    }

    /// Coordinate along the readout direction of a side, measured from the
    /// lower left corner, before folding into the strip range [cm].
    ///
    /// For stereo strips this is the intersection of the strip through
    /// (x, y) with the readout edge.
    #[must_use]
    pub fn readout_coordinate(&self, x: f64, y: f64, side: Side) -> f64 {
        let x_dist = x + 0.5 * self.geometry.dx;
        let y_dist = y + 0.5 * self.geometry.dy;
        match self.geometry.layout {
            StripLayout::Orthogonal { .. } => match side {
                Side::Front => x_dist,
                Side::Back => y_dist,
            },
            StripLayout::Stereo { .. } => {
                x_dist - (self.geometry.dy - y_dist) * self.tan_stereo(side)
            }
        }
    }

    /// Strip containing a readout coordinate, folded periodically for
    /// stereo sides. `None` if an orthogonal coordinate is off the sensor.
    #[must_use]
    pub fn strip_of_coordinate(&self, coordinate: f64, side: Side) -> Option<u16> {
        let n = i64::from(self.nof_strips(side));
        let strip = (coordinate / self.pitch(side)).floor() as i64;
        if self.is_orthogonal() {
            match strip {
                s if (0..n).contains(&s) => Some(s as u16),
                // Point exactly on the upper edge
                s if s == n && coordinate <= n as f64 * self.pitch(side) * (1.0 + 1e-12) => {
                    Some((n - 1) as u16)
                }
                _ => None,
            }
        } else {
            Some(strip.rem_euclid(n) as u16)
        }
    }

    /// Strip number for a local point on a side.
    #[must_use]
    pub fn strip_number(&self, x: f64, y: f64, side: Side) -> Option<u16> {
        self.strip_of_coordinate(self.readout_coordinate(x, y, side), side)
    }

    /// Left and right neighbour strips. Stereo sides wrap round the edge;
    /// orthogonal sides end at the sensor boundary.
    #[must_use]
    pub fn neighbour_strips(&self, strip: u16, side: Side) -> (Option<u16>, Option<u16>) {
        let n = self.nof_strips(side);
        if self.is_orthogonal() {
            let left = strip.checked_sub(1);
            let right = if strip + 1 < n { Some(strip + 1) } else { None };
            (left, right)
        } else {
            let left = if strip == 0 { n - 1 } else { strip - 1 };
            let right = if strip + 1 == n { 0 } else { strip + 1 };
            (Some(left), Some(right))
        }
    }

    /// Module channel reading a strip.
    #[must_use]
    pub fn module_channel(&self, strip: u16, side: Side) -> u16 {
        let n = i32::from(self.nof_strips(side));
        let shift = i32::from(self.index) * self.strip_shift(side);
        let channel = (i32::from(strip) - shift).rem_euclid(n) as u16;
        channel + side.index() as u16 * self.channels_per_side
    }

    /// Strip and side read by a module channel.
    ///
    /// # Errors
    /// Returns [`Error::ChannelOutOfRange`] if the channel is not connected
    /// to a strip of this sensor.
    pub fn strip_of_channel(&self, channel: u16) -> Result<(u16, Side)> {
        let out_of_range = Error::ChannelOutOfRange {
            channel,
            nof_channels: 2 * self.channels_per_side,
        };
        let side = match channel / self.channels_per_side {
            0 => Side::Front,
            1 => Side::Back,
            _ => return Err(out_of_range),
        };
        let local = channel % self.channels_per_side;
        let n = i32::from(self.nof_strips(side));
        if i32::from(local) >= n {
            return Err(out_of_range);
        }
        let shift = i32::from(self.index) * self.strip_shift(side);
        let strip = (i32::from(local) + shift).rem_euclid(n) as u16;
        Ok((strip, side))
    }
}
