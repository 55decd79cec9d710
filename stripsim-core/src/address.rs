//! Bit-packed addresses of setup elements.
//!
//! Layout of the 32-bit word (least significant bit first):
//!
//! | bits    | field        |
//! |---------|--------------|
//! | 0..4    | system id    |
//! | 4..10   | unit         |
//! | 10..15  | ladder       |
//! | 15      | half-ladder  |
//! | 16..21  | module       |
//! | 21..25  | sensor       |
//! | 25      | side         |
//! | 28..32  | version      |

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Side of a double-sided sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Side {
    /// Front (p) side, collects electrons.
    #[default]
    Front = 0,
    /// Back (n) side, collects holes.
    Back = 1,
}

impl Side {
    /// Both sides in readout order.
    pub const BOTH: [Side; 2] = [Side::Front, Side::Back];

    /// Array index of the side (0 = front, 1 = back).
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Side from an array index; anything non-zero is the back side.
    #[inline]
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            Side::Front
        } else {
            Side::Back
        }
    }

    /// The opposite side.
    #[inline]
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Side::Front => Side::Back,
            Side::Back => Side::Front,
        }
    }
}

/// Hierarchy level of a setup element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ElementLevel {
    /// Mechanical unit (station half).
    Unit,
    /// Carbon ladder.
    Ladder,
    /// One half of a ladder.
    HalfLadder,
    /// Readout module (one front-end board pair).
    Module,
    /// Silicon sensor.
    Sensor,
}

impl ElementLevel {
    /// The level one step up the hierarchy.
    #[must_use]
    pub fn parent(self) -> Option<Self> {
        match self {
            ElementLevel::Unit => None,
            ElementLevel::Ladder => Some(ElementLevel::Unit),
            ElementLevel::HalfLadder => Some(ElementLevel::Ladder),
            ElementLevel::Module => Some(ElementLevel::HalfLadder),
            ElementLevel::Sensor => Some(ElementLevel::Module),
        }
    }
}

const SYSTEM_SHIFT: u32 = 0;
const UNIT_SHIFT: u32 = 4;
const LADDER_SHIFT: u32 = 10;
const HALF_LADDER_SHIFT: u32 = 15;
const MODULE_SHIFT: u32 = 16;
const SENSOR_SHIFT: u32 = 21;
const SIDE_SHIFT: u32 = 25;
const VERSION_SHIFT: u32 = 28;

const SYSTEM_MASK: u32 = 0xF;
const UNIT_MASK: u32 = 0x3F;
const LADDER_MASK: u32 = 0x1F;
const HALF_LADDER_MASK: u32 = 0x1;
const MODULE_MASK: u32 = 0x1F;
const SENSOR_MASK: u32 = 0xF;
const SIDE_MASK: u32 = 0x1;

/// Packed address of a unit, ladder, module, sensor or sensor side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct StsAddress(u32);

impl StsAddress {
    /// System identifier stored in the lowest nibble.
    pub const SYSTEM_ID: u32 = 0x2;
    /// Address format version.
    pub const VERSION: u32 = 0x1;

    /// Creates a sensor-side address, validating every field width.
    ///
    /// # Errors
    /// Returns [`Error::AddressField`] if any field overflows its bit range.
    pub fn new(
        unit: u32,
        ladder: u32,
        half_ladder: u32,
        module: u32,
        sensor: u32,
        side: Side,
    ) -> Result<Self> {
        check_field("unit", unit, UNIT_MASK)?;
        check_field("ladder", ladder, LADDER_MASK)?;
        check_field("half_ladder", half_ladder, HALF_LADDER_MASK)?;
        check_field("module", module, MODULE_MASK)?;
        check_field("sensor", sensor, SENSOR_MASK)?;

        let raw = (Self::SYSTEM_ID << SYSTEM_SHIFT)
            | (unit << UNIT_SHIFT)
            | (ladder << LADDER_SHIFT)
            | (half_ladder << HALF_LADDER_SHIFT)
            | (module << MODULE_SHIFT)
            | (sensor << SENSOR_SHIFT)
            | ((side as u32) << SIDE_SHIFT)
            | (Self::VERSION << VERSION_SHIFT);
        Ok(Self(raw))
    }

    /// Module address (sensor and side fields zero).
    ///
    /// # Errors
    /// Returns [`Error::AddressField`] if any field overflows its bit range.
    pub fn module(unit: u32, ladder: u32, half_ladder: u32, module: u32) -> Result<Self> {
        Self::new(unit, ladder, half_ladder, module, 0, Side::Front)
    }

    /// Wraps a raw 32-bit address without validation.
    #[inline]
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw 32-bit value.
    #[inline]
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// System id field.
    #[inline]
    #[must_use]
    pub fn system(self) -> u32 {
        (self.0 >> SYSTEM_SHIFT) & SYSTEM_MASK
    }

    /// Unit field.
    #[inline]
    #[must_use]
    pub fn unit(self) -> u32 {
        (self.0 >> UNIT_SHIFT) & UNIT_MASK
    }

    /// Ladder field.
    #[inline]
    #[must_use]
    pub fn ladder(self) -> u32 {
        (self.0 >> LADDER_SHIFT) & LADDER_MASK
    }

    /// Half-ladder field.
    #[inline]
    #[must_use]
    pub fn half_ladder(self) -> u32 {
        (self.0 >> HALF_LADDER_SHIFT) & HALF_LADDER_MASK
    }

    /// Module field.
    #[inline]
    #[must_use]
    pub fn module_number(self) -> u32 {
        (self.0 >> MODULE_SHIFT) & MODULE_MASK
    }

    /// Sensor field (position of the sensor in its module's daisy chain).
    #[inline]
    #[must_use]
    pub fn sensor(self) -> u32 {
        (self.0 >> SENSOR_SHIFT) & SENSOR_MASK
    }

    /// Side field.
    #[inline]
    #[must_use]
    pub fn side(self) -> Side {
        if (self.0 >> SIDE_SHIFT) & SIDE_MASK == 0 {
            Side::Front
        } else {
            Side::Back
        }
    }

    /// Version field.
    #[inline]
    #[must_use]
    pub fn version(self) -> u32 {
        self.0 >> VERSION_SHIFT
    }

    /// Address of the enclosing element at `level`: all fields below it cleared.
    #[must_use]
    pub fn at_level(self, level: ElementLevel) -> Self {
        let keep_below = match level {
            ElementLevel::Unit => LADDER_SHIFT,
            ElementLevel::Ladder => HALF_LADDER_SHIFT,
            ElementLevel::HalfLadder => MODULE_SHIFT,
            ElementLevel::Module => SENSOR_SHIFT,
            ElementLevel::Sensor => SIDE_SHIFT,
        };
        let low = (1u32 << keep_below) - 1;
        let version = Self::VERSION << VERSION_SHIFT;
        Self((self.0 & low) | version)
    }

    /// Address of the module this address belongs to.
    #[inline]
    #[must_use]
    pub fn module_address(self) -> Self {
        self.at_level(ElementLevel::Module)
    }

    /// Same address with the side field replaced.
    #[inline]
    #[must_use]
    pub fn with_side(self, side: Side) -> Self {
        Self((self.0 & !(SIDE_MASK << SIDE_SHIFT)) | ((side as u32) << SIDE_SHIFT))
    }

    /// Same address with the sensor field replaced.
    ///
    /// # Errors
    /// Returns [`Error::AddressField`] if `sensor` does not fit.
    pub fn with_sensor(self, sensor: u32) -> Result<Self> {
        check_field("sensor", sensor, SENSOR_MASK)?;
        Ok(Self(
            (self.0 & !(SENSOR_MASK << SENSOR_SHIFT)) | (sensor << SENSOR_SHIFT),
        ))
    }
}

impl std::fmt::Display for StsAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "U{}L{}H{}M{}S{}{}",
            self.unit(),
            self.ladder(),
            self.half_ladder(),
            self.module_number(),
            self.sensor(),
            match self.side() {
                Side::Front => 'F',
                Side::Back => 'B',
            }
        )
    }
}

fn check_field(field: &'static str, value: u32, max: u32) -> Result<()> {
    if value > max {
        return Err(Error::AddressField { field, value, max });
    }
    Ok(())
}
