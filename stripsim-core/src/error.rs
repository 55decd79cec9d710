//! Error types for stripsim-core.

use crate::address::Side;
use thiserror::Error;

/// Result type alias for stripsim operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
///
/// Only configuration problems and broken invariants are reported through
/// this type. Expected absences (a charge outside the active area, a cluster
/// pair without intersection) are counted by the caller instead.
#[derive(Error, Debug)]
pub enum Error {
    /// A parameter is missing or outside its physical range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Sensor derived parameters were never computed.
    #[error("sensor {0:#010x} has no derived parameters; call DetectorContext::prepare first")]
    SensorNotPrepared(u32),

    /// No module is registered under this address.
    #[error("unknown module address {0:#010x}")]
    UnknownModule(u32),

    /// No sensor is registered under this address.
    #[error("unknown sensor address {0:#010x}")]
    UnknownSensor(u32),

    /// An element with this address already exists.
    #[error("duplicate setup element address {0:#010x}")]
    DuplicateAddress(u32),

    /// Channel number outside the module.
    #[error("channel {channel} out of range (module has {nof_channels} channels)")]
    ChannelOutOfRange {
        /// Offending channel.
        channel: u16,
        /// Number of channels in the module.
        nof_channels: u16,
    },

    /// A cluster or strip was attributed to the wrong sensor side.
    #[error("side mismatch: expected {expected:?}, found {found:?}")]
    SideMismatch {
        /// Side required by the operation.
        expected: Side,
        /// Side carried by the data.
        found: Side,
    },

    /// Address field overflow.
    #[error("address field `{field}` value {value} exceeds {max}")]
    AddressField {
        /// Field name.
        field: &'static str,
        /// Requested value.
        value: u32,
        /// Largest allowed value.
        max: u32,
    },
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`].
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
