//! stripsim-digi: detector response simulation for double-sided silicon
//! strip sensors.
//!
//! # Key Components
//!
//! - [`ChargeTransport`] - energy loss, Lorentz shift, diffusion and
//!   cross-talk from a trajectory segment to strip charges
//! - [`ChannelSignalBuffer`] - per-channel time-ordered signals with
//!   dead-time merging and horizon-based release
//! - [`Digitizer`] - threshold, ADC, time jitter and noise
//! - [`Digitize`] - run driver over all modules (event or time-based)
//!
//! # Processing Pipeline
//!
//! segment → strip charges → buffered signals → (horizon) → digis

pub mod buffer;
pub mod config;
pub mod digitize;
pub mod digitizer;
pub mod error;
pub mod module;
pub mod physics;
pub mod transport;

pub use buffer::{AddOutcome, BufferStatistics, ChannelSignalBuffer, FlushHorizon};
pub use config::{DigitizeConfig, EnergyLossModel, PhysicsSettings, RunMode};
pub use digitize::{set_lorentz_corrections, Digitize, DigitizeStatistics};
pub use digitizer::{noise_charge, Digitizer};
pub use error::{Error, Result};
pub use module::{ModuleStatistics, SimModule};
pub use physics::{mean_lorentz_shift, ChargeCarrier, Particle, UrbanModel, PAIR_CREATION_ENERGY};
pub use transport::{cross_talk, ChargeTransport, StripCharges};
