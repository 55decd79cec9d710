//! Digitization configuration.
//!
//! Loaded once before the run, validated, then shared read-only by all
//! module workers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use stripsim_core::{AsicParams, ModuleParams};

/// Energy-loss model along a trajectory segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyLossModel {
    /// All charge at the segment midpoint.
    Ideal,
    /// Charge distributed uniformly over fixed-size steps.
    Uniform,
    /// Fluctuating step losses from the Urban model.
    #[default]
    Urban,
}

/// Readout mode of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Every event is read out completely before the next starts.
    #[default]
    Event,
    /// Free-streaming readout: signals are released once no later signal
    /// can interfere, noise is generated between events.
    TimeBased,
}

/// Physics process switches of the charge transport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    /// Energy-loss model.
    pub energy_loss: EnergyLossModel,
    /// Lorentz shift of drifting charge carriers.
    pub lorentz_shift: bool,
    /// Thermal diffusion onto neighbouring strips.
    pub diffusion: bool,
    /// Capacitive cross-talk between neighbouring strips.
    pub cross_talk: bool,
    /// Step length for the uniform and Urban models [cm].
    pub step_size: f64,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            energy_loss: EnergyLossModel::Urban,
            lorentz_shift: true,
            diffusion: true,
            cross_talk: true,
            step_size: 3.0e-4,
        }
    }
}

impl PhysicsSettings {
    /// No fluctuations, no transport effects: charge lands on the strip
    /// under the segment midpoint.
    #[must_use]
    pub fn ideal() -> Self {
        Self {
            energy_loss: EnergyLossModel::Ideal,
            lorentz_shift: false,
            diffusion: false,
            cross_talk: false,
            ..Self::default()
        }
    }
}

/// Digitization configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitizeConfig {
    /// Readout mode.
    pub mode: RunMode,
    /// Seed for all random number streams.
    pub seed: u64,
    /// Charge transport switches.
    pub physics: PhysicsSettings,
    /// Noise generation and smearing.
    pub noise: bool,
    /// ASIC parameters applied to every module built from this configuration.
    pub asic: AsicParams,
    /// Channels per module.
    pub nof_channels: u16,
    /// Channels per ASIC.
    pub channels_per_asic: u16,
    /// Fraction of channels randomly flagged dead.
    pub dead_channel_fraction: f64,
    /// Module channels flagged dead in every module, on top of the random
    /// fraction.
    pub dead_channels: Vec<u16>,
}

impl Default for DigitizeConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Event,
            seed: 0,
            physics: PhysicsSettings::default(),
            noise: true,
            asic: AsicParams::default(),
            nof_channels: ModuleParams::DEFAULT_CHANNELS,
            channels_per_asic: ModuleParams::DEFAULT_CHANNELS_PER_ASIC,
            dead_channel_fraction: 0.0,
            dead_channels: Vec::new(),
        }
    }
}

// Intermediate structs for the JSON schema
#[derive(Deserialize)]
struct JsonConfig {
    digitizer: JsonDigitizer,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct JsonDigitizer {
    mode: RunMode,
    seed: u64,
    physics: PhysicsSettings,
    noise: JsonNoise,
    asic: AsicParams,
    module: JsonModule,
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonNoise {
    enabled: bool,
    dead_channel_fraction: f64,
    dead_channels: Vec<u16>,
}

impl Default for JsonNoise {
    fn default() -> Self {
        Self {
            enabled: true,
            dead_channel_fraction: 0.0,
            dead_channels: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonModule {
    nof_channels: u16,
    channels_per_asic: u16,
}

impl Default for JsonModule {
    fn default() -> Self {
        Self {
            nof_channels: ModuleParams::DEFAULT_CHANNELS,
            channels_per_asic: ModuleParams::DEFAULT_CHANNELS_PER_ASIC,
        }
    }
}

impl DigitizeConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let json_config: JsonConfig = serde_json::from_reader(reader)?;
        Self::from_json_config(json_config)
    }

    /// Load configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the document cannot be parsed or validated.
    pub fn from_json(json: &str) -> Result<Self> {
        let json_config: JsonConfig = serde_json::from_str(json)?;
        Self::from_json_config(json_config)
    }

    fn from_json_config(config: JsonConfig) -> Result<Self> {
        let d = config.digitizer;
        let config = Self {
            mode: d.mode,
            seed: d.seed,
            physics: d.physics,
            noise: d.noise.enabled,
            asic: d.asic,
            nof_channels: d.module.nof_channels,
            channels_per_asic: d.module.channels_per_asic,
            dead_channel_fraction: d.noise.dead_channel_fraction,
            dead_channels: d.noise.dead_channels,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration once before the run.
    ///
    /// # Errors
    /// Returns [`Error::Config`] or a core parameter error.
    pub fn validate(&self) -> Result<()> {
        self.asic.validate()?;
        if !(0.0..=1.0).contains(&self.dead_channel_fraction) {
            return Err(Error::Config(format!(
                "dead channel fraction {} outside [0, 1]",
                self.dead_channel_fraction
            )));
        }
        if let Some(&channel) = self.dead_channels.iter().find(|&&c| c >= self.nof_channels) {
            return Err(Error::Config(format!(
                "dead channel {channel} outside {} module channels",
                self.nof_channels
            )));
        }
        if !(self.physics.step_size > 0.0) {
            return Err(Error::Config("step size must be positive".into()));
        }
        Ok(())
    }

    /// Module parameters with every ASIC set to [`Self::asic`].
    ///
    /// # Errors
    /// Returns an error for inconsistent channel counts.
    pub fn module_params(&self) -> Result<ModuleParams> {
        Ok(ModuleParams::new(
            self.nof_channels,
            self.channels_per_asic,
            self.asic,
        )?)
    }

    /// Builder: set the run mode.
    #[must_use]
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder: set the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder: set the physics switches.
    #[must_use]
    pub fn with_physics(mut self, physics: PhysicsSettings) -> Self {
        self.physics = physics;
        self
    }

    /// Builder: enable or disable noise.
    #[must_use]
    pub fn with_noise(mut self, noise: bool) -> Self {
        self.noise = noise;
        self
    }

    /// Builder: set the ASIC parameters.
    #[must_use]
    pub fn with_asic(mut self, asic: AsicParams) -> Self {
        self.asic = asic;
        self
    }

    /// Builder: set the random dead-channel fraction.
    #[must_use]
    pub fn with_dead_channel_fraction(mut self, fraction: f64) -> Self {
        self.dead_channel_fraction = fraction;
        self
    }

    /// Builder: set the explicit dead-channel list.
    #[must_use]
    pub fn with_dead_channels(mut self, channels: Vec<u16>) -> Self {
        self.dead_channels = channels;
        self
    }
}
