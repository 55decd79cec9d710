//! Reconstruction configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use stripsim_core::Side;

/// Time cut between two objects: an absolute window, or a multiple of
/// their combined time error. Both unset disables the cut.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeCut {
    /// Absolute window [ns]; takes precedence when set.
    pub absolute: Option<f64>,
    /// Window in units of the combined time error.
    pub sigma: Option<f64>,
}

impl TimeCut {
    /// Cut in units of the combined time error.
    #[must_use]
    pub fn sigma(n: f64) -> Self {
        Self {
            absolute: None,
            sigma: Some(n),
        }
    }

    /// Absolute cut [ns].
    #[must_use]
    pub fn absolute(window: f64) -> Self {
        Self {
            absolute: Some(window),
            sigma: None,
        }
    }

    /// No time cut.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Window for a combined time error `sigma` [ns]; `None` if disabled.
    #[must_use]
    pub fn window(&self, sigma: f64) -> Option<f64> {
        match (self.absolute, self.sigma) {
            (Some(abs), _) if abs > 0.0 => Some(abs),
            (_, Some(n)) if n > 0.0 => Some(n * sigma),
            _ => None,
        }
    }

    /// True if two times are compatible under the cut.
    #[must_use]
    pub fn accepts(&self, dt: f64, sigma: f64) -> bool {
        self.window(sigma).map_or(true, |w| dt.abs() <= w)
    }

    fn validate(&self, name: &str) -> Result<()> {
        let bad = |v: Option<f64>| v.is_some_and(|v| !(v >= 0.0));
        if bad(self.absolute) || bad(self.sigma) {
            return Err(Error::Config(format!("{name} time cut must not be negative")));
        }
        Ok(())
    }
}

/// Reconstruction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    /// Matching window of digis in neighbouring channels. The sigma form
    /// multiplies `√2 · time_resolution` of the channel.
    pub digi_time_cut: TimeCut,
    /// Compatibility window of front and back clusters.
    pub cluster_time_cut: TimeCut,
    /// Round-the-edge connectivity per side (front, back). Only applied to
    /// modules whose sensors all have stereo strips.
    pub connect_edge: [bool; 2],
    /// Build one hit per cluster instead of front/back intersections.
    pub single_cluster_hits: bool,
    /// Strip pitch used for hit positions instead of the sensor's [cm].
    pub pitch_override: Option<f64>,
    /// Run module and sensor loops on the rayon pool.
    pub parallel: bool,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            digi_time_cut: TimeCut::sigma(3.0),
            cluster_time_cut: TimeCut::sigma(4.0),
            connect_edge: [true, true],
            single_cluster_hits: false,
            pitch_override: None,
            parallel: true,
        }
    }
}

// Intermediate structs for the JSON schema
#[derive(Deserialize)]
struct JsonConfig {
    reconstruction: JsonReconstruction,
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonReconstruction {
    clusters: JsonClusters,
    hits: JsonHits,
    parallel: bool,
}

impl Default for JsonReconstruction {
    fn default() -> Self {
        Self {
            clusters: JsonClusters::default(),
            hits: JsonHits::default(),
            parallel: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonClusters {
    time_cut_sigma: Option<f64>,
    time_cut_abs: Option<f64>,
    connect_front: bool,
    connect_back: bool,
}

impl Default for JsonClusters {
    fn default() -> Self {
        Self {
            time_cut_sigma: Some(3.0),
            time_cut_abs: None,
            connect_front: true,
            connect_back: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonHits {
    time_cut_sigma: Option<f64>,
    time_cut_abs: Option<f64>,
    single_cluster: bool,
    pitch: Option<f64>,
}

impl Default for JsonHits {
    fn default() -> Self {
        Self {
            time_cut_sigma: Some(4.0),
            time_cut_abs: None,
            single_cluster: false,
            pitch: None,
        }
    }
}

impl ReconstructionConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let json_config: JsonConfig = serde_json::from_reader(BufReader::new(file))?;
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
        let r = config.reconstruction;
        let config = Self {
            digi_time_cut: TimeCut {
                absolute: r.clusters.time_cut_abs,
                sigma: r.clusters.time_cut_sigma,
            },
            cluster_time_cut: TimeCut {
                absolute: r.hits.time_cut_abs,
                sigma: r.hits.time_cut_sigma,
            },
            connect_edge: [r.clusters.connect_front, r.clusters.connect_back],
            single_cluster_hits: r.hits.single_cluster,
            pitch_override: r.hits.pitch,
            parallel: r.parallel,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration once before the run.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for negative cuts or a non-positive pitch.
    pub fn validate(&self) -> Result<()> {
        self.digi_time_cut.validate("digi")?;
        self.cluster_time_cut.validate("cluster")?;
        if let Some(pitch) = self.pitch_override {
            if !(pitch > 0.0) {
                return Err(Error::Config(format!("pitch override {pitch} must be positive")));
            }
        }
        Ok(())
    }

    /// Round-the-edge connectivity of a side.
    #[inline]
    #[must_use]
    pub fn connects_edge(&self, side: Side) -> bool {
        self.connect_edge[side.index()]
    }

    /// Builder: set the digi matching window.
    #[must_use]
    pub fn with_digi_time_cut(mut self, cut: TimeCut) -> Self {
        self.digi_time_cut = cut;
        self
    }

    /// Builder: set the front/back cluster window.
    #[must_use]
    pub fn with_cluster_time_cut(mut self, cut: TimeCut) -> Self {
        self.cluster_time_cut = cut;
        self
    }

    /// Builder: set round-the-edge connectivity for one side.
    #[must_use]
    pub fn with_connect_edge(mut self, side: Side, connect: bool) -> Self {
        self.connect_edge[side.index()] = connect;
        self
    }

    /// Builder: enable single-cluster hits.
    #[must_use]
    pub fn with_single_cluster_hits(mut self, single: bool) -> Self {
        self.single_cluster_hits = single;
        self
    }

    /// Builder: override the strip pitch for hit positions.
    #[must_use]
    pub fn with_pitch_override(mut self, pitch: Option<f64>) -> Self {
        self.pitch_override = pitch;
        self
    }

    /// Builder: enable or disable parallel execution.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}
