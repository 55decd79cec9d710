//! stripsim-reco: local reconstruction for double-sided strip sensors.
//!
//! - [`ClusterBuilder`] - per-module channel state machine grouping
//!   neighbouring digis, with optional round-the-edge connectivity
//! - [`ClusterEstimator`] - charge, position and time of a cluster with
//!   closed-form errors
//! - [`HitBuilder`] - front/back cluster intersections per sensor, including
//!   stereo ghosts and single-cluster hits
//! - [`Reconstruction`] - two-pass driver (all clusters, then all hits)
//!
#![warn(missing_docs)]

mod analyze;
mod config;
mod error;
mod find_clusters;
mod find_hits;
mod processing;

pub use analyze::ClusterEstimator;
pub use config::{ReconstructionConfig, TimeCut};
pub use error::{Error, Result};
pub use find_clusters::{ClusterBuilder, ClusterBuilderStatistics};
pub use find_hits::{intersect, HitBuilder, HitStatistics, StripLine};
pub use processing::{Reconstruction, ReconstructionOutput, ReconstructionStatistics};
