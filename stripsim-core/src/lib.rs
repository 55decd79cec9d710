//! stripsim-core: data model and detector description for double-sided
//! silicon strip sensors.
//!
//! This crate provides the types shared by every pipeline stage: signals,
//! digis, clusters and hits with their provenance, packed element addresses,
//! read-out parameters, sensor geometry with strip ⇄ channel mapping, and the
//! [`DetectorContext`] setup arena.
//!

pub mod address;
pub mod clustering;
pub mod context;
pub mod digi;
pub mod error;
pub mod geometry;
pub mod hit;
pub mod landau;
pub mod link;
pub mod params;
pub mod segment;
pub mod signal;

pub use address::{ElementLevel, Side, StsAddress};
pub use clustering::Cluster;
pub use context::{DetectorContext, ElementId, ModuleDescriptor, SensorDescriptor, SetupElement};
pub use digi::{sort_digis, Digi};
pub use error::{Error, Result};
pub use geometry::{SensorConditions, SensorDssd, SensorGeometry, SensorTransform, StripLayout};
pub use hit::{Covariance2, Hit};
pub use landau::LandauWidthTable;
pub use link::{Link, Match, Origin};
pub use params::{AsicParams, ModuleParams};
pub use segment::TrajectorySegment;
pub use signal::Signal;
