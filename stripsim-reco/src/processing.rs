//! Two-pass local reconstruction of a processing unit.
//!
//! Pass one finds and analyses clusters module by module. Pass two builds
//! hits sensor by sensor from the complete cluster list, so no hit finding
//! starts before every module has closed its clusters.

use crate::analyze::ClusterEstimator;
use crate::config::ReconstructionConfig;
use crate::error::Result;
use crate::find_clusters::{ClusterBuilder, ClusterBuilderStatistics};
use crate::find_hits::{HitBuilder, HitStatistics};
use log::{debug, info};
use rayon::prelude::*;
use stripsim_core::{
    Cluster, DetectorContext, Digi, Hit, LandauWidthTable, ModuleDescriptor, SensorDescriptor,
    Side,
};

type ModuleClusters = (Vec<Cluster>, ClusterBuilderStatistics);

/// Counters of a reconstruction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructionStatistics {
    /// Digis offered.
    pub digis: usize,
    /// Digis of modules missing from the setup.
    pub digis_unknown_module: usize,
    /// Cluster finder counters.
    pub clusters: ClusterBuilderStatistics,
    /// Clusters of modules missing from the setup.
    pub clusters_unknown_module: usize,
    /// Hit finder counters.
    pub hits: HitStatistics,
}

impl ReconstructionStatistics {
    /// Adds another set of counters.
    pub fn merge(&mut self, other: &ReconstructionStatistics) {
        self.digis += other.digis;
        self.digis_unknown_module += other.digis_unknown_module;
        self.clusters.merge(&other.clusters);
        self.clusters_unknown_module += other.clusters_unknown_module;
        self.hits.merge(&other.hits);
    }
}

/// Clusters and hits of one processing unit.
#[derive(Debug, Clone, Default)]
pub struct ReconstructionOutput {
    /// Clusters, grouped by module in setup order. Member indices refer to
    /// the digi input.
    pub clusters: Vec<Cluster>,
    /// Hits, grouped by sensor in setup order. Cluster indices refer to
    /// [`Self::clusters`].
    pub hits: Vec<Hit>,
    /// Counters of this unit.
    pub statistics: ReconstructionStatistics,
}

/// Local reconstruction over a detector setup.
#[derive(Debug, Clone)]
pub struct Reconstruction<'a> {
    ctx: &'a DetectorContext,
    config: ReconstructionConfig,
    landau: LandauWidthTable,
}

impl<'a> Reconstruction<'a> {
    /// Creates the reconstruction for a prepared setup.
    ///
    /// # Errors
    /// Returns a configuration error if the configuration is invalid or a
    /// sensor has no derived parameters.
    pub fn new(ctx: &'a DetectorContext, config: ReconstructionConfig) -> Result<Self> {
        config.validate()?;
        for sensor in ctx.sensors() {
            ctx.sensor_dssd(sensor.address)?;
        }
        Ok(Self {
            ctx,
            config,
            landau: LandauWidthTable::default(),
        })
    }

    /// Replaces the Landau width table used for cluster errors.
    #[must_use]
    pub fn with_landau_table(mut self, landau: LandauWidthTable) -> Self {
        self.landau = landau;
        self
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Round-the-edge connectivity of a module: configured per side and
    /// only for modules reading stereo sensors exclusively.
    fn connect_edge(&self, module: &ModuleDescriptor) -> [bool; 2] {
        let stereo = module.sensors.iter().all(|&slot| {
            self.ctx.sensors()[slot]
                .prepared()
                .is_some_and(|sensor| !sensor.is_orthogonal())
        });
        [
            stereo && self.config.connects_edge(Side::Front),
            stereo && self.config.connects_edge(Side::Back),
        ]
    }

    /// Finds and analyses the clusters of all modules.
    ///
    /// Digis need not be sorted; each module's digis are processed in time
    /// order.
    ///
    /// # Errors
    /// Returns an error for channels outside their module.
    pub fn find_clusters(&self, digis: &[Digi]) -> Result<(Vec<Cluster>, ReconstructionStatistics)> {
        let modules = self.ctx.modules();
        let mut stats = ReconstructionStatistics {
            digis: digis.len(),
            ..Default::default()
        };

        let mut per_module: Vec<Vec<usize>> = vec![Vec::new(); modules.len()];
        for (index, digi) in digis.iter().enumerate() {
            if let Some(slot) = self.ctx.module_slot(digi.address) {
                per_module[slot].push(index);
            } else {
                debug!("skipping digi on unknown module {}", digi.address);
                stats.digis_unknown_module += 1;
            }
        }
        for indices in &mut per_module {
            indices.sort_by_key(|&i| (digis[i].time, digis[i].channel));
        }

        let run_module = |(module, indices): (&ModuleDescriptor, &Vec<usize>)| -> Result<ModuleClusters> {
            let mut builder = ClusterBuilder::new(
                module.address,
                &module.params,
                &self.config.digi_time_cut,
                self.connect_edge(module),
            );
            for &index in indices {
                let digi = &digis[index];
                builder.process_digi(digi.channel, digi.time_ns(), index)?;
            }
            let mut clusters = builder.finish();
            let estimator = ClusterEstimator::new(&module.params, &self.landau);
            for cluster in &mut clusters {
                estimator.analyze(cluster, digis)?;
            }
            Ok((clusters, *builder.statistics()))
        };

        let per_module: Vec<ModuleClusters> = if self.config.parallel {
            modules
                .par_iter()
                .zip(per_module.par_iter())
                .map(run_module)
                .collect::<Result<_>>()?
        } else {
            modules
                .iter()
                .zip(per_module.iter())
                .map(run_module)
                .collect::<Result<_>>()?
        };

        let mut clusters = Vec::new();
        for (module_clusters, module_stats) in per_module {
            stats.clusters.merge(&module_stats);
            clusters.extend(module_clusters);
        }
        Ok((clusters, stats))
    }

    /// Builds the hits of all sensors from a complete cluster list.
    ///
    /// # Errors
    /// Returns an error if a cluster is inconsistent with its sensor.
    pub fn find_hits(&self, clusters: &[Cluster]) -> Result<(Vec<Hit>, ReconstructionStatistics)> {
        let mut stats = ReconstructionStatistics::default();
        let mut per_module: Vec<Vec<usize>> = vec![Vec::new(); self.ctx.nof_modules()];
        for (index, cluster) in clusters.iter().enumerate() {
            if let Some(slot) = self.ctx.module_slot(cluster.address) {
                per_module[slot].push(index);
            } else {
                stats.clusters_unknown_module += 1;
            }
        }

        let run_sensor = |sensor: &SensorDescriptor| -> Result<(Vec<Hit>, HitStatistics)> {
            let members = &per_module[sensor.module];
            if members.is_empty() {
                return Ok((Vec::new(), HitStatistics::default()));
            }
            let dssd = self.ctx.sensor_dssd(sensor.address)?;
            HitBuilder::new(sensor.address, dssd, &self.config).build(clusters, members)
        };

        let sensors = self.ctx.sensors();
        let per_sensor: Vec<(Vec<Hit>, HitStatistics)> = if self.config.parallel {
            sensors.par_iter().map(run_sensor).collect::<Result<_>>()?
        } else {
            sensors.iter().map(run_sensor).collect::<Result<_>>()?
        };

        let mut hits = Vec::new();
        for (sensor_hits, sensor_stats) in per_sensor {
            stats.hits.merge(&sensor_stats);
            hits.extend(sensor_hits);
        }
        Ok((hits, stats))
    }

    /// Runs both passes on the digis of one processing unit.
    ///
    /// # Errors
    /// Returns the first integrity error of either pass.
    pub fn process(&self, digis: &[Digi]) -> Result<ReconstructionOutput> {
        let (clusters, mut statistics) = self.find_clusters(digis)?;
        let (hits, hit_stats) = self.find_hits(&clusters)?;
        statistics.merge(&hit_stats);
        info!(
            "reconstructed {} digis: {} clusters ({} digis ignored), {} hits from {} pairs",
            statistics.digis,
            clusters.len(),
            statistics.clusters.ignored,
            hits.len(),
            statistics.hits.pairs
        );
        Ok(ReconstructionOutput {
            clusters,
            hits,
            statistics,
        })
    }
}
