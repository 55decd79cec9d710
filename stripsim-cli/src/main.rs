//! stripsim: digitize trajectory segments and reconstruct strip hits.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

mod setup;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use stripsim_core::{Cluster, Digi, Hit};
use stripsim_digi::{set_lorentz_corrections, Digitize, DigitizeConfig, RunMode};
use stripsim_io::{DataFileReader, DataFileWriter, RecordKind};
use stripsim_reco::{Reconstruction, ReconstructionConfig, ReconstructionOutput, ReconstructionStatistics};
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data file error: {0}")]
    StripIo(#[from] stripsim_io::Error),

    #[error("setup error: {0}")]
    Core(#[from] stripsim_core::Error),

    #[error("digitization error: {0}")]
    Digi(#[from] stripsim_digi::Error),

    #[error("reconstruction error: {0}")]
    Reco(#[from] stripsim_reco::Error),

    #[error("invalid input: {0}")]
    Input(String),
}

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Versioned binary records
    Bin,
    /// CSV tables
    Csv,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Format::Bin => "bin",
            Format::Csv => "csv",
        }
    }
}

/// Silicon strip detector digitization and local reconstruction.
#[derive(Parser)]
#[command(name = "stripsim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Digitize events and reconstruct clusters and hits
    Simulate {
        /// Detector setup (JSON)
        #[arg(long)]
        setup: PathBuf,

        /// Events with trajectory segments (JSON)
        #[arg(long)]
        events: PathBuf,

        /// Digitizer configuration (JSON with a "digitizer" section)
        #[arg(long)]
        digi_config: Option<PathBuf>,

        /// Reconstruction configuration (JSON with a "reconstruction" section)
        #[arg(long)]
        reco_config: Option<PathBuf>,

        /// Override the run mode of the digitizer configuration
        #[arg(long, value_enum)]
        mode: Option<Mode>,

        /// Override the random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "bin")]
        format: Format,
    },

    /// Show information about a binary data file
    Info {
        /// Input data file
        input: PathBuf,
    },
}

/// Run mode selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Read out every event completely
    Event,
    /// Free-streaming readout across events
    TimeBased,
}

/// Everything produced by one run, with indices valid across processing
/// units.
#[derive(Default)]
struct RunOutput {
    digis: Vec<Digi>,
    clusters: Vec<Cluster>,
    hits: Vec<Hit>,
    statistics: ReconstructionStatistics,
}

impl RunOutput {
    /// Appends one processing unit, shifting its digi and cluster indices.
    fn append(&mut self, digis: Vec<Digi>, output: ReconstructionOutput) {
        let digi_base = self.digis.len();
        let cluster_base = self.clusters.len();
        self.digis.extend(digis);
        self.clusters.extend(output.clusters.into_iter().map(|mut c| {
            for index in &mut c.digis {
                *index += digi_base;
            }
            c
        }));
        self.hits.extend(output.hits.into_iter().map(|mut h| {
            h.front_cluster = h.front_cluster.map(|i| i + cluster_base);
            h.back_cluster = h.back_cluster.map(|i| i + cluster_base);
            h
        }));
        self.statistics.merge(&output.statistics);
    }
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli.command) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Simulate {
            setup,
            events,
            digi_config,
            reco_config,
            mode,
            seed,
            output,
            format,
        } => {
            let mut digi_config = match digi_config {
                Some(path) => DigitizeConfig::from_file(path)?,
                None => DigitizeConfig::default(),
            };
            if let Some(mode) = mode {
                digi_config = digi_config.with_mode(match mode {
                    Mode::Event => RunMode::Event,
                    Mode::TimeBased => RunMode::TimeBased,
                });
            }
            if let Some(seed) = seed {
                digi_config = digi_config.with_seed(seed);
            }
            let reco_config = match reco_config {
                Some(path) => ReconstructionConfig::from_file(path)?,
                None => ReconstructionConfig::default(),
            };

            let setup_file: setup::SetupFile = setup::read_json(&setup)?;
            let events_file: setup::EventsFile = setup::read_json(&events)?;
            let params = digi_config.module_params()?;
            let (mut ctx, addresses) = setup::build_context(&setup_file, &params)?;
            if digi_config.physics.lorentz_shift {
                set_lorentz_corrections(&mut ctx)?;
            }
            info!(
                "setup: {} modules, {} sensors; {} events",
                ctx.nof_modules(),
                ctx.nof_sensors(),
                events_file.events.len()
            );

            let start = Instant::now();
            let time_based = digi_config.mode == RunMode::TimeBased;
            let mut digitize = Digitize::new(&ctx, digi_config)?;
            let reco = Reconstruction::new(&ctx, reco_config)?;
            let mut run = RunOutput::default();

            let mut pending = Vec::new();
            for (index, event) in events_file.events.iter().enumerate() {
                let segments = setup::event_segments(event, index, &addresses)?;
                let digis = digitize.process_event(event.time, &segments)?;
                if time_based {
                    pending.extend(digis);
                } else {
                    let output = reco.process(&digis)?;
                    run.append(digis, output);
                }
            }
            pending.extend(digitize.finish()?);
            if !pending.is_empty() {
                let output = reco.process(&pending)?;
                run.append(pending, output);
            }
            let elapsed = start.elapsed();

            fs::create_dir_all(&output)?;
            let path = |name: &str| output.join(format!("{name}.{}", format.extension()));
            write_outputs(&run, format, &path("digis"), &path("clusters"), &path("hits"))?;

            let stats = digitize.statistics();
            println!(
                "Processed {} events in {:.2}s",
                stats.events,
                elapsed.as_secs_f64()
            );
            println!(
                "Segments: {} ({} on unknown sensors)",
                stats.modules.segments, stats.segments_unknown_sensor
            );
            println!(
                "Signals: {} added, {} merged, {} on dead channels",
                stats.signals.added, stats.signals.merged, stats.signals.discarded_dead
            );
            println!(
                "Digis: {} ({} noise)",
                run.digis.len(),
                stats.modules.noise_digis
            );
            println!(
                "Clusters: {} ({} digis ignored)",
                run.clusters.len(),
                run.statistics.clusters.ignored
            );
            println!(
                "Hits: {} from {} cluster pairs ({} outside time cut, {} without intersection, {} clusters without strip)",
                run.hits.len(),
                run.statistics.hits.pairs,
                run.statistics.hits.rejected_time,
                run.statistics.hits.no_intersection,
                run.statistics.hits.unconnected
            );
            println!("Output: {}", output.display());
        }

        Commands::Info { input } => {
            let reader = DataFileReader::open(&input)?;
            let header = *reader.header();
            println!("File: {}", input.display());
            println!("Schema version: {}", header.version);
            println!("Records: {} {}s", header.count, header.kind.name());
            println!("Payload: {} bytes", reader.payload_size());

            match header.kind {
                RecordKind::Digi => {
                    let digis = reader.read::<Digi>()?;
                    if let (Some(first), Some(last)) = (
                        digis.iter().map(|d| d.time).min(),
                        digis.iter().map(|d| d.time).max(),
                    ) {
                        println!("Time range: {} - {} ns", first, last);
                    }
                    let noise = digis.iter().filter(|d| d.is_noise()).count();
                    println!("Noise digis: {}", noise);
                }
                RecordKind::Cluster => {
                    let clusters = reader.read::<Cluster>()?;
                    let members: usize = clusters.iter().map(Cluster::size).sum();
                    if !clusters.is_empty() {
                        println!(
                            "Mean cluster size: {:.2}",
                            members as f64 / clusters.len() as f64
                        );
                    }
                }
                RecordKind::Hit => {
                    let hits = reader.read::<Hit>()?;
                    let two_sided = hits.iter().filter(|h| h.is_two_sided()).count();
                    println!("Two-sided hits: {}", two_sided);
                }
            }
        }
    }

    Ok(())
}

fn write_outputs(run: &RunOutput, format: Format, digis: &Path, clusters: &Path, hits: &Path) -> Result<()> {
    let mut digi_writer = DataFileWriter::create(digis)?;
    let mut cluster_writer = DataFileWriter::create(clusters)?;
    let mut hit_writer = DataFileWriter::create(hits)?;
    match format {
        Format::Bin => {
            digi_writer.write_records(&run.digis)?;
            cluster_writer.write_records(&run.clusters)?;
            hit_writer.write_records(&run.hits)?;
        }
        Format::Csv => {
            digi_writer.write_digis_csv(&run.digis)?;
            cluster_writer.write_clusters_csv(&run.clusters)?;
            hit_writer.write_hits_csv(&run.hits)?;
        }
    }
    Ok(())
}
