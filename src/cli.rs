//! Command-line surface: load a run configuration, drive a KMC/MMC job
//! or an MMCFE sweep to completion, and inspect a saved state image's
//! jump histograms.
//!
//! **Usage**:
//! ```bash
//! mocsim run --config run.toml
//! mocsim mmcfe --config run.toml --db-path sweep.sqlite
//! mocsim print-jump-histograms run.mcs
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Runs a KMC or MMC job to completion, checkpointing periodically.
    Run {
        /// Path to the run configuration TOML file.
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Runs the MMCFE alpha sweep against a model, logging to a SQLite
    /// database.
    Mmcfe {
        #[arg(short, long)]
        config: PathBuf,

        /// Lower bound of the alpha ramp (exclusive of 0, inclusive otherwise).
        #[arg(long, default_value_t = 0.1)]
        alpha_min: f64,

        /// Upper bound of the alpha ramp (must not exceed 1).
        #[arg(long, default_value_t = 1.0)]
        alpha_max: f64,

        /// Number of steps the ramp is divided into; the sweep visits
        /// `alpha_count + 1` values from `alpha_min` to `alpha_max`.
        #[arg(long, default_value_t = 9)]
        alpha_count: u32,

        /// Half-width used to re-center the energy histogram after each
        /// relaxation phase.
        #[arg(long, default_value_t = 1.0)]
        histogram_range: f64,

        /// Number of bins in the energy histogram.
        #[arg(long, default_value_t = 200)]
        histogram_size: u32,

        /// Cycles spent relaxing at each alpha step before logging.
        #[arg(long, default_value_t = 50_000)]
        relax_cycles: u64,

        /// Cycles spent sampling the energy histogram at each alpha step.
        #[arg(long, default_value_t = 20_000)]
        log_cycles: u64,

        /// SQLite database path for the log entries.
        #[arg(long)]
        db_path: PathBuf,
    },

    /// Prints the per-(jump-collection, particle) jump energy histograms
    /// recorded in a saved state image.
    PrintJumpHistograms {
        /// Path to the saved `.mcs` state image.
        state_file: PathBuf,
    },
}
