//! Command-line parsing for the tipping-point estimator.
//!
//! The goal of this module is to keep **argument parsing** and **command
//! dispatch** separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "tipfit",
    version,
    about = "Tipping-point parameter estimation for noisy time series"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit every replicate of one or more datasets and write estimate tables.
    Fit(FitArgs),
    /// Refit one dataset at every pen grid value and write the combined table.
    Sweep(FitArgs),
    /// Write standardized one-step residuals for a single replicate.
    Residuals(ResidualsArgs),
    /// Generate a synthetic replicate ensemble in the ingest CSV format.
    Simulate(SimulateArgs),
}

/// Common options for fitting and pen sweeps.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Input CSV file, or a directory of CSV files (one dataset each).
    pub input: PathBuf,

    /// Output directory for estimate tables.
    #[arg(short = 'o', long, default_value = "out")]
    pub out: PathBuf,

    /// Onset time of the control-parameter ramp.
    #[arg(long, default_value_t = 1924.0)]
    pub t0: f64,

    /// Post-onset observations at or below this floor end the usable segment.
    #[arg(long, default_value_t = -1.2, allow_negative_numbers = true)]
    pub post_floor: f64,

    /// Fixed penalization weight (skips calibration).
    #[arg(long, conflicts_with = "calibrate")]
    pub pen: Option<f64>,

    /// Calibrate the penalization weight by simulated cross-validation.
    #[arg(long)]
    pub calibrate: bool,

    /// Largest candidate weight in the pen grid.
    #[arg(long, default_value_t = 0.5)]
    pub pen_max: f64,

    /// Number of evenly spaced pen grid values on [0, pen-max].
    #[arg(long, default_value_t = 11)]
    pub pen_steps: usize,

    /// Cross-validation replicates per grid value.
    #[arg(long, default_value_t = 50)]
    pub nsim: usize,

    /// Fine integration steps per observation interval in cross-validation.
    #[arg(long, default_value_t = 30)]
    pub nloop: usize,

    /// Base seed for cross-validation simulations.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Starting ramp duration for the tipping fit.
    #[arg(long, default_value_t = 100.0)]
    pub tau_init: f64,

    /// Starting curvature for the tipping fit.
    #[arg(long, default_value_t = 1.0)]
    pub a_init: f64,

    /// Minimum post-onset observations required to fit a replicate.
    #[arg(long, default_value_t = 20)]
    pub min_post: usize,
}

/// Options for residual diagnostics of one replicate.
#[derive(Debug, Parser)]
pub struct ResidualsArgs {
    /// Input CSV file.
    pub input: PathBuf,

    /// Replicate column name (defaults to the first replicate).
    #[arg(short = 'r', long)]
    pub replicate: Option<String>,

    /// Reuse a previously exported fitted-model JSON instead of refitting.
    #[arg(long, value_name = "JSON")]
    pub model: Option<PathBuf>,

    /// Export the fitted model (parameters + run context) to JSON.
    #[arg(long = "export-model", value_name = "JSON", conflicts_with = "model")]
    pub export_model: Option<PathBuf>,

    /// Output directory.
    #[arg(short = 'o', long, default_value = "out")]
    pub out: PathBuf,

    /// Onset time of the control-parameter ramp.
    #[arg(long, default_value_t = 1924.0)]
    pub t0: f64,

    /// Post-onset observations at or below this floor end the usable segment.
    #[arg(long, default_value_t = -1.2, allow_negative_numbers = true)]
    pub post_floor: f64,

    /// Penalization weight used for the fit.
    #[arg(long, default_value_t = 0.0)]
    pub pen: f64,

    /// Starting ramp duration for the tipping fit.
    #[arg(long, default_value_t = 100.0)]
    pub tau_init: f64,

    /// Starting curvature for the tipping fit.
    #[arg(long, default_value_t = 1.0)]
    pub a_init: f64,
}

/// Options for generating a synthetic ensemble.
#[derive(Debug, Parser)]
pub struct SimulateArgs {
    /// Output CSV file.
    #[arg(short = 'o', long, default_value = "simulated.csv")]
    pub out: PathBuf,

    /// Baseline mean-reversion rate.
    #[arg(long, default_value_t = 3.0)]
    pub alpha0: f64,

    /// Baseline stationary mean.
    #[arg(long, default_value_t = 0.25)]
    pub mu0: f64,

    /// Diffusion variance.
    #[arg(long, default_value_t = 0.033)]
    pub sigma2: f64,

    /// Ramp duration from onset to the bifurcation.
    #[arg(long, default_value_t = 130.0)]
    pub tau: f64,

    /// Drift curvature.
    #[arg(long, default_value_t = 0.9)]
    pub a: f64,

    /// Observation spacing.
    #[arg(long, default_value_t = 1.0 / 12.0)]
    pub delta: f64,

    /// Onset time written to the output time axis.
    #[arg(long, default_value_t = 1924.0)]
    pub t0: f64,

    /// Observations before the onset.
    #[arg(long, default_value_t = 660)]
    pub baseline_obs: usize,

    /// Observations after the onset.
    #[arg(long, default_value_t = 1000)]
    pub post_obs: usize,

    /// Number of replicates.
    #[arg(short = 'n', long, default_value_t = 10)]
    pub nrep: usize,

    /// Fine integration steps per observation interval.
    #[arg(long, default_value_t = 30)]
    pub nloop: usize,

    /// Random seed; replicate `i` uses `seed + i`.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}
