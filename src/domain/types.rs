//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable where they
//! cross the export boundary, so they can be:
//!
//! - used in-memory during estimation
//! - exported to CSV
//! - reloaded later for diagnostics or comparisons

use serde::{Deserialize, Serialize};

/// One observed (or simulated) replicate trace.
///
/// Values sit on the shared uniform time grid of the owning [`Dataset`];
/// traces are immutable once loaded or generated.
#[derive(Debug, Clone)]
pub struct Trace {
    pub name: String,
    pub values: Vec<f64>,
}

/// A set of replicate traces on one uniform time grid.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Dataset label (file stem for ingested data).
    pub name: String,
    /// Observation time step (decimal years for monthly data: 1/12).
    pub delta: f64,
    /// Absolute time axis shared by every replicate.
    pub times: Vec<f64>,
    pub traces: Vec<Trace>,
}

impl Dataset {
    /// Index of the first observation at or after the onset time `t0`.
    ///
    /// Everything before the index is the baseline segment; everything from
    /// the index on is the post-onset segment.
    pub fn onset_index(&self, t0: f64) -> usize {
        self.times
            .iter()
            .position(|t| *t >= t0)
            .unwrap_or(self.times.len())
    }
}

/// Truncate a post-onset segment at the first observation at or below `floor`.
///
/// Guards against fitting past an already-tipped trajectory. Non-finite
/// values count as below the floor, which is also how NaN-padded
/// cross-validation traces are cut back to their simulated length.
pub fn clip_below_floor(values: &[f64], floor: f64) -> &[f64] {
    let end = values
        .iter()
        .position(|v| !(*v > floor))
        .unwrap_or(values.len());
    &values[..end]
}

/// Stationary OU parameter set fitted on the baseline segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OuParams {
    /// Mean-reversion (decay) rate, > 0.
    pub alpha0: f64,
    /// Stationary mean level.
    pub mu0: f64,
    /// Infinitesimal variance, >= 0.
    pub sigma2: f64,
}

impl OuParams {
    /// Stationary variance `sigma2 / (2 alpha0)`.
    pub fn stationary_var(&self) -> f64 {
        self.sigma2 / (2.0 * self.alpha0)
    }
}

/// Tipping-model parameter pair fitted on the post-onset segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TipParams {
    /// Ramp duration (time units from onset to the critical point), > 0.
    pub tau: f64,
    /// Curvature coefficient of the quadratic drift, > 0.
    pub a: f64,
}

/// A complete fitted replicate model.
///
/// The secondary quantities `m`, `lambda0` and `tc` are pure functions of the
/// stored parameters and are always recomputed, never stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub ou: OuParams,
    pub tip: TipParams,
}

impl FittedModel {
    /// Mean shift of the quadratic drift, `mu0 - alpha0 / (2a)`.
    pub fn m(&self) -> f64 {
        self.ou.mu0 - self.ou.alpha0 / (2.0 * self.tip.a)
    }

    /// Stationary control level, `-alpha0^2 / (4a)`.
    pub fn lambda0(&self) -> f64 {
        -self.ou.alpha0 * self.ou.alpha0 / (4.0 * self.tip.a)
    }

    /// Estimated critical time, `t0 + tau`.
    pub fn tc(&self, t0: f64) -> f64 {
        t0 + self.tip.tau
    }
}

/// One output row of a dataset's estimate table. Exported as CSV (see
/// `io::export`).
#[derive(Debug, Clone)]
pub struct EstimateRow {
    pub replicate: String,
    pub alpha0: f64,
    pub mu0: f64,
    pub lambda0: f64,
    pub tau: f64,
    pub s2: f64,
    pub m: f64,
    pub a: f64,
    pub tc: f64,
    /// Present only in penalization sweeps.
    pub pen: Option<f64>,
}

impl EstimateRow {
    /// Assemble a row from a fitted model, recomputing all derived columns.
    pub fn new(replicate: impl Into<String>, model: &FittedModel, t0: f64, pen: Option<f64>) -> Self {
        Self {
            replicate: replicate.into(),
            alpha0: model.ou.alpha0,
            mu0: model.ou.mu0,
            lambda0: model.lambda0(),
            tau: model.tip.tau,
            s2: model.ou.sigma2,
            m: model.m(),
            a: model.tip.a,
            tc: model.tc(t0),
            pen,
        }
    }
}

/// How the penalization weight for a dataset is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PenMode {
    /// Use this weight for every replicate.
    Fixed(f64),
    /// Select the weight by simulated cross-validation over the pen grid.
    Calibrate,
}

/// Cross-validation ensemble settings.
#[derive(Debug, Clone, Copy)]
pub struct CrossvalSettings {
    /// Number of simulated cross-validation replicates.
    pub nsim: usize,
    /// Fine integration steps per observation interval.
    pub nloop: usize,
    /// Base seed; replicate `i` uses `seed + i`.
    pub seed: u64,
}

/// Immutable estimation configuration for one batch run.
///
/// Constants shared across routines (`t0`, the pen grid, the post-onset
/// floor) are threaded through this object rather than held as ambient state.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Shared onset time of the control-parameter ramp.
    pub t0: f64,
    /// Lower floor for post-onset observations (trace-specific constant,
    /// see DESIGN.md).
    pub post_floor: f64,
    pub pen: PenMode,
    /// Candidate penalization weights, in selection order.
    pub pen_grid: Vec<f64>,
    pub crossval: CrossvalSettings,
    /// Starting ramp duration for the tipping fit.
    pub tau_init: f64,
    /// Starting curvature for the tipping fit.
    pub a_init: f64,
    /// Minimum post-onset observations required to fit a replicate.
    pub min_post_obs: usize,
}
