//! Batch estimation pipeline.
//!
//! Per dataset:
//!
//! 1. split every replicate at the onset time and clip the post-onset tail
//! 2. pass 1: pen = 0 fits (OU baseline, then tipping) on every replicate
//! 3. median model across the fitted replicates
//! 4. pen selection: fixed, or calibrated by simulated cross-validation
//! 5. pass 2 at the selected pen, producing the estimate table
//!
//! Replicates are independent, so the per-replicate loop runs in parallel
//! over read-only shared inputs.

use rayon::prelude::*;

use crate::domain::{
    Dataset, EstimateRow, FittedModel, PenMode, RunConfig, Trace, clip_below_floor,
};
use crate::error::AppError;
use crate::fit::penalty::{PenaltySelection, calibrate_pen};
use crate::fit::tipping::{TipInit, fit_tipping};
use crate::fit::fit_ou;
use crate::math::median;

/// One fitted replicate with its convergence flags.
#[derive(Debug, Clone)]
pub struct ReplicateFit {
    pub name: String,
    pub model: FittedModel,
    pub ou_converged: bool,
    pub tip_converged: bool,
}

/// One replicate's disposition: in the estimate table, or left out with a
/// reason. Skips are data conditions (unusable segments), not failures;
/// anything fatal surfaces as an `AppError` instead.
#[derive(Debug, Clone)]
pub enum ReplicateOutcome {
    Fitted(ReplicateFit),
    Skipped { name: String, reason: String },
}

/// Everything computed for one dataset run.
#[derive(Debug, Clone)]
pub struct DatasetOutput {
    pub name: String,
    /// The pen applied in the final pass (`None` for sweep outputs, where
    /// each row carries its own pen).
    pub pen: Option<f64>,
    pub rows: Vec<EstimateRow>,
    /// Calibration score table, when calibration ran.
    pub calibration: Option<PenaltySelection>,
    /// Per-replicate non-convergence notes (stage + replicate).
    pub warnings: Vec<String>,
    /// Replicates left out of the table, with reasons.
    pub skipped: Vec<(String, String)>,
}

/// Run the full two-pass estimation for one dataset.
pub fn run_dataset(dataset: &Dataset, config: &RunConfig) -> Result<DatasetOutput, AppError> {
    let onset = checked_onset_index(dataset, config)?;
    let init = TipInit {
        tau: config.tau_init,
        a: config.a_init,
    };

    // Pass 1: pen = 0 everywhere; also feeds the median model.
    let pass1 = fit_all(dataset, onset, config, 0.0, init)?;
    let fitted: Vec<&ReplicateFit> = pass1
        .iter()
        .filter_map(|o| match o {
            ReplicateOutcome::Fitted(fit) => Some(fit),
            ReplicateOutcome::Skipped { .. } => None,
        })
        .collect();
    if fitted.is_empty() {
        return Err(AppError::new(
            4,
            format!("Dataset '{}': no replicate could be fitted.", dataset.name),
        ));
    }
    let median_model = median_model(&fitted);

    let (pen, calibration) = match config.pen {
        PenMode::Fixed(pen) => (pen, None),
        PenMode::Calibrate => {
            let post_obs = dataset.times.len() - onset;
            let selection = calibrate_pen(
                &median_model,
                dataset.delta,
                onset,
                post_obs,
                config.post_floor,
                &config.pen_grid,
                init,
                config.min_post_obs,
                &config.crossval,
            )?;
            (selection.pen, Some(selection))
        }
    };

    // Pass 2: the pen = 0 pass is already the final answer when pen is 0.
    let final_pass = if pen == 0.0 {
        pass1
    } else {
        fit_all(dataset, onset, config, pen, init)?
    };

    let mut rows = Vec::new();
    let mut warnings = Vec::new();
    let mut skipped = Vec::new();
    for outcome in &final_pass {
        match outcome {
            ReplicateOutcome::Fitted(fit) => {
                collect_warnings(fit, &mut warnings);
                rows.push(EstimateRow::new(fit.name.clone(), &fit.model, config.t0, None));
            }
            ReplicateOutcome::Skipped { name, reason } => {
                skipped.push((name.clone(), reason.clone()));
            }
        }
    }

    Ok(DatasetOutput {
        name: dataset.name.clone(),
        pen: Some(pen),
        rows,
        calibration,
        warnings,
        skipped,
    })
}

/// Fit every replicate at every grid pen, producing the combined sweep table
/// (one block of rows per pen value, each row tagged with its pen).
pub fn run_pen_sweep(dataset: &Dataset, config: &RunConfig) -> Result<DatasetOutput, AppError> {
    let onset = checked_onset_index(dataset, config)?;
    let init = TipInit {
        tau: config.tau_init,
        a: config.a_init,
    };
    if config.pen_grid.is_empty() {
        return Err(AppError::new(2, "Pen sweep needs a non-empty pen grid."));
    }

    let mut rows = Vec::new();
    let mut warnings = Vec::new();
    let mut skipped = Vec::new();
    for &pen in &config.pen_grid {
        for outcome in fit_all(dataset, onset, config, pen, init)? {
            match outcome {
                ReplicateOutcome::Fitted(fit) => {
                    collect_warnings(&fit, &mut warnings);
                    rows.push(EstimateRow::new(fit.name, &fit.model, config.t0, Some(pen)));
                }
                ReplicateOutcome::Skipped { name, reason } => {
                    // Identical for every pen; record once.
                    if pen == config.pen_grid[0] {
                        skipped.push((name, reason));
                    }
                }
            }
        }
    }

    Ok(DatasetOutput {
        name: dataset.name.clone(),
        pen: None,
        rows,
        calibration: None,
        warnings,
        skipped,
    })
}

/// Split one replicate and fit OU then tipping, at a given pen.
///
/// Unusable segments (non-finite baseline values, a post-onset segment too
/// short after clipping) come back as `Skipped`; errors are reserved for
/// genuine fit failures.
pub fn fit_replicate(
    trace: &Trace,
    delta: f64,
    onset: usize,
    config: &RunConfig,
    pen: f64,
    init: TipInit,
) -> Result<ReplicateOutcome, AppError> {
    let baseline = &trace.values[..onset];
    if baseline.iter().any(|v| !v.is_finite()) {
        return Ok(ReplicateOutcome::Skipped {
            name: trace.name.clone(),
            reason: "baseline segment contains non-finite values".to_string(),
        });
    }
    let post = clip_below_floor(&trace.values[onset..], config.post_floor);
    let needed = config.min_post_obs.max(3);
    if post.len() < needed {
        return Ok(ReplicateOutcome::Skipped {
            name: trace.name.clone(),
            reason: format!(
                "post-onset segment too short after clipping ({} < {needed})",
                post.len()
            ),
        });
    }
    let ou = fit_ou(baseline, delta)?;
    let tip = fit_tipping(post, delta, &ou.params, pen, init)?;
    Ok(ReplicateOutcome::Fitted(ReplicateFit {
        name: trace.name.clone(),
        model: FittedModel {
            ou: ou.params,
            tip: tip.params,
        },
        ou_converged: ou.converged,
        tip_converged: tip.converged,
    }))
}

fn fit_all(
    dataset: &Dataset,
    onset: usize,
    config: &RunConfig,
    pen: f64,
    init: TipInit,
) -> Result<Vec<ReplicateOutcome>, AppError> {
    dataset
        .traces
        .par_iter()
        .map(|trace| fit_replicate(trace, dataset.delta, onset, config, pen, init))
        .collect()
}

fn checked_onset_index(dataset: &Dataset, config: &RunConfig) -> Result<usize, AppError> {
    let onset = dataset.onset_index(config.t0);
    if onset < 3 {
        return Err(AppError::new(
            3,
            format!(
                "Dataset '{}': only {} baseline observations before t0 = {}.",
                dataset.name, onset, config.t0
            ),
        ));
    }
    if onset >= dataset.times.len() {
        return Err(AppError::new(
            3,
            format!(
                "Dataset '{}': no observations at or after t0 = {}.",
                dataset.name, config.t0
            ),
        ));
    }
    Ok(onset)
}

fn collect_warnings(fit: &ReplicateFit, warnings: &mut Vec<String>) {
    if !fit.ou_converged {
        warnings.push(format!("OU fit did not converge for replicate '{}'.", fit.name));
    }
    if !fit.tip_converged {
        warnings.push(format!(
            "Tipping fit did not converge for replicate '{}'.",
            fit.name
        ));
    }
}

fn median_model(fits: &[&ReplicateFit]) -> FittedModel {
    let pick = |f: fn(&FittedModel) -> f64| {
        let values: Vec<f64> = fits.iter().map(|r| f(&r.model)).collect();
        median(&values).unwrap_or(f64::NAN)
    };
    FittedModel {
        ou: crate::domain::OuParams {
            alpha0: pick(|m| m.ou.alpha0),
            mu0: pick(|m| m.ou.mu0),
            sigma2: pick(|m| m.ou.sigma2),
        },
        tip: crate::domain::TipParams {
            tau: pick(|m| m.tip.tau),
            a: pick(|m| m.tip.a),
        },
    }
}
