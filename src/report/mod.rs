//! Reporting: residual diagnostics and terminal summaries.

use crate::app::pipeline::DatasetOutput;
use crate::domain::FittedModel;
use crate::error::AppError;
use crate::fit::tipping::strang_transition;
use crate::math::median;

/// Standardized one-step-ahead residuals under the fitted tipping model.
///
/// For each observed transition the Strang approximation implies a Gaussian
/// location and scale (same half-step transform as the estimator); the
/// residual is `(z - mean) / sqrt(var)`. Under a well-specified model these
/// are approximately iid standard normal, which an external plotting
/// collaborator can check against a normal reference (QQ plot).
pub fn standardized_residuals(
    values: &[f64],
    delta: f64,
    model: &FittedModel,
) -> Result<Vec<f64>, AppError> {
    if values.len() < 2 {
        return Err(AppError::new(
            4,
            "Residual diagnostics need at least 2 post-onset observations.",
        ));
    }
    let mut out = Vec::with_capacity(values.len() - 1);
    for k in 0..values.len() - 1 {
        let t = k as f64 * delta;
        let s = strang_transition(
            values[k],
            values[k + 1],
            t,
            delta,
            &model.ou,
            model.tip.tau,
            model.tip.a,
        )
        .ok_or_else(|| {
            AppError::new(
                4,
                format!("Model-implied transition undefined at step {k} (t = {t:.4})."),
            )
        })?;
        out.push((s.z - s.mean) / s.var.sqrt());
    }
    Ok(out)
}

/// Human-readable summary of one dataset run.
pub fn format_dataset_summary(output: &DatasetOutput) -> String {
    let mut s = String::new();
    s.push_str(&format!(
        "dataset {}: {} replicate(s) fitted",
        output.name,
        output.rows.len()
    ));
    match output.pen {
        Some(pen) => s.push_str(&format!(", pen = {pen:.4}\n")),
        None => s.push('\n'),
    }

    if let Some(cal) = &output.calibration {
        s.push_str("  pen calibration (pen, mse, n):\n");
        for score in &cal.table {
            s.push_str(&format!(
                "    {:>8.4}  {:>12.6}  {}\n",
                score.pen, score.mse, score.n_used
            ));
        }
    }

    let taus: Vec<f64> = output.rows.iter().map(|r| r.tau).collect();
    let curvatures: Vec<f64> = output.rows.iter().map(|r| r.a).collect();
    let tcs: Vec<f64> = output.rows.iter().map(|r| r.tc).collect();
    if let (Some(tau), Some(a), Some(tc)) = (median(&taus), median(&curvatures), median(&tcs)) {
        s.push_str(&format!(
            "  median tau = {tau:.2}, median a = {a:.4}, median tc = {tc:.2}\n"
        ));
    }

    for (name, reason) in &output.skipped {
        s.push_str(&format!("  skipped {name}: {reason}\n"));
    }
    if !output.warnings.is_empty() {
        s.push_str(&format!("  {} convergence warning(s)\n", output.warnings.len()));
    }
    s
}
