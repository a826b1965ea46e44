//! Export estimate tables, pen sweeps and residuals to CSV.
//!
//! The exports are meant to be easy to consume in spreadsheets or downstream
//! plotting scripts.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::{Dataset, EstimateRow};
use crate::error::AppError;

fn create(path: &Path) -> Result<File, AppError> {
    File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", path.display())))
}

fn write_err(path: &Path, e: std::io::Error) -> AppError {
    AppError::new(2, format!("Failed to write '{}': {e}", path.display()))
}

/// Write a per-replicate estimate table.
///
/// With `include_pen` the table carries the extra `pen` column used by
/// penalization sweeps; rows without a recorded pen write an empty cell.
pub fn write_estimates_csv(
    path: &Path,
    rows: &[EstimateRow],
    include_pen: bool,
) -> Result<(), AppError> {
    let mut file = create(path)?;

    let header = if include_pen {
        "replicate,alpha0,mu0,lambda0,tau,s2,m,a,tc,pen"
    } else {
        "replicate,alpha0,mu0,lambda0,tau,s2,m,a,tc"
    };
    writeln!(file, "{header}").map_err(|e| write_err(path, e))?;

    for r in rows {
        let base = format!(
            "{},{:.10},{:.10},{:.10},{:.10},{:.10},{:.10},{:.10},{:.10}",
            r.replicate, r.alpha0, r.mu0, r.lambda0, r.tau, r.s2, r.m, r.a, r.tc
        );
        let line = if include_pen {
            match r.pen {
                Some(pen) => format!("{base},{pen:.10}"),
                None => format!("{base},"),
            }
        } else {
            base
        };
        writeln!(file, "{line}").map_err(|e| write_err(path, e))?;
    }
    Ok(())
}

/// Write one replicate's standardized residuals as a single column.
pub fn write_residuals_csv(path: &Path, residuals: &[f64]) -> Result<(), AppError> {
    let mut file = create(path)?;
    writeln!(file, "residual").map_err(|e| write_err(path, e))?;
    for r in residuals {
        writeln!(file, "{r:.10}").map_err(|e| write_err(path, e))?;
    }
    Ok(())
}

/// Write a dataset in the ingest format (`time,<rep1>,...`).
///
/// Used by `tipfit simulate` to produce synthetic validation inputs.
pub fn write_traces_csv(path: &Path, dataset: &Dataset) -> Result<(), AppError> {
    let mut file = create(path)?;

    let mut header = String::from("time");
    for trace in &dataset.traces {
        header.push(',');
        header.push_str(&trace.name);
    }
    writeln!(file, "{header}").map_err(|e| write_err(path, e))?;

    for (i, t) in dataset.times.iter().enumerate() {
        let mut line = format!("{t:.10}");
        for trace in &dataset.traces {
            line.push_str(&format!(",{:.10}", trace.values[i]));
        }
        writeln!(file, "{line}").map_err(|e| write_err(path, e))?;
    }
    Ok(())
}
