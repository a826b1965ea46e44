//! CSV ingest of replicate trace tables.
//!
//! Expected format: a header row `time,<rep1>,<rep2>,...` followed by one row
//! per time point, each holding the time followed by one value per replicate.
//! The time grid must be uniform and strictly increasing. Malformed files
//! (wrong column count, non-numeric cells, ragged rows) fail fast with a
//! descriptive error; estimators never see bad data.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{Dataset, Trace};
use crate::error::AppError;

/// Relative tolerance for the uniform-grid check.
const GRID_TOLERANCE: f64 = 1e-6;

/// Read a trace table from a CSV file.
pub fn read_traces_csv(path: &Path) -> Result<Dataset, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::new(3, format!("Failed to read '{}': {e}", path.display())))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    parse_traces(&text, &name, path)
}

fn parse_traces(text: &str, name: &str, path: &Path) -> Result<Dataset, AppError> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines.next().ok_or_else(|| {
        AppError::new(3, format!("'{}' is empty.", path.display()))
    })?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    if columns.len() < 2 {
        return Err(AppError::new(
            3,
            format!(
                "'{}' needs a time column and at least one replicate column, found {}.",
                path.display(),
                columns.len()
            ),
        ));
    }
    let rep_names: Vec<String> = columns[1..].iter().map(|s| s.to_string()).collect();

    let mut times: Vec<f64> = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); rep_names.len()];

    for (line_no, line) in lines {
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        if cells.len() != columns.len() {
            return Err(AppError::new(
                3,
                format!(
                    "'{}' line {}: expected {} columns, found {}.",
                    path.display(),
                    line_no + 1,
                    columns.len(),
                    cells.len()
                ),
            ));
        }
        let mut parsed = cells.iter().enumerate().map(|(col, cell)| {
            cell.parse::<f64>().map_err(|_| {
                AppError::new(
                    3,
                    format!(
                        "'{}' line {}, column {}: '{}' is not numeric.",
                        path.display(),
                        line_no + 1,
                        col + 1,
                        cell
                    ),
                )
            })
        });
        // First cell is the time point; the rest are replicate values.
        let t = parsed.next().ok_or_else(|| {
            AppError::new(3, format!("'{}' line {}: empty row.", path.display(), line_no + 1))
        })??;
        times.push(t);
        for column in values.iter_mut() {
            match parsed.next() {
                Some(cell) => column.push(cell?),
                None => unreachable!("column count checked above"),
            }
        }
    }

    if times.len() < 2 {
        return Err(AppError::new(
            3,
            format!("'{}' has fewer than 2 time points.", path.display()),
        ));
    }

    let delta = times[1] - times[0];
    if !(delta.is_finite() && delta > 0.0) {
        return Err(AppError::new(
            3,
            format!("'{}' time axis is not strictly increasing.", path.display()),
        ));
    }
    for (i, w) in times.windows(2).enumerate() {
        let step = w[1] - w[0];
        if (step - delta).abs() > GRID_TOLERANCE * delta.abs().max(1.0) {
            return Err(AppError::new(
                3,
                format!(
                    "'{}' time grid is not uniform at row {} (step {step}, expected {delta}).",
                    path.display(),
                    i + 2
                ),
            ));
        }
    }

    let traces = rep_names
        .into_iter()
        .zip(values)
        .map(|(rep, vals)| Trace { name: rep, values: vals })
        .collect();

    Ok(Dataset {
        name: name.to_string(),
        delta,
        times,
        traces,
    })
}

/// List the CSV files in a directory, sorted by file name.
pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| AppError::new(3, format!("Failed to list '{}': {e}", dir.display())))?;
    let mut out: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| AppError::new(3, format!("Failed to list '{}': {e}", dir.display())))?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Dataset, AppError> {
        parse_traces(text, "test", Path::new("test.csv"))
    }

    #[test]
    fn parses_a_well_formed_table() {
        let ds = parse("time,rep1,rep2\n1870.0,0.1,0.2\n1870.5,0.3,0.4\n1871.0,0.5,0.6\n").unwrap();
        assert_eq!(ds.traces.len(), 2);
        assert_eq!(ds.traces[0].name, "rep1");
        assert_eq!(ds.traces[1].values, vec![0.2, 0.4, 0.6]);
        assert!((ds.delta - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_numeric_cells_with_location() {
        let err = parse("time,rep1\n1870.0,0.1\n1870.5,oops\n").unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("line 3"));
        assert!(err.to_string().contains("oops"));
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = parse("time,rep1,rep2\n1870.0,0.1,0.2\n1870.5,0.3\n").unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("expected 3 columns"));
    }

    #[test]
    fn rejects_non_uniform_grids() {
        let err = parse("time,rep1\n1870.0,0.1\n1870.5,0.2\n1871.5,0.3\n").unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("not uniform"));
    }

    #[test]
    fn rejects_missing_replicate_columns() {
        let err = parse("time\n1870.0\n1870.5\n").unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
