//! Read/write fitted-model JSON files.
//!
//! Model JSON is the portable representation of one replicate's fit:
//! - the OU and tipping parameter sets
//! - the run context needed to reapply them (onset time, time step, pen)
//!
//! `tipfit residuals --export-model` writes one; `tipfit residuals --model`
//! reloads it to diagnose further traces without refitting.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::FittedModel;
use crate::error::AppError;

/// On-disk schema of a fitted-model JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub tool: String,
    /// Dataset the model was fitted on.
    pub dataset: String,
    /// Replicate the model was fitted on.
    pub replicate: String,
    /// Onset time used for the baseline/post-onset split.
    pub t0: f64,
    /// Observation time step of the fitted data.
    pub delta: f64,
    /// Penalization weight the tipping fit used.
    pub pen: f64,
    pub model: FittedModel,
}

/// Write a fitted-model JSON file.
pub fn write_model_json(path: &Path, file: &ModelFile) -> Result<(), AppError> {
    let out = File::create(path).map_err(|e| {
        AppError::new(2, format!("Failed to create model JSON '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(out, file)
        .map_err(|e| AppError::new(2, format!("Failed to write model JSON: {e}")))?;
    Ok(())
}

/// Read a fitted-model JSON file.
pub fn read_model_json(path: &Path) -> Result<ModelFile, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open model JSON '{}': {e}", path.display()))
    })?;
    let model: ModelFile = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid model JSON: {e}")))?;
    Ok(model)
}
