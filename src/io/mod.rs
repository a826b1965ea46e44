//! File input/output.
//!
//! Responsibilities:
//!
//! - ingest replicate trace tables from CSV with row-level validation
//! - export estimate tables, pen sweeps and residual columns to CSV
//! - read/write fitted-model JSON files

pub mod export;
pub mod ingest;
pub mod model;
