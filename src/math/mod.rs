//! Small numeric building blocks.
//!
//! Responsibilities:
//!
//! - summary statistics used for moment-based starting values
//! - a derivative-free Nelder-Mead simplex minimizer

pub mod simplex;
pub mod stats;

pub use simplex::*;
pub use stats::*;
