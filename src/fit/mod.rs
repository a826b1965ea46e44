//! Maximum-likelihood estimation.
//!
//! Responsibilities:
//!
//! - OU transition MLE on the baseline segment (`ou`)
//! - Strang-splitting pseudo-likelihood fit of the tipping model on the
//!   post-onset segment (`tipping`)
//! - cross-validated selection of the penalization weight (`penalty`)
//!
//! Objective contract shared by both estimators: objectives are minimized
//! and always return a finite value. Infeasible proposals are clamped to the
//! feasible region before evaluation, and any non-finite likelihood value is
//! replaced by [`BIG_PENALTY`], so the simplex never sees NaN or infinity.
//! Non-convergence is reported through the fit outcome, never as an error.

pub mod ou;
pub mod penalty;
pub mod tipping;

pub use ou::*;
pub use penalty::*;
pub use tipping::*;

/// Finite stand-in for an undefined likelihood evaluation.
pub const BIG_PENALTY: f64 = 1e10;

/// Floor for the OU decay rate inside the objective.
pub(crate) const ALPHA_FLOOR: f64 = 1e-4;

/// Floor for the curvature coefficient inside the objective.
pub(crate) const CURVATURE_FLOOR: f64 = 0.1;

/// Floor for the ramp duration inside the objective.
pub(crate) const TAU_FLOOR: f64 = 1e-6;
