//! `tipfit` library crate.
//!
//! Estimates the parameters of a stochastic tipping-point model from noisy
//! time-series traces: a stationary Ornstein-Uhlenbeck fit on the baseline
//! segment, a Strang-splitting pseudo-likelihood fit of the ramping model on
//! the post-onset segment, and a cross-validated choice of the curvature
//! penalization weight.
//!
//! The binary (`tipfit`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable from notebooks or downstream tooling
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod report;
pub mod sim;
