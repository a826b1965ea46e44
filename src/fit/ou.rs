//! Stationary OU maximum-likelihood fit (baseline segment).
//!
//! The OU transition density over one step `delta` is Gaussian with mean
//! `x rho + mu (1 - rho)` and variance `gamma2 (1 - rho^2)`, where
//! `rho = exp(-alpha delta)` and `gamma2 = sigma2 / (2 alpha)`. The objective
//! is twice the negative log-likelihood up to an additive constant, summed
//! over consecutive pairs.
//!
//! Starting values are moment-based: the sample mean for `mu`, the lag-1
//! autocorrelation via `-ln(corr)/delta` for `alpha`, and the
//! quadratic-variation estimate `mean(diff^2)/delta` for `sigma2`.

use crate::domain::OuParams;
use crate::error::AppError;
use crate::math::{SimplexOptions, lag1_autocorrelation, mean, mean_sq_increment, minimize};

use super::{ALPHA_FLOOR, BIG_PENALTY};

/// Outcome of an OU fit. `converged` comes straight from the simplex; the
/// parameters are the last iterate either way.
#[derive(Debug, Clone)]
pub struct OuFit {
    pub params: OuParams,
    /// Objective value (2x negative log-likelihood, up to a constant).
    pub objective: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Gaussian transition implied by the OU model over one step of size `delta`
/// from state `x`: location `x rho + mu0 (1 - rho)` and variance
/// `gamma2 (1 - rho^2)`. As `delta -> 0` the location collapses to `x` and
/// the variance to zero.
pub fn ou_transition(x: f64, delta: f64, params: &OuParams) -> (f64, f64) {
    let rho = (-params.alpha0 * delta).exp();
    let gamma2 = params.sigma2 / (2.0 * params.alpha0);
    (
        x * rho + params.mu0 * (1.0 - rho),
        gamma2 * (1.0 - rho * rho),
    )
}

/// OU objective, per the crate-wide clamping contract (see `fit`).
pub fn ou_objective(values: &[f64], delta: f64, alpha: f64, mu: f64, sigma2: f64) -> f64 {
    let params = OuParams {
        alpha0: alpha.max(ALPHA_FLOOR),
        mu0: mu,
        sigma2: sigma2.max(0.0),
    };

    // The transition variance does not depend on the state.
    let (_, var) = ou_transition(0.0, delta, &params);
    if !(var > 0.0 && var.is_finite()) {
        return BIG_PENALTY;
    }

    let ln_var = var.ln();
    let mut acc = 0.0;
    for w in values.windows(2) {
        let (pred, _) = ou_transition(w[0], delta, &params);
        let resid = w[1] - pred;
        acc += resid * resid / var + ln_var;
    }
    if acc.is_finite() { acc } else { BIG_PENALTY }
}

/// Fit the 3-parameter stationary OU model to a trace segment.
pub fn fit_ou(values: &[f64], delta: f64) -> Result<OuFit, AppError> {
    if values.len() < 3 {
        return Err(AppError::new(
            4,
            format!("OU fit needs at least 3 observations, got {}.", values.len()),
        ));
    }
    if !(delta.is_finite() && delta > 0.0) {
        return Err(AppError::new(2, format!("Invalid time step: {delta}.")));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(AppError::new(4, "Baseline segment contains non-finite values."));
    }

    let mu_init = mean(values);
    let alpha_init = match lag1_autocorrelation(values) {
        // Non-positive autocorrelation has no OU interpretation; start from
        // one decay time per observation step instead.
        Some(corr) if corr > 0.0 => -corr.ln() / delta,
        _ => 1.0 / delta,
    };
    let sigma2_init = match mean_sq_increment(values) {
        Some(q) => q / delta,
        None => return Err(AppError::new(4, "OU fit: degenerate segment.")),
    };

    let start = [alpha_init.max(ALPHA_FLOOR), mu_init, sigma2_init.max(0.0)];
    let outcome = minimize(
        |theta| ou_objective(values, delta, theta[0], theta[1], theta[2]),
        &start,
        &SimplexOptions::default(),
    );

    Ok(OuFit {
        params: OuParams {
            alpha0: outcome.x[0].max(ALPHA_FLOOR),
            mu0: outcome.x[1],
            sigma2: outcome.x[2].max(0.0),
        },
        objective: outcome.value,
        iterations: outcome.iterations,
        converged: outcome.converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, StandardNormal};

    /// Exact OU simulation via the Gaussian transition (no discretization
    /// bias, unlike Euler).
    fn simulate_exact_ou(
        alpha: f64,
        mu: f64,
        sigma2: f64,
        delta: f64,
        n: usize,
        seed: u64,
    ) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let rho = (-alpha * delta).exp();
        let sd = (sigma2 / (2.0 * alpha) * (1.0 - rho * rho)).sqrt();
        let mut x = mu;
        let mut out = Vec::with_capacity(n);
        out.push(x);
        for _ in 1..n {
            let z: f64 = StandardNormal.sample(&mut rng);
            x = mu + (x - mu) * rho + sd * z;
            out.push(x);
        }
        out
    }

    #[test]
    fn recovers_parameters_on_a_long_trace() {
        let (alpha, mu, sigma2, delta) = (3.0, 0.25, 0.033, 1.0 / 12.0);
        let x = simulate_exact_ou(alpha, mu, sigma2, delta, 20_000, 42);
        let fit = fit_ou(&x, delta).unwrap();

        assert!(fit.converged);
        assert!((fit.params.alpha0 - alpha).abs() / alpha < 0.10);
        assert!((fit.params.mu0 - mu).abs() < 0.0125);
        assert!((fit.params.sigma2 - sigma2).abs() / sigma2 < 0.10);
    }

    #[test]
    fn objective_improves_on_the_moment_start() {
        let x = simulate_exact_ou(2.0, -0.5, 0.05, 0.1, 2_000, 7);
        let fit = fit_ou(&x, 0.1).unwrap();

        let mu_init = mean(&x);
        let alpha_init = -lag1_autocorrelation(&x).unwrap().ln() / 0.1;
        let sigma2_init = mean_sq_increment(&x).unwrap() / 0.1;
        let start_obj = ou_objective(&x, 0.1, alpha_init, mu_init, sigma2_init);
        assert!(fit.objective <= start_obj);
    }

    #[test]
    fn transition_collapses_to_the_current_state_as_delta_shrinks() {
        let params = OuParams {
            alpha0: 3.0,
            mu0: 0.25,
            sigma2: 0.033,
        };
        // Start far from the mean so the one-step pull is visible.
        let x = -0.8;

        let mut prev_gap = f64::INFINITY;
        let mut prev_var = f64::INFINITY;
        for delta in [1.0, 0.1, 0.01, 1e-3, 1e-5] {
            let (mean, var) = ou_transition(x, delta, &params);
            let gap = (mean - x).abs();
            assert!(gap < prev_gap, "mean gap not shrinking at delta = {delta}");
            assert!(var < prev_var, "variance not shrinking at delta = {delta}");
            prev_gap = gap;
            prev_var = var;
        }

        let (mean, var) = ou_transition(x, 1e-9, &params);
        assert!((mean - x).abs() < 1e-8);
        assert!(var < 1e-9);
    }

    #[test]
    fn objective_is_translation_invariant() {
        let x = simulate_exact_ou(1.5, 0.0, 0.02, 0.05, 500, 3);
        let shifted: Vec<f64> = x.iter().map(|v| v + 10.0).collect();
        let a = ou_objective(&x, 0.05, 1.5, 0.0, 0.02);
        let b = ou_objective(&shifted, 0.05, 1.5, 10.0, 0.02);
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn degenerate_variance_hits_the_penalty_clamp() {
        let x = [0.1, 0.2, 0.15, 0.12];
        assert_eq!(ou_objective(&x, 0.1, 1.0, 0.1, 0.0), BIG_PENALTY);
        assert_eq!(ou_objective(&x, 0.1, 1.0, 0.1, -5.0), BIG_PENALTY);
    }

    #[test]
    fn rejects_too_short_segments() {
        assert!(fit_ou(&[0.1, 0.2], 0.1).is_err());
    }
}
