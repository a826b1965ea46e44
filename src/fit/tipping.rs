//! Tipping-model fit on the post-onset segment.
//!
//! Model: `dX = -(a (X - m)^2 + lambda(t)) dt + sigma dB`, with the control
//! level ramping linearly, `lambda(t) = lambda0 (1 - t/tau)`, and `m`,
//! `lambda0` derived from the baseline OU parameters (which are fixed
//! conditioning inputs here, not re-estimated).
//!
//! The transition density has no closed form, so each observation interval
//! is approximated by Strang splitting: a half-step of the nonlinear drift
//! remainder, an exact OU step at the local linearization
//! (`mu_t = m + sqrt(-lambda/a)`, `alpha_t = 2 a sqrt(-lambda/a)`), and the
//! inverse nonlinear half-step applied to the right endpoint. The remainder
//! ODE `u' = -a u^2` (with `u = x - mu_t`) solves in closed form to
//! `u / (1 + a u h)`, which keeps every piece analytically tractable; the
//! half-step inversion contributes a Jacobian correction to the
//! log-likelihood. The approximation bias is controlled by the step size.
//!
//! A soft penalty `pen * n * (1/a - 1)` for `a < 1` regularizes against the
//! degenerate small-curvature solutions that otherwise dominate the
//! likelihood surface on short post-onset segments.

use crate::domain::{OuParams, TipParams};
use crate::error::AppError;
use crate::math::{SimplexOptions, minimize};

use super::{BIG_PENALTY, CURVATURE_FLOOR, TAU_FLOOR};

/// Fitted curvature at or below this is treated as a collapse onto the floor.
const FLOOR_MODE_BAND: f64 = CURVATURE_FLOOR * 2.0;

/// Starting values for the tipping fit.
#[derive(Debug, Clone, Copy)]
pub struct TipInit {
    pub tau: f64,
    pub a: f64,
}

impl Default for TipInit {
    fn default() -> Self {
        Self { tau: 100.0, a: 1.0 }
    }
}

/// Outcome of a tipping fit. As with the OU fit, the parameters are the last
/// iterate whether or not the simplex converged.
#[derive(Debug, Clone)]
pub struct TipFit {
    pub params: TipParams,
    /// Penalized negative pseudo-log-likelihood at the fitted parameters.
    pub objective: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// One Strang-approximated transition: the transformed right endpoint `z`,
/// its Gaussian location/scale, and the log-Jacobian of the inversion.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StrangTransition {
    pub z: f64,
    pub mean: f64,
    pub var: f64,
    pub log_jac: f64,
}

/// Evaluate the Strang transition for the step starting at time `t` since
/// onset. Returns `None` when the transition is undefined for the candidate
/// parameters (ramp already past `tau`, or a degenerate half-step map).
pub(crate) fn strang_transition(
    x0: f64,
    x1: f64,
    t: f64,
    delta: f64,
    ou: &OuParams,
    tau: f64,
    a: f64,
) -> Option<StrangTransition> {
    let m = ou.mu0 - ou.alpha0 / (2.0 * a);
    let lambda0 = -ou.alpha0 * ou.alpha0 / (4.0 * a);
    let lambda = lambda0 * (1.0 - t / tau);
    if !(lambda < 0.0) {
        return None;
    }

    let root = (-lambda / a).sqrt();
    let mu_t = m + root;
    let alpha_t = 2.0 * a * root;
    let half = 0.5 * delta;

    // Forward half-step of the remainder flow applied to the left endpoint.
    let u = x0 - mu_t;
    let fwd = 1.0 + a * u * half;
    if !(fwd > 0.0) {
        return None;
    }
    let y = mu_t + u / fwd;

    // Inverse half-step applied to the right endpoint.
    let v = x1 - mu_t;
    let inv = 1.0 - a * v * half;
    if !(inv > 0.0) {
        return None;
    }
    let z = mu_t + v / inv;

    let rho = (-alpha_t * delta).exp();
    let var = ou.sigma2 / (2.0 * alpha_t) * (1.0 - rho * rho);
    if !(var > 0.0 && var.is_finite()) {
        return None;
    }
    let mean = mu_t + (y - mu_t) * rho;

    Some(StrangTransition {
        z,
        mean,
        var,
        log_jac: -2.0 * inv.ln(),
    })
}

/// Penalized negative pseudo-log-likelihood, per the crate-wide clamping
/// contract (see `fit`).
pub fn tipping_objective(
    values: &[f64],
    delta: f64,
    ou: &OuParams,
    pen: f64,
    tau: f64,
    a: f64,
) -> f64 {
    let a = a.max(CURVATURE_FLOOR);
    let tau = tau.max(TAU_FLOOR);
    let n = values.len();

    let mut nll = 0.0;
    for k in 0..n.saturating_sub(1) {
        let t = k as f64 * delta;
        match strang_transition(values[k], values[k + 1], t, delta, ou, tau, a) {
            Some(s) => {
                let resid = s.z - s.mean;
                nll += 0.5 * (resid * resid / s.var + s.var.ln()) - s.log_jac;
            }
            None => return BIG_PENALTY,
        }
    }
    if a < 1.0 {
        nll += pen * n as f64 * (1.0 / a - 1.0);
    }
    if nll.is_finite() { nll } else { BIG_PENALTY }
}

/// Fit (tau, a) on the post-onset segment, conditional on `ou`.
///
/// The ramp clock starts at the first retained post-onset observation.
pub fn fit_tipping(
    values: &[f64],
    delta: f64,
    ou: &OuParams,
    pen: f64,
    init: TipInit,
) -> Result<TipFit, AppError> {
    if values.len() < 3 {
        return Err(AppError::new(
            4,
            format!(
                "Tipping fit needs at least 3 post-onset observations, got {}.",
                values.len()
            ),
        ));
    }
    if !(delta.is_finite() && delta > 0.0) {
        return Err(AppError::new(2, format!("Invalid time step: {delta}.")));
    }
    if !(pen.is_finite() && pen >= 0.0) {
        return Err(AppError::new(2, format!("Invalid penalization weight: {pen}.")));
    }
    if !(ou.alpha0 > 0.0 && ou.sigma2 >= 0.0) {
        return Err(AppError::new(
            4,
            "Tipping fit requires alpha0 > 0 and sigma2 >= 0 from the baseline fit.",
        ));
    }

    let objective = |theta: &[f64]| tipping_objective(values, delta, ou, pen, theta[0], theta[1]);
    let opts = SimplexOptions::default();

    let mut outcome = minimize(&objective, &[init.tau, init.a], &opts);

    // The pseudo-likelihood has a degenerate low-curvature mode where the
    // simplex can stall on the curvature floor (huge tau, a at the floor). A
    // fit landing near the floor gets one retry from a higher-curvature
    // start; the lower objective wins.
    if outcome.x[1] <= FLOOR_MODE_BAND {
        let retry = minimize(&objective, &[init.tau, init.a.max(1.0) * 2.0], &opts);
        if retry.value < outcome.value {
            outcome = retry;
        }
    }

    Ok(TipFit {
        params: TipParams {
            tau: outcome.x[0].max(TAU_FLOOR),
            a: outcome.x[1].max(CURVATURE_FLOOR),
        },
        objective: outcome.value,
        iterations: outcome.iterations,
        converged: outcome.converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FittedModel, OuParams, TipParams};
    use crate::sim::{SimParams, downsample, simulate};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn base_ou() -> OuParams {
        OuParams {
            alpha0: 3.0,
            mu0: 0.25,
            sigma2: 0.033,
        }
    }

    /// Simulate a post-onset segment at (tau, a) on a fine grid and
    /// downsample to the monthly observation grid.
    fn simulate_post_onset(tau: f64, a: f64, n_obs: usize, nloop: usize, seed: u64) -> Vec<f64> {
        let ou = base_ou();
        let model = FittedModel {
            ou,
            tip: TipParams { tau, a },
        };
        let delta = 1.0 / 12.0;
        let params = SimParams {
            sigma: ou.sigma2.sqrt(),
            lambda0: model.lambda0(),
            tau,
            m: model.m(),
            a,
            pre_ramp: 0.0,
            x0: ou.mu0,
            dt: delta / nloop as f64,
            max_steps: (n_obs - 1) * nloop,
        };
        let mut rng = StdRng::seed_from_u64(seed);
        let out = simulate(&params, &mut rng);
        let obs = downsample(&out.path, nloop, n_obs);
        assert!(obs.iter().all(|v| v.is_finite()), "early barrier crossing in test setup");
        obs
    }

    #[test]
    fn penalty_is_monotone_in_pen_below_unit_curvature() {
        let obs = simulate_post_onset(130.0, 0.9, 200, 10, 5);
        let ou = base_ou();

        let at = |pen: f64, a: f64| tipping_objective(&obs, 1.0 / 12.0, &ou, pen, 120.0, a);

        // a < 1: strictly increasing in pen.
        assert!(at(0.1, 0.5) > at(0.0, 0.5));
        assert!(at(0.2, 0.5) > at(0.1, 0.5));

        // a >= 1: the penalty term vanishes.
        assert_eq!(at(0.0, 1.0), at(0.3, 1.0));
        assert_eq!(at(0.0, 1.4), at(0.3, 1.4));
    }

    #[test]
    fn ramp_past_tau_is_rejected_with_the_finite_penalty() {
        let obs = simulate_post_onset(130.0, 0.9, 50, 5, 9);
        let ou = base_ou();
        // tau shorter than the segment: late transitions have lambda >= 0.
        let obj = tipping_objective(&obs, 1.0 / 12.0, &ou, 0.0, 1.0, 0.9);
        assert_eq!(obj, BIG_PENALTY);
        assert!(obj.is_finite());
    }

    #[test]
    fn recovers_tau_and_a_without_penalization() {
        let (tau, a) = (130.0, 0.9);
        let obs = simulate_post_onset(tau, a, 1200, 30, 42);
        let fit = fit_tipping(&obs, 1.0 / 12.0, &base_ou(), 0.0, TipInit::default()).unwrap();

        assert!((fit.params.tau - tau).abs() / tau < 0.20);
        assert!((fit.params.a - a).abs() / a < 0.25);
    }

    #[test]
    fn recovers_from_a_near_floor_start() {
        // Starting the search right next to the curvature floor is the worst
        // case for the degenerate low-curvature mode; the fit must still come
        // back to the generating parameters.
        let (tau, a) = (130.0, 0.9);
        let obs = simulate_post_onset(tau, a, 1200, 30, 42);
        let init = TipInit { tau: 100.0, a: 0.12 };
        let fit = fit_tipping(&obs, 1.0 / 12.0, &base_ou(), 0.0, init).unwrap();

        assert!(fit.params.a > 0.3, "curvature stuck near the floor: {}", fit.params.a);
        assert!((fit.params.tau - tau).abs() / tau < 0.20);
        assert!((fit.params.a - a).abs() / a < 0.25);
    }

    #[test]
    fn floors_apply_inside_the_objective() {
        let obs = simulate_post_onset(130.0, 0.9, 100, 5, 1);
        let ou = base_ou();
        // Proposals below the curvature floor evaluate at the floor.
        let clamped = tipping_objective(&obs, 1.0 / 12.0, &ou, 0.0, 120.0, 0.01);
        let floored = tipping_objective(&obs, 1.0 / 12.0, &ou, 0.0, 120.0, 0.1);
        assert_eq!(clamped, floored);
    }

    #[test]
    fn rejects_invalid_inputs() {
        let obs = [0.1, 0.2, 0.3, 0.2];
        let ou = base_ou();
        assert!(fit_tipping(&obs[..2], 1.0 / 12.0, &ou, 0.0, TipInit::default()).is_err());
        assert!(fit_tipping(&obs, 0.0, &ou, 0.0, TipInit::default()).is_err());
        assert!(fit_tipping(&obs, 1.0 / 12.0, &ou, -0.1, TipInit::default()).is_err());
    }
}
