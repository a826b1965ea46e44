//! Euler-Maruyama simulation of the tipping SDE.
//!
//! Trajectories run in two phases:
//!
//! 1. stationary: the control level is held at `lambda0` for `pre_ramp` time
//!    units
//! 2. ramping: the control level decreases linearly,
//!    `lambda(t) = lambda0 * (1 - t/tau)` with `t` measured from ramp start
//!
//! Integration stops at the first barrier crossing (`x <= m - 2`) or at the
//! step cap; an early crossing is a valid terminal outcome, signalled by a
//! truncated path. Randomness is injected through `rand::Rng` so estimation
//! stays deterministic and testable; callers seed a `StdRng` per replicate.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;

use crate::domain::{FittedModel, OuParams};

/// Inputs for one simulated trajectory.
#[derive(Debug, Clone, Copy)]
pub struct SimParams {
    /// Diffusion scale.
    pub sigma: f64,
    /// Control level during the stationary phase (and at ramp start).
    pub lambda0: f64,
    /// Ramp duration.
    pub tau: f64,
    /// Mean shift of the quadratic drift.
    pub m: f64,
    /// Curvature coefficient.
    pub a: f64,
    /// Duration of the stationary phase before the ramp starts.
    pub pre_ramp: f64,
    /// Initial state.
    pub x0: f64,
    /// Integration step.
    pub dt: f64,
    /// Cap on integration steps.
    pub max_steps: usize,
}

/// Why integration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The state crossed the barrier `m - 2`.
    Crossed,
    /// The step cap was exhausted without a crossing.
    StepCapReached,
}

/// Integration phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Stationary,
    Ramping,
    Terminated(StopReason),
}

/// A simulated trajectory and its first-passage outcome.
#[derive(Debug, Clone)]
pub struct SimOutcome {
    /// States at `0, dt, 2dt, ...`, including the initial state. Truncated
    /// at the crossing step for crossing outcomes.
    pub path: Vec<f64>,
    /// Elapsed time at termination (first-passage time for crossings).
    pub elapsed: f64,
    pub reason: StopReason,
}

/// Simulate one trajectory of the tipping SDE.
///
/// Each step draws one independent standard-normal increment and advances
/// `x += -(a (x - m)^2 + lambda) dt + sigma sqrt(dt) z`.
pub fn simulate<R: Rng + ?Sized>(params: &SimParams, rng: &mut R) -> SimOutcome {
    let barrier = params.m - 2.0;
    let sqrt_dt = params.dt.sqrt();

    let mut x = params.x0;
    let mut path = Vec::with_capacity(params.max_steps + 1);
    path.push(x);

    let mut phase = Phase::Stationary;
    let mut step = 0usize;

    while step < params.max_steps {
        let t = step as f64 * params.dt;
        if phase == Phase::Stationary && t >= params.pre_ramp {
            phase = Phase::Ramping;
        }
        let lambda = match phase {
            Phase::Stationary => params.lambda0,
            Phase::Ramping => params.lambda0 * (1.0 - (t - params.pre_ramp) / params.tau),
            Phase::Terminated(_) => break,
        };

        let z: f64 = rng.sample(StandardNormal);
        x += -(params.a * (x - params.m) * (x - params.m) + lambda) * params.dt
            + params.sigma * sqrt_dt * z;
        path.push(x);
        step += 1;

        if x <= barrier {
            phase = Phase::Terminated(StopReason::Crossed);
            break;
        }
    }

    let reason = match phase {
        Phase::Terminated(reason) => reason,
        _ => StopReason::StepCapReached,
    };
    SimOutcome {
        path,
        elapsed: step as f64 * params.dt,
        reason,
    }
}

/// Draw an initial state from the OU stationary law, N(mu0, sigma2/(2 alpha0)).
pub fn stationary_draw<R: Rng + ?Sized>(ou: &OuParams, rng: &mut R) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    ou.mu0 + ou.stationary_var().max(0.0).sqrt() * z
}

/// Downsample a fine-grid path to the observation grid.
///
/// Keeps every `nloop`-th point and NaN-pads trajectories that terminated
/// early, so every replicate has the reference length `ref_len`.
pub fn downsample(path: &[f64], nloop: usize, ref_len: usize) -> Vec<f64> {
    let mut out: Vec<f64> = path.iter().step_by(nloop).copied().take(ref_len).collect();
    out.resize(ref_len, f64::NAN);
    out
}

/// Generate a synthetic replicate ensemble under `model`.
///
/// Each replicate starts from an independent stationary draw, spends
/// `baseline_obs` observations in the stationary phase, then ramps for up to
/// `post_obs` further observations, integrated at `delta / nloop` and
/// downsampled back to the observation grid. Used both for cross-validation
/// trace generation and for writing synthetic validation datasets.
pub fn generate_ensemble(
    model: &FittedModel,
    delta: f64,
    baseline_obs: usize,
    post_obs: usize,
    nloop: usize,
    seed: u64,
    nsim: usize,
) -> Vec<Vec<f64>> {
    let ref_len = baseline_obs + post_obs;
    let max_steps = ref_len.saturating_sub(1) * nloop;
    (0..nsim)
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            let params = SimParams {
                sigma: model.ou.sigma2.max(0.0).sqrt(),
                lambda0: model.lambda0(),
                tau: model.tip.tau,
                m: model.m(),
                a: model.tip.a,
                pre_ramp: baseline_obs as f64 * delta,
                x0: stationary_draw(&model.ou, &mut rng),
                dt: delta / nloop as f64,
                max_steps,
            };
            let outcome = simulate(&params, &mut rng);
            downsample(&outcome.path, nloop, ref_len)
        })
        .collect()
}
