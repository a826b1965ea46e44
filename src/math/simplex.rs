//! Derivative-free Nelder-Mead simplex minimization.
//!
//! Why a simplex search?
//!
//! - the Strang pseudo-likelihood is not smooth in a convenient closed form
//!   near the curvature floor, so gradient-based methods are unreliable there
//! - parameter dimension is tiny (2-3), where the simplex is fast and robust
//! - it is deterministic given the same starting point
//!
//! Objectives must always return a finite value; callers substitute a large
//! finite penalty for undefined likelihood evaluations (see `fit`).

use nalgebra::DVector;

#[derive(Debug, Clone)]
pub struct SimplexOptions {
    /// Iteration cap. Reaching it clears the `converged` flag.
    pub max_iters: usize,
    /// Convergence tolerance on the spread of vertex function values.
    pub tol_fun: f64,
    /// Convergence tolerance on the simplex diameter (max-norm).
    pub tol_x: f64,
    /// Relative perturbation used to build the initial simplex.
    pub relative_step: f64,
    /// Absolute perturbation for coordinates starting at zero.
    pub zero_step: f64,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            max_iters: 500,
            tol_fun: 1e-9,
            tol_x: 1e-9,
            relative_step: 0.05,
            zero_step: 1e-3,
        }
    }
}

/// Result of a simplex run: the best vertex seen, whether the tolerances were
/// met, and how many iterations were spent.
#[derive(Debug, Clone)]
pub struct SimplexOutcome {
    pub x: DVector<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimize `f` starting from `x0`.
///
/// Standard Nelder-Mead moves (reflection, expansion, outside/inside
/// contraction, shrink) with coefficients 1, 2, 1/2, 1/2. When the iteration
/// cap is hit the best vertex so far is returned with `converged = false`;
/// non-convergence is the caller's signal to surface, not an error.
pub fn minimize<F>(f: F, x0: &[f64], opts: &SimplexOptions) -> SimplexOutcome
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    assert!(n > 0, "simplex needs at least one parameter");

    let base = DVector::from_column_slice(x0);
    let mut verts: Vec<DVector<f64>> = Vec::with_capacity(n + 1);
    verts.push(base.clone());
    for i in 0..n {
        let mut v = base.clone();
        v[i] = if v[i] != 0.0 {
            v[i] * (1.0 + opts.relative_step)
        } else {
            opts.zero_step
        };
        verts.push(v);
    }
    let mut vals: Vec<f64> = verts.iter().map(|v| f(v.as_slice())).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < opts.max_iters {
        // Sort vertices by objective value (ascending).
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&i, &j| vals[i].partial_cmp(&vals[j]).unwrap_or(std::cmp::Ordering::Equal));
        verts = order.iter().map(|&i| verts[i].clone()).collect();
        vals = order.iter().map(|&i| vals[i]).collect();

        let f_spread = vals[n] - vals[0];
        let x_spread = verts[1..]
            .iter()
            .map(|v| (v - &verts[0]).amax())
            .fold(0.0_f64, f64::max);
        if f_spread.abs() <= opts.tol_fun && x_spread <= opts.tol_x {
            converged = true;
            break;
        }

        // Centroid of all vertices except the worst.
        let mut centroid = DVector::zeros(n);
        for v in &verts[..n] {
            centroid += v;
        }
        centroid /= n as f64;

        let worst = verts[n].clone();
        let f_worst = vals[n];
        let f_second = vals[n - 1];

        let reflected = &centroid * 2.0 - &worst;
        let f_reflected = f(reflected.as_slice());

        if f_reflected < vals[0] {
            let expanded = &centroid * 3.0 - &worst * 2.0;
            let f_expanded = f(expanded.as_slice());
            if f_expanded < f_reflected {
                verts[n] = expanded;
                vals[n] = f_expanded;
            } else {
                verts[n] = reflected;
                vals[n] = f_reflected;
            }
        } else if f_reflected < f_second {
            verts[n] = reflected;
            vals[n] = f_reflected;
        } else if f_reflected < f_worst {
            let outside = &centroid * 1.5 - &worst * 0.5;
            let f_outside = f(outside.as_slice());
            if f_outside <= f_reflected {
                verts[n] = outside;
                vals[n] = f_outside;
            } else {
                shrink(&f, &mut verts, &mut vals);
            }
        } else {
            let inside = (&centroid + &worst) * 0.5;
            let f_inside = f(inside.as_slice());
            if f_inside < f_worst {
                verts[n] = inside;
                vals[n] = f_inside;
            } else {
                shrink(&f, &mut verts, &mut vals);
            }
        }

        iterations += 1;
    }

    let mut best = 0;
    for i in 1..vals.len() {
        if vals[i] < vals[best] {
            best = i;
        }
    }
    SimplexOutcome {
        x: verts[best].clone(),
        value: vals[best],
        iterations,
        converged,
    }
}

fn shrink<F>(f: &F, verts: &mut [DVector<f64>], vals: &mut [f64])
where
    F: Fn(&[f64]) -> f64,
{
    for i in 1..verts.len() {
        let moved = (&verts[0] + &verts[i]) * 0.5;
        vals[i] = f(moved.as_slice());
        verts[i] = moved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimizes_shifted_quadratic() {
        let f = |x: &[f64]| (x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2) + 5.0;
        let out = minimize(f, &[0.0, 0.0], &SimplexOptions::default());
        assert!(out.converged);
        assert!((out.x[0] - 1.0).abs() < 1e-4);
        assert!((out.x[1] + 2.0).abs() < 1e-4);
        assert!((out.value - 5.0).abs() < 1e-7);
    }

    #[test]
    fn minimizes_rosenbrock_with_enough_iterations() {
        let f = |x: &[f64]| {
            let (a, b) = (x[0], x[1]);
            (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2)
        };
        let opts = SimplexOptions {
            max_iters: 5000,
            ..SimplexOptions::default()
        };
        let out = minimize(f, &[-1.2, 1.0], &opts);
        assert!(out.converged);
        assert!((out.x[0] - 1.0).abs() < 1e-3);
        assert!((out.x[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn iteration_cap_clears_converged_flag() {
        let f = |x: &[f64]| x[0] * x[0];
        let opts = SimplexOptions {
            max_iters: 2,
            ..SimplexOptions::default()
        };
        let out = minimize(f, &[50.0], &opts);
        assert!(!out.converged);
        assert_eq!(out.iterations, 2);
    }
}
