//! Summary statistics.
//!
//! These feed the moment-based starting values of the estimators and the
//! per-dataset median model used for cross-validation.

/// Sample mean. Returns NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of a slice (the input is copied, not reordered).
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Lag-1 autocorrelation of a series.
///
/// Returns `None` when the series is too short or has zero variance.
pub fn lag1_autocorrelation(values: &[f64]) -> Option<f64> {
    if values.len() < 3 {
        return None;
    }
    let xbar = mean(values);
    let mut cov = 0.0;
    let mut var = 0.0;
    for w in values.windows(2) {
        cov += (w[0] - xbar) * (w[1] - xbar);
    }
    for v in values {
        var += (v - xbar) * (v - xbar);
    }
    if var <= 0.0 || !cov.is_finite() {
        return None;
    }
    Some(cov / var)
}

/// Mean squared one-step increment, `mean((x[k+1] - x[k])^2)`.
///
/// Dividing by the time step gives the quadratic-variation estimate of the
/// infinitesimal variance.
pub fn mean_sq_increment(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let sum: f64 = values.windows(2).map(|w| (w[1] - w[0]) * (w[1] - w[0])).sum();
    Some(sum / (values.len() - 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_handles_odd_and_even_lengths() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn lag1_autocorrelation_of_alternating_series_is_negative() {
        let x = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let r = lag1_autocorrelation(&x).unwrap();
        assert!(r < -0.5);
    }

    #[test]
    fn lag1_autocorrelation_rejects_constant_series() {
        assert_eq!(lag1_autocorrelation(&[2.0; 10]), None);
    }

    #[test]
    fn mean_sq_increment_of_linear_ramp() {
        let x: Vec<f64> = (0..10).map(|i| i as f64 * 0.5).collect();
        let q = mean_sq_increment(&x).unwrap();
        assert!((q - 0.25).abs() < 1e-12);
    }
}
