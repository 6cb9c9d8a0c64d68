//! Small numeric helpers over `f64` slices.
//!
//! All of them return 0.0 for an empty input instead of NaN.

/// Percentile with linear interpolation between closest ranks (`q` in 0..=100).
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    percentile_sorted(&sorted, q)
}

/// Same as [`percentile`] for input already sorted ascending.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by n).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Consecutive differences `values[i + 1] - values[i]`.
pub fn diff(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

/// Ordinary least-squares slope of `y` against `x`.
///
/// Zero when there are fewer than two points or `x` has no spread.
pub fn least_squares_slope(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mean_x = mean(x);
    let mean_y = mean(y);

    let mut covariance = 0.0;
    let mut spread = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        covariance += dx * (yi - mean_y);
        spread += dx * dx;
    }
    if spread == 0.0 {
        0.0
    } else {
        covariance / spread
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_percentile_interpolates() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_abs_diff_eq!(percentile(&values, 0.0), 1.0);
        assert_abs_diff_eq!(percentile(&values, 50.0), 2.5);
        assert_abs_diff_eq!(percentile(&values, 100.0), 4.0);
        assert_abs_diff_eq!(percentile(&values, 95.0), 3.85, epsilon = 1e-12);
    }

    #[test]
    fn test_population_std() {
        assert_abs_diff_eq!(std_dev(&[50.0, 70.0]), 10.0);
        assert_abs_diff_eq!(std_dev(&[3.0]), 0.0);
    }

    #[test]
    fn test_empty_inputs_are_zero() {
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
        assert!(diff(&[1.0]).is_empty());
    }

    #[test]
    fn test_slope() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        assert_abs_diff_eq!(least_squares_slope(&x, &y), 2.0, epsilon = 1e-12);
        assert_eq!(least_squares_slope(&[1.0, 1.0], &[0.0, 5.0]), 0.0);
    }
}
