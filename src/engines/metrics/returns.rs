// src/engines/metrics/returns.rs

/// Period-over-period simple returns. Periods starting from a non-positive
/// value are skipped.
pub fn simple_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1); NaN with fewer than two values
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Division that never panics or silently returns garbage.
///
/// `num / den` for a non-zero denominator, `+inf` / `-inf` for a zero
/// denominator with a positive / negative numerator, and `NaN` for `0 / 0`
/// or any non-finite input.
pub fn safe_ratio(num: f64, den: f64) -> f64 {
    if !num.is_finite() || !den.is_finite() {
        return f64::NAN;
    }
    if den != 0.0 {
        num / den
    } else if num > 0.0 {
        f64::INFINITY
    } else if num < 0.0 {
        f64::NEG_INFINITY
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_ratio_sentinels() {
        assert_eq!(safe_ratio(3.0, 2.0), 1.5);
        assert_eq!(safe_ratio(1.0, 0.0), f64::INFINITY);
        assert_eq!(safe_ratio(-1.0, 0.0), f64::NEG_INFINITY);
        assert!(safe_ratio(0.0, 0.0).is_nan());
        assert!(safe_ratio(f64::NAN, 1.0).is_nan());
    }

    #[test]
    fn test_sample_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((sample_std(&values) - 2.138089935299395).abs() < 1e-12);
        assert!(sample_std(&[1.0]).is_nan());
    }
}
