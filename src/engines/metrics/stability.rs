// src/engines/metrics/stability.rs
use crate::engines::metrics::returns::{mean, sample_std, simple_returns};

/// Bars in one rolling performance window, about a trading year
pub const ROLLING_WINDOW: usize = 252;

/// How steady the return stream is over time. Each value is NaN when the
/// curve is too short or too flat to define it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityMetrics {
    /// Std of the annualised mean return over rolling `ROLLING_WINDOW`-bar windows
    pub rolling_dispersion: f64,
    /// Jarque-Bera p-value; small values mean fat tails or skew
    pub normality_p_value: f64,
    /// Lag-1 autocorrelation of the returns
    pub autocorrelation: f64,
}

impl StabilityMetrics {
    /// `equity` includes the starting balance as its first value
    pub fn calculate(equity: &[f64], periods_per_year: f64) -> Self {
        let returns = simple_returns(equity);
        Self {
            rolling_dispersion: Self::rolling_dispersion(&returns, ROLLING_WINDOW, periods_per_year),
            normality_p_value: Self::jarque_bera_p_value(&returns),
            autocorrelation: Self::autocorrelation(&returns, 1),
        }
    }

    fn rolling_dispersion(returns: &[f64], window: usize, periods_per_year: f64) -> f64 {
        if window == 0 || returns.len() < window {
            return f64::NAN;
        }
        let means: Vec<f64> = returns
            .windows(window)
            .map(|w| mean(w) * periods_per_year)
            .collect();
        sample_std(&means)
    }

    /// The statistic is chi-square with two degrees of freedom under
    /// normality, whose survival function is `exp(-x / 2)`
    pub fn jarque_bera_p_value(returns: &[f64]) -> f64 {
        if returns.len() < 4 {
            return f64::NAN;
        }
        let n = returns.len() as f64;
        let m = mean(returns);
        let moment = |k: i32| returns.iter().map(|r| (r - m).powi(k)).sum::<f64>() / n;
        let variance = moment(2);
        if variance <= 0.0 || !variance.is_finite() {
            return f64::NAN;
        }

        let skewness = moment(3) / variance.powf(1.5);
        let kurtosis = moment(4) / variance.powi(2);
        let statistic = n / 6.0 * (skewness.powi(2) + (kurtosis - 3.0).powi(2) / 4.0);
        (-statistic / 2.0).exp()
    }

    /// Pearson correlation of `returns[lag..]` with `returns[..len - lag]`
    pub fn autocorrelation(returns: &[f64], lag: usize) -> f64 {
        if lag == 0 || returns.len() < lag + 2 {
            return f64::NAN;
        }
        let head = &returns[..returns.len() - lag];
        let tail = &returns[lag..];
        let (mh, mt) = (mean(head), mean(tail));

        let mut covariance = 0.0;
        let mut var_head = 0.0;
        let mut var_tail = 0.0;
        for (h, t) in head.iter().zip(tail) {
            covariance += (h - mh) * (t - mt);
            var_head += (h - mh).powi(2);
            var_tail += (t - mt).powi(2);
        }
        let denominator = (var_head * var_tail).sqrt();
        if denominator == 0.0 {
            return f64::NAN;
        }
        covariance / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternating_returns_are_negatively_autocorrelated() {
        let returns = [0.01, -0.01, 0.01, -0.01, 0.01, -0.01];
        assert!((StabilityMetrics::autocorrelation(&returns, 1) + 1.0).abs() < 1e-12);

        let trending = [0.01, 0.02, 0.03, 0.04, 0.05];
        assert!((StabilityMetrics::autocorrelation(&trending, 1) - 1.0).abs() < 1e-12);
        assert!(StabilityMetrics::autocorrelation(&[0.01, 0.01, 0.01], 1).is_nan());
    }

    #[test]
    fn test_jarque_bera() {
        // Symmetric two-point distribution: skew 0, kurtosis 1 -> JB = n / 6
        let returns: Vec<f64> = (0..12).map(|i| if i % 2 == 0 { 0.01 } else { -0.01 }).collect();
        let p = StabilityMetrics::jarque_bera_p_value(&returns);
        assert!((p - (-1.0f64).exp()).abs() < 1e-12);

        // One large outlier makes normality very unlikely
        let mut fat: Vec<f64> = (0..60).map(|i| 0.001 * ((i % 5) as f64 - 2.0)).collect();
        fat.push(0.2);
        assert!(StabilityMetrics::jarque_bera_p_value(&fat) < 0.01);

        assert!(StabilityMetrics::jarque_bera_p_value(&[0.01, 0.02, 0.03]).is_nan());
        assert!(StabilityMetrics::jarque_bera_p_value(&[0.0; 10]).is_nan());
    }

    #[test]
    fn test_rolling_dispersion() {
        // Constant returns give identical rolling means
        let equity: Vec<f64> = (0..=300).map(|i| 1000.0 * 1.001f64.powi(i)).collect();
        let metrics = StabilityMetrics::calculate(&equity, 252.0);
        assert!(metrics.rolling_dispersion.abs() < 1e-9);

        let short: Vec<f64> = (0..100).map(|i| 1000.0 + i as f64).collect();
        assert!(StabilityMetrics::calculate(&short, 252.0).rolling_dispersion.is_nan());
    }
}
