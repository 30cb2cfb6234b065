use crate::engines::optimisation::AggregateResult;
use crate::types::float_repr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relative change inside which a metric counts as unchanged
pub const UNCHANGED_BAND: f64 = 0.05;

/// Denominator floor for relative changes of near-zero metrics
const RELATIVE_FLOOR: f64 = 0.01;

/// Weights of the headline metrics in the improvement score
const SCORE_WEIGHTS: [(&str, f64); 7] = [
    ("sharpe_ratio", 0.25),
    ("sortino_ratio", 0.20),
    ("calmar_ratio", 0.15),
    ("max_drawdown", 0.15),
    ("win_rate", 0.10),
    ("profit_factor", 0.10),
    ("total_return", 0.05),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricChange {
    Improved,
    Degraded,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementLevel {
    Degradation,
    Neutral,
    Minor,
    Moderate,
    Significant,
}

impl ImprovementLevel {
    pub fn from_score(score: f64) -> Self {
        if score > 0.2 {
            ImprovementLevel::Significant
        } else if score > 0.1 {
            ImprovementLevel::Moderate
        } else if score > 0.05 {
            ImprovementLevel::Minor
        } else if score > -0.05 {
            ImprovementLevel::Neutral
        } else {
            ImprovementLevel::Degradation
        }
    }
}

/// How much worse the candidate's drawdown is than the baseline's
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawdownRisk {
    Low,
    Medium,
    High,
}

impl DrawdownRisk {
    /// High above +20% relative drawdown, medium above +10%
    pub fn assess(baseline_drawdown: f64, candidate_drawdown: f64) -> Self {
        if !baseline_drawdown.is_finite() || !candidate_drawdown.is_finite() {
            return DrawdownRisk::Low;
        }
        if candidate_drawdown > baseline_drawdown * 1.2 {
            DrawdownRisk::High
        } else if candidate_drawdown > baseline_drawdown * 1.1 {
            DrawdownRisk::Medium
        } else {
            DrawdownRisk::Low
        }
    }
}

/// Metric-by-metric comparison of a candidate against the baseline it
/// was validated against, using the cross-window means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalAssessment {
    #[serde(with = "float_repr")]
    pub improvement_score: f64,
    pub level: ImprovementLevel,
    pub drawdown_risk: DrawdownRisk,
    pub metrics: BTreeMap<String, MetricChange>,
}

impl ProposalAssessment {
    /// None when either side has no healthy window to summarise
    pub fn compare(baseline: &AggregateResult, candidate: &AggregateResult) -> Option<Self> {
        if baseline.metrics.is_empty() || candidate.metrics.is_empty() {
            return None;
        }
        let higher_is_better = |name: &str| !LOWER_IS_BETTER.contains(&name);

        let mut metrics = BTreeMap::new();
        for (name, before) in &baseline.metrics {
            let Some(after) = candidate.metric(name) else {
                continue;
            };
            let Some(change) = relative_change(before.mean, after.mean, higher_is_better(name)) else {
                continue;
            };
            let verdict = if change > UNCHANGED_BAND {
                MetricChange::Improved
            } else if change < -UNCHANGED_BAND {
                MetricChange::Degraded
            } else {
                MetricChange::Unchanged
            };
            metrics.insert(name.clone(), verdict);
        }

        let improvement_score: f64 = SCORE_WEIGHTS
            .iter()
            .filter_map(|(name, weight)| {
                let (before, after) = (baseline.metric(name)?, candidate.metric(name)?);
                relative_change(before.mean, after.mean, higher_is_better(name)).map(|c| weight * c)
            })
            .sum();

        let drawdown = |result: &AggregateResult| result.metric("max_drawdown").map(|m| m.mean).unwrap_or(f64::NAN);
        Some(Self {
            improvement_score,
            level: ImprovementLevel::from_score(improvement_score),
            drawdown_risk: DrawdownRisk::assess(drawdown(baseline), drawdown(candidate)),
            metrics,
        })
    }

    pub fn count(&self, change: MetricChange) -> usize {
        self.metrics.values().filter(|c| **c == change).count()
    }
}

const LOWER_IS_BETTER: [&str; 6] = [
    "volatility",
    "max_drawdown",
    "value_at_risk",
    "conditional_var",
    "ulcer_index",
    "rolling_dispersion",
];

/// Signed relative change, positive when the candidate is better
fn relative_change(before: f64, after: f64, higher_is_better: bool) -> Option<f64> {
    if !before.is_finite() || !after.is_finite() {
        return None;
    }
    let change = (after - before) / before.abs().max(RELATIVE_FLOOR);
    Some(if higher_is_better { change } else { -change })
}
