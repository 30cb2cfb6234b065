use super::history::ImprovementRecord;
use super::proposal::{ImprovementProposal, ProposalKind};
use crate::engines::optimisation::AggregateResult;
use crate::error::Result;
use crate::functions::strategy::Strategy;
use crate::types::{ParamSpec, ParamValue, ParameterSet};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

/// What a proposal generator gets to look at
pub struct ProposalContext<'a> {
    pub strategy: &'a dyn Strategy,
    /// Parameters currently in force
    pub baseline: &'a ParameterSet,
    /// Walk-forward result of the baseline on the current data
    pub result: &'a AggregateResult,
    /// Earlier records of this strategy, oldest first
    pub history: &'a [ImprovementRecord],
    /// Active record the proposals build on, if any
    pub parent: Option<&'a str>,
    pub limit: usize,
}

/// Source of candidate changes. Implementations may keep state between calls.
pub trait ProposalGenerator: Send {
    fn name(&self) -> &str;

    /// At most `context.limit` proposals, best first
    fn propose(&mut self, context: &ProposalContext<'_>) -> Result<Vec<ImprovementProposal>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weakness {
    LowSharpe,
    HighDrawdown,
    LowWinRate,
    LowProfitFactor,
}

/// Metric thresholds below (or above, for drawdown) which a weakness is flagged
#[derive(Debug, Clone)]
pub struct RuleThresholds {
    pub min_sharpe: f64,
    pub max_drawdown: f64,
    pub min_win_rate: f64,
    pub min_profit_factor: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            min_sharpe: 0.5,
            max_drawdown: 0.3,
            min_win_rate: 0.4,
            min_profit_factor: 1.0,
        }
    }
}

/// Turns weak out-of-sample metrics into targeted changes: shorter or longer
/// lookbacks, tighter risk limits, and entry filters.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedProposer {
    pub thresholds: RuleThresholds,
}

impl RuleBasedProposer {
    pub fn new(thresholds: RuleThresholds) -> Self {
        Self { thresholds }
    }

    pub fn analyze(&self, result: &AggregateResult) -> Vec<Weakness> {
        let mean = |name: &str| result.metric(name).map(|m| m.mean).filter(|v| !v.is_nan());
        let t = &self.thresholds;

        let mut weaknesses = Vec::new();
        if mean("sharpe_ratio").is_some_and(|v| v < t.min_sharpe) {
            weaknesses.push(Weakness::LowSharpe);
        }
        if mean("max_drawdown").is_some_and(|v| v > t.max_drawdown) {
            weaknesses.push(Weakness::HighDrawdown);
        }
        if mean("win_rate").is_some_and(|v| v < t.min_win_rate) {
            weaknesses.push(Weakness::LowWinRate);
        }
        if mean("profit_factor").is_some_and(|v| v < t.min_profit_factor) {
            weaknesses.push(Weakness::LowProfitFactor);
        }
        weaknesses
    }

    fn candidates(&self, context: &ProposalContext<'_>, weaknesses: &[Weakness]) -> Vec<(ProposalKind, String, ParameterSet)> {
        let base = context.baseline;
        let specs = context.strategy.parameter_specs();
        let has = |w: Weakness| weaknesses.contains(&w);
        let mut out = Vec::new();

        if has(Weakness::LowWinRate) {
            out.push((
                ProposalKind::ParameterAdjustment,
                "Shorten lookbacks for earlier entries".to_string(),
                scale_lookbacks(base, &specs, 0.8),
            ));
        }
        if has(Weakness::HighDrawdown) {
            out.push((
                ProposalKind::ParameterAdjustment,
                "Lengthen lookbacks for steadier trend following".to_string(),
                scale_lookbacks(base, &specs, 1.25),
            ));
        }
        if has(Weakness::LowProfitFactor) && specs.iter().any(|s| s.name == "rsi_oversold") {
            out.push((
                ProposalKind::ParameterAdjustment,
                "Widen RSI thresholds to 25/75".to_string(),
                ParameterSet::new()
                    .with("rsi_oversold", ParamValue::Float(25.0))
                    .with("rsi_overbought", ParamValue::Float(75.0)),
            ));
        }

        if has(Weakness::HighDrawdown) {
            let current = base.get_f64("stop_loss", 0.05);
            let tighter = round4((current * 0.8).max(0.02));
            out.push((
                ProposalKind::RiskManagement,
                format!("Tighten stop loss from {:.1}% to {:.1}%", current * 100.0, tighter * 100.0),
                ParameterSet::new().with("stop_loss", ParamValue::Float(tighter)),
            ));

            let size = base.get_f64("max_position_size", 1.0);
            let smaller = round4((size * 0.7).max(0.05));
            out.push((
                ProposalKind::RiskManagement,
                format!("Reduce position size from {:.0}% to {:.0}%", size * 100.0, smaller * 100.0),
                ParameterSet::new().with("max_position_size", ParamValue::Float(smaller)),
            ));
        }
        if has(Weakness::LowProfitFactor) {
            let current = base.get_f64("take_profit", 0.1);
            let wider = round4(current * 1.5);
            out.push((
                ProposalKind::RiskManagement,
                format!("Raise take profit from {:.1}% to {:.1}%", current * 100.0, wider * 100.0),
                ParameterSet::new().with("take_profit", ParamValue::Float(wider)),
            ));
        }

        if has(Weakness::LowWinRate) && !base.get_flag("volatility_filter") {
            out.push((
                ProposalKind::StrategyCombination,
                "Add ATR volatility filter".to_string(),
                ParameterSet::new()
                    .with("volatility_filter", ParamValue::Flag(true))
                    .with("atr_period", ParamValue::Int(14)),
            ));
        }
        if has(Weakness::LowSharpe) && !base.get_flag("trend_filter") {
            out.push((
                ProposalKind::StrategyCombination,
                "Add long-term trend filter".to_string(),
                ParameterSet::new()
                    .with("trend_filter", ParamValue::Flag(true))
                    .with("trend_sma", ParamValue::Int(50)),
            ));
        }

        out
    }
}

impl ProposalGenerator for RuleBasedProposer {
    fn name(&self) -> &str {
        "rule_based"
    }

    fn propose(&mut self, context: &ProposalContext<'_>) -> Result<Vec<ImprovementProposal>> {
        let weaknesses = self.analyze(context.result);
        log::debug!("{} weaknesses: {:?}", context.strategy.name(), weaknesses);

        let proposals = self
            .candidates(context, &weaknesses)
            .into_iter()
            .map(|(kind, description, changes)| {
                ImprovementProposal::new(
                    context.strategy.name(),
                    kind,
                    description,
                    context.baseline.clone(),
                    changes,
                    context.parent.map(str::to_string),
                )
            })
            .filter(|p| !p.is_empty() && context.strategy.validate_parameters(&p.candidate_parameters()))
            .take(context.limit)
            .collect();
        Ok(proposals)
    }
}

/// Random neighbourhood moves on one tunable parameter at a time.
pub struct PerturbationProposer {
    rng: StdRng,
    /// Maximum relative change per move
    pub step: f64,
    /// Draws tried per proposal before giving up
    pub attempts: usize,
}

impl PerturbationProposer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            step: 0.25,
            attempts: 20,
        }
    }

    fn perturb(&mut self, spec: &ParamSpec, current: &ParamValue) -> Option<ParamValue> {
        let factor = 1.0 + self.rng.gen_range(-self.step..=self.step);
        match current {
            ParamValue::Int(v) => {
                let mut next = clamp(*v as f64 * factor, spec).round() as i64;
                if next == *v {
                    // Small integers need at least one unit of movement
                    next = if factor >= 1.0 { v + 1 } else { v - 1 };
                    next = clamp(next as f64, spec).round() as i64;
                }
                (next != *v).then_some(ParamValue::Int(next))
            }
            ParamValue::Float(v) => {
                let next = round4(clamp(v * factor, spec));
                (next != *v).then_some(ParamValue::Float(next))
            }
            _ => None,
        }
    }
}

impl ProposalGenerator for PerturbationProposer {
    fn name(&self) -> &str {
        "perturbation"
    }

    fn propose(&mut self, context: &ProposalContext<'_>) -> Result<Vec<ImprovementProposal>> {
        let tunable: Vec<ParamSpec> = context
            .strategy
            .parameter_specs()
            .into_iter()
            .filter(|s| s.tunable && s.default.is_numeric())
            .collect();
        if tunable.is_empty() {
            return Ok(Vec::new());
        }

        let mut proposals: Vec<ImprovementProposal> = Vec::new();
        for _ in 0..context.limit * self.attempts {
            if proposals.len() >= context.limit {
                break;
            }
            let spec = &tunable[self.rng.gen_range(0..tunable.len())];
            let current = context.baseline.get(&spec.name).unwrap_or(&spec.default).clone();
            let Some(next) = self.perturb(spec, &current) else {
                continue;
            };

            let proposal = ImprovementProposal::new(
                context.strategy.name(),
                ProposalKind::ParameterAdjustment,
                format!("Move {} from {} to {}", spec.name, current, next),
                context.baseline.clone(),
                ParameterSet::new().with(&spec.name, next),
                context.parent.map(str::to_string),
            );

            let fresh = proposals.iter().all(|p| p.fingerprint != proposal.fingerprint);
            if fresh && context.strategy.validate_parameters(&proposal.candidate_parameters()) {
                proposals.push(proposal);
            }
        }
        Ok(proposals)
    }
}

/// Every tunable integer parameter scaled by `factor`, rounded and clamped
fn scale_lookbacks(base: &ParameterSet, specs: &[ParamSpec], factor: f64) -> ParameterSet {
    specs
        .iter()
        .filter(|s| s.tunable && matches!(s.default, ParamValue::Int(_)))
        .filter_map(|spec| {
            let current = base.get(&spec.name).and_then(ParamValue::as_f64)?;
            let scaled = clamp(current * factor, spec).round() as i64;
            Some((spec.name.clone(), ParamValue::Int(scaled)))
        })
        .collect()
}

fn clamp(value: f64, spec: &ParamSpec) -> f64 {
    let lo = spec.min.unwrap_or(f64::NEG_INFINITY);
    let hi = spec.max.unwrap_or(f64::INFINITY);
    value.max(lo).min(hi)
}

fn round4(value: f64) -> f64 {
    (value * 1e4).round() / 1e4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::optimisation::MetricSummary;
    use crate::functions::registry::StrategyKind;
    use std::collections::BTreeMap;

    fn result_with(metrics: &[(&str, f64)]) -> AggregateResult {
        let metrics: BTreeMap<String, MetricSummary> = metrics
            .iter()
            .map(|(name, v)| {
                (
                    name.to_string(),
                    MetricSummary {
                        mean: *v,
                        std: 0.0,
                        worst: *v,
                    },
                )
            })
            .collect();
        AggregateResult {
            strategy: "FixedSma".to_string(),
            instrument: "SPY".to_string(),
            metrics,
            parameter_stability: 0.0,
            composite_score: Some(0.0),
            healthy_windows: 1,
            degraded_windows: 0,
            windows: Vec::new(),
        }
    }

    fn context<'a>(strategy: &'a dyn Strategy, baseline: &'a ParameterSet, result: &'a AggregateResult) -> ProposalContext<'a> {
        ProposalContext {
            strategy,
            baseline,
            result,
            history: &[],
            parent: None,
            limit: 10,
        }
    }

    #[test]
    fn test_rule_based_flags_weaknesses() {
        let proposer = RuleBasedProposer::default();
        let weak = result_with(&[
            ("sharpe_ratio", 0.2),
            ("max_drawdown", 0.4),
            ("win_rate", 0.3),
            ("profit_factor", 0.8),
        ]);
        assert_eq!(
            proposer.analyze(&weak),
            vec![
                Weakness::LowSharpe,
                Weakness::HighDrawdown,
                Weakness::LowWinRate,
                Weakness::LowProfitFactor
            ]
        );

        let strong = result_with(&[("sharpe_ratio", 1.8), ("max_drawdown", 0.05), ("win_rate", 0.65)]);
        assert!(proposer.analyze(&strong).is_empty());
    }

    #[test]
    fn test_rule_based_proposals_are_valid() {
        let strategy = StrategyKind::FixedSma.strategy();
        let baseline = strategy.default_parameters();
        let weak = result_with(&[("sharpe_ratio", 0.2), ("max_drawdown", 0.4), ("win_rate", 0.3)]);

        let mut proposer = RuleBasedProposer::default();
        let proposals = proposer.propose(&context(strategy, &baseline, &weak)).unwrap();

        assert!(!proposals.is_empty());
        assert!(proposals.iter().any(|p| p.kind == ProposalKind::RiskManagement));
        assert!(proposals.iter().any(|p| p.kind == ProposalKind::StrategyCombination));
        for p in &proposals {
            assert!(!p.is_empty());
            assert!(strategy.validate_parameters(&p.candidate_parameters()));
        }

        let shorter = proposals
            .iter()
            .find(|p| p.description.starts_with("Shorten"))
            .unwrap();
        assert_eq!(shorter.changes.get("n_fast"), Some(&ParamValue::Int(8)));
        assert_eq!(shorter.changes.get("n_slow"), Some(&ParamValue::Int(16)));
    }

    #[test]
    fn test_perturbation_is_seeded() {
        let strategy = StrategyKind::SmaCross.strategy();
        let baseline = strategy.default_parameters();
        let result = result_with(&[]);

        let mut a = PerturbationProposer::new(7);
        let mut b = PerturbationProposer::new(7);
        let pa = a.propose(&context(strategy, &baseline, &result)).unwrap();
        let pb = b.propose(&context(strategy, &baseline, &result)).unwrap();

        assert!(!pa.is_empty());
        let fa: Vec<&String> = pa.iter().map(|p| &p.fingerprint).collect();
        let fb: Vec<&String> = pb.iter().map(|p| &p.fingerprint).collect();
        assert_eq!(fa, fb);
        for p in &pa {
            assert_eq!(p.changes.len(), 1);
            assert!(strategy.validate_parameters(&p.candidate_parameters()));
        }
    }
}
