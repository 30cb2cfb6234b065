mod common;

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use strategy_lab::config::{AppConfig, OperatingMode};
use strategy_lab::engines::improvement::{
    ActiveBaseline, BaselineRegistry, CandidateEvaluator, CycleOutcome, Decision, ImprovementController,
    ImprovementHistory, ImprovementProposal, Notifier, ProposalContext, ProposalGenerator, ProposalKind,
};
use strategy_lab::engines::optimisation::{AggregateResult, WalkForwardEngine};
use strategy_lab::error::{LabError, Result};
use strategy_lab::functions::registry::StrategyKind;
use strategy_lab::functions::strategy::Strategy;
use strategy_lab::types::{ParamValue, ParameterSet, PriceSeries};

/// Composite score looked up by the `n_fast` value being validated
#[derive(Clone, Default)]
struct ScriptedEvaluator {
    scores: Arc<Mutex<BTreeMap<i64, Option<f64>>>>,
    degraded: Arc<Mutex<BTreeMap<i64, usize>>>,
    abort_on: Arc<Mutex<Option<i64>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedEvaluator {
    fn score(&self, n_fast: i64, score: f64) {
        self.scores.lock().unwrap().insert(n_fast, Some(score));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CandidateEvaluator for ScriptedEvaluator {
    fn validate(&self, series: &PriceSeries, strategy: &dyn Strategy, params: &ParameterSet) -> Result<AggregateResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let n_fast = params.get_usize("n_fast", 0) as i64;
        if *self.abort_on.lock().unwrap() == Some(n_fast) {
            return Err(LabError::Aborted);
        }

        let composite_score = self.scores.lock().unwrap().get(&n_fast).copied().unwrap_or(Some(0.0));
        let degraded_windows = self.degraded.lock().unwrap().get(&n_fast).copied().unwrap_or(0);
        Ok(AggregateResult {
            strategy: strategy.name().to_string(),
            instrument: series.instrument().to_string(),
            metrics: BTreeMap::new(),
            parameter_stability: 0.0,
            composite_score,
            healthy_windows: 9 - degraded_windows,
            degraded_windows,
            windows: Vec::new(),
        })
    }
}

/// Hands out a fixed list of `n_fast` changes per cycle
#[derive(Clone, Default)]
struct ScriptedProposer {
    script: Arc<Mutex<VecDeque<Vec<i64>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProposer {
    fn then(&self, values: &[i64]) -> &Self {
        self.script.lock().unwrap().push_back(values.to_vec());
        self
    }
}

impl ProposalGenerator for ScriptedProposer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn propose(&mut self, context: &ProposalContext<'_>) -> Result<Vec<ImprovementProposal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let values = self.script.lock().unwrap().pop_front().unwrap_or_default();
        Ok(values
            .into_iter()
            .map(|n| {
                ImprovementProposal::new(
                    context.strategy.name(),
                    ProposalKind::ParameterAdjustment,
                    format!("n_fast -> {}", n),
                    context.baseline.clone(),
                    ParameterSet::new().with("n_fast", ParamValue::Int(n)),
                    context.parent.map(str::to_string),
                )
            })
            .collect())
    }
}

#[derive(Clone, Default)]
struct CountingNotifier {
    delivered: Arc<Mutex<Vec<CycleOutcome>>>,
    fail: bool,
}

impl Notifier for CountingNotifier {
    fn notify(&self, outcome: &CycleOutcome) -> Result<()> {
        self.delivered.lock().unwrap().push(outcome.clone());
        if self.fail {
            return Err(LabError::Validation("channel down".to_string()));
        }
        Ok(())
    }
}

const FIXED_SMA: StrategyKind = StrategyKind::FixedSma;

fn config(mode: OperatingMode) -> AppConfig {
    let mut config = AppConfig::default();
    config.improvement.mode = mode;
    config.improvement.min_improvement_margin = 0.05;
    config.improvement.similarity_tolerance = 0.01;
    config.improvement.max_proposals_per_cycle = 3;
    config
}

fn controller(
    mode: OperatingMode,
    evaluator: &ScriptedEvaluator,
    proposer: &ScriptedProposer,
    history: ImprovementHistory,
) -> ImprovementController {
    ImprovementController::new(
        &config(mode),
        Box::new(evaluator.clone()),
        Box::new(proposer.clone()),
        history,
    )
}

fn series() -> PriceSeries {
    common::daily_series("SPY", common::day(2020, 1, 1), common::day(2020, 3, 1), 11)
}

fn ledger_json(history: &ImprovementHistory) -> Vec<String> {
    history
        .records()
        .iter()
        .map(|r| serde_json::to_string(r).unwrap())
        .collect()
}

#[test]
fn test_duplicate_from_two_cycles_ago_skips_validation() {
    let evaluator = ScriptedEvaluator::default();
    evaluator.score(10, 1.0);
    evaluator.score(8, 1.01);
    evaluator.score(12, 0.9);
    let proposer = ScriptedProposer::default();
    proposer.then(&[8]).then(&[12]).then(&[8]);
    let mut controller = controller(OperatingMode::Validation, &evaluator, &proposer, ImprovementHistory::in_memory());
    let series = series();

    let first = controller.run_cycle(&series, FIXED_SMA).unwrap();
    assert_eq!(first.records[0].decision, Decision::Rejected);
    assert!(first.records[0].reason.contains("below margin"));
    controller.run_cycle(&series, FIXED_SMA).unwrap();
    assert_eq!(evaluator.calls(), 4);

    let third = controller.run_cycle(&series, FIXED_SMA).unwrap();
    assert_eq!(third.records.len(), 1);
    assert_eq!(third.records[0].decision, Decision::Rejected);
    assert_eq!(third.records[0].reason, "duplicate proposal");
    // Only the baseline was evaluated in the third cycle
    assert_eq!(evaluator.calls(), 5);
    assert_eq!(proposer.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_repeated_proposal_is_duplicate() {
    let evaluator = ScriptedEvaluator::default();
    let proposer = ScriptedProposer::default();
    proposer.then(&[7, 7]);
    let mut controller = controller(OperatingMode::Validation, &evaluator, &proposer, ImprovementHistory::in_memory());

    let report = controller.run_cycle(&series(), FIXED_SMA).unwrap();
    assert_eq!(report.records.len(), 2);
    assert_ne!(report.records[0].reason, "duplicate proposal");
    assert_eq!(report.records[1].reason, "duplicate proposal");
    assert_eq!(
        report.records[0].proposal.fingerprint,
        report.records[1].proposal.fingerprint
    );
}

#[test]
fn test_promotion_margin_boundary() {
    let eps = 1e-9;
    let evaluator = ScriptedEvaluator::default();
    evaluator.score(10, 1.0);
    evaluator.score(8, 1.0 + 0.05 - eps);
    evaluator.score(12, 1.0 + 0.05 + eps);
    let proposer = ScriptedProposer::default();
    proposer.then(&[8, 12]);
    let mut controller = controller(OperatingMode::Validation, &evaluator, &proposer, ImprovementHistory::in_memory());

    let report = controller.run_cycle(&series(), FIXED_SMA).unwrap();
    assert_eq!(report.records[0].decision, Decision::Rejected);
    assert_eq!(report.records[1].decision, Decision::Promoted);
}

#[test]
fn test_validation_mode_stages_without_touching_baseline() {
    let evaluator = ScriptedEvaluator::default();
    evaluator.score(10, 1.0);
    evaluator.score(8, 1.5);
    let proposer = ScriptedProposer::default();
    proposer.then(&[8]);
    let mut controller = controller(OperatingMode::Validation, &evaluator, &proposer, ImprovementHistory::in_memory());

    let report = controller.run_cycle(&series(), FIXED_SMA).unwrap();
    let staged = report.promoted().unwrap().clone();
    assert!(!staged.activated);
    let artifact = staged.artifact.clone().unwrap();
    assert!(artifact.starts_with("improvement/FixedSma/"));
    assert!(controller.history().active_record("FixedSma").is_none());
    assert_eq!(controller.baselines().get("FixedSma").unwrap().version, 0);

    let adopted = controller.adopt_staged(&staged.record_id).unwrap();
    assert!(adopted.activated);
    assert_eq!(adopted.supersedes.as_deref(), Some(staged.record_id.as_str()));
    assert_eq!(
        controller.history().active_record("FixedSma").unwrap().record_id,
        adopted.record_id
    );
    assert_eq!(
        controller.active_parameters(FIXED_SMA).unwrap().get("n_fast"),
        Some(&ParamValue::Int(8))
    );
    assert!(controller.adopt_staged(&staged.record_id).is_err());
}

#[test]
fn test_adoption_then_regression_rolls_back() {
    let evaluator = ScriptedEvaluator::default();
    evaluator.score(10, 1.0);
    evaluator.score(8, 1.5);
    let proposer = ScriptedProposer::default();
    proposer.then(&[8]).then(&[6]);
    let mut controller = controller(OperatingMode::Adoption, &evaluator, &proposer, ImprovementHistory::in_memory());
    let series = series();

    let report = controller.run_cycle(&series, FIXED_SMA).unwrap();
    let promoted = report.promoted().unwrap().clone();
    assert!(promoted.activated);
    assert_eq!(controller.baselines().get("FixedSma").unwrap().version, 1);

    // The next cycle builds on the promoted parameters
    let next = controller.run_cycle(&series, FIXED_SMA).unwrap();
    assert_eq!(next.baseline_score, Some(1.5));
    assert_eq!(next.records[0].proposal.parent.as_deref(), Some(promoted.record_id.as_str()));

    // Within tolerance: nothing happens
    evaluator.score(8, 1.45);
    assert!(controller.revalidate(&series, FIXED_SMA).unwrap().is_none());

    let before = ledger_json(controller.history());
    evaluator.score(8, 1.2);
    let rollback = controller.revalidate(&series, FIXED_SMA).unwrap().unwrap();
    assert_eq!(rollback.decision, Decision::RolledBack);
    assert_eq!(rollback.supersedes.as_deref(), Some(promoted.record_id.as_str()));
    assert_eq!(rollback.reinstated, None);

    // Append-only: every earlier record is byte-for-byte unchanged
    let after = ledger_json(controller.history());
    assert_eq!(after.len(), before.len() + 1);
    assert_eq!(&after[..before.len()], &before[..]);
    assert!(controller.history().get(&promoted.record_id).is_some());

    assert!(controller.history().active_record("FixedSma").is_none());
    assert_eq!(
        controller.active_parameters(FIXED_SMA).unwrap().get("n_fast"),
        Some(&ParamValue::Int(10))
    );
    assert!(matches!(
        controller.rollback(FIXED_SMA, "again"),
        Err(LabError::Validation(_))
    ));
}

#[test]
fn test_manual_rollback_reinstates_previous() {
    let evaluator = ScriptedEvaluator::default();
    evaluator.score(10, 1.0);
    evaluator.score(8, 1.5);
    evaluator.score(6, 2.0);
    let proposer = ScriptedProposer::default();
    proposer.then(&[8]).then(&[6]);
    let mut controller = controller(OperatingMode::Adoption, &evaluator, &proposer, ImprovementHistory::in_memory());
    let series = series();

    let first = controller.run_cycle(&series, FIXED_SMA).unwrap().promoted().unwrap().clone();
    let second = controller.run_cycle(&series, FIXED_SMA).unwrap().promoted().unwrap().clone();

    let rollback = controller.rollback(FIXED_SMA, "operator request").unwrap();
    assert_eq!(rollback.reinstated.as_deref(), Some(first.record_id.as_str()));
    assert_eq!(
        controller.history().active_record("FixedSma").unwrap().record_id,
        first.record_id
    );
    assert_eq!(controller.history().get(&second.record_id), Some(&second));
    assert_eq!(
        controller.baselines().get("FixedSma").unwrap().active.unwrap().record_id,
        first.record_id
    );
}

#[test]
fn test_non_comparable_and_empty_proposals_are_rejected() {
    let evaluator = ScriptedEvaluator::default();
    evaluator.score(10, 1.0);
    evaluator.score(8, 3.0);
    evaluator.degraded.lock().unwrap().insert(8, 2);
    evaluator.scores.lock().unwrap().insert(12, None);
    let proposer = ScriptedProposer::default();
    // 10 is the current value, so that proposal changes nothing
    proposer.then(&[8, 12, 10]);
    let mut controller = controller(OperatingMode::Adoption, &evaluator, &proposer, ImprovementHistory::in_memory());

    let report = controller.run_cycle(&series(), FIXED_SMA).unwrap();
    let reasons: Vec<&str> = report.records.iter().map(|r| r.reason.as_str()).collect();
    assert!(reasons[0].starts_with("not comparable"));
    assert!(reasons[1].starts_with("not comparable"));
    assert_eq!(reasons[2], "empty proposal");
    assert!(report.records.iter().all(|r| r.decision == Decision::Rejected));
    // Baseline plus the two non-empty candidates
    assert_eq!(evaluator.calls(), 3);
}

#[test]
fn test_scoreless_baseline_yields_to_a_scored_candidate() {
    let evaluator = ScriptedEvaluator::default();
    evaluator.scores.lock().unwrap().insert(10, None);
    evaluator.scores.lock().unwrap().insert(12, None);
    evaluator.score(8, -0.2);
    let proposer = ScriptedProposer::default();
    proposer.then(&[12, 8]);
    let mut controller = controller(OperatingMode::Adoption, &evaluator, &proposer, ImprovementHistory::in_memory());

    let report = controller.run_cycle(&series(), FIXED_SMA).unwrap();
    assert_eq!(report.baseline_score, None);
    assert_eq!(report.records[0].decision, Decision::Rejected);
    assert_eq!(report.records[0].reason, "not comparable: missing composite score");

    let promoted = &report.records[1];
    assert_eq!(promoted.decision, Decision::Promoted);
    assert!(promoted.activated);
    assert_eq!(promoted.score_delta(), None);
    assert_eq!(
        controller.history().active_record("FixedSma").map(|r| r.record_id.as_str()),
        Some(promoted.record_id.as_str())
    );
}

#[test]
fn test_proposals_are_capped_per_cycle() {
    let evaluator = ScriptedEvaluator::default();
    let proposer = ScriptedProposer::default();
    proposer.then(&[2, 3, 4, 5, 6, 7]);
    let mut controller = controller(OperatingMode::Validation, &evaluator, &proposer, ImprovementHistory::in_memory());

    let report = controller.run_cycle(&series(), FIXED_SMA).unwrap();
    assert_eq!(report.records.len(), 3);
}

#[test]
fn test_abort_leaves_history_untouched() {
    let evaluator = ScriptedEvaluator::default();
    *evaluator.abort_on.lock().unwrap() = Some(8);
    let proposer = ScriptedProposer::default();
    proposer.then(&[8]);
    let mut controller = controller(OperatingMode::Validation, &evaluator, &proposer, ImprovementHistory::in_memory());

    assert!(matches!(
        controller.run_cycle(&series(), FIXED_SMA),
        Err(LabError::Aborted)
    ));
    assert!(controller.history().is_empty());
}

#[test]
fn test_notifier_failures_do_not_block() {
    let evaluator = ScriptedEvaluator::default();
    let proposer = ScriptedProposer::default();
    proposer.then(&[8, 6]);
    let notifier = CountingNotifier {
        fail: true,
        ..Default::default()
    };
    let mut controller = controller(OperatingMode::Validation, &evaluator, &proposer, ImprovementHistory::in_memory())
        .with_notifier(Box::new(notifier.clone()));

    let report = controller.run_cycle(&series(), FIXED_SMA).unwrap();
    assert_eq!(report.records.len(), 2);
    let delivered = notifier.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].record_id, report.records[0].record_id);
}

#[test]
fn test_ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.jsonl");
    let evaluator = ScriptedEvaluator::default();
    evaluator.score(10, 1.0);
    evaluator.score(8, 1.5);
    let proposer = ScriptedProposer::default();
    proposer.then(&[8, 6]);

    let mut controller = controller(
        OperatingMode::Adoption,
        &evaluator,
        &proposer,
        ImprovementHistory::open(&path).unwrap(),
    );
    let report = controller.run_cycle(&series(), FIXED_SMA).unwrap();
    let promoted = report.promoted().unwrap().clone();

    let reopened = ImprovementHistory::open(&path).unwrap();
    assert_eq!(ledger_json(&reopened), ledger_json(controller.history()));

    let registry = BaselineRegistry::from_history(&reopened);
    let snapshot = registry.get("FixedSma").unwrap();
    assert_eq!(snapshot.active.unwrap().record_id, promoted.record_id);
    assert_eq!(snapshot.version, 1);
}

#[test]
fn test_walk_forward_validation_end_to_end() {
    let series = common::ten_year_series(21);
    let mut config = config(OperatingMode::Validation);
    config.improvement.max_degraded_windows = 9;
    let proposer = ScriptedProposer::default();
    proposer.then(&[8, 8]);

    let mut controller = ImprovementController::new(
        &config,
        Box::new(WalkForwardEngine::from_config(&config)),
        Box::new(proposer.clone()),
        ImprovementHistory::in_memory(),
    );
    let report = controller.run_cycle(&series, FIXED_SMA).unwrap();

    assert_eq!(report.records.len(), 2);
    let first = &report.records[0];
    assert_ne!(first.reason, "duplicate proposal");
    assert_eq!(first.result.as_ref().map(|r| r.windows.len()), Some(9));
    let assessment = first.assessment.as_ref().unwrap();
    assert!(assessment.metrics.contains_key("sharpe_ratio"));
    assert!(assessment.improvement_score.is_finite());
    assert_eq!(report.records[1].reason, "duplicate proposal");
    assert!(report.records[1].result.is_none());
}

/// Installs an outside baseline for FixedSma while the candidate with
/// `n_fast == trigger` is being validated, as a concurrent promotion would
#[derive(Clone)]
struct RacingEvaluator {
    inner: ScriptedEvaluator,
    registry: Arc<BaselineRegistry>,
    trigger: i64,
    rival: i64,
    raced: Arc<AtomicUsize>,
}

impl CandidateEvaluator for RacingEvaluator {
    fn validate(&self, series: &PriceSeries, strategy: &dyn Strategy, params: &ParameterSet) -> Result<AggregateResult> {
        let n_fast = params.get_usize("n_fast", 0) as i64;
        if n_fast == self.trigger && self.raced.fetch_add(1, Ordering::SeqCst) == 0 {
            let rival = ActiveBaseline {
                record_id: "rec-elsewhere".to_string(),
                parameters: ParameterSet::new()
                    .with("n_fast", ParamValue::Int(self.rival))
                    .with("n_slow", ParamValue::Int(20)),
                score: None,
            };
            let version = self.registry.get(strategy.name())?.version;
            self.registry.compare_and_swap(strategy.name(), version, Some(rival))?;
        }
        self.inner.validate(series, strategy, params)
    }
}

fn racing_controller(rival_score: f64) -> (ImprovementController, RacingEvaluator) {
    let inner = ScriptedEvaluator::default();
    inner.score(10, 0.4);
    inner.score(8, 1.0);
    inner.score(9, rival_score);
    let evaluator = RacingEvaluator {
        inner,
        registry: Arc::new(BaselineRegistry::new()),
        trigger: 8,
        rival: 9,
        raced: Arc::new(AtomicUsize::new(0)),
    };
    let proposer = ScriptedProposer::default();
    proposer.then(&[8]);

    let controller = ImprovementController::new(
        &config(OperatingMode::Adoption),
        Box::new(evaluator.clone()),
        Box::new(proposer),
        ImprovementHistory::in_memory(),
    )
    .with_baselines(Arc::clone(&evaluator.registry));
    (controller, evaluator)
}

#[test]
fn test_moved_baseline_is_rechecked_then_promoted() {
    let (mut controller, evaluator) = racing_controller(0.5);

    let report = controller.run_cycle(&series(), FIXED_SMA).unwrap();
    let record = &report.records[0];
    assert_eq!(record.decision, Decision::Promoted);
    assert!(record.activated);
    assert_eq!(record.baseline_score, Some(0.5));

    // Baseline, candidate, then the rival that replaced the baseline
    assert_eq!(evaluator.inner.calls(), 3);
    let snapshot = evaluator.registry.get("FixedSma").unwrap();
    assert_eq!(snapshot.version, 2);
    assert_eq!(snapshot.active.unwrap().record_id, record.record_id);
}

#[test]
fn test_moved_baseline_that_closes_the_gap_rejects() {
    let (mut controller, evaluator) = racing_controller(0.99);

    let report = controller.run_cycle(&series(), FIXED_SMA).unwrap();
    let record = &report.records[0];
    assert_eq!(record.decision, Decision::Rejected);
    assert!(!record.activated);
    assert_eq!(record.reason, "stale baseline: no longer clears the margin");
    assert_eq!(record.baseline_score, Some(0.99));

    // The rival stays in place
    let snapshot = evaluator.registry.get("FixedSma").unwrap();
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.active.unwrap().record_id, "rec-elsewhere");
    assert_eq!(controller.history().active_record("FixedSma"), None);
}
