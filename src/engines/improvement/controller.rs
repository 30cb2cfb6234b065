use super::assessment::ProposalAssessment;
use super::baseline::{ActiveBaseline, BaselineRegistry};
use super::collaborators::{BranchNameVcs, CycleOutcome, LogNotifier, Notifier, VersionControl};
use super::history::{Decision, ImprovementHistory, ImprovementRecord, RecordDraft};
use super::proposal::ImprovementProposal;
use super::proposer::{ProposalContext, ProposalGenerator, RuleBasedProposer};
use crate::config::{AppConfig, ImprovementConfig, OperatingMode, StrategiesConfig};
use crate::engines::optimisation::{AggregateResult, ParameterSpace, WalkForwardEngine};
use crate::error::{LabError, Result};
use crate::functions::registry::StrategyKind;
use crate::functions::strategy::Strategy;
use crate::types::{ParameterSet, PriceSeries};
use std::fmt;
use std::sync::Arc;

/// Runs one parameter set through walk-forward validation
pub trait CandidateEvaluator: Send + Sync {
    fn validate(&self, series: &PriceSeries, strategy: &dyn Strategy, params: &ParameterSet) -> Result<AggregateResult>;
}

impl CandidateEvaluator for WalkForwardEngine {
    /// The exact parameter set on every window, so baseline and candidate
    /// are compared as proposed rather than after re-tuning.
    fn validate(&self, series: &PriceSeries, strategy: &dyn Strategy, params: &ParameterSet) -> Result<AggregateResult> {
        self.run(series, strategy, &ParameterSpace::single(params.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    ProposalGenerated,
    Validating,
    Promoted,
    Rejected,
    RolledBack,
}

impl ControllerState {
    /// Proposal lifecycle plus the operator paths: re-validation of the
    /// active record (`Idle -> Validating -> RolledBack | Idle`), manual
    /// rollback and adoption of a staged promotion.
    pub fn can_transition(self, to: ControllerState) -> bool {
        use ControllerState::*;
        matches!(
            (self, to),
            (Idle, ProposalGenerated)
                | (Idle, Validating)
                | (Idle, Promoted)
                | (Idle, RolledBack)
                | (ProposalGenerated, Validating)
                | (ProposalGenerated, Rejected)
                | (Validating, Promoted)
                | (Validating, Rejected)
                | (Validating, RolledBack)
                | (Validating, Idle)
                | (Promoted, RolledBack)
                | (Promoted, Idle)
                | (Rejected, Idle)
                | (RolledBack, Idle)
        )
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Records appended by one improvement cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub strategy: String,
    pub instrument: String,
    pub baseline_score: Option<f64>,
    pub records: Vec<ImprovementRecord>,
}

impl CycleReport {
    pub fn promoted(&self) -> Option<&ImprovementRecord> {
        self.records.iter().find(|r| r.decision == Decision::Promoted)
    }

    pub fn rejected(&self) -> impl Iterator<Item = &ImprovementRecord> {
        self.records.iter().filter(|r| r.decision == Decision::Rejected)
    }
}

/// `candidate - baseline >= margin`
pub fn clears_margin(candidate: f64, baseline: f64, margin: f64) -> bool {
    candidate - baseline >= margin
}

/// Outcome of comparing a validated candidate with the baseline
enum Verdict {
    Eligible,
    Rejected(String),
}

/// Propose, validate and promote or reject changes to one strategy at a time.
///
/// Every terminal transition (promoted, rejected, rolled back) appends one
/// ledger record; nothing already in the ledger is ever rewritten. The active
/// baseline lives in a [`BaselineRegistry`] and only moves by compare-and-swap.
pub struct ImprovementController {
    config: ImprovementConfig,
    strategies: StrategiesConfig,
    evaluator: Box<dyn CandidateEvaluator>,
    proposer: Box<dyn ProposalGenerator>,
    notifier: Box<dyn Notifier>,
    vcs: Box<dyn VersionControl>,
    history: ImprovementHistory,
    baselines: Arc<BaselineRegistry>,
    state: ControllerState,
}

impl ImprovementController {
    pub fn new(
        config: &AppConfig,
        evaluator: Box<dyn CandidateEvaluator>,
        proposer: Box<dyn ProposalGenerator>,
        history: ImprovementHistory,
    ) -> Self {
        let baselines = Arc::new(BaselineRegistry::from_history(&history));
        Self {
            config: config.improvement.clone(),
            strategies: config.strategies.clone(),
            evaluator,
            proposer,
            notifier: Box::new(LogNotifier),
            vcs: Box::new(BranchNameVcs::default()),
            history,
            baselines,
            state: ControllerState::Idle,
        }
    }

    /// Walk-forward validation, rule-based proposals and the configured ledger file
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let history = ImprovementHistory::open(&config.improvement.history_path)?;
        Ok(Self::new(
            config,
            Box::new(WalkForwardEngine::from_config(config)),
            Box::new(RuleBasedProposer::default()),
            history,
        ))
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_version_control(mut self, vcs: Box<dyn VersionControl>) -> Self {
        self.vcs = vcs;
        self
    }

    /// Share active-baseline pointers with other controllers
    pub fn with_baselines(mut self, baselines: Arc<BaselineRegistry>) -> Self {
        self.baselines = baselines;
        self
    }

    pub fn history(&self) -> &ImprovementHistory {
        &self.history
    }

    pub fn baselines(&self) -> Arc<BaselineRegistry> {
        Arc::clone(&self.baselines)
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Parameters in force for `kind`: the active record's, else the configured ones
    pub fn active_parameters(&self, kind: StrategyKind) -> Result<ParameterSet> {
        Ok(self.resolve(kind, self.baselines.get(kind.name())?.active.as_ref()))
    }

    /// One improvement cycle: evaluate the baseline, ask for proposals and
    /// decide each of them. Errors leave the controller idle; records already
    /// appended in this cycle stay.
    pub fn run_cycle(&mut self, series: &PriceSeries, kind: StrategyKind) -> Result<CycleReport> {
        let outcome = self.cycle(series, kind);
        self.state = ControllerState::Idle;
        outcome
    }

    /// Re-check the active record on fresh data and roll it back when its
    /// composite score dropped by more than the rollback tolerance.
    pub fn revalidate(&mut self, series: &PriceSeries, kind: StrategyKind) -> Result<Option<ImprovementRecord>> {
        let outcome = self.check_active(series, kind);
        self.state = ControllerState::Idle;
        outcome
    }

    /// Operator-initiated rollback of the active record
    pub fn rollback(&mut self, kind: StrategyKind, reason: &str) -> Result<ImprovementRecord> {
        let outcome = match self.history.active_record(kind.name()).cloned() {
            Some(active) => self.roll_back(&active, reason.to_string(), None, None, active.instrument.clone()),
            None => Err(LabError::Validation(format!("No active record for {} to roll back", kind))),
        };
        self.state = ControllerState::Idle;
        outcome
    }

    /// Make a validation-mode promotion active after external review
    pub fn adopt_staged(&mut self, record_id: &str) -> Result<ImprovementRecord> {
        let outcome = self.adopt(record_id);
        self.state = ControllerState::Idle;
        outcome
    }

    fn cycle(&mut self, series: &PriceSeries, kind: StrategyKind) -> Result<CycleReport> {
        let strategy = kind.strategy();
        let name = strategy.name();

        let snapshot = self.baselines.get(name)?;
        let baseline_params = self.resolve(kind, snapshot.active.as_ref());
        let baseline = self.evaluator.validate(series, strategy, &baseline_params)?;
        log::info!(
            "{} baseline on {}: composite {:?} (version {})",
            name,
            series.instrument(),
            baseline.composite_score,
            snapshot.version
        );

        let limit = self.config.max_proposals_per_cycle;
        let parent = snapshot.active.as_ref().map(|a| a.record_id.as_str());
        let context = ProposalContext {
            strategy,
            baseline: &baseline_params,
            result: &baseline,
            history: self.history.records(),
            parent,
            limit,
        };
        let mut proposals = self.proposer.propose(&context)?;
        proposals.truncate(limit);
        log::info!("{} proposed {} change(s) for {}", self.proposer.name(), proposals.len(), name);

        let mut report = CycleReport {
            strategy: name.to_string(),
            instrument: series.instrument().to_string(),
            baseline_score: baseline.composite_score,
            records: Vec::new(),
        };

        for proposal in proposals {
            let record = self.decide(series, kind, proposal, &baseline, snapshot.version)?;
            report.records.push(record);
        }
        Ok(report)
    }

    fn decide(
        &mut self,
        series: &PriceSeries,
        kind: StrategyKind,
        proposal: ImprovementProposal,
        baseline: &AggregateResult,
        version: u64,
    ) -> Result<ImprovementRecord> {
        let strategy = kind.strategy();
        let baseline_score = baseline.composite_score;
        self.transition(ControllerState::ProposalGenerated)?;
        let candidate_params = proposal.candidate_parameters();
        let mode = self.config.mode;
        let draft = |proposal: ImprovementProposal, reason: String| RecordDraft {
            strategy: strategy.name().to_string(),
            instrument: series.instrument().to_string(),
            parameters: proposal.candidate_parameters(),
            proposal,
            decision: Decision::Rejected,
            mode,
            reason,
            result: None,
            baseline_score,
            candidate_score: None,
            assessment: None,
            activated: false,
            artifact: None,
            supersedes: None,
            reinstated: None,
        };

        if proposal.is_empty() {
            return self.finish(draft(proposal, "empty proposal".to_string()));
        }

        if let Some(previous) =
            self.history
                .find_duplicate(&proposal, self.config.duplicate_lookback, self.config.similarity_tolerance)
        {
            log::info!(
                "Proposal {} for {} repeats {}; skipping validation",
                proposal.id,
                strategy.name(),
                previous.record_id
            );
            return self.finish(draft(proposal, "duplicate proposal".to_string()));
        }

        self.transition(ControllerState::Validating)?;
        let result = match self.evaluator.validate(series, strategy, &candidate_params) {
            Ok(result) => result,
            Err(LabError::Aborted) => return Err(LabError::Aborted),
            Err(e) => return self.finish(draft(proposal, format!("validation failed: {}", e))),
        };

        let candidate_score = result.composite_score;
        let mut record = draft(proposal, String::new());
        record.candidate_score = candidate_score;
        record.assessment = ProposalAssessment::compare(baseline, &result);

        match self.verdict(&result, baseline_score) {
            Verdict::Rejected(reason) => {
                record.reason = reason;
                record.result = Some(result);
                self.finish(record)
            }
            Verdict::Eligible => {
                record.result = Some(result);
                match self.config.mode {
                    OperatingMode::Validation => self.stage(record),
                    OperatingMode::Adoption => self.promote(series, kind, record, version),
                }
            }
        }
    }

    fn verdict(&self, result: &AggregateResult, baseline_score: Option<f64>) -> Verdict {
        if result.degraded_windows > self.config.max_degraded_windows {
            return Verdict::Rejected(format!(
                "not comparable: {} degraded window(s)",
                result.degraded_windows
            ));
        }
        let Some(candidate) = result.composite_score else {
            return Verdict::Rejected("not comparable: missing composite score".to_string());
        };
        // A baseline without a healthy window has nothing to defend
        let Some(baseline) = baseline_score else {
            return Verdict::Eligible;
        };

        let margin = self.config.min_improvement_margin;
        if clears_margin(candidate, baseline, margin) {
            Verdict::Eligible
        } else {
            Verdict::Rejected(format!(
                "improvement {:+.4} below margin {:.4}",
                candidate - baseline,
                margin
            ))
        }
    }

    /// Validation mode: stage the change for review, leave the baseline alone
    fn stage(&mut self, mut record: RecordDraft) -> Result<ImprovementRecord> {
        match self.vcs.request_artifact(&record.proposal) {
            Ok(artifact) => {
                record.decision = Decision::Promoted;
                record.reason = format!("staged for review as {}", artifact);
                record.artifact = Some(artifact);
            }
            Err(e) => {
                record.reason = format!("artifact request failed: {}", e);
            }
        }
        self.finish(record)
    }

    /// Adoption mode: move the active pointer, retrying once against a
    /// baseline that changed underneath us
    fn promote(
        &mut self,
        series: &PriceSeries,
        kind: StrategyKind,
        mut record: RecordDraft,
        version: u64,
    ) -> Result<ImprovementRecord> {
        let name = kind.name();
        let mut expected = version;
        // Only used to undo the swap; a newer version fails the swap and refreshes it
        let mut previous = self.baselines.get(name)?.active;

        for attempt in 0..2 {
            let active = ActiveBaseline {
                record_id: self.history.next_record_id(),
                parameters: record.parameters.clone(),
                score: record.candidate_score,
            };

            match self.baselines.compare_and_swap(name, expected, Some(active)) {
                Ok(new_version) => {
                    record.decision = Decision::Promoted;
                    record.activated = true;
                    record.reason = "adopted as active baseline".to_string();
                    self.transition(ControllerState::Promoted)?;
                    return match self.history.append(record) {
                        Ok(stored) => {
                            self.notify(&stored);
                            self.transition(ControllerState::Idle)?;
                            Ok(stored)
                        }
                        Err(e) => {
                            // Leave the pointer where the ledger says it is
                            self.baselines.compare_and_swap(name, new_version, previous)?;
                            Err(e)
                        }
                    };
                }
                Err(LabError::StaleBaseline { found, .. }) if attempt == 0 => {
                    log::warn!("Baseline of {} moved to version {}; re-checking", name, found);
                    let fresh = self.baselines.get(name)?;
                    let fresh_params = self.resolve(kind, fresh.active.as_ref());
                    let fresh_result = self.evaluator.validate(series, kind.strategy(), &fresh_params)?;
                    record.baseline_score = fresh_result.composite_score;
                    record.assessment = record
                        .result
                        .as_ref()
                        .and_then(|candidate| ProposalAssessment::compare(&fresh_result, candidate));
                    expected = fresh.version;
                    previous = fresh.active;

                    let still_better = match (record.candidate_score, record.baseline_score) {
                        (Some(c), Some(b)) => clears_margin(c, b, self.config.min_improvement_margin),
                        (Some(_), None) => true,
                        (None, _) => false,
                    };
                    if !still_better {
                        record.reason = "stale baseline: no longer clears the margin".to_string();
                        return self.finish(record);
                    }
                }
                Err(LabError::StaleBaseline { .. }) => break,
                Err(e) => return Err(e),
            }
        }

        record.reason = "stale baseline: lost the promotion race twice".to_string();
        self.finish(record)
    }

    fn check_active(&mut self, series: &PriceSeries, kind: StrategyKind) -> Result<Option<ImprovementRecord>> {
        let name = kind.name();
        let Some(active) = self.history.active_record(name).cloned() else {
            log::info!("{} has no active record to re-validate", name);
            return Ok(None);
        };

        self.transition(ControllerState::Validating)?;
        let result = self.evaluator.validate(series, kind.strategy(), &active.parameters)?;
        let reference = active.candidate_score;
        let current = result.composite_score;

        let regression = match (current, reference) {
            (Some(now), Some(then)) => (then - now > self.config.rollback_tolerance)
                .then(|| format!("composite fell from {:.4} to {:.4}", then, now)),
            (None, _) => Some("re-validation produced no composite score".to_string()),
            (Some(_), None) => None,
        };

        match regression {
            Some(reason) => {
                log::warn!("{} active record {} regressed: {}", name, active.record_id, reason);
                self.roll_back(&active, reason, Some(result), current, series.instrument().to_string())
                    .map(Some)
            }
            None => {
                log::info!("{} active record {} holds ({:?})", name, active.record_id, current);
                self.transition(ControllerState::Idle)?;
                Ok(None)
            }
        }
    }

    fn roll_back(
        &mut self,
        active: &ImprovementRecord,
        reason: String,
        result: Option<AggregateResult>,
        current_score: Option<f64>,
        instrument: String,
    ) -> Result<ImprovementRecord> {
        let kind: StrategyKind = active.strategy.parse()?;
        let target = self.history.rollback_target(&active.record_id).cloned();
        let restored = target.as_ref().map(|t| ActiveBaseline {
            record_id: t.record_id.clone(),
            parameters: t.parameters.clone(),
            score: t.candidate_score,
        });
        let parameters = self.resolve(kind, restored.as_ref());

        self.transition(ControllerState::RolledBack)?;
        let (new_version, displaced) = self.swap(kind.name(), restored)?;
        let assessment = active
            .result
            .as_ref()
            .zip(result.as_ref())
            .and_then(|(then, now)| ProposalAssessment::compare(then, now));
        let draft = RecordDraft {
            strategy: active.strategy.clone(),
            instrument,
            proposal: active.proposal.clone(),
            parameters,
            decision: Decision::RolledBack,
            mode: self.config.mode,
            reason,
            result,
            baseline_score: active.candidate_score,
            candidate_score: current_score,
            assessment,
            activated: false,
            artifact: None,
            supersedes: Some(active.record_id.clone()),
            reinstated: target.map(|t| t.record_id),
        };

        match self.history.append(draft) {
            Ok(stored) => {
                self.notify(&stored);
                self.transition(ControllerState::Idle)?;
                Ok(stored)
            }
            Err(e) => {
                self.baselines.compare_and_swap(kind.name(), new_version, displaced)?;
                Err(e)
            }
        }
    }

    fn adopt(&mut self, record_id: &str) -> Result<ImprovementRecord> {
        let staged = self
            .history
            .get(record_id)
            .cloned()
            .ok_or_else(|| LabError::Validation(format!("Unknown record {}", record_id)))?;

        if staged.decision != Decision::Promoted || staged.activated {
            return Err(LabError::Validation(format!(
                "Record {} is not a staged promotion",
                record_id
            )));
        }
        let already = self
            .history
            .records()
            .iter()
            .any(|r| r.activated && r.supersedes.as_deref() == Some(record_id));
        if already {
            return Err(LabError::Validation(format!("Record {} was already adopted", record_id)));
        }

        self.transition(ControllerState::Promoted)?;
        let active = ActiveBaseline {
            record_id: self.history.next_record_id(),
            parameters: staged.parameters.clone(),
            score: staged.candidate_score,
        };
        let (new_version, displaced) = self.swap(&staged.strategy, Some(active))?;

        let draft = RecordDraft {
            strategy: staged.strategy.clone(),
            instrument: staged.instrument.clone(),
            proposal: staged.proposal.clone(),
            parameters: staged.parameters.clone(),
            decision: Decision::Promoted,
            mode: OperatingMode::Adoption,
            reason: "adopted after review".to_string(),
            result: None,
            baseline_score: staged.baseline_score,
            candidate_score: staged.candidate_score,
            assessment: staged.assessment.clone(),
            activated: true,
            artifact: staged.artifact.clone(),
            supersedes: Some(staged.record_id.clone()),
            reinstated: None,
        };

        match self.history.append(draft) {
            Ok(stored) => {
                self.notify(&stored);
                self.transition(ControllerState::Idle)?;
                Ok(stored)
            }
            Err(e) => {
                self.baselines.compare_and_swap(&staged.strategy, new_version, displaced)?;
                Err(e)
            }
        }
    }

    /// Unconditional pointer move for operator actions; retries once if the
    /// version changed between read and swap. Returns the new version and
    /// what it replaced.
    fn swap(&self, strategy: &str, active: Option<ActiveBaseline>) -> Result<(u64, Option<ActiveBaseline>)> {
        let snapshot = self.baselines.get(strategy)?;
        match self.baselines.compare_and_swap(strategy, snapshot.version, active.clone()) {
            Ok(version) => Ok((version, snapshot.active)),
            Err(LabError::StaleBaseline { .. }) => {
                let snapshot = self.baselines.get(strategy)?;
                let version = self.baselines.compare_and_swap(strategy, snapshot.version, active)?;
                Ok((version, snapshot.active))
            }
            Err(e) => Err(e),
        }
    }

    /// Record a rejection or staged promotion and return to idle
    fn finish(&mut self, draft: RecordDraft) -> Result<ImprovementRecord> {
        let terminal = match draft.decision {
            Decision::Promoted => ControllerState::Promoted,
            Decision::Rejected => ControllerState::Rejected,
            Decision::RolledBack => ControllerState::RolledBack,
        };
        self.transition(terminal)?;
        let stored = self.history.append(draft)?;
        self.notify(&stored);
        self.transition(ControllerState::Idle)?;
        Ok(stored)
    }

    fn notify(&self, record: &ImprovementRecord) {
        let outcome = CycleOutcome {
            strategy: record.strategy.clone(),
            proposal_id: record.proposal.id.clone(),
            record_id: record.record_id.clone(),
            decision: record.decision,
            score_delta: record.score_delta(),
            reason: record.reason.clone(),
        };
        if let Err(e) = self.notifier.notify(&outcome) {
            log::warn!("Failed to deliver outcome of {}: {}", record.record_id, e);
        }
    }

    fn transition(&mut self, to: ControllerState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(LabError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        log::debug!("Controller {} -> {}", self.state, to);
        self.state = to;
        Ok(())
    }

    fn resolve(&self, kind: StrategyKind, active: Option<&ActiveBaseline>) -> ParameterSet {
        match active {
            Some(active) => active.parameters.clone(),
            None => self.strategies.parameters_for(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_is_inclusive() {
        let eps = 1e-9;
        assert!(clears_margin(1.05, 1.0, 0.05 - eps));
        assert!(clears_margin(1.0 + 0.05 + eps, 1.0, 0.05));
        assert!(!clears_margin(1.0 + 0.05 - eps, 1.0, 0.05));
        assert!(clears_margin(0.5, 0.5, 0.0));
    }

    #[test]
    fn test_state_machine() {
        use ControllerState::*;
        assert!(Idle.can_transition(ProposalGenerated));
        assert!(ProposalGenerated.can_transition(Rejected));
        assert!(Validating.can_transition(Promoted));
        assert!(Promoted.can_transition(RolledBack));
        assert!(!ProposalGenerated.can_transition(Promoted));
        assert!(!Rejected.can_transition(Promoted));
        assert!(!Idle.can_transition(Rejected));
    }
}
