use super::history::Decision;
use super::proposal::ImprovementProposal;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// What gets reported once a proposal reaches a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub strategy: String,
    pub proposal_id: String,
    pub record_id: String,
    pub decision: Decision,
    pub score_delta: Option<f64>,
    pub reason: String,
}

/// Outbound channel for cycle outcomes. Called at most once per outcome;
/// errors are logged by the caller and never retried.
pub trait Notifier: Send + Sync {
    fn notify(&self, outcome: &CycleOutcome) -> Result<()>;
}

/// Writes outcomes to the log
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, outcome: &CycleOutcome) -> Result<()> {
        let delta = outcome
            .score_delta
            .map(|d| format!("{:+.4}", d))
            .unwrap_or_else(|| "n/a".to_string());
        log::info!(
            "[{}] {} {:?} (delta {}): {}",
            outcome.strategy,
            outcome.proposal_id,
            outcome.decision,
            delta,
            outcome.reason
        );
        Ok(())
    }
}

/// Stages a promoted change for external review and returns an opaque reference
pub trait VersionControl: Send + Sync {
    fn request_artifact(&self, proposal: &ImprovementProposal) -> Result<String>;
}

/// Names a review branch without touching any repository
pub struct BranchNameVcs {
    pub prefix: String,
}

impl Default for BranchNameVcs {
    fn default() -> Self {
        Self {
            prefix: "improvement".to_string(),
        }
    }
}

impl VersionControl for BranchNameVcs {
    fn request_artifact(&self, proposal: &ImprovementProposal) -> Result<String> {
        Ok(format!(
            "{}/{}/{}",
            self.prefix,
            proposal.strategy,
            proposal.id
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::improvement::proposal::ProposalKind;
    use crate::types::{ParamValue, ParameterSet};

    #[test]
    fn test_branch_name() {
        let proposal = ImprovementProposal::new(
            "SmaCross",
            ProposalKind::RiskManagement,
            "tighter stop",
            ParameterSet::new(),
            ParameterSet::new().with("stop_loss", ParamValue::Float(0.04)),
            None,
        );
        let artifact = BranchNameVcs::default().request_artifact(&proposal).unwrap();
        assert_eq!(artifact, format!("improvement/SmaCross/{}", proposal.id));
    }
}
