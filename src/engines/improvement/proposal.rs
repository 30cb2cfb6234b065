use crate::types::{relative_difference, ParameterSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    ParameterAdjustment,
    RiskManagement,
    StrategyCombination,
}

impl fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposalKind::ParameterAdjustment => f.write_str("parameter_adjustment"),
            ProposalKind::RiskManagement => f.write_str("risk_management"),
            ProposalKind::StrategyCombination => f.write_str("strategy_combination"),
        }
    }
}

/// A candidate change to one strategy's parameters.
///
/// `changes` only holds entries that actually differ from `base`, so two
/// proposals making the same change share a fingerprint regardless of how
/// they were phrased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementProposal {
    pub id: String,
    pub strategy: String,
    pub kind: ProposalKind,
    pub description: String,
    pub base: ParameterSet,
    pub changes: ParameterSet,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    /// Record id of the proposal this one refines, if any
    pub parent: Option<String>,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    strategy: &'a str,
    changes: &'a ParameterSet,
}

impl ImprovementProposal {
    pub fn new(
        strategy: &str,
        kind: ProposalKind,
        description: impl Into<String>,
        base: ParameterSet,
        changes: ParameterSet,
        parent: Option<String>,
    ) -> Self {
        let changes = base.merged(&changes).diff(&base);
        let fingerprint = fingerprint(strategy, &changes);
        let created_at = Utc::now();
        let id = format!("{}-{}", &fingerprint[..12], created_at.timestamp_millis());

        Self {
            id,
            strategy: strategy.to_string(),
            kind,
            description: description.into(),
            base,
            changes,
            fingerprint,
            created_at,
            parent,
        }
    }

    /// Full parameter set the candidate is evaluated with
    pub fn candidate_parameters(&self) -> ParameterSet {
        self.base.merged(&self.changes)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Same fingerprint, or the same keys changed to values within
    /// `tolerance` (relative) of each other. Non-numeric values must match.
    pub fn is_near_duplicate(&self, other: &ImprovementProposal, tolerance: f64) -> bool {
        if self.strategy != other.strategy {
            return false;
        }
        if self.fingerprint == other.fingerprint {
            return true;
        }
        if self.changes.len() != other.changes.len() {
            return false;
        }

        self.changes.iter().all(|(key, value)| match other.changes.get(key) {
            Some(theirs) if theirs == value => true,
            Some(theirs) => match (value.as_f64(), theirs.as_f64()) {
                (Some(a), Some(b)) => relative_difference(a, b) < tolerance,
                _ => false,
            },
            None => false,
        })
    }
}

/// SHA-256 over the canonical JSON of `{strategy, changes}`
pub fn fingerprint(strategy: &str, changes: &ParameterSet) -> String {
    let input = FingerprintInput { strategy, changes };
    let canonical = serde_json::to_string(&input).unwrap_or_default();
    sha256_hex(&canonical)
}

pub(crate) fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}
