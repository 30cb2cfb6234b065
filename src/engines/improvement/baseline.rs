use super::history::{Decision, ImprovementHistory};
use crate::error::{LabError, Result};
use crate::types::ParameterSet;
use std::collections::HashMap;
use std::sync::RwLock;

/// Parameters currently in force for a strategy
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveBaseline {
    /// Ledger record that established it
    pub record_id: String,
    pub parameters: ParameterSet,
    pub score: Option<f64>,
}

/// Versioned view of one strategy's active pointer.
///
/// `active == None` means the strategy runs on its configured defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineSnapshot {
    pub version: u64,
    pub active: Option<ActiveBaseline>,
}

/// Active-baseline pointers, one per strategy, replaced only by
/// compare-and-swap on the version that was read.
#[derive(Debug, Default)]
pub struct BaselineRegistry {
    entries: RwLock<HashMap<String, BaselineSnapshot>>,
}

impl BaselineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the pointers from the ledger's active records
    pub fn from_history(history: &ImprovementHistory) -> Self {
        let mut entries = HashMap::new();
        for strategy in history.summary().into_keys() {
            let changes = history
                .records_for(&strategy)
                .filter(|r| r.activated || r.decision == Decision::RolledBack)
                .count() as u64;
            let active = history.active_record(&strategy).map(|r| ActiveBaseline {
                record_id: r.record_id.clone(),
                parameters: r.parameters.clone(),
                score: r.candidate_score,
            });
            entries.insert(strategy, BaselineSnapshot { version: changes, active });
        }
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn get(&self, strategy: &str) -> Result<BaselineSnapshot> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LabError::Validation("Baseline registry lock poisoned".to_string()))?;
        Ok(entries.get(strategy).cloned().unwrap_or(BaselineSnapshot {
            version: 0,
            active: None,
        }))
    }

    /// Install `active` if the pointer is still at `expected`; returns the new version
    pub fn compare_and_swap(&self, strategy: &str, expected: u64, active: Option<ActiveBaseline>) -> Result<u64> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| LabError::Validation("Baseline registry lock poisoned".to_string()))?;

        let current = entries.get(strategy).map(|s| s.version).unwrap_or(0);
        if current != expected {
            return Err(LabError::StaleBaseline {
                strategy: strategy.to_string(),
                expected,
                found: current,
            });
        }

        let version = current + 1;
        entries.insert(strategy.to_string(), BaselineSnapshot { version, active });
        Ok(version)
    }
}
