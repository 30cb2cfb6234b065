use super::assessment::ProposalAssessment;
use super::proposal::{sha256_hex, ImprovementProposal};
use crate::config::OperatingMode;
use crate::engines::optimisation::AggregateResult;
use crate::error::{LabError, Result};
use crate::types::{float_repr, ParameterSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Promoted,
    Rejected,
    RolledBack,
}

/// One terminal outcome of the improvement loop. Never modified once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementRecord {
    pub sequence: u64,
    pub record_id: String,
    pub timestamp: DateTime<Utc>,
    pub strategy: String,
    pub instrument: String,
    pub proposal: ImprovementProposal,
    /// Full parameter set this record refers to
    pub parameters: ParameterSet,
    pub decision: Decision,
    pub mode: OperatingMode,
    pub reason: String,
    pub result: Option<AggregateResult>,
    #[serde(default, with = "float_repr::option")]
    pub baseline_score: Option<f64>,
    #[serde(default, with = "float_repr::option")]
    pub candidate_score: Option<f64>,
    /// Metric-by-metric comparison with the baseline, when both had healthy windows
    #[serde(default)]
    pub assessment: Option<ProposalAssessment>,
    /// Whether this record became the active baseline
    pub activated: bool,
    /// Opaque reference returned by version control for staged promotions
    pub artifact: Option<String>,
    /// Record replaced (rollback) or adopted (staged promotion) by this one
    pub supersedes: Option<String>,
    /// Record made active again by a rollback; None means strategy defaults
    pub reinstated: Option<String>,
}

impl ImprovementRecord {
    pub fn score_delta(&self) -> Option<f64> {
        match (self.candidate_score, self.baseline_score) {
            (Some(c), Some(b)) => Some(c - b),
            _ => None,
        }
    }
}

/// Fields of a record before the ledger assigns its identity
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub strategy: String,
    pub instrument: String,
    pub proposal: ImprovementProposal,
    pub parameters: ParameterSet,
    pub decision: Decision,
    pub mode: OperatingMode,
    pub reason: String,
    pub result: Option<AggregateResult>,
    pub baseline_score: Option<f64>,
    pub candidate_score: Option<f64>,
    pub assessment: Option<ProposalAssessment>,
    pub activated: bool,
    pub artifact: Option<String>,
    pub supersedes: Option<String>,
    pub reinstated: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategySummary {
    pub total: usize,
    pub promoted: usize,
    pub rejected: usize,
    pub rolled_back: usize,
    pub best_score: Option<f64>,
    pub active_record: Option<String>,
    /// Ids of the ten most recent records, oldest first
    pub recent: Vec<String>,
}

/// Append-only ledger of improvement records.
///
/// Persisted as one line per record, `<sha256 of json>\t<json>`, in append
/// order. Loading verifies every checksum and fails on the first bad line.
pub struct ImprovementHistory {
    path: Option<PathBuf>,
    records: Vec<ImprovementRecord>,
}

impl ImprovementHistory {
    /// Open (or start) the ledger at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            load(&path)?
        } else {
            Vec::new()
        };
        log::debug!("Loaded {} improvement records from {}", records.len(), path.display());
        Ok(Self {
            path: Some(path),
            records,
        })
    }

    /// Ledger that lives only as long as this value
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Vec::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn next_sequence(&self) -> u64 {
        self.records.last().map(|r| r.sequence + 1).unwrap_or(1)
    }

    /// Id the next appended record will get
    pub fn next_record_id(&self) -> String {
        record_id(self.next_sequence())
    }

    /// Store a new record. The file is written before memory is updated, so a
    /// failed write leaves both unchanged.
    pub fn append(&mut self, draft: RecordDraft) -> Result<ImprovementRecord> {
        let sequence = self.next_sequence();
        let record = ImprovementRecord {
            sequence,
            record_id: record_id(sequence),
            timestamp: Utc::now(),
            strategy: draft.strategy,
            instrument: draft.instrument,
            proposal: draft.proposal,
            parameters: draft.parameters,
            decision: draft.decision,
            mode: draft.mode,
            reason: draft.reason,
            result: draft.result,
            baseline_score: draft.baseline_score,
            candidate_score: draft.candidate_score,
            assessment: draft.assessment,
            activated: draft.activated,
            artifact: draft.artifact,
            supersedes: draft.supersedes,
            reinstated: draft.reinstated,
        };

        if let Some(path) = &self.path {
            let json = serde_json::to_string(&record)?;
            let line = format!("{}\t{}\n", sha256_hex(&json), json);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(line.as_bytes())?;
            file.sync_data()?;
        }

        log::info!(
            "Recorded {} for {} ({:?}): {}",
            record.record_id,
            record.strategy,
            record.decision,
            record.reason
        );
        self.records.push(record.clone());
        Ok(record)
    }

    pub fn records(&self) -> &[ImprovementRecord] {
        &self.records
    }

    pub fn get(&self, record_id: &str) -> Option<&ImprovementRecord> {
        self.records.iter().find(|r| r.record_id == record_id)
    }

    pub fn records_for<'a>(&'a self, strategy: &'a str) -> impl Iterator<Item = &'a ImprovementRecord> + 'a {
        self.records.iter().filter(move |r| r.strategy == strategy)
    }

    /// Records of `strategy` with `from <= timestamp < to`
    pub fn in_range<'a>(
        &'a self,
        strategy: &'a str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<&'a ImprovementRecord> {
        self.records_for(strategy)
            .filter(|r| r.timestamp >= from && r.timestamp < to)
            .collect()
    }

    /// Most recent of the last `lookback` records of the proposal's strategy
    /// whose proposal is the same change or a near-duplicate of it
    pub fn find_duplicate(
        &self,
        proposal: &ImprovementProposal,
        lookback: usize,
        tolerance: f64,
    ) -> Option<&ImprovementRecord> {
        self.records
            .iter()
            .rev()
            .filter(|r| r.strategy == proposal.strategy)
            .take(lookback)
            .find(|r| r.proposal.is_near_duplicate(proposal, tolerance))
    }

    /// Record currently in force for `strategy`, or None for its defaults
    pub fn active_record(&self, strategy: &str) -> Option<&ImprovementRecord> {
        self.active_among(strategy, &self.records)
    }

    /// The record that was active just before `record_id` took over
    pub fn rollback_target(&self, record_id: &str) -> Option<&ImprovementRecord> {
        let position = self.records.iter().position(|r| r.record_id == record_id)?;
        let strategy = &self.records[position].strategy;
        self.active_among(strategy, &self.records[..position])
    }

    fn active_among<'a>(&'a self, strategy: &str, records: &'a [ImprovementRecord]) -> Option<&'a ImprovementRecord> {
        for record in records.iter().rev().filter(|r| r.strategy == strategy) {
            match record.decision {
                Decision::Promoted if record.activated => return Some(record),
                Decision::RolledBack => {
                    return record.reinstated.as_deref().and_then(|id| self.get(id));
                }
                _ => {}
            }
        }
        None
    }

    pub fn summary(&self) -> BTreeMap<String, StrategySummary> {
        let mut out: BTreeMap<String, StrategySummary> = BTreeMap::new();
        for record in &self.records {
            let entry = out.entry(record.strategy.clone()).or_default();
            entry.total += 1;
            match record.decision {
                Decision::Promoted => entry.promoted += 1,
                Decision::Rejected => entry.rejected += 1,
                Decision::RolledBack => entry.rolled_back += 1,
            }
            if let Some(score) = record.candidate_score.filter(|s| s.is_finite()) {
                entry.best_score = Some(entry.best_score.map_or(score, |b| b.max(score)));
            }
            entry.recent.push(record.record_id.clone());
            if entry.recent.len() > 10 {
                entry.recent.remove(0);
            }
        }
        for (strategy, entry) in out.iter_mut() {
            entry.active_record = self.active_record(strategy).map(|r| r.record_id.clone());
        }
        out
    }
}

fn record_id(sequence: u64) -> String {
    format!("rec-{:06}", sequence)
}

fn load(path: &Path) -> Result<Vec<ImprovementRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records: Vec<ImprovementRecord> = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let number = i + 1;
        if line.trim().is_empty() {
            continue;
        }

        let (checksum, json) = line.split_once('\t').ok_or_else(|| LabError::HistoryCorrupted {
            line: number,
            reason: "missing checksum separator".to_string(),
        })?;

        let actual = sha256_hex(json);
        if actual != checksum {
            return Err(LabError::ChecksumMismatch {
                line: number,
                expected: checksum.to_string(),
                actual,
            });
        }

        let record: ImprovementRecord = serde_json::from_str(json).map_err(|e| LabError::HistoryCorrupted {
            line: number,
            reason: e.to_string(),
        })?;

        let expected_sequence = records.last().map(|r| r.sequence + 1).unwrap_or(1);
        if record.sequence != expected_sequence {
            return Err(LabError::HistoryCorrupted {
                line: number,
                reason: format!("sequence {} follows {}", record.sequence, expected_sequence - 1),
            });
        }
        records.push(record);
    }

    Ok(records)
}
