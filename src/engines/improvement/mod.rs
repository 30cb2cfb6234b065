//! Closed improvement loop: proposals, validation, promotion and rollback.

pub mod assessment;
pub mod baseline;
pub mod collaborators;
pub mod controller;
pub mod history;
pub mod proposal;
pub mod proposer;

pub use assessment::{DrawdownRisk, ImprovementLevel, MetricChange, ProposalAssessment};
pub use baseline::{ActiveBaseline, BaselineRegistry, BaselineSnapshot};
pub use collaborators::{BranchNameVcs, CycleOutcome, LogNotifier, Notifier, VersionControl};
pub use controller::{clears_margin, CandidateEvaluator, ControllerState, CycleReport, ImprovementController};
pub use history::{Decision, ImprovementHistory, ImprovementRecord, RecordDraft, StrategySummary};
pub use proposal::{fingerprint, ImprovementProposal, ProposalKind};
pub use proposer::{PerturbationProposer, ProposalContext, ProposalGenerator, RuleBasedProposer, RuleThresholds, Weakness};
