mod categories;
mod deletion;
mod engine;
mod reclaimer;
mod roots;
mod rules;
mod safety;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod tests;

pub use deletion::{DeletionExecutor, DeletionProgressFn};
pub use engine::{ScanEngine, ScanOptions, ScanProgressFn};
pub use reclaimer::Reclaimer;
pub use roots::{available_roots, ScanRoot};
pub use safety::{DenyReason, ProtectionRuleSet, RuleSnapshot, SafetyClassifier, Verdict};
pub use telemetry::TelemetrySnapshot;
pub use types::{
    Category, CategorySummary, DeletionOutcome, DeletionProgress, DeletionSummary, FailureReason,
    FileRecord, ScanIssue, ScanIssueKind, ScanProgress, ScanReport,
};
