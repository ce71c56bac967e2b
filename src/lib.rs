//! Finds reclaimable files (caches, temporaries, logs, prefetch data, recycle
//! bin contents and stale downloads) and deletes a caller-selected subset,
//! re-checking every path against the same safety classifier first.

pub mod config;
pub mod errors;
pub mod file_cleaner;
pub mod ops;

pub use config::EngineConfig;
pub use errors::{ReclaimError, Result, RootRejection};
pub use file_cleaner::{
    available_roots, Category, CategorySummary, DeletionExecutor, DeletionOutcome,
    DeletionProgress, DeletionSummary, DenyReason, FailureReason, FileRecord, Reclaimer,
    RuleSnapshot, SafetyClassifier, ScanEngine, ScanIssue, ScanIssueKind, ScanProgress,
    ScanReport, ScanRoot, Verdict,
};
pub use ops::{OperationKind, OperationRegistry, OperationStatus, OperationTask};
