use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reclaimable file categories, declared in categorisation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    RecycleBin,
    Prefetch,
    Logs,
    Cache,
    Temporary,
    DownloadsOld,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::RecycleBin,
        Category::Prefetch,
        Category::Logs,
        Category::Cache,
        Category::Temporary,
        Category::DownloadsOld,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Cache => "Cache",
            Category::Temporary => "Temporary",
            Category::Logs => "Logs",
            Category::Prefetch => "Prefetch",
            Category::RecycleBin => "Recycle Bin",
            Category::DownloadsOld => "Downloads Old",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub category: Category,
    pub last_modified: DateTime<Utc>,
    pub is_safe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: Category,
    pub count: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanIssueKind {
    PermissionDenied,
    NotFound,
    SymlinkLoop,
    Metadata,
    Io,
}

/// A non-fatal problem met while walking: the subtree or file was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanIssue {
    pub path: Option<PathBuf>,
    pub kind: ScanIssueKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub files_scanned: u64,
    pub bytes_scanned: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionProgress {
    pub attempted: usize,
    pub total: usize,
    pub freed_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub root: PathBuf,
    pub total_files: usize,
    pub total_bytes: u64,
    pub categories: Vec<CategorySummary>,
    pub records: Vec<FileRecord>,
    /// Regular files visited, retained or not.
    pub files_scanned: u64,
    pub issues: Vec<ScanIssue>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ScanReport {
    pub(crate) fn build(
        root: PathBuf,
        records: Vec<FileRecord>,
        files_scanned: u64,
        issues: Vec<ScanIssue>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        let mut report = ScanReport {
            root,
            total_files: 0,
            total_bytes: 0,
            categories: Vec::new(),
            records,
            files_scanned,
            issues,
            started_at,
            duration_ms,
        };
        report.recompute_totals();
        report
    }

    fn recompute_totals(&mut self) {
        let mut rollup: BTreeMap<Category, (usize, u64)> = BTreeMap::new();
        let mut total_bytes = 0u64;

        for record in &self.records {
            total_bytes += record.size_bytes;
            let entry = rollup.entry(record.category).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += record.size_bytes;
        }

        self.total_files = self.records.len();
        self.total_bytes = total_bytes;
        self.categories = rollup
            .into_iter()
            .map(|(category, (count, bytes))| CategorySummary {
                category,
                count,
                bytes,
            })
            .collect();
    }

    pub fn category_summary(&self, category: Category) -> Option<&CategorySummary> {
        self.categories.iter().find(|c| c.category == category)
    }

    pub fn files_by_category(&self) -> BTreeMap<Category, Vec<&FileRecord>> {
        let mut grouped: BTreeMap<Category, Vec<&FileRecord>> = BTreeMap::new();
        for record in &self.records {
            grouped.entry(record.category).or_default().push(record);
        }
        grouped
    }

    pub fn total_size_display(&self) -> String {
        ByteSize(self.total_bytes).to_string()
    }

    /// Drops records that were deleted or that the re-check refused, so the
    /// report matches what is still on disk and still deletable.
    pub fn apply_outcomes(&mut self, outcomes: &[DeletionOutcome]) {
        let gone: std::collections::HashSet<&PathBuf> = outcomes
            .iter()
            .filter(|o| {
                o.succeeded || matches!(o.failure_reason, Some(FailureReason::NoLongerSafe { .. }))
            })
            .map(|o| &o.path)
            .collect();
        if gone.is_empty() {
            return;
        }
        self.records.retain(|record| !gone.contains(&record.path));
        self.recompute_totals();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    NoLongerSafe { reason: String },
    NotFound,
    PermissionDenied,
    InUse,
    NotAFile,
    Cancelled,
    Io { details: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoLongerSafe { reason } => write!(f, "no longer safe: {}", reason),
            FailureReason::NotFound => write!(f, "file no longer exists"),
            FailureReason::PermissionDenied => write!(f, "permission denied"),
            FailureReason::InUse => write!(f, "file is in use"),
            FailureReason::NotAFile => write!(f, "path is not a regular file"),
            FailureReason::Cancelled => write!(f, "cancelled before deletion was attempted"),
            FailureReason::Io { details } => write!(f, "I/O error: {}", details),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionOutcome {
    pub path: PathBuf,
    pub succeeded: bool,
    pub failure_reason: Option<FailureReason>,
    /// Size recorded at scan time; counted as freed only on success.
    pub size_bytes: u64,
}

impl DeletionOutcome {
    pub(crate) fn success(record: &FileRecord) -> Self {
        DeletionOutcome {
            path: record.path.clone(),
            succeeded: true,
            failure_reason: None,
            size_bytes: record.size_bytes,
        }
    }

    pub(crate) fn failure(record: &FileRecord, reason: FailureReason) -> Self {
        DeletionOutcome {
            path: record.path.clone(),
            succeeded: false,
            failure_reason: Some(reason),
            size_bytes: record.size_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionSummary {
    pub deleted: usize,
    pub failed: usize,
    pub freed_bytes: u64,
}

impl DeletionSummary {
    pub fn from_outcomes(outcomes: &[DeletionOutcome]) -> Self {
        outcomes
            .iter()
            .fold(DeletionSummary::default(), |mut summary, outcome| {
                if outcome.succeeded {
                    summary.deleted += 1;
                    summary.freed_bytes += outcome.size_bytes;
                } else {
                    summary.failed += 1;
                }
                summary
            })
    }

    pub fn freed_display(&self) -> String {
        ByteSize(self.freed_bytes).to_string()
    }
}
