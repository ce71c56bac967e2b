use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::categories::{Candidate, CategoryMatcher};
use super::safety::{lexical_segments, RuleSnapshot, SafetyClassifier};
use super::telemetry::duration_ms;
use super::types::{FileRecord, ScanIssue, ScanIssueKind, ScanProgress, ScanReport};
use crate::errors::{ReclaimError, Result, RootRejection};

pub type ScanProgressFn<'a> = &'a (dyn Fn(ScanProgress) + Send + Sync);

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub downloads_age_days: u32,
    pub max_depth: Option<usize>,
    pub progress_interval: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            downloads_age_days: 90,
            max_depth: None,
            progress_interval: 256,
        }
    }
}

/// Walks a root, keeps the files the classifier allows and that fall into a
/// reclaimable category, and rolls them up into a [`ScanReport`].
pub struct ScanEngine<'a> {
    classifier: &'a SafetyClassifier,
    matcher: &'a CategoryMatcher,
    options: ScanOptions,
}

impl<'a> ScanEngine<'a> {
    pub(crate) fn new(
        classifier: &'a SafetyClassifier,
        matcher: &'a CategoryMatcher,
        options: ScanOptions,
    ) -> Self {
        ScanEngine {
            classifier,
            matcher,
            options,
        }
    }

    pub fn options(&self) -> ScanOptions {
        self.options
    }

    pub fn with_downloads_age_days(mut self, days: u32) -> Self {
        self.options.downloads_age_days = days;
        self
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.options.max_depth = depth;
        self
    }

    pub fn scan(&self, root: &Path) -> Result<ScanReport> {
        self.scan_with_cancel(root, &CancellationToken::new(), None)
    }

    /// Cancellable scan. The token is checked between entries; a cancelled
    /// scan discards everything gathered so far.
    pub fn scan_with_cancel(
        &self,
        root: &Path,
        cancel: &CancellationToken,
        progress: Option<ScanProgressFn<'_>>,
    ) -> Result<ScanReport> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let rules = self.classifier.snapshot();
        let root = validate_root(root, &rules)?;
        log::info!("Scanning {}", root.display());

        let downloads_age = ChronoDuration::days(i64::from(self.options.downloads_age_days));
        let interval = self.options.progress_interval.max(1);

        let mut walker = WalkDir::new(&root)
            .follow_links(false)
            .follow_root_links(false)
            .sort_by_file_name();
        if let Some(depth) = self.options.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut records: Vec<FileRecord> = Vec::new();
        let mut issues: Vec<ScanIssue> = Vec::new();
        let mut tally = ScanProgress::default();

        let entries = walker.into_iter().filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let allowed = rules.may_descend(entry.path());
            if !allowed {
                log::debug!("Skipping protected subtree {}", entry.path().display());
            }
            allowed
        });

        for entry in entries {
            if cancel.is_cancelled() {
                log::info!("Scan of {} cancelled", root.display());
                return Err(ReclaimError::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let issue = issue_from_walk_error(&err);
                    log::warn!("Traversal error: {}", issue.message);
                    issues.push(issue);
                    continue;
                }
            };

            // Symlinks report their own type here and are never followed.
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    log::warn!("Cannot read metadata for {}: {}", path.display(), err);
                    issues.push(ScanIssue {
                        path: Some(path.to_path_buf()),
                        kind: ScanIssueKind::Metadata,
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            let size = metadata.len();
            tally.files_scanned += 1;
            tally.bytes_scanned += size;
            if let Some(report_progress) = progress {
                if tally.files_scanned % interval == 0 {
                    report_progress(tally);
                }
            }

            if !rules.is_safe_to_delete(path) {
                log::debug!("Excluded by safety rules: {}", path.display());
                continue;
            }

            let last_modified = match metadata.modified() {
                Ok(modified) => DateTime::<Utc>::from(modified),
                Err(err) => {
                    issues.push(ScanIssue {
                        path: Some(path.to_path_buf()),
                        kind: ScanIssueKind::Metadata,
                        message: format!("modification time unavailable: {}", err),
                    });
                    continue;
                }
            };

            let segments = lexical_segments(&path.to_string_lossy());
            let category = Candidate::new(&segments, last_modified).and_then(|candidate| {
                self.matcher
                    .categorize(&candidate, started_at, downloads_age)
            });

            if let Some(category) = category {
                records.push(FileRecord {
                    path: path.to_path_buf(),
                    size_bytes: size,
                    category,
                    last_modified,
                    is_safe: true,
                });
            }
        }

        if cancel.is_cancelled() {
            log::info!("Scan of {} cancelled", root.display());
            return Err(ReclaimError::Cancelled);
        }
        if let Some(report_progress) = progress {
            report_progress(tally);
        }

        let report = ScanReport::build(
            root,
            records,
            tally.files_scanned,
            issues,
            started_at,
            duration_ms(timer.elapsed()),
        );
        log::info!(
            "Scan of {} finished: {} reclaimable files ({}) out of {} scanned, {} issues",
            report.root.display(),
            report.total_files,
            report.total_size_display(),
            report.files_scanned,
            report.issues.len()
        );
        Ok(report)
    }
}

/// Checks the root and returns its canonical form. Protection is checked on
/// both the given path and the resolved one, so a link into a protected tree
/// is refused like the tree itself.
fn validate_root(root: &Path, rules: &RuleSnapshot) -> Result<PathBuf> {
    let given = std::path::absolute(root).map_err(|e| ReclaimError::io(root, e))?;

    let metadata = fs::metadata(&given).map_err(|e| rejection(&given, &e))?;
    if !metadata.is_dir() {
        return Err(ReclaimError::invalid_root(&given, RootRejection::NotADirectory));
    }
    refuse_protected(&given, rules)?;

    let root = fs::canonicalize(&given).map_err(|e| rejection(&given, &e))?;
    if root != given {
        log::debug!("Scan root {} resolves to {}", given.display(), root.display());
        refuse_protected(&root, rules)?;
    }

    fs::read_dir(&root).map_err(|e| {
        ReclaimError::invalid_root(
            &root,
            RootRejection::Unreadable {
                details: e.to_string(),
            },
        )
    })?;

    Ok(root)
}

fn rejection(root: &Path, err: &std::io::Error) -> ReclaimError {
    let reason = match err.kind() {
        ErrorKind::NotFound => RootRejection::NotFound,
        _ => RootRejection::Unreadable {
            details: err.to_string(),
        },
    };
    ReclaimError::invalid_root(root, reason)
}

fn refuse_protected(root: &Path, rules: &RuleSnapshot) -> Result<()> {
    if rules.may_descend(root) {
        return Ok(());
    }
    let directory = rules
        .protecting_directory(root)
        .unwrap_or_else(|| root.to_path_buf());
    log::info!("Refusing protected scan root {}", root.display());
    Err(ReclaimError::invalid_root(
        root,
        RootRejection::Protected { directory },
    ))
}

fn issue_from_walk_error(err: &walkdir::Error) -> ScanIssue {
    let kind = if err.loop_ancestor().is_some() {
        ScanIssueKind::SymlinkLoop
    } else {
        match err.io_error().map(|io| io.kind()) {
            Some(ErrorKind::PermissionDenied) => ScanIssueKind::PermissionDenied,
            Some(ErrorKind::NotFound) => ScanIssueKind::NotFound,
            _ => ScanIssueKind::Io,
        }
    };
    ScanIssue {
        path: err.path().map(Path::to_path_buf),
        kind,
        message: err.to_string(),
    }
}
