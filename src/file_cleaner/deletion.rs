use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use super::safety::{DenyReason, RuleSnapshot, SafetyClassifier, Verdict};
use super::types::{DeletionOutcome, DeletionProgress, FailureReason, FileRecord};

pub type DeletionProgressFn<'a> = &'a (dyn Fn(DeletionProgress) + Send + Sync);

#[cfg(windows)]
const IN_USE_OS_CODES: &[i32] = &[32, 33]; // sharing / lock violation
#[cfg(unix)]
const IN_USE_OS_CODES: &[i32] = &[16, 26]; // EBUSY, ETXTBSY
#[cfg(not(any(windows, unix)))]
const IN_USE_OS_CODES: &[i32] = &[];

/// Deletes caller-selected records, re-checking each one first.
///
/// One outcome is produced per input record, in input order. Failures are
/// recorded and never stop the batch.
pub struct DeletionExecutor<'a> {
    classifier: &'a SafetyClassifier,
}

impl<'a> DeletionExecutor<'a> {
    pub fn new(classifier: &'a SafetyClassifier) -> Self {
        DeletionExecutor { classifier }
    }

    pub fn delete_files(&self, records: &[FileRecord]) -> Vec<DeletionOutcome> {
        self.delete_files_with_cancel(records, &CancellationToken::new(), None)
    }

    /// Once cancelled, no further deletion starts; the remaining records get
    /// [`FailureReason::Cancelled`].
    pub fn delete_files_with_cancel(
        &self,
        records: &[FileRecord],
        cancel: &CancellationToken,
        progress: Option<DeletionProgressFn<'_>>,
    ) -> Vec<DeletionOutcome> {
        let rules = self.classifier.snapshot();
        let mut outcomes = Vec::with_capacity(records.len());
        let mut tally = DeletionProgress {
            attempted: 0,
            total: records.len(),
            freed_bytes: 0,
        };
        log::info!("Deleting {} selected files", records.len());

        for record in records {
            if cancel.is_cancelled() {
                outcomes.push(DeletionOutcome::failure(record, FailureReason::Cancelled));
                continue;
            }

            let outcome = delete_one(&rules, record);
            match &outcome.failure_reason {
                None => tally.freed_bytes += record.size_bytes,
                Some(reason) => {
                    log::warn!("Could not delete {}: {}", record.path.display(), reason)
                }
            }
            outcomes.push(outcome);

            tally.attempted += 1;
            if let Some(report_progress) = progress {
                report_progress(tally);
            }
        }

        let deleted = outcomes.iter().filter(|o| o.succeeded).count();
        log::info!(
            "Deletion finished: {} deleted, {} failed",
            deleted,
            outcomes.len() - deleted
        );
        outcomes
    }
}

fn delete_one(rules: &RuleSnapshot, record: &FileRecord) -> DeletionOutcome {
    // The scan-time flag is not trusted; the same classification runs again,
    // on the recorded path and on where its parent really points now.
    if let Some(reason) = denial(rules, &record.path) {
        return no_longer_safe(record, reason);
    }
    let target = match resolved_location(&record.path) {
        Ok(target) => target,
        Err(e) => return DeletionOutcome::failure(record, failure_from_io(&e)),
    };
    if target != record.path {
        if let Some(reason) = denial(rules, &target) {
            log::warn!(
                "{} now resolves to {}",
                record.path.display(),
                target.display()
            );
            return no_longer_safe(record, reason);
        }
    }

    match fs::symlink_metadata(&target) {
        Ok(metadata) if metadata.is_dir() => {
            return DeletionOutcome::failure(record, FailureReason::NotAFile)
        }
        Ok(_) => {}
        Err(e) => return DeletionOutcome::failure(record, failure_from_io(&e)),
    }

    match fs::remove_file(&target) {
        Ok(()) => {
            log::debug!("Deleted {}", record.path.display());
            DeletionOutcome::success(record)
        }
        Err(e) => DeletionOutcome::failure(record, failure_from_io(&e)),
    }
}

fn denial(rules: &RuleSnapshot, path: &Path) -> Option<DenyReason> {
    match rules.classify(path) {
        Verdict::Denied(reason) => Some(reason),
        _ => None,
    }
}

fn no_longer_safe(record: &FileRecord, reason: DenyReason) -> DeletionOutcome {
    DeletionOutcome::failure(
        record,
        FailureReason::NoLongerSafe {
            reason: reason.to_string(),
        },
    )
}

/// Real location of `path`: the parent directory with every link resolved,
/// joined with the final name left as is, so a symlinked file is removed as
/// a link rather than through it.
fn resolved_location(path: &Path) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(ErrorKind::InvalidInput, "path has no file name")
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(fs::canonicalize(parent)?.join(name))
}

fn failure_from_io(err: &io::Error) -> FailureReason {
    if err
        .raw_os_error()
        .map(|code| IN_USE_OS_CODES.contains(&code))
        .unwrap_or(false)
    {
        return FailureReason::InUse;
    }
    match err.kind() {
        ErrorKind::NotFound => FailureReason::NotFound,
        ErrorKind::PermissionDenied => FailureReason::PermissionDenied,
        _ => FailureReason::Io {
            details: err.to_string(),
        },
    }
}
