use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::types::{DeletionOutcome, DeletionSummary, ScanReport};

/// Running totals for one process. Kept in memory only; the engine writes
/// nothing of its own to disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetrySnapshot {
    pub total_scans: u64,
    pub cancelled_scans: u64,
    pub last_scan_ms: u64,
    pub last_scan_files: usize,
    pub total_scan_issues: u64,
    pub total_deleted: u64,
    pub total_delete_failures: u64,
    pub total_freed_bytes: u64,
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

pub struct RunMetricsCollector {
    snapshot: TelemetrySnapshot,
    scan_timer: Option<Instant>,
}

impl RunMetricsCollector {
    pub fn new() -> Self {
        Self {
            snapshot: TelemetrySnapshot::default(),
            scan_timer: None,
        }
    }

    pub fn start_scan(&mut self) {
        self.scan_timer = Some(Instant::now());
    }

    pub fn finish_scan(&mut self, report: Option<&ScanReport>) {
        let elapsed = self
            .scan_timer
            .take()
            .map(|t0| duration_ms(t0.elapsed()));
        match report {
            Some(report) => {
                self.snapshot.total_scans = self.snapshot.total_scans.saturating_add(1);
                self.snapshot.last_scan_ms = elapsed.unwrap_or(report.duration_ms);
                self.snapshot.last_scan_files = report.total_files;
                self.snapshot.total_scan_issues = self
                    .snapshot
                    .total_scan_issues
                    .saturating_add(report.issues.len() as u64);
            }
            None => {
                self.snapshot.cancelled_scans = self.snapshot.cancelled_scans.saturating_add(1);
            }
        }
    }

    pub fn track_deletions(&mut self, outcomes: &[DeletionOutcome]) {
        let summary = DeletionSummary::from_outcomes(outcomes);
        self.snapshot.total_deleted = self
            .snapshot
            .total_deleted
            .saturating_add(summary.deleted as u64);
        self.snapshot.total_delete_failures = self
            .snapshot
            .total_delete_failures
            .saturating_add(summary.failed as u64);
        self.snapshot.total_freed_bytes = self
            .snapshot
            .total_freed_bytes
            .saturating_add(summary.freed_bytes);
    }

    pub fn get_snapshot(&self) -> TelemetrySnapshot {
        self.snapshot.clone()
    }
}

impl Default for RunMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
