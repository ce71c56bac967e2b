use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::errors::{ReclaimError, Result};
use crate::file_cleaner::{
    DeletionOutcome, DeletionProgress, FileRecord, Reclaimer, ScanProgress, ScanReport,
};

pub type OperationId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Canceled,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Scan,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpState {
    pub id: OperationId,
    pub kind: OperationKind,
    pub root: Option<PathBuf>,
    pub started_at_ms: u128,
    pub stage: String,
    pub progress: f32,
    pub eta_ms: Option<u32>,
    pub details: Option<String>,
    pub cancellable: bool,
    pub status: OperationStatus,
}

#[derive(Debug)]
pub struct OpHandle {
    pub token: CancellationToken,
    pub _started_at: Instant,
}

/// Tracks the scans and deletions a caller has in flight.
///
/// The engine does not serialize work against overlapping roots itself; this
/// registry refuses a second scan whose root contains, or is contained by,
/// the root of an active one.
#[derive(Clone)]
pub struct OperationRegistry {
    inner: Arc<DashMap<OperationId, (OpState, Arc<OpHandle>)>>,
    // Held across the overlap check and the insert.
    admission: Arc<Mutex<()>>,
    // Global concurrency guards
    pub scan_sem: Arc<Semaphore>,
    pub delete_sem: Arc<Semaphore>,
}

impl OperationRegistry {
    pub fn new(scan_permits: usize, delete_permits: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            admission: Arc::new(Mutex::new(())),
            scan_sem: Arc::new(Semaphore::new(scan_permits.max(1))),
            delete_sem: Arc::new(Semaphore::new(delete_permits.max(1))),
        }
    }

    pub fn register(
        &self,
        kind: OperationKind,
        root: Option<&Path>,
    ) -> Result<(OperationId, CancellationToken)> {
        let _admission = self.admission.lock();

        if let (OperationKind::Scan, Some(root)) = (kind, root) {
            let busy = self.inner.iter().any(|entry| {
                let state = &entry.value().0;
                state.kind == OperationKind::Scan
                    && state
                        .root
                        .as_deref()
                        .map(|active| roots_overlap(active, root))
                        .unwrap_or(false)
            });
            if busy {
                log::info!("Refusing overlapping scan of {}", root.display());
                return Err(ReclaimError::RootBusy {
                    root: root.to_path_buf(),
                });
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        let state = OpState {
            id: id.clone(),
            kind,
            root: root.map(Path::to_path_buf),
            started_at_ms: now_ms(),
            stage: "pending".into(),
            progress: 0.0,
            eta_ms: None,
            details: None,
            cancellable: true,
            status: OperationStatus::Pending,
        };
        let handle = Arc::new(OpHandle {
            token: token.clone(),
            _started_at: Instant::now(),
        });
        self.inner.insert(id.clone(), (state, handle));
        Ok((id, token))
    }

    pub fn update(&self, id: &str, mut f: impl FnMut(&mut OpState)) {
        if let Some(mut entry) = self.inner.get_mut(id) {
            f(&mut entry.0);
        }
    }

    pub fn get(&self, id: &str) -> Option<OpState> {
        self.inner.get(id).map(|e| e.0.clone())
    }

    pub fn active(&self) -> Vec<OpState> {
        self.inner.iter().map(|e| e.value().0.clone()).collect()
    }

    pub fn cancel(&self, id: &str) -> bool {
        if let Some(entry) = self.inner.get(id) {
            entry.1.token.cancel();
            true
        } else {
            false
        }
    }

    pub fn finish_success(&self, id: &str) {
        self.update(id, |s| {
            s.status = OperationStatus::Completed;
            s.progress = 100.0;
            s.stage = "complete".into();
        });
        // Finished operations are dropped so their root becomes free again.
        let _ = self.inner.remove(id);
    }

    pub fn finish_canceled(&self, id: &str) {
        self.update(id, |s| {
            s.status = OperationStatus::Canceled;
        });
        let _ = self.inner.remove(id);
    }

    pub fn finish_failed(&self, id: &str, msg: &str) {
        log::warn!("Operation {} failed: {}", id, msg);
        self.update(id, |s| {
            s.status = OperationStatus::Failed;
            s.details = Some(msg.to_string());
        });
        let _ = self.inner.remove(id);
    }

    /// Runs a scan on the blocking pool. Progress, when requested, is
    /// forwarded over `progress` and mirrored into the operation state.
    pub fn spawn_scan(
        &self,
        reclaimer: Arc<Reclaimer>,
        root: PathBuf,
        progress: Option<mpsc::UnboundedSender<ScanProgress>>,
    ) -> Result<OperationTask<ScanReport>> {
        let root = std::path::absolute(&root).unwrap_or(root);
        let (id, token) = self.register(OperationKind::Scan, Some(&root))?;
        let registry = self.clone();
        let op_id = id.clone();

        let handle = tokio::spawn(async move {
            let _permit = registry.scan_sem.clone().acquire_owned().await;
            registry.update(&op_id, |s| {
                s.status = OperationStatus::Running;
                s.stage = "scanning".into();
            });

            let reporter = registry.clone();
            let report_id = op_id.clone();
            let blocking_token = token.clone();
            let result = tokio::task::spawn_blocking(move || {
                let on_progress = move |p: ScanProgress| {
                    reporter.update(&report_id, |s| {
                        s.details = Some(format!(
                            "{} files, {}",
                            p.files_scanned,
                            bytesize::ByteSize(p.bytes_scanned)
                        ));
                    });
                    if let Some(tx) = &progress {
                        let _ = tx.send(p);
                    }
                };
                reclaimer.scan_with_cancel(&root, &blocking_token, Some(&on_progress))
            })
            .await
            .map_err(ReclaimError::from)
            .and_then(|inner| inner);

            match &result {
                Ok(_) => registry.finish_success(&op_id),
                Err(ReclaimError::Cancelled) => registry.finish_canceled(&op_id),
                Err(e) => registry.finish_failed(&op_id, &e.to_string()),
            }
            result
        });

        Ok(OperationTask { id, handle })
    }

    /// Runs a deletion batch on the blocking pool. Cancellation stops further
    /// deletions; the task still resolves with one outcome per record.
    pub fn spawn_delete(
        &self,
        reclaimer: Arc<Reclaimer>,
        records: Vec<FileRecord>,
        progress: Option<mpsc::UnboundedSender<DeletionProgress>>,
    ) -> Result<OperationTask<Vec<DeletionOutcome>>> {
        let (id, token) = self.register(OperationKind::Delete, None)?;
        let registry = self.clone();
        let op_id = id.clone();

        let handle = tokio::spawn(async move {
            let _permit = registry.delete_sem.clone().acquire_owned().await;
            registry.update(&op_id, |s| {
                s.status = OperationStatus::Running;
                s.stage = "deleting".into();
            });

            let reporter = registry.clone();
            let report_id = op_id.clone();
            let blocking_token = token.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let tracker = Mutex::new(RateTracker::default());
                let on_progress = move |p: DeletionProgress| {
                    let rate = tracker.lock().sample(&p);
                    reporter.update(&report_id, |s| {
                        s.progress = if p.total == 0 {
                            100.0
                        } else {
                            p.attempted as f32 * 100.0 / p.total as f32
                        };
                        if let Some(rate) = rate {
                            s.eta_ms = rate.eta_ms;
                            s.details = Some(rate.describe());
                        }
                    });
                    if let Some(tx) = &progress {
                        let _ = tx.send(p);
                    }
                };
                reclaimer.delete_files_with_cancel(&records, &blocking_token, Some(&on_progress))
            })
            .await;

            match joined {
                Ok(outcomes) => {
                    if token.is_cancelled() {
                        registry.finish_canceled(&op_id);
                    } else {
                        registry.finish_success(&op_id);
                    }
                    Ok(outcomes)
                }
                Err(e) => {
                    let err = ReclaimError::from(e);
                    registry.finish_failed(&op_id, &err.to_string());
                    Err(err)
                }
            }
        });

        Ok(OperationTask { id, handle })
    }
}

/// A spawned operation: its registry id and the task producing its result.
pub struct OperationTask<T> {
    pub id: OperationId,
    handle: JoinHandle<Result<T>>,
}

impl<T> OperationTask<T> {
    pub async fn join(self) -> Result<T> {
        self.handle.await?
    }
}

fn roots_overlap(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

fn now_ms() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Deletion rate measured between two progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeletionRate {
    pub files_per_s: f32,
    pub mb_per_s: f32,
    pub eta_ms: Option<u32>,
}

impl DeletionRate {
    pub fn describe(&self) -> String {
        format!("{:.1} files/s, {:.2} MB/s", self.files_per_s, self.mb_per_s)
    }
}

/// Turns cumulative deletion counters into a [`DeletionRate`]. The first
/// sample only sets the baseline.
#[derive(Debug, Default)]
pub struct RateTracker {
    last: Option<(Instant, usize, u64)>,
}

impl RateTracker {
    pub fn sample(&mut self, progress: &DeletionProgress) -> Option<DeletionRate> {
        let now = Instant::now();
        let previous = self
            .last
            .replace((now, progress.attempted, progress.freed_bytes))?;
        let (at, attempted, freed) = previous;

        let secs = now.duration_since(at).as_secs_f32().max(0.001);
        let files_per_s = progress.attempted.saturating_sub(attempted) as f32 / secs;
        let mb_per_s = progress.freed_bytes.saturating_sub(freed) as f32 / 1_048_576.0 / secs;
        let eta_ms = (files_per_s > 0.0).then(|| {
            let remaining = progress.total.saturating_sub(progress.attempted) as f32;
            (remaining / files_per_s * 1000.0) as u32
        });
        Some(DeletionRate {
            files_per_s,
            mb_per_s,
            eta_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_scan_roots_are_refused() {
        let registry = OperationRegistry::new(1, 1);
        let (id, _token) = registry
            .register(OperationKind::Scan, Some(Path::new("/data/projects")))
            .unwrap();

        let nested = registry.register(OperationKind::Scan, Some(Path::new("/data/projects/app")));
        assert!(matches!(nested, Err(ReclaimError::RootBusy { .. })));
        let parent = registry.register(OperationKind::Scan, Some(Path::new("/data")));
        assert!(matches!(parent, Err(ReclaimError::RootBusy { .. })));

        // Sibling names sharing a prefix do not overlap.
        assert!(registry
            .register(OperationKind::Scan, Some(Path::new("/data/projects-old")))
            .is_ok());
        // Deletions are never refused for a root.
        assert!(registry.register(OperationKind::Delete, None).is_ok());

        registry.finish_success(&id);
        assert!(registry.get(&id).is_none());
        assert!(registry
            .register(OperationKind::Scan, Some(Path::new("/data/projects/app")))
            .is_ok());
    }

    #[test]
    fn cancel_by_id_trips_the_token() {
        let registry = OperationRegistry::new(1, 1);
        let (id, token) = registry.register(OperationKind::Delete, None).unwrap();
        assert!(!token.is_cancelled());
        assert!(registry.cancel(&id));
        assert!(token.is_cancelled());
        assert!(!registry.cancel("unknown"));
    }

    fn progress(attempted: usize, freed_bytes: u64) -> DeletionProgress {
        DeletionProgress {
            attempted,
            total: 10,
            freed_bytes,
        }
    }

    #[test]
    fn deletion_rate_needs_a_baseline() {
        let mut tracker = RateTracker::default();
        assert!(tracker.sample(&progress(0, 0)).is_none());
        std::thread::sleep(std::time::Duration::from_millis(5));

        let rate = tracker.sample(&progress(5, 2 * 1_048_576)).unwrap();
        assert!(rate.files_per_s > 0.0);
        assert!(rate.mb_per_s > 0.0);
        assert!(rate.eta_ms.is_some());
        assert!(rate.describe().contains("files/s"));
        assert!(rate.describe().ends_with("MB/s"));
    }

    #[test]
    fn stalled_deletion_has_no_eta() {
        let mut tracker = RateTracker::default();
        tracker.sample(&progress(3, 100));
        let rate = tracker.sample(&progress(3, 100)).unwrap();
        assert_eq!(rate.files_per_s, 0.0);
        assert_eq!(rate.eta_ms, None);
        assert_eq!(rate.describe(), "0.0 files/s, 0.00 MB/s");
    }
}
