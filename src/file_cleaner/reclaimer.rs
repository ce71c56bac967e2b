use std::path::Path;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::categories::CategoryMatcher;
use super::deletion::{DeletionExecutor, DeletionProgressFn};
use super::engine::{ScanEngine, ScanOptions, ScanProgressFn};
use super::rules::RuleBook;
use super::safety::{ProtectionRuleSet, SafetyClassifier};
use super::telemetry::{RunMetricsCollector, TelemetrySnapshot};
use super::types::{DeletionOutcome, FileRecord, ScanReport};
use crate::config::EngineConfig;
use crate::errors::{ReclaimError, Result};

/// Owns the configuration, the shared classifier and the compiled category
/// rules. Scans and deletions borrow from it.
pub struct Reclaimer {
    config: EngineConfig,
    classifier: SafetyClassifier,
    matcher: CategoryMatcher,
    telemetry: Mutex<RunMetricsCollector>,
}

impl Reclaimer {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let book = match &config.rules_path {
            Some(path) => {
                log::info!("Loading rule book override from {}", path.display());
                RuleBook::from_file(path)?
            }
            None => RuleBook::embedded()?,
        };

        let classifier = SafetyClassifier::new(ProtectionRuleSet::from_rules(&book.protection));
        classifier.set_protect_hidden_files(config.protect_hidden_files);
        for dir in &config.extra_protected_directories {
            classifier.add_custom_protected_directory(dir)?;
        }
        let matcher = CategoryMatcher::new(&book.categories)?;

        Ok(Reclaimer {
            config,
            classifier,
            matcher,
            telemetry: Mutex::new(RunMetricsCollector::new()),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &SafetyClassifier {
        &self.classifier
    }

    pub fn scan_engine(&self) -> ScanEngine<'_> {
        ScanEngine::new(
            &self.classifier,
            &self.matcher,
            ScanOptions {
                downloads_age_days: self.config.downloads_age_days,
                max_depth: self.config.max_depth,
                progress_interval: self.config.progress_interval,
            },
        )
    }

    pub fn deletion_executor(&self) -> DeletionExecutor<'_> {
        DeletionExecutor::new(&self.classifier)
    }

    pub fn scan(&self, root: &Path) -> Result<ScanReport> {
        self.scan_with_cancel(root, &CancellationToken::new(), None)
    }

    pub fn scan_with_cancel(
        &self,
        root: &Path,
        cancel: &CancellationToken,
        progress: Option<ScanProgressFn<'_>>,
    ) -> Result<ScanReport> {
        self.telemetry.lock().start_scan();
        let result = self.scan_engine().scan_with_cancel(root, cancel, progress);
        match &result {
            Ok(report) => self.telemetry.lock().finish_scan(Some(report)),
            Err(ReclaimError::Cancelled) => self.telemetry.lock().finish_scan(None),
            Err(_) => {}
        }
        result
    }

    pub fn delete_files(&self, records: &[FileRecord]) -> Vec<DeletionOutcome> {
        self.delete_files_with_cancel(records, &CancellationToken::new(), None)
    }

    pub fn delete_files_with_cancel(
        &self,
        records: &[FileRecord],
        cancel: &CancellationToken,
        progress: Option<DeletionProgressFn<'_>>,
    ) -> Vec<DeletionOutcome> {
        let outcomes = self
            .deletion_executor()
            .delete_files_with_cancel(records, cancel, progress);
        self.telemetry.lock().track_deletions(&outcomes);
        outcomes
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.lock().get_snapshot()
    }
}
