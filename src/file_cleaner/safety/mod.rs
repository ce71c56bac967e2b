mod context;

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

pub(crate) use context::{extension_of, lexical_segments, starts_with_segments, PathContext};

use super::rules::{normalize_extension, ProtectionRules, RuleBook};
use crate::errors::{ReclaimError, Result};

/// A directory rule kept both as given and as comparable segments.
#[derive(Debug, Clone)]
struct DirectoryRule {
    path: PathBuf,
    segments: Vec<String>,
}

impl DirectoryRule {
    fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let segments = lexical_segments(&path.to_string_lossy());
        Self { path, segments }
    }
}

#[derive(Debug, Clone, Default)]
struct TemporarySignals {
    extensions: HashSet<String>,
    name_fragments: Vec<String>,
    directories: Vec<Vec<String>>,
}

impl TemporarySignals {
    fn matches_file_name(&self, name: &str) -> bool {
        extension_of(name)
            .map(|ext| self.extensions.contains(&ext))
            .unwrap_or(false)
            || self
                .name_fragments
                .iter()
                .any(|fragment| name.contains(fragment.as_str()))
    }

    fn matches_directories(&self, directories: &[String]) -> bool {
        self.directories
            .iter()
            .any(|sequence| PathContext::contains_sequence(directories, sequence))
    }
}

/// The rules every classification is evaluated against.
#[derive(Debug, Clone, Default)]
pub struct ProtectionRuleSet {
    protected_directories: Vec<DirectoryRule>,
    protected_extensions: HashSet<String>,
    protected_names: HashSet<String>,
    temporary_signals: TemporarySignals,
    known_reclaim_locations: Vec<DirectoryRule>,
    protect_hidden_files: bool,
}

impl ProtectionRuleSet {
    pub(crate) fn from_rules(rules: &ProtectionRules) -> Self {
        let mut set = ProtectionRuleSet {
            protected_extensions: rules
                .protected_extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect(),
            protected_names: rules
                .protected_names
                .iter()
                .map(|name| name.trim().to_lowercase())
                .collect(),
            temporary_signals: TemporarySignals {
                extensions: rules
                    .temporary_signals
                    .extensions
                    .iter()
                    .map(|ext| normalize_extension(ext))
                    .collect(),
                name_fragments: rules
                    .temporary_signals
                    .name_fragments
                    .iter()
                    .map(|fragment| fragment.to_lowercase())
                    .collect(),
                directories: rules
                    .temporary_signals
                    .directories
                    .iter()
                    .map(|dir| lexical_segments(dir))
                    .filter(|segments| !segments.is_empty())
                    .collect(),
            },
            known_reclaim_locations: rules
                .known_reclaim_locations
                .iter()
                .map(DirectoryRule::new)
                .collect(),
            ..Default::default()
        };
        for dir in &rules.protected_directories {
            set.insert_directory(PathBuf::from(dir));
        }
        set
    }

    /// Returns false when an equivalent directory is already protected.
    fn insert_directory(&mut self, path: PathBuf) -> bool {
        let rule = DirectoryRule::new(path);
        if self
            .protected_directories
            .iter()
            .any(|existing| existing.segments == rule.segments)
        {
            return false;
        }
        self.protected_directories.push(rule);
        true
    }

    /// Deepest protected directory that contains (or is) the path.
    fn containing_directory(&self, ctx: &PathContext) -> Option<&DirectoryRule> {
        self.protected_directories
            .iter()
            .filter(|dir| ctx.starts_with(&dir.segments))
            .max_by_key(|dir| dir.segments.len())
    }

    fn classify(&self, path: &Path) -> Verdict {
        let ctx = PathContext::new(path);
        let file_name = ctx.file_name().unwrap_or_default();

        let exception = match self.containing_directory(&ctx) {
            Some(dir) => {
                // Only signals below the protected directory count, so a
                // protected tree whose own path says "cache" stays protected.
                let below = &ctx.segments()[dir.segments.len()..];
                let signalled = match below.split_last() {
                    Some((name, parents)) => {
                        self.temporary_signals.matches_file_name(name)
                            || self.temporary_signals.matches_directories(parents)
                    }
                    None => false,
                };
                if !signalled {
                    return Verdict::Denied(DenyReason::ProtectedDirectory {
                        directory: dir.path.clone(),
                    });
                }
                Some(dir.path.clone())
            }
            None => None,
        };

        if let Some(ext) = ctx.extension() {
            if self.protected_extensions.contains(ext) {
                return Verdict::Denied(DenyReason::ProtectedExtension {
                    extension: ext.to_string(),
                });
            }
        }
        if self.protected_names.contains(file_name) {
            return Verdict::Denied(DenyReason::ProtectedName {
                name: file_name.to_string(),
            });
        }
        if self.protect_hidden_files && file_name.starts_with('.') {
            return Verdict::Denied(DenyReason::HiddenFile);
        }

        match exception {
            Some(directory) => Verdict::TemporaryException { directory },
            None => Verdict::Safe,
        }
    }

    fn may_descend(&self, dir: &Path) -> bool {
        let ctx = PathContext::new(dir);
        let Some(protected) = self.containing_directory(&ctx) else {
            return true;
        };
        let below = &ctx.segments()[protected.segments.len()..];
        if self.temporary_signals.matches_directories(below) {
            return true;
        }
        self.known_reclaim_locations
            .iter()
            .any(|location| starts_with_segments(&location.segments, ctx.segments()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenyReason {
    ProtectedDirectory { directory: PathBuf },
    ProtectedExtension { extension: String },
    ProtectedName { name: String },
    HiddenFile,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::ProtectedDirectory { directory } => {
                write!(f, "inside protected directory {}", directory.display())
            }
            DenyReason::ProtectedExtension { extension } => {
                write!(f, "protected extension .{}", extension)
            }
            DenyReason::ProtectedName { name } => write!(f, "protected file name {}", name),
            DenyReason::HiddenFile => write!(f, "hidden file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Safe,
    /// Inside a protected directory but carrying a temporary-file signal.
    TemporaryException { directory: PathBuf },
    Denied(DenyReason),
}

impl Verdict {
    pub fn is_safe(&self) -> bool {
        !matches!(self, Verdict::Denied(_))
    }
}

/// Immutable view of the rules, taken once per scan or deletion pass.
#[derive(Debug, Clone)]
pub struct RuleSnapshot(Arc<ProtectionRuleSet>);

impl RuleSnapshot {
    pub fn classify(&self, path: &Path) -> Verdict {
        self.0.classify(path)
    }

    pub fn is_safe_to_delete(&self, path: &Path) -> bool {
        self.classify(path).is_safe()
    }

    /// Whether the walker may enter `dir`: unprotected, signalled as
    /// temporary, or on the way to a known reclaim location.
    pub fn may_descend(&self, dir: &Path) -> bool {
        self.0.may_descend(dir)
    }

    pub fn protecting_directory(&self, path: &Path) -> Option<PathBuf> {
        self.0
            .containing_directory(&PathContext::new(path))
            .map(|dir| dir.path.clone())
    }
}

/// Answers "is this path safe to delete?" against a shared rule set.
///
/// Writers replace the rule set copy-on-write, so a [`RuleSnapshot`] held by
/// an in-flight operation never observes a later change.
#[derive(Debug)]
pub struct SafetyClassifier {
    rules: RwLock<Arc<ProtectionRuleSet>>,
}

impl SafetyClassifier {
    pub fn new(rules: ProtectionRuleSet) -> Self {
        Self {
            rules: RwLock::new(Arc::new(rules)),
        }
    }

    pub fn with_defaults() -> Result<Self> {
        let book = RuleBook::embedded()?;
        Ok(Self::new(ProtectionRuleSet::from_rules(&book.protection)))
    }

    pub fn snapshot(&self) -> RuleSnapshot {
        let guard = self.rules.read();
        RuleSnapshot(Arc::clone(&*guard))
    }

    pub fn classify(&self, path: &Path) -> Verdict {
        self.snapshot().classify(path)
    }

    pub fn is_safe_to_delete(&self, path: &Path) -> bool {
        self.snapshot().is_safe_to_delete(path)
    }

    /// Protected directories, sorted case-insensitively.
    pub fn get_protected_directories(&self) -> Vec<PathBuf> {
        let rules = self.snapshot();
        let mut dirs: Vec<PathBuf> = rules
            .0
            .protected_directories
            .iter()
            .map(|dir| dir.path.clone())
            .collect();
        dirs.sort_by_key(|path| path.to_string_lossy().to_lowercase());
        dirs
    }

    /// Protects an existing absolute directory. Returns `false` when it was
    /// already protected.
    pub fn add_custom_protected_directory(&self, path: &Path) -> Result<bool> {
        if !path.is_absolute() {
            return Err(ReclaimError::invalid_path(path, "path is not absolute"));
        }
        match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(ReclaimError::invalid_path(path, "not a directory")),
            Err(e) => {
                return Err(ReclaimError::invalid_path(
                    path,
                    format!("cannot be resolved: {}", e),
                ))
            }
        }

        let mut guard = self.rules.write();
        let added = Arc::make_mut(&mut *guard).insert_directory(path.to_path_buf());
        if added {
            log::info!("Protected directory added: {}", path.display());
        } else {
            log::debug!("Protected directory already present: {}", path.display());
        }
        Ok(added)
    }

    pub fn set_protect_hidden_files(&self, enabled: bool) {
        let mut guard = self.rules.write();
        Arc::make_mut(&mut *guard).protect_hidden_files = enabled;
    }
}
