// src/config.rs

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ReclaimError, Result};

pub const RULES_OVERRIDE_ENV: &str = "RECLAIMER_RULES_OVERRIDE";
pub const DOWNLOADS_AGE_ENV: &str = "RECLAIMER_DOWNLOADS_AGE_DAYS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // Categorisation
    pub downloads_age_days: u32, // Default: 90

    // Traversal
    pub max_depth: Option<usize>, // Default: unbounded
    pub progress_interval: u64,   // Default: every 256 regular files

    // Protection
    pub extra_protected_directories: Vec<PathBuf>,
    pub protect_hidden_files: bool, // Default: false

    /// Replaces the embedded rule book when set.
    pub rules_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            downloads_age_days: 90,
            max_depth: None,
            progress_interval: 256,
            extra_protected_directories: Vec::new(),
            protect_hidden_files: false,
            rules_path: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ReclaimError::MissingConfig {
                    path: path.to_path_buf(),
                }
            } else {
                ReclaimError::io(path, e)
            }
        })?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = EngineConfig::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = env::var(RULES_OVERRIDE_ENV) {
            if !path.trim().is_empty() {
                self.rules_path = Some(PathBuf::from(path.trim()));
            }
        }
        if let Ok(days) = env::var(DOWNLOADS_AGE_ENV) {
            self.downloads_age_days =
                days.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ReclaimError::ConfigParse {
                        context: DOWNLOADS_AGE_ENV,
                        details: e.to_string(),
                    })?;
        }
        self.validate()
    }

    pub fn with_downloads_age_days(mut self, days: u32) -> Self {
        self.downloads_age_days = days;
        self
    }

    pub fn with_protected_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra_protected_directories.push(dir.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.progress_interval == 0 {
            return Err(ReclaimError::ConfigParse {
                context: "progress_interval",
                details: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}
