use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::types::Category;
use crate::errors::{ReclaimError, Result};

const EMBEDDED_RULES: &str = include_str!("../../rules/reclaim_rules.json");

/// On-disk shape of the rule book.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RuleBook {
    pub(crate) protection: ProtectionRules,
    pub(crate) categories: Vec<CategoryRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ProtectionRules {
    pub(crate) protected_directories: Vec<String>,
    pub(crate) protected_extensions: Vec<String>,
    pub(crate) protected_names: Vec<String>,
    pub(crate) temporary_signals: SignalRules,
    #[serde(default)]
    pub(crate) known_reclaim_locations: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SignalRules {
    #[serde(default)]
    pub(crate) extensions: Vec<String>,
    #[serde(default)]
    pub(crate) name_fragments: Vec<String>,
    /// Directory names; `a/b` means the contiguous segments `a`, `b`.
    #[serde(default)]
    pub(crate) directories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CategoryRule {
    pub(crate) category: Category,
    #[serde(default)]
    pub(crate) directories: Vec<String>,
    #[serde(default)]
    pub(crate) extensions: Vec<String>,
    #[serde(default)]
    pub(crate) name_patterns: Vec<String>,
    /// Only files older than the configured downloads threshold match.
    #[serde(default)]
    pub(crate) age_gated: bool,
}

impl RuleBook {
    pub(crate) fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED_RULES, "embedded rule book")
    }

    pub(crate) fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ReclaimError::MissingConfig {
                    path: path.to_path_buf(),
                }
            } else {
                ReclaimError::io(path, e)
            }
        })?;
        Self::parse(&raw, "rule book override")
    }

    pub(crate) fn parse(raw: &str, context: &'static str) -> Result<Self> {
        let mut book: RuleBook =
            serde_json::from_str(raw).map_err(|e| ReclaimError::InvalidRules {
                context,
                details: e.to_string(),
            })?;
        // Priority comes from the category, not from file order.
        book.categories.sort_by_key(|rule| rule.category);
        Ok(book)
    }
}

pub(crate) fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}
