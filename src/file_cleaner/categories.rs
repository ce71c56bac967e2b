use chrono::{DateTime, Duration as ChronoDuration, Utc};
use regex::RegexSet;

use super::rules::{normalize_extension, CategoryRule};
use super::safety::{extension_of, lexical_segments, PathContext};
use super::types::Category;
use crate::errors::{ReclaimError, Result};

#[derive(Debug)]
struct CompiledCategory {
    category: Category,
    directories: Vec<Vec<String>>,
    extensions: Vec<String>,
    name_patterns: Option<RegexSet>,
    age_gated: bool,
}

impl CompiledCategory {
    fn compile(rule: &CategoryRule) -> Result<Self> {
        let name_patterns = if rule.name_patterns.is_empty() {
            None
        } else {
            Some(
                RegexSet::new(&rule.name_patterns).map_err(|e| ReclaimError::InvalidRules {
                    context: "category name pattern",
                    details: format!("{}: {}", rule.category, e),
                })?,
            )
        };

        Ok(CompiledCategory {
            category: rule.category,
            directories: rule
                .directories
                .iter()
                .map(|dir| lexical_segments(dir))
                .filter(|segments| !segments.is_empty())
                .collect(),
            extensions: rule
                .extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect(),
            name_patterns,
            age_gated: rule.age_gated,
        })
    }

    fn matches_signal(&self, candidate: &Candidate<'_>) -> bool {
        self.directories
            .iter()
            .any(|sequence| PathContext::contains_sequence(candidate.directories, sequence))
            || candidate
                .extension
                .as_deref()
                .map(|ext| self.extensions.iter().any(|e| e == ext))
                .unwrap_or(false)
            || self
                .name_patterns
                .as_ref()
                .map(|set| set.is_match(candidate.file_name))
                .unwrap_or(false)
    }
}

/// What categorisation looks at for one file.
pub(crate) struct Candidate<'a> {
    /// Lowercase directory segments from the scan root's own name down to
    /// the file's parent.
    pub(crate) directories: &'a [String],
    pub(crate) file_name: &'a str,
    pub(crate) extension: Option<String>,
    pub(crate) last_modified: DateTime<Utc>,
}

impl<'a> Candidate<'a> {
    pub(crate) fn new(
        segments: &'a [String],
        last_modified: DateTime<Utc>,
    ) -> Option<Candidate<'a>> {
        let (file_name, directories) = segments.split_last()?;
        Some(Candidate {
            directories,
            file_name,
            extension: extension_of(file_name),
            last_modified,
        })
    }
}

/// Assigns the first matching category in priority order.
#[derive(Debug)]
pub(crate) struct CategoryMatcher {
    categories: Vec<CompiledCategory>,
}

impl CategoryMatcher {
    pub(crate) fn new(rules: &[CategoryRule]) -> Result<Self> {
        let mut categories = rules
            .iter()
            .map(CompiledCategory::compile)
            .collect::<Result<Vec<_>>>()?;
        categories.sort_by_key(|c| c.category);

        Ok(CategoryMatcher { categories })
    }

    /// `downloads_age` gates the age-gated category (Downloads Old).
    pub(crate) fn categorize(
        &self,
        candidate: &Candidate<'_>,
        now: DateTime<Utc>,
        downloads_age: ChronoDuration,
    ) -> Option<Category> {
        self.categories
            .iter()
            .find(|compiled| {
                compiled.matches_signal(candidate)
                    && (!compiled.age_gated
                        || now.signed_duration_since(candidate.last_modified) >= downloads_age)
            })
            .map(|compiled| compiled.category)
    }
}
