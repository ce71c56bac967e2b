//! Structured error values surfaced to callers of the reclaim engine.
//!
//! Only call-level preconditions become a [`ReclaimError`]. Problems with a
//! single file or subtree are collected into the scan report or the deletion
//! outcome list instead.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReclaimError>;

/// Why a scan root was refused before any traversal happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RootRejection {
    NotFound,
    NotADirectory,
    Protected { directory: PathBuf },
    Unreadable { details: String },
}

impl fmt::Display for RootRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootRejection::NotFound => write!(f, "does not exist"),
            RootRejection::NotADirectory => write!(f, "is not a directory"),
            RootRejection::Protected { directory } => {
                write!(f, "lies inside protected directory {}", directory.display())
            }
            RootRejection::Unreadable { details } => write!(f, "cannot be read: {}", details),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReclaimError {
    #[error("[RCL-1001] invalid scan root {}: {reason}", path.display())]
    InvalidRoot { path: PathBuf, reason: RootRejection },

    #[error("[RCL-1002] invalid protected directory {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    #[error("[RCL-1101] rule book failure in {context}: {details}")]
    InvalidRules {
        context: &'static str,
        details: String,
    },

    #[error("[RCL-1102] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[RCL-1103] missing configuration file: {}", path.display())]
    MissingConfig { path: PathBuf },

    #[error("[RCL-2001] operation cancelled")]
    Cancelled,

    #[error("[RCL-2002] an active scan already covers {}", root.display())]
    RootBusy { root: PathBuf },

    #[error("[RCL-3001] IO failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[RCL-3002] background task failed: {details}")]
    TaskFailed { details: String },
}

impl ReclaimError {
    /// Stable machine-parseable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRoot { .. } => "RCL-1001",
            Self::InvalidPath { .. } => "RCL-1002",
            Self::InvalidRules { .. } => "RCL-1101",
            Self::ConfigParse { .. } => "RCL-1102",
            Self::MissingConfig { .. } => "RCL-1103",
            Self::Cancelled => "RCL-2001",
            Self::RootBusy { .. } => "RCL-2002",
            Self::Io { .. } => "RCL-3001",
            Self::TaskFailed { .. } => "RCL-3002",
        }
    }

    pub fn invalid_root(path: impl AsRef<Path>, reason: RootRejection) -> Self {
        Self::InvalidRoot {
            path: path.as_ref().to_path_buf(),
            reason,
        }
    }

    pub fn invalid_path(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for ReclaimError {
    fn from(value: serde_json::Error) -> Self {
        Self::ConfigParse {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for ReclaimError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::TaskFailed {
            details: value.to_string(),
        }
    }
}
