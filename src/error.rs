// ⚠️ Error taxonomy
// Every failure the ledger can report, split so callers can tell
// "your file was rejected" apart from "the import broke halfway".

use crate::entities::EntityKind;
use crate::verify::VerificationIssue;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to open database at {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Backup could not be written; the live schema was not touched.
    #[error("failed to back up {database} to {backup}")]
    Backup {
        database: PathBuf,
        backup: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A schema unit failed; the enclosing transaction was rolled back.
    #[error("migration to schema version {version} failed, database left at version {current}")]
    MigrationApply {
        version: u32,
        current: u32,
        #[source]
        source: rusqlite::Error,
    },

    /// The bundle was rejected before any mutation.
    #[error("import bundle rejected: {}", summarize_issues(.issues))]
    Verification { issues: Vec<VerificationIssue> },

    /// Merging failed; the import transaction was rolled back.
    #[error("import failed while merging {kind} records")]
    Merge {
        kind: EntityKind,
        #[source]
        source: MergeFailure,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i64 },

    #[error("{kind} {id} is still referenced by {dependents} record(s)")]
    InUse {
        kind: EntityKind,
        id: i64,
        dependents: i64,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl LedgerError {
    pub fn is_verification(&self) -> bool {
        matches!(self, LedgerError::Verification { .. })
    }

    pub fn is_merge(&self) -> bool {
        matches!(self, LedgerError::Merge { .. })
    }

    pub(crate) fn verification(issue: VerificationIssue) -> Self {
        LedgerError::Verification {
            issues: vec![issue],
        }
    }
}

/// Why a single merge step gave up.
#[derive(Debug, Error)]
pub enum MergeFailure {
    /// A foreign key carried by the record has no origin -> local mapping.
    #[error("{referenced} origin id {origin_id} has no local mapping")]
    UnresolvedReference { referenced: EntityKind, origin_id: i64 },

    #[error("record is missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    #[error("{0}")]
    Rejected(String),
}

impl From<LedgerError> for MergeFailure {
    /// Errors from the single-entity creation path, seen from inside a merge.
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Store(source) => MergeFailure::Store(source),
            other => MergeFailure::Rejected(other.to_string()),
        }
    }
}

fn summarize_issues(issues: &[VerificationIssue]) -> String {
    match issues {
        [] => "no issues recorded".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_message_counts_extra_issues() {
        let err = LedgerError::Verification {
            issues: vec![
                VerificationIssue::new(EntityKind::Category, Some(1), "colorCode", "not a hex colour"),
                VerificationIssue::new(EntityKind::Account, Some(2), "accountTypeId", "unknown id"),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("colorCode"));
        assert!(message.contains("(and 1 more)"));
        assert!(err.is_verification());
        assert!(!err.is_merge());
    }

    #[test]
    fn test_merge_error_keeps_source() {
        let err = LedgerError::Merge {
            kind: EntityKind::Transaction,
            source: MergeFailure::UnresolvedReference {
                referenced: EntityKind::Account,
                origin_id: 50,
            },
        };

        assert!(err.is_merge());
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("account origin id 50 has no local mapping"));
    }
}
