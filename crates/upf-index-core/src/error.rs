//! Error types for the UPF index pipeline.
//!
//! Hard errors abort the whole run: a partially built index is worse than a
//! failed build. Recoverable situations (unclassified members, single-source
//! identity, missing sidecars) are collected as warnings instead and never
//! pass through this type.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the indexer.
#[derive(Debug, Error)]
pub enum IndexError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Archive errors
    #[error("Integrity mismatch for {path}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Archive '{archive}' contains zero UPF files")]
    NoDataFiles { archive: String },

    // Identity errors
    #[error(
        "Cannot determine element for '{path_in_archive}' in archive '{archive}': \
         neither file content nor filename yielded a valid symbol"
    )]
    IdentityUnresolvable {
        archive: String,
        path_in_archive: String,
    },

    #[error(
        "Element mismatch for '{path_in_archive}' in archive '{archive}': \
         file content says '{from_content}', filename says '{from_filename}'"
    )]
    IdentityConflict {
        archive: String,
        path_in_archive: String,
        from_content: String,
        from_filename: String,
    },

    // Content errors
    #[error("Whitespace-only content (empty canonical text): {context}")]
    EmptyCanonicalText { context: String },

    // Post-accumulation validation
    #[error("Index validation failed with {} error(s):\n{}", failures.len(), failures.join("\n"))]
    Validation { failures: Vec<String> },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for indexer operations.
pub type Result<T> = std::result::Result<T, IndexError>;

impl From<std::io::Error> for IndexError {
    fn from(err: std::io::Error) -> Self {
        IndexError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl IndexError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        IndexError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// True for post-accumulation validation failures, false for hard
    /// pipeline errors. The CLI maps the two classes to distinct exit codes.
    pub fn is_validation(&self) -> bool {
        matches!(self, IndexError::Validation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexError::NoDataFiles {
            archive: "GIPAW_DavideCeresoli.zip".into(),
        };
        assert_eq!(
            err.to_string(),
            "Archive 'GIPAW_DavideCeresoli.zip' contains zero UPF files"
        );
    }

    #[test]
    fn test_conflict_names_both_candidates() {
        let err = IndexError::IdentityConflict {
            archive: "a.zip".into(),
            path_in_archive: "B.upf".into(),
            from_content: "Be".into(),
            from_filename: "B".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'Be'"));
        assert!(msg.contains("'B'"));
    }

    #[test]
    fn test_validation_classification() {
        assert!(IndexError::Validation { failures: vec![] }.is_validation());
        assert!(!IndexError::FileNotFound(PathBuf::from("/x")).is_validation());
    }
}
