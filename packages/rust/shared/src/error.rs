//! Error types for Curricula.
//!
//! Library crates use [`CurriculaError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Curricula operations.
#[derive(Debug, thiserror::Error)]
pub enum CurriculaError {
    /// Configuration loading or validation error. Fatal at startup.
    #[error("config error: {message}")]
    Config { message: String },

    /// Graph store error outside of a cluster transaction (open, query, migration).
    #[error("storage error: {0}")]
    Storage(String),

    /// A per-cluster write transaction failed and was rolled back.
    #[error("transaction for cluster '{cluster}' rolled back: {message}")]
    Transaction { cluster: String, message: String },

    /// Similarity judge failure (network, timeout, unparseable response).
    #[error("judge error: {0}")]
    Judge(String),

    /// Object-store listing or fetch error.
    #[error("object store error: {0}")]
    ObjectStore(String),

    /// A course could not be reconciled (missing or corrupt manifest).
    #[error("reconciliation error for course '{course_id}': {message}")]
    Reconciliation { course_id: String, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input file, invalid identifiers, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CurriculaError>;

impl CurriculaError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a transaction error for the named cluster.
    pub fn transaction(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transaction {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create a reconciliation error for the given course.
    pub fn reconciliation(course_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Reconciliation {
            course_id: course_id.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CurriculaError::config("missing judge endpoint");
        assert_eq!(err.to_string(), "config error: missing judge endpoint");

        let err = CurriculaError::transaction("Emergency Stop", "write conflict");
        assert_eq!(
            err.to_string(),
            "transaction for cluster 'Emergency Stop' rolled back: write conflict"
        );

        let err = CurriculaError::reconciliation("course-1", "manifest not found");
        assert!(err.to_string().contains("course-1"));
        assert!(err.to_string().contains("manifest not found"));
    }
}
