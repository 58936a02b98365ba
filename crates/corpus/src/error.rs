//! Corpus synchronization errors.

use crisis_core::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// External service a platform failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Storage,
    Index,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Storage => f.write_str("object storage"),
            Service::Index => f.write_str("retrieval index"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CorpusError {
    /// Index or storage service unreachable. Fatal for the run.
    #[error("{service} unavailable during {step}: {detail}")]
    PlatformUnavailable {
        service: Service,
        step: &'static str,
        detail: String,
    },

    /// Source fetch failed. Recorded per document.
    #[error("download of {uri} failed: {reason}")]
    Download { uri: String, reason: String },

    /// Configured corpus identifier is not a corpus resource name.
    #[error(
        "invalid corpus id '{0}': expected projects/<project>/locations/<location>/ragCorpora/<id>"
    )]
    InvalidCorpusId(String),

    /// Index holds the object under an incompatible representation.
    #[error("ingest conflict for {uri}: corpus already holds '{existing}' under that name")]
    IngestConflict { uri: String, existing: String },

    /// The platform answered but refused the request.
    #[error("{step} rejected: {detail}")]
    Rejected { step: &'static str, detail: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Serializable classification of a per-document failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PlatformUnavailable,
    Download,
    InvalidCorpusId,
    IngestConflict,
    Rejected,
    Config,
}

impl CorpusError {
    pub(crate) fn storage(step: &'static str, detail: impl fmt::Display) -> Self {
        CorpusError::PlatformUnavailable {
            service: Service::Storage,
            step,
            detail: detail.to_string(),
        }
    }

    pub(crate) fn index(step: &'static str, detail: impl fmt::Display) -> Self {
        CorpusError::PlatformUnavailable {
            service: Service::Index,
            step,
            detail: detail.to_string(),
        }
    }

    pub(crate) fn download(uri: &str, reason: impl fmt::Display) -> Self {
        CorpusError::Download {
            uri: uri.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Fatal errors abort the run; the rest are recorded per document.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CorpusError::PlatformUnavailable { .. }
                | CorpusError::InvalidCorpusId(_)
                | CorpusError::Config(_)
        )
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            CorpusError::PlatformUnavailable { .. } => FailureKind::PlatformUnavailable,
            CorpusError::Download { .. } => FailureKind::Download,
            CorpusError::InvalidCorpusId(_) => FailureKind::InvalidCorpusId,
            CorpusError::IngestConflict { .. } => FailureKind::IngestConflict,
            CorpusError::Rejected { .. } => FailureKind::Rejected,
            CorpusError::Config(_) => FailureKind::Config,
        }
    }
}

impl From<CorpusError> for AppError {
    fn from(err: CorpusError) -> Self {
        match err {
            CorpusError::Config(msg) => AppError::Config(msg),
            other => AppError::Corpus(other.to_string()),
        }
    }
}

pub type CorpusResult<T> = Result<T, CorpusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(CorpusError::index("create corpus", "connection refused").is_fatal());
        assert!(CorpusError::InvalidCorpusId("abc".to_string()).is_fatal());
        assert!(!CorpusError::download("https://x/a.pdf", "404 Not Found").is_fatal());
        assert!(!CorpusError::IngestConflict {
            uri: "gs://b/a.pdf".to_string(),
            existing: "gs://b/other.pdf".to_string(),
        }
        .is_fatal());
    }

    #[test]
    fn test_fatal_error_names_step() {
        let err = CorpusError::storage("put documents/a.pdf", "timed out");
        assert_eq!(
            err.to_string(),
            "object storage unavailable during put documents/a.pdf: timed out"
        );
    }

    #[test]
    fn test_into_app_error() {
        let err: AppError = CorpusError::Config("missing token".to_string()).into();
        assert!(matches!(err, AppError::Config(_)));

        let err: AppError = CorpusError::InvalidCorpusId("abc".to_string()).into();
        assert!(matches!(err, AppError::Corpus(_)));
    }
}
