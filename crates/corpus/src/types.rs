//! Corpus synchronization type definitions.

use crate::corpus_id::CorpusId;
use crate::error::FailureKind;
use serde::{Deserialize, Serialize};

/// A source document to ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Source location (http, https or file URI)
    #[serde(alias = "url")]
    pub uri: String,

    /// Display name inside the corpus
    #[serde(default, alias = "filename", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DocumentRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            display_name: None,
            description: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A document copy held in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorEntry {
    /// Source the copy was taken from
    pub source_uri: String,

    /// Deterministic object name within the bucket
    pub object_name: String,

    /// Storage URI handed to the index (e.g. gs://bucket/object)
    pub uri: String,

    /// Display name used when registering with the corpus
    pub display_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Uploaded size (absent when an existing object was reused)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,

    /// SHA-256 of the uploaded content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    /// Whether an existing object was reused instead of uploading
    pub reused: bool,
}

/// Parameters used when a corpus has to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusSpec {
    pub display_name: String,
    pub description: String,
}

/// A managed retrieval corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusHandle {
    pub id: CorpusId,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A member of a corpus as reported by the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusFile {
    /// Index-assigned resource name
    pub name: String,
    pub display_name: String,
    /// Storage URI the member was imported from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

/// One object to register with a corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub uri: String,
    pub display_name: String,
    pub description: Option<String>,
}

impl From<&MirrorEntry> for ImportRequest {
    fn from(entry: &MirrorEntry) -> Self {
        Self {
            uri: entry.uri.clone(),
            display_name: entry.display_name.clone(),
            description: entry.description.clone(),
        }
    }
}

/// Per-file status reported by an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStatus {
    Imported,
    AlreadyPresent,
    /// Display name already bound to another source
    Conflict { existing: String },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub uri: String,
    pub status: ImportStatus,
}

/// Outcome of one document in a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Newly added to the corpus this run
    Ingested,
    /// Already a member of the corpus
    AlreadyPresent,
    /// Repeats an earlier entry of the same list
    Duplicate,
    Failed { kind: FailureKind, message: String },
    /// Not started because the run stopped early
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(flatten)]
    pub status: DocumentStatus,
}

/// Result of one synchronization pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub corpus_id: CorpusId,

    /// Whether the corpus was created by this run
    pub corpus_created: bool,

    pub outcomes: Vec<DocumentOutcome>,

    /// Fatal error that stopped the document loop
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted: Option<String>,

    /// Whether the run stopped because of cancellation or its deadline
    pub cancelled: bool,

    pub duration_secs: f64,
}

impl SyncReport {
    fn count(&self, pred: impl Fn(&DocumentStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn ingested_count(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Ingested))
    }

    pub fn already_present_count(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::AlreadyPresent))
    }

    pub fn duplicate_count(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Duplicate))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Failed { .. }))
    }

    pub fn not_attempted_count(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::NotAttempted))
    }

    /// Documents that are members of the corpus after this run.
    pub fn succeeded_count(&self) -> usize {
        self.ingested_count() + self.already_present_count()
    }

    pub fn failed_uris(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, DocumentStatus::Failed { .. }))
            .map(|o| o.uri.as_str())
            .collect()
    }

    /// Every document is in the corpus and the run finished.
    pub fn is_complete(&self) -> bool {
        self.halted.is_none()
            && !self.cancelled
            && self.failed_count() == 0
            && self.not_attempted_count() == 0
    }
}
