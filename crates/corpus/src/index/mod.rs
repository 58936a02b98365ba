//! Retrieval index abstraction.
//!
//! Defines a trait for the managed index that groups ingested documents into
//! corpora. Embedding, chunking and retrieval happen behind it.

pub mod sqlite;
pub mod vertex;

use crate::corpus_id::CorpusId;
use crate::error::CorpusResult;
use crate::types::{CorpusFile, CorpusHandle, CorpusSpec, ImportRequest, ImportResult};

pub use sqlite::SqliteIndex;
pub use vertex::{VertexIndex, VertexIndexConfig};

/// Trait for retrieval index backends.
///
/// Implementations must:
/// - Report an unknown corpus as `Ok(None)` from `get_corpus`
/// - Report unreachable services as `CorpusError::PlatformUnavailable`
/// - Make `import_files` idempotent: an object already imported under the
///   same display name is `AlreadyPresent`, one whose display name is bound to
///   another source is `Conflict`
#[async_trait::async_trait]
pub trait RetrievalIndex: Send + Sync {
    /// Backend name for logs (e.g. "local", "vertex").
    fn backend_name(&self) -> &str;

    async fn create_corpus(&self, spec: &CorpusSpec) -> CorpusResult<CorpusHandle>;

    async fn get_corpus(&self, id: &CorpusId) -> CorpusResult<Option<CorpusHandle>>;

    async fn list_corpora(&self) -> CorpusResult<Vec<CorpusHandle>>;

    async fn list_files(&self, corpus: &CorpusHandle) -> CorpusResult<Vec<CorpusFile>>;

    /// Register objects with the corpus, one result per request in order.
    ///
    /// `display_name` and `description` are advisory. Backends that name
    /// imported files after the storage object (Vertex AI) ignore them and
    /// check conflicts against the object name instead.
    async fn import_files(
        &self,
        corpus: &CorpusHandle,
        files: &[ImportRequest],
    ) -> CorpusResult<Vec<ImportResult>>;
}
