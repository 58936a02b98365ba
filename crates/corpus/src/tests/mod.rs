//! Scenario tests for corpus synchronization.
//!
//! These run the synchronizer against in-process fakes: a scripted document
//! source, the in-memory object store and an in-memory SQLite index wrapped
//! so calls can be counted or made to fail.

mod run;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::corpus_id::CorpusId;
use crate::error::{CorpusError, CorpusResult};
use crate::fetch::DocumentSource;
use crate::index::{RetrievalIndex, SqliteIndex};
use crate::storage::ObjectStoreStorage;
use crate::sync::{CorpusSynchronizer, SyncOptions};
use crate::types::{
    CorpusFile, CorpusHandle, CorpusSpec, DocumentRef, ImportRequest, ImportResult,
};
use crate::Backends;

/// Document source answering from a fixed table.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    documents: HashMap<String, Bytes>,
    fetched: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub(crate) fn with(mut self, uri: &str, content: &'static [u8]) -> Self {
        self.documents
            .insert(uri.to_string(), Bytes::from_static(content));
        self
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl DocumentSource for ScriptedSource {
    async fn fetch(&self, uri: &str) -> CorpusResult<Bytes> {
        self.fetched.lock().unwrap().push(uri.to_string());
        self.documents
            .get(uri)
            .cloned()
            .ok_or_else(|| CorpusError::download(uri, "HTTP 404 Not Found"))
    }
}

/// SQLite index that counts calls and can fail imports after a number of
/// successful ones.
pub(crate) struct RecordingIndex {
    inner: SqliteIndex,
    creates: AtomicUsize,
    imports: AtomicUsize,
    fail_after: Option<usize>,
}

impl RecordingIndex {
    pub(crate) fn new() -> Self {
        Self {
            inner: SqliteIndex::in_memory().unwrap(),
            creates: AtomicUsize::new(0),
            imports: AtomicUsize::new(0),
            fail_after: None,
        }
    }

    /// Imports past the first `n` report the index as unreachable.
    pub(crate) fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::new()
        }
    }

    pub(crate) fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RetrievalIndex for RecordingIndex {
    fn backend_name(&self) -> &str {
        "recording"
    }

    async fn create_corpus(&self, spec: &CorpusSpec) -> CorpusResult<CorpusHandle> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_corpus(spec).await
    }

    async fn get_corpus(&self, id: &CorpusId) -> CorpusResult<Option<CorpusHandle>> {
        self.inner.get_corpus(id).await
    }

    async fn list_corpora(&self) -> CorpusResult<Vec<CorpusHandle>> {
        self.inner.list_corpora().await
    }

    async fn list_files(&self, corpus: &CorpusHandle) -> CorpusResult<Vec<CorpusFile>> {
        self.inner.list_files(corpus).await
    }

    async fn import_files(
        &self,
        corpus: &CorpusHandle,
        files: &[ImportRequest],
    ) -> CorpusResult<Vec<ImportResult>> {
        let done = self.imports.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|n| done >= n) {
            return Err(CorpusError::index("import files", "connection reset by peer"));
        }
        self.inner.import_files(corpus, files).await
    }
}

/// Shared fakes for one scenario.
pub(crate) struct Harness {
    pub(crate) source: Arc<ScriptedSource>,
    pub(crate) storage: Arc<ObjectStoreStorage>,
    pub(crate) index: Arc<RecordingIndex>,
}

impl Harness {
    pub(crate) fn new(source: ScriptedSource) -> Self {
        Self::with_index(source, RecordingIndex::new())
    }

    pub(crate) fn with_index(source: ScriptedSource, index: RecordingIndex) -> Self {
        Self {
            source: Arc::new(source),
            storage: Arc::new(ObjectStoreStorage::in_memory("crisis-test")),
            index: Arc::new(index),
        }
    }

    pub(crate) fn synchronizer(&self, options: SyncOptions) -> CorpusSynchronizer {
        CorpusSynchronizer::new(
            self.source.clone(),
            self.storage.clone(),
            self.index.clone(),
            options,
        )
    }

    pub(crate) fn backends(&self) -> Backends {
        Backends {
            source: self.source.clone(),
            storage: self.storage.clone(),
            index: self.index.clone(),
        }
    }
}

pub(crate) fn options() -> SyncOptions {
    SyncOptions::new(CorpusSpec {
        display_name: "Crisis_Response_Corpus".to_string(),
        description: "Corpus for Crisis Response Information Agent".to_string(),
    })
}

pub(crate) fn docs(uris: &[&str]) -> Vec<DocumentRef> {
    uris.iter().map(|uri| DocumentRef::new(*uri)).collect()
}
