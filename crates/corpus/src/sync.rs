//! Corpus synchronization.
//!
//! Brings a retrieval corpus into agreement with a list of source documents:
//! every document is mirrored into object storage and registered with the
//! corpus exactly once, and re-running the same list is a no-op.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::corpus_id::CorpusId;
use crate::error::{CorpusError, CorpusResult};
use crate::fetch::DocumentSource;
use crate::index::RetrievalIndex;
use crate::naming::{hex_digest, mirror_object_name};
use crate::progress::ProgressReporter;
use crate::storage::ObjectStorage;
use crate::types::{
    CorpusHandle, CorpusSpec, DocumentOutcome, DocumentRef, DocumentStatus, ImportRequest,
    ImportStatus, MirrorEntry, SyncReport,
};

/// Shared flag that stops a run before its next document.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Knobs for a synchronizer.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Used when a corpus has to be created
    pub corpus: CorpusSpec,

    /// Object name prefix for mirrors
    pub object_prefix: String,

    /// Reuse existing mirror objects without downloading again
    pub skip_existing_downloads: bool,

    /// With no stored identifier, adopt a corpus carrying the same display name
    pub adopt_existing_by_name: bool,

    /// No new document is started after this instant
    pub deadline: Option<Instant>,

    pub cancel: CancelFlag,
}

impl SyncOptions {
    pub fn new(corpus: CorpusSpec) -> Self {
        Self {
            corpus,
            object_prefix: "documents".to_string(),
            skip_existing_downloads: true,
            adopt_existing_by_name: false,
            deadline: None,
            cancel: CancelFlag::new(),
        }
    }
}

/// Corpus handle plus whether this call created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredCorpus {
    pub handle: CorpusHandle,
    pub created: bool,
}

pub struct CorpusSynchronizer {
    source: Arc<dyn DocumentSource>,
    storage: Arc<dyn ObjectStorage>,
    index: Arc<dyn RetrievalIndex>,
    options: SyncOptions,
    progress: ProgressReporter,
}

impl CorpusSynchronizer {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        storage: Arc<dyn ObjectStorage>,
        index: Arc<dyn RetrievalIndex>,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            storage,
            index,
            options,
            progress: ProgressReporter::noop(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Resolve the configured corpus or create one.
    ///
    /// A blank identifier creates a corpus. A malformed one is
    /// `InvalidCorpusId`. An identifier the index does not know creates a new
    /// corpus rather than failing.
    pub async fn ensure_corpus(&self, existing_id: Option<&str>) -> CorpusResult<EnsuredCorpus> {
        match CorpusId::parse(existing_id)? {
            Some(id) => {
                if let Some(handle) = self.index.get_corpus(&id).await? {
                    tracing::info!("Using existing corpus {}", handle.id);
                    return Ok(EnsuredCorpus {
                        handle,
                        created: false,
                    });
                }
                tracing::warn!("Corpus {} not found in {} index", id, self.index.backend_name());
            }
            None if self.options.adopt_existing_by_name => {
                let name = &self.options.corpus.display_name;
                let found = self
                    .index
                    .list_corpora()
                    .await?
                    .into_iter()
                    .find(|c| &c.display_name == name);
                if let Some(handle) = found {
                    tracing::info!("Found existing corpus {} named '{}'", handle.id, name);
                    return Ok(EnsuredCorpus {
                        handle,
                        created: false,
                    });
                }
            }
            None => {}
        }

        let handle = self.index.create_corpus(&self.options.corpus).await?;
        tracing::info!(
            "Created corpus {} named '{}'",
            handle.id,
            handle.display_name
        );
        Ok(EnsuredCorpus {
            handle,
            created: true,
        })
    }

    /// Copy a document into object storage under its deterministic name.
    pub async fn mirror_document(&self, doc: &DocumentRef) -> CorpusResult<MirrorEntry> {
        let object_name = mirror_object_name(&self.options.object_prefix, &doc.uri);
        // Defaults to the object's file name, which carries the URI digest
        let display_name = doc.display_name.clone().unwrap_or_else(|| {
            object_name
                .rsplit('/')
                .next()
                .unwrap_or(&object_name)
                .to_string()
        });

        let mut entry = MirrorEntry {
            source_uri: doc.uri.clone(),
            uri: self.storage.uri_for(&object_name),
            object_name,
            display_name,
            description: doc.description.clone(),
            size_bytes: None,
            sha256: None,
            reused: false,
        };

        if self.options.skip_existing_downloads && self.storage.exists(&entry.object_name).await? {
            tracing::debug!("Mirror {} already present, skipping download", entry.object_name);
            entry.reused = true;
            return Ok(entry);
        }

        let bytes = self.source.fetch(&doc.uri).await?;
        entry.size_bytes = Some(bytes.len() as u64);
        entry.sha256 = Some(hex_digest(&bytes));
        entry.uri = self.storage.put(&entry.object_name, bytes).await?;

        tracing::info!("Mirrored {} to {}", doc.uri, entry.uri);
        Ok(entry)
    }

    /// Register a mirror with the corpus. Returns whether it was newly added.
    pub async fn ingest(&self, corpus: &CorpusHandle, entry: &MirrorEntry) -> CorpusResult<bool> {
        let request = ImportRequest::from(entry);
        let results = self
            .index
            .import_files(corpus, std::slice::from_ref(&request))
            .await?;

        let status = results
            .into_iter()
            .find(|r| r.uri == request.uri)
            .map(|r| r.status)
            .ok_or_else(|| CorpusError::Rejected {
                step: "import files",
                detail: format!("no status reported for {}", request.uri),
            })?;

        match status {
            ImportStatus::Imported => Ok(true),
            ImportStatus::AlreadyPresent => Ok(false),
            ImportStatus::Conflict { existing } => Err(CorpusError::IngestConflict {
                uri: entry.uri.clone(),
                existing,
            }),
            ImportStatus::Failed(detail) => Err(CorpusError::Rejected {
                step: "import files",
                detail: format!("{}: {}", entry.uri, detail),
            }),
        }
    }

    /// Mirror and ingest every document in order.
    ///
    /// Only corpus setup failures are returned as errors. Per-document
    /// failures are recorded in the report; a platform outage mid-run stops
    /// the loop but still returns the report so the corpus identifier can be
    /// persisted.
    pub async fn sync(
        &self,
        docs: &[DocumentRef],
        existing_id: Option<&str>,
    ) -> CorpusResult<SyncReport> {
        let start = Instant::now();
        let ensured = self.ensure_corpus(existing_id).await?;
        let total = docs.len();
        self.progress
            .corpus(ensured.handle.id.as_str(), ensured.created, total);

        let mut seen = HashSet::new();
        let mut outcomes = Vec::with_capacity(docs.len());
        let mut halted: Option<String> = None;
        let mut cancelled = false;

        for (position, doc) in docs.iter().enumerate() {
            let object_name = mirror_object_name(&self.options.object_prefix, &doc.uri);
            let outcome = |status| DocumentOutcome {
                uri: doc.uri.clone(),
                object_name: Some(object_name.clone()),
                status,
            };

            if halted.is_some() || cancelled {
                outcomes.push(outcome(DocumentStatus::NotAttempted));
                continue;
            }

            if self.should_stop() {
                tracing::warn!(
                    "Stopping before document {} of {}: run cancelled or past its deadline",
                    position + 1,
                    total
                );
                cancelled = true;
                outcomes.push(outcome(DocumentStatus::NotAttempted));
                continue;
            }

            if !seen.insert(doc.uri.trim().to_string()) {
                tracing::debug!("Skipping repeated document {}", doc.uri);
                outcomes.push(outcome(DocumentStatus::Duplicate));
                continue;
            }

            let status = match self.process(&ensured.handle, doc, position + 1, total).await {
                Ok(true) => DocumentStatus::Ingested,
                Ok(false) => DocumentStatus::AlreadyPresent,
                Err(err) => {
                    if err.is_fatal() {
                        tracing::error!("Halting sync at {}: {}", doc.uri, err);
                        halted = Some(err.to_string());
                    } else {
                        tracing::warn!("Failed to sync {}: {}", doc.uri, err);
                    }
                    DocumentStatus::Failed {
                        kind: err.kind(),
                        message: err.to_string(),
                    }
                }
            };
            outcomes.push(outcome(status));
        }

        let report = SyncReport {
            corpus_id: ensured.handle.id,
            corpus_created: ensured.created,
            outcomes,
            halted,
            cancelled,
            duration_secs: start.elapsed().as_secs_f64(),
        };

        tracing::info!(
            "Sync finished for {}: {} ingested, {} already present, {} failed, {} not attempted in {:.2}s",
            report.corpus_id,
            report.ingested_count(),
            report.already_present_count(),
            report.failed_count(),
            report.not_attempted_count(),
            report.duration_secs
        );

        Ok(report)
    }

    async fn process(
        &self,
        corpus: &CorpusHandle,
        doc: &DocumentRef,
        current: usize,
        total: usize,
    ) -> CorpusResult<bool> {
        self.progress.mirror(current, total, &doc.uri);
        let entry = self.mirror_document(doc).await?;

        self.progress.ingest(current, total, &entry.object_name);
        self.ingest(corpus, &entry).await
    }

    fn should_stop(&self) -> bool {
        self.options.cancel.is_cancelled()
            || self
                .options
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }
}
