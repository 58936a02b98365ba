//! Corpus synchronization for the crisis response agent.
//!
//! Mirrors source documents into object storage and registers them with a
//! managed retrieval corpus. The corpus identifier is persisted in the
//! workspace `.env` file so the agent runtime and later runs reuse it.

pub mod corpus_id;
pub mod error;
pub mod factory;
pub mod fetch;
pub mod index;
pub mod manifest;
pub mod naming;
pub mod progress;
pub mod storage;
pub mod sync;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use corpus_id::CorpusId;
pub use error::{CorpusError, CorpusResult, FailureKind, Service};
pub use manifest::DocumentManifest;
pub use progress::{Phase, ProgressCallback, ProgressEvent, ProgressReporter};
pub use sync::{CancelFlag, CorpusSynchronizer, EnsuredCorpus, SyncOptions};
pub use types::{
    CorpusFile, CorpusHandle, CorpusSpec, DocumentOutcome, DocumentRef, DocumentStatus,
    MirrorEntry, SyncReport,
};

use crisis_core::{AppConfig, AppError, AppResult, EnvFile, KeyValueStore};
use fetch::DocumentSource;
use index::RetrievalIndex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::ObjectStorage;

/// Caller controls for one sync run.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// No new document is started once this much time has passed
    pub timeout: Option<Duration>,
    pub cancel: CancelFlag,
    pub progress: ProgressReporter,
}

/// The three external collaborators of a sync run.
#[derive(Clone)]
pub struct Backends {
    pub source: Arc<dyn DocumentSource>,
    pub storage: Arc<dyn ObjectStorage>,
    pub index: Arc<dyn RetrievalIndex>,
}

impl Backends {
    /// Build the backends selected by the configuration.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            source: factory::build_source()?,
            storage: factory::build_storage(config)?,
            index: factory::build_index(config)?,
        })
    }
}

/// Resolve the documents for a run.
///
/// `manifest` overrides the configured manifest path. Without either, the
/// built-in crisis documents are used. Extra `urls` are appended.
pub fn load_documents(
    config: &AppConfig,
    manifest: Option<&Path>,
    urls: &[String],
) -> AppResult<Vec<DocumentRef>> {
    let path = manifest
        .map(Path::to_path_buf)
        .or_else(|| config.corpus.manifest.clone())
        .map(|p| config.resolve(&p));

    let mut documents = match path {
        Some(path) => DocumentManifest::load(&path)?,
        None if urls.is_empty() => DocumentManifest::builtin(),
        None => DocumentManifest::default(),
    };
    documents.extend_uris(urls.iter().cloned())?;

    tracing::debug!("Resolved {} documents for sync", documents.documents.len());
    Ok(documents.documents)
}

/// Synchronize `documents` with the configured corpus and persist its
/// identifier.
pub async fn run_sync(
    config: &AppConfig,
    documents: &[DocumentRef],
    options: RunOptions,
) -> AppResult<SyncReport> {
    config.validate()?;
    let backends = Backends::from_config(config)?;
    let store = EnvFile::new(config.env_file_path());
    run_sync_with(config, documents, options, backends, &store).await
}

/// `run_sync` over explicit backends and state store.
pub async fn run_sync_with(
    config: &AppConfig,
    documents: &[DocumentRef],
    options: RunOptions,
    backends: Backends,
    store: &dyn KeyValueStore,
) -> AppResult<SyncReport> {
    let settings = &config.corpus;
    let stored_id = store.get(&settings.state_key)?;

    tracing::info!(
        "Syncing {} documents into corpus '{}' ({} index)",
        documents.len(),
        stored_id.as_deref().unwrap_or("<new>"),
        backends.index.backend_name()
    );

    let sync_options = SyncOptions {
        corpus: CorpusSpec {
            display_name: settings.display_name.clone(),
            description: settings.description.clone(),
        },
        object_prefix: settings.storage.prefix.clone(),
        skip_existing_downloads: settings.skip_existing_downloads,
        adopt_existing_by_name: settings.adopt_existing_by_name,
        deadline: options.timeout.map(|t| Instant::now() + t),
        cancel: options.cancel,
    };

    let synchronizer =
        CorpusSynchronizer::new(backends.source, backends.storage, backends.index, sync_options)
            .with_progress(options.progress);

    let report = synchronizer
        .sync(documents, stored_id.as_deref())
        .await?;

    if stored_id.as_deref() != Some(report.corpus_id.as_str()) {
        store.set(&settings.state_key, report.corpus_id.as_str())?;
        tracing::info!(
            "Stored corpus id {} under {}",
            report.corpus_id,
            settings.state_key
        );
    }

    Ok(report)
}

/// Corpus identifier stored in the workspace and whether the index knows it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusStatus {
    pub state_key: String,
    pub env_file: PathBuf,
    pub backend: String,
    pub stored_id: Option<String>,
    /// Present when the stored identifier resolves
    pub corpus: Option<CorpusHandle>,
}

pub async fn status(config: &AppConfig) -> AppResult<CorpusStatus> {
    let index = factory::build_index(config)?;
    let store = EnvFile::new(config.env_file_path());
    status_with(config, index.as_ref(), &store).await
}

async fn status_with(
    config: &AppConfig,
    index: &dyn RetrievalIndex,
    store: &EnvFile,
) -> AppResult<CorpusStatus> {
    let state_key = config.corpus.state_key.clone();
    let stored_id = store.get(&state_key)?;

    let corpus = match CorpusId::parse(stored_id.as_deref())? {
        Some(id) => index.get_corpus(&id).await?,
        None => None,
    };

    Ok(CorpusStatus {
        state_key,
        env_file: store.path().to_path_buf(),
        backend: index.backend_name().to_string(),
        stored_id,
        corpus,
    })
}

/// List the members of the corpus stored in the workspace.
pub async fn list_files(config: &AppConfig) -> AppResult<Vec<CorpusFile>> {
    let index = factory::build_index(config)?;
    let store = EnvFile::new(config.env_file_path());
    list_files_with(config, index.as_ref(), &store).await
}

async fn list_files_with(
    config: &AppConfig,
    index: &dyn RetrievalIndex,
    store: &dyn KeyValueStore,
) -> AppResult<Vec<CorpusFile>> {
    let key = &config.corpus.state_key;
    let id = CorpusId::parse(store.get(key)?.as_deref())?.ok_or_else(|| {
        AppError::State(format!(
            "No corpus id stored under {}; run `crisis corpus sync` first",
            key
        ))
    })?;

    let corpus = index
        .get_corpus(&id)
        .await?
        .ok_or_else(|| AppError::State(format!("Corpus {} not found", id)))?;

    let files = index.list_files(&corpus).await?;
    tracing::debug!("Corpus {} has {} files", corpus.id, files.len());
    Ok(files)
}

/// List the corpora visible to the configured index.
pub async fn list_corpora(config: &AppConfig) -> AppResult<Vec<CorpusHandle>> {
    let index = factory::build_index(config)?;
    Ok(index.list_corpora().await?)
}

/// Remove the stored corpus identifier. Returns the identifier that was removed.
pub fn forget(config: &AppConfig) -> AppResult<Option<String>> {
    let store = EnvFile::new(config.env_file_path());
    forget_with(config, &store)
}

fn forget_with(config: &AppConfig, store: &dyn KeyValueStore) -> AppResult<Option<String>> {
    let key = &config.corpus.state_key;
    let previous = store.get(key)?;
    if store.unset(key)? {
        tracing::info!("Removed {} from the workspace state", key);
    }
    Ok(previous)
}
