//! Backend factory.
//!
//! Builds the document source, object storage and retrieval index selected by
//! the application configuration.

use std::sync::Arc;
use std::time::Duration;

use crisis_core::config::{IndexKind, StorageKind};
use crisis_core::AppConfig;

use crate::error::{CorpusError, CorpusResult};
use crate::fetch::{DocumentSource, HttpFetcher};
use crate::index::{RetrievalIndex, SqliteIndex, VertexIndex, VertexIndexConfig};
use crate::storage::{ObjectStorage, ObjectStoreStorage};

/// Create the object storage configured under `corpus.storage`.
///
/// The memory backend is process-local, so mirrors never outlive the run.
pub fn build_storage(config: &AppConfig) -> CorpusResult<Arc<dyn ObjectStorage>> {
    let settings = &config.corpus.storage;
    let storage = match settings.kind {
        StorageKind::Memory => ObjectStoreStorage::in_memory(&settings.bucket),
        StorageKind::Local => {
            ObjectStoreStorage::local(&config.resolve(&settings.local_root), &settings.bucket)?
        }
        StorageKind::Gcs => ObjectStoreStorage::gcs(&settings.bucket)?,
    };

    tracing::debug!(
        "Using {:?} object storage, bucket '{}'",
        settings.kind,
        settings.bucket
    );
    Ok(Arc::new(storage))
}

/// Create the retrieval index configured under `corpus.index`.
///
/// The vertex backend needs an OAuth access token in the variable named by
/// `accessTokenEnv`, read from the process environment or the `.env` file.
pub fn build_index(config: &AppConfig) -> CorpusResult<Arc<dyn RetrievalIndex>> {
    let settings = &config.corpus.index;
    match settings.kind {
        IndexKind::Local => {
            let index = SqliteIndex::open(&config.resolve(&settings.local_path))?;
            Ok(Arc::new(index))
        }
        IndexKind::Vertex => {
            let project = required(settings.project.as_deref(), "GOOGLE_CLOUD_PROJECT")?;
            let location = required(settings.location.as_deref(), "GOOGLE_CLOUD_LOCATION")?;
            let access_token = config.var(&settings.access_token_env).ok_or_else(|| {
                CorpusError::Config(format!(
                    "Vertex index requires an access token in {}",
                    settings.access_token_env
                ))
            })?;

            let index = VertexIndex::new(VertexIndexConfig {
                project,
                location,
                endpoint: settings.endpoint.clone(),
                access_token,
                embedding_model: settings.embedding_model.clone(),
                poll_interval: Duration::from_millis(settings.poll_interval_ms),
                max_polls: settings.max_polls,
            })?;
            Ok(Arc::new(index))
        }
    }
}

pub fn build_source() -> CorpusResult<Arc<dyn DocumentSource>> {
    Ok(Arc::new(HttpFetcher::new()?))
}

fn required(value: Option<&str>, name: &str) -> CorpusResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(CorpusError::Config(format!(
            "{} must be set for the vertex index",
            name
        ))),
    }
}
