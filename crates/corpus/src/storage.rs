//! Object storage for mirrored documents.
//!
//! Mirrors live in a single bucket under deterministic names. The backend is
//! any `object_store` implementation: in-memory for tests, the local
//! filesystem for offline runs, or Google Cloud Storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use crisis_core::config::StorageKind;
use futures::TryStreamExt;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, ObjectStore, PutPayload};

use crate::error::{CorpusError, CorpusResult};

pub type DynStore = Arc<dyn ObjectStore>;

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
    pub uri: String,
    pub size_bytes: u64,
}

/// Durable storage for document mirrors, bound to one bucket.
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    fn bucket(&self) -> &str;

    /// URI the index uses to read `object_name`.
    fn uri_for(&self, object_name: &str) -> String;

    /// Store `bytes` under `object_name`, overwriting any previous content.
    async fn put(&self, object_name: &str, bytes: Bytes) -> CorpusResult<String>;

    async fn exists(&self, object_name: &str) -> CorpusResult<bool>;

    /// Objects whose names start with `prefix`.
    async fn list(&self, prefix: Option<&str>) -> CorpusResult<Vec<StoredObject>>;
}

/// `ObjectStorage` over an `object_store` backend.
#[derive(Clone)]
pub struct ObjectStoreStorage {
    store: DynStore,
    kind: StorageKind,
    bucket: String,
    local_base: Option<PathBuf>,
}

impl ObjectStoreStorage {
    /// In-process storage that lives as long as this value.
    pub fn in_memory(bucket: impl Into<String>) -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            kind: StorageKind::Memory,
            bucket: bucket.into(),
            local_base: None,
        }
    }

    /// Filesystem storage rooted at `<root>/<bucket>`.
    pub fn local(root: &Path, bucket: impl Into<String>) -> CorpusResult<Self> {
        let bucket = bucket.into();
        let base = root.join(&bucket);
        std::fs::create_dir_all(&base).map_err(|e| {
            CorpusError::storage("create local bucket", format!("{:?}: {}", base, e))
        })?;
        let base = base.canonicalize().map_err(|e| {
            CorpusError::storage("resolve local bucket", format!("{:?}: {}", base, e))
        })?;

        let store = LocalFileSystem::new_with_prefix(&base)
            .map_err(|e| CorpusError::storage("open local bucket", e))?;

        Ok(Self {
            store: Arc::new(store),
            kind: StorageKind::Local,
            bucket,
            local_base: Some(base),
        })
    }

    /// Google Cloud Storage bucket, credentials taken from the environment.
    pub fn gcs(bucket: impl Into<String>) -> CorpusResult<Self> {
        let bucket = bucket.into();
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(&bucket)
            .build()
            .map_err(|e| {
                CorpusError::Config(format!("Failed to configure GCS bucket {}: {}", bucket, e))
            })?;

        Ok(Self {
            store: Arc::new(store),
            kind: StorageKind::Gcs,
            bucket,
            local_base: None,
        })
    }

    /// Wrap an arbitrary backend.
    pub fn with_backend(store: DynStore, kind: StorageKind, bucket: impl Into<String>) -> Self {
        Self {
            store,
            kind,
            bucket: bucket.into(),
            local_base: None,
        }
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }
}

#[async_trait::async_trait]
impl ObjectStorage for ObjectStoreStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn uri_for(&self, object_name: &str) -> String {
        match (self.kind, &self.local_base) {
            (StorageKind::Gcs, _) => format!("gs://{}/{}", self.bucket, object_name),
            (StorageKind::Local, Some(base)) => {
                format!("file://{}", base.join(object_name).display())
            }
            _ => format!("memory://{}/{}", self.bucket, object_name),
        }
    }

    async fn put(&self, object_name: &str, bytes: Bytes) -> CorpusResult<String> {
        let path = ObjPath::from(object_name);
        let size = bytes.len();
        self.store
            .put(&path, PutPayload::from_bytes(bytes))
            .await
            .map_err(|e| CorpusError::storage("put object", format!("{}: {}", object_name, e)))?;

        let uri = self.uri_for(object_name);
        tracing::debug!("Stored {} bytes at {}", size, uri);
        Ok(uri)
    }

    async fn exists(&self, object_name: &str) -> CorpusResult<bool> {
        let path = ObjPath::from(object_name);
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(CorpusError::storage(
                "check object",
                format!("{}: {}", object_name, e),
            )),
        }
    }

    async fn list(&self, prefix: Option<&str>) -> CorpusResult<Vec<StoredObject>> {
        let prefix_path = prefix.map(ObjPath::from);
        let metas: Vec<object_store::ObjectMeta> = self
            .store
            .list(prefix_path.as_ref())
            .try_collect()
            .await
            .map_err(|e| CorpusError::storage("list objects", e))?;

        Ok(metas
            .into_iter()
            .map(|meta| {
                let name = meta.location.to_string();
                StoredObject {
                    uri: self.uri_for(&name),
                    name,
                    size_bytes: meta.size as u64,
                }
            })
            .collect())
    }
}
