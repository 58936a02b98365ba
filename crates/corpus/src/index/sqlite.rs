//! SQLite-backed corpus registry.
//!
//! Stands in for the managed index during offline runs: it records corpora
//! and their members with the same idempotence rules, without embedding
//! anything.

use crate::corpus_id::CorpusId;
use crate::error::{CorpusError, CorpusResult};
use crate::index::RetrievalIndex;
use crate::types::{
    CorpusFile, CorpusHandle, CorpusSpec, ImportRequest, ImportResult, ImportStatus,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const LOCAL_PROJECT: &str = "local";
const LOCAL_LOCATION: &str = "local";

pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    /// Open (or create) the index database.
    pub fn open(db_path: &Path) -> CorpusResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CorpusError::index("create index directory", format!("{:?}: {}", parent, e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| CorpusError::index("open index", format!("{:?}: {}", db_path, e)))?;

        let index = Self::init(conn)?;
        tracing::debug!("Initialized SQLite index at {:?}", db_path);
        Ok(index)
    }

    /// Index that lives only as long as this value.
    pub fn in_memory() -> CorpusResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| CorpusError::index("open index", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> CorpusResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS corpora (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS corpus_files (
                id TEXT PRIMARY KEY,
                corpus_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                source_uri TEXT NOT NULL,
                description TEXT,
                imported_at TEXT NOT NULL,
                FOREIGN KEY (corpus_id) REFERENCES corpora(id),
                UNIQUE (corpus_id, display_name)
            );

            CREATE INDEX IF NOT EXISTS idx_files_source ON corpus_files(corpus_id, source_uri);
            "#,
        )
        .map_err(|e| CorpusError::index("create tables", e))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> CorpusResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CorpusError::index("lock index", "connection poisoned"))
    }

    fn import_one(
        conn: &Connection,
        corpus: &CorpusHandle,
        request: &ImportRequest,
    ) -> CorpusResult<ImportStatus> {
        let corpus_id = corpus.id.as_str();

        let by_source: Option<String> = conn
            .query_row(
                "SELECT display_name FROM corpus_files WHERE corpus_id = ?1 AND source_uri = ?2",
                params![corpus_id, request.uri],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CorpusError::index("look up file", e))?;

        if by_source.is_some() {
            return Ok(ImportStatus::AlreadyPresent);
        }

        let by_name: Option<String> = conn
            .query_row(
                "SELECT source_uri FROM corpus_files WHERE corpus_id = ?1 AND display_name = ?2",
                params![corpus_id, request.display_name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CorpusError::index("look up file", e))?;

        if let Some(existing) = by_name {
            return Ok(ImportStatus::Conflict { existing });
        }

        let file_id = format!("{}/ragFiles/{}", corpus_id, uuid::Uuid::new_v4().simple());
        conn.execute(
            "INSERT INTO corpus_files (id, corpus_id, display_name, source_uri, description, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                file_id,
                corpus_id,
                request.display_name,
                request.uri,
                request.description,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| CorpusError::index("insert file", e))?;

        Ok(ImportStatus::Imported)
    }
}

fn row_to_handle(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, Option<String>)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn to_handle(
    (id, display_name, description): (String, String, Option<String>),
) -> CorpusResult<CorpusHandle> {
    Ok(CorpusHandle {
        id: CorpusId::try_from(id)?,
        display_name,
        description,
    })
}

#[async_trait::async_trait]
impl RetrievalIndex for SqliteIndex {
    fn backend_name(&self) -> &str {
        "local"
    }

    async fn create_corpus(&self, spec: &CorpusSpec) -> CorpusResult<CorpusHandle> {
        let id = CorpusId::new(
            LOCAL_PROJECT,
            LOCAL_LOCATION,
            &uuid::Uuid::new_v4().simple().to_string(),
        )?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO corpora (id, display_name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                id.as_str(),
                spec.display_name,
                spec.description,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| CorpusError::index("create corpus", e))?;

        tracing::debug!("Created local corpus {}", id);
        Ok(CorpusHandle {
            id,
            display_name: spec.display_name.clone(),
            description: Some(spec.description.clone()),
        })
    }

    async fn get_corpus(&self, id: &CorpusId) -> CorpusResult<Option<CorpusHandle>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, display_name, description FROM corpora WHERE id = ?1",
                params![id.as_str()],
                row_to_handle,
            )
            .optional()
            .map_err(|e| CorpusError::index("get corpus", e))?;

        row.map(to_handle).transpose()
    }

    async fn list_corpora(&self) -> CorpusResult<Vec<CorpusHandle>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, display_name, description FROM corpora ORDER BY created_at")
            .map_err(|e| CorpusError::index("list corpora", e))?;

        let rows = stmt
            .query_map([], row_to_handle)
            .map_err(|e| CorpusError::index("list corpora", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| CorpusError::index("list corpora", e))?;

        rows.into_iter().map(to_handle).collect()
    }

    async fn list_files(&self, corpus: &CorpusHandle) -> CorpusResult<Vec<CorpusFile>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, display_name, source_uri FROM corpus_files
                 WHERE corpus_id = ?1 ORDER BY imported_at, display_name",
            )
            .map_err(|e| CorpusError::index("list files", e))?;

        let files = stmt
            .query_map(params![corpus.id.as_str()], |row| {
                Ok(CorpusFile {
                    name: row.get(0)?,
                    display_name: row.get(1)?,
                    source_uri: Some(row.get(2)?),
                })
            })
            .map_err(|e| CorpusError::index("list files", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| CorpusError::index("list files", e))?;

        Ok(files)
    }

    async fn import_files(
        &self,
        corpus: &CorpusHandle,
        files: &[ImportRequest],
    ) -> CorpusResult<Vec<ImportResult>> {
        let conn = self.lock()?;

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM corpora WHERE id = ?1)",
                params![corpus.id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| CorpusError::index("import files", e))?;

        if !exists {
            return Err(CorpusError::Rejected {
                step: "import files",
                detail: format!("corpus {} does not exist", corpus.id),
            });
        }

        files
            .iter()
            .map(|request| {
                Ok(ImportResult {
                    uri: request.uri.clone(),
                    status: Self::import_one(&conn, corpus, request)?,
                })
            })
            .collect()
    }
}
