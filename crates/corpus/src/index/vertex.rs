//! Vertex AI RAG Engine index.
//!
//! Talks to the `ragCorpora` REST resources. Corpus creation and file imports
//! are long-running operations that are polled until done.
//! API: https://cloud.google.com/vertex-ai/generative-ai/docs/model-reference/rag-api

use crate::corpus_id::CorpusId;
use crate::error::{CorpusError, CorpusResult};
use crate::index::RetrievalIndex;
use crate::naming::source_basename;
use crate::types::{
    CorpusFile, CorpusHandle, CorpusSpec, ImportRequest, ImportResult, ImportStatus,
};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const PAGE_SIZE: &str = "100";

/// Connection settings for the Vertex AI index.
#[derive(Debug, Clone)]
pub struct VertexIndexConfig {
    pub project: String,
    pub location: String,
    /// Base URL without the API version, e.g. `https://us-central1-aiplatform.googleapis.com`
    pub endpoint: Option<String>,
    pub access_token: String,
    /// Publisher model path, e.g. `publishers/google/models/text-embedding-004`
    pub embedding_model: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

pub struct VertexIndex {
    config: VertexIndexConfig,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCorpusBody {
    display_name: String,
    description: String,
    vector_db_config: VectorDbConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VectorDbConfig {
    rag_embedding_model_config: EmbeddingModelConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingModelConfig {
    vertex_prediction_endpoint: PredictionEndpoint,
}

#[derive(Debug, Serialize)]
struct PredictionEndpoint {
    endpoint: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportBody {
    import_rag_files_config: ImportConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportConfig {
    gcs_source: GcsSource,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct GcsSource {
    #[serde(default)]
    uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RagCorpus {
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RagFile {
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    gcs_source: Option<GcsSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListCorporaResponse {
    #[serde(default)]
    rag_corpora: Vec<RagCorpus>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFilesResponse {
    #[serde(default)]
    rag_files: Vec<RagFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    response: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportResponse {
    #[serde(default, deserialize_with = "int64_string")]
    imported_rag_files_count: i64,
    #[serde(default, deserialize_with = "int64_string")]
    failed_rag_files_count: i64,
    #[serde(default, deserialize_with = "int64_string")]
    skipped_rag_files_count: i64,
}

/// JSON int64 fields arrive as strings.
fn int64_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

trait Page: DeserializeOwned {
    type Item;
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

impl Page for ListCorporaResponse {
    type Item = RagCorpus;
    fn into_parts(self) -> (Vec<RagCorpus>, Option<String>) {
        (self.rag_corpora, self.next_page_token)
    }
}

impl Page for ListFilesResponse {
    type Item = RagFile;
    fn into_parts(self) -> (Vec<RagFile>, Option<String>) {
        (self.rag_files, self.next_page_token)
    }
}

impl RagCorpus {
    fn into_handle(self) -> CorpusResult<CorpusHandle> {
        Ok(CorpusHandle {
            id: CorpusId::try_from(self.name)?,
            display_name: self.display_name,
            description: self.description.filter(|d| !d.is_empty()),
        })
    }
}

impl RagFile {
    fn source_uri(&self) -> Option<&str> {
        self.gcs_source
            .as_ref()
            .and_then(|source| source.uris.first())
            .map(String::as_str)
    }

    fn into_corpus_file(self) -> CorpusFile {
        let source_uri = self.source_uri().map(str::to_string);
        CorpusFile {
            name: self.name,
            display_name: self.display_name,
            source_uri,
        }
    }
}

/// Statuses that mean the platform cannot serve us right now.
fn is_unavailable(status: StatusCode) -> bool {
    status.is_server_error()
        || matches!(
            status,
            StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN
                | StatusCode::REQUEST_TIMEOUT
                | StatusCode::TOO_MANY_REQUESTS
        )
}

fn classify(step: &'static str, status: StatusCode, body: &str) -> CorpusError {
    let detail = format!("HTTP {}: {}", status, body.trim());
    if is_unavailable(status) {
        CorpusError::index(step, detail)
    } else {
        CorpusError::Rejected { step, detail }
    }
}

impl VertexIndex {
    pub fn new(config: VertexIndexConfig) -> CorpusResult<Self> {
        if config.access_token.trim().is_empty() {
            return Err(CorpusError::Config(
                "Vertex AI access token is empty".to_string(),
            ));
        }

        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com", config.location));
        let base_url = format!("{}/v1", endpoint.trim_end_matches('/'));

        let client = reqwest::Client::builder()
            .user_agent(concat!("crisis-corpus/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CorpusError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    fn parent(&self) -> String {
        format!(
            "projects/{}/locations/{}",
            self.config.project, self.config.location
        )
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource)
    }

    fn create_body(&self, spec: &CorpusSpec) -> CreateCorpusBody {
        CreateCorpusBody {
            display_name: spec.display_name.clone(),
            description: spec.description.clone(),
            vector_db_config: VectorDbConfig {
                rag_embedding_model_config: EmbeddingModelConfig {
                    vertex_prediction_endpoint: PredictionEndpoint {
                        endpoint: format!(
                            "{}/{}",
                            self.parent(),
                            self.config.embedding_model.trim_start_matches('/')
                        ),
                    },
                },
            },
        }
    }

    /// Send a request and return the raw response, mapping transport errors.
    async fn send<B: Serialize + ?Sized>(
        &self,
        step: &'static str,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> CorpusResult<reqwest::Response> {
        tracing::debug!("{} {} ({})", method, url, step);

        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.config.access_token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        request
            .send()
            .await
            .map_err(|e| CorpusError::index(step, e))
    }

    async fn parse<T: DeserializeOwned>(
        step: &'static str,
        response: reqwest::Response,
    ) -> CorpusResult<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify(step, status, &text));
        }

        response
            .json()
            .await
            .map_err(|e| CorpusError::index(step, format!("unreadable response: {}", e)))
    }

    async fn list_all<P: Page>(&self, step: &'static str, url: &str) -> CorpusResult<Vec<P::Item>> {
        let mut items = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page: P = {
                let mut query = vec![("pageSize", PAGE_SIZE)];
                if let Some(token) = token.as_deref() {
                    query.push(("pageToken", token));
                }

                let response = self
                    .send::<()>(step, Method::GET, url, &query, None)
                    .await?;
                Self::parse(step, response).await?
            };
            let (mut batch, next) = page.into_parts();
            items.append(&mut batch);

            match next.filter(|t| !t.is_empty()) {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(items)
    }

    /// Poll a long-running operation until it finishes and return its response.
    async fn wait(&self, step: &'static str, mut op: Operation) -> CorpusResult<serde_json::Value> {
        let mut polls = 0u32;

        while !op.done {
            if polls >= self.config.max_polls {
                return Err(CorpusError::index(
                    step,
                    format!("operation {} still running after {} polls", op.name, polls),
                ));
            }
            polls += 1;

            tokio::time::sleep(self.config.poll_interval).await;
            let url = self.url(&op.name);
            let response = self.send::<()>(step, Method::GET, &url, &[], None).await?;
            op = Self::parse(step, response).await?;
            tracing::debug!("Operation {} poll {}: done={}", op.name, polls, op.done);
        }

        if let Some(error) = op.error {
            return Err(CorpusError::Rejected {
                step,
                detail: format!("operation failed (code {}): {}", error.code, error.message),
            });
        }

        Ok(op.response.unwrap_or(serde_json::Value::Null))
    }

    async fn files_by_uri(&self, corpus: &CorpusHandle) -> CorpusResult<HashMap<String, RagFile>> {
        let url = self.url(&format!("{}/ragFiles", corpus.id));
        let files: Vec<RagFile> = self
            .list_all::<ListFilesResponse>("list files", &url)
            .await?;

        Ok(files
            .into_iter()
            .filter_map(|file| {
                let uri = file.source_uri()?.to_string();
                Some((uri, file))
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl RetrievalIndex for VertexIndex {
    fn backend_name(&self) -> &str {
        "vertex"
    }

    async fn create_corpus(&self, spec: &CorpusSpec) -> CorpusResult<CorpusHandle> {
        tracing::info!("Creating Vertex AI corpus '{}'", spec.display_name);

        let url = self.url(&format!("{}/ragCorpora", self.parent()));
        let body = self.create_body(spec);
        let response = self
            .send("create corpus", Method::POST, &url, &[], Some(&body))
            .await?;
        let op: Operation = Self::parse("create corpus", response).await?;
        let created = self.wait("create corpus", op).await?;

        let corpus: RagCorpus = serde_json::from_value(created).map_err(|e| {
            CorpusError::index("create corpus", format!("unexpected operation response: {}", e))
        })?;
        corpus.into_handle()
    }

    async fn get_corpus(&self, id: &CorpusId) -> CorpusResult<Option<CorpusHandle>> {
        let url = self.url(id.as_str());
        let response = self
            .send::<()>("get corpus", Method::GET, &url, &[], None)
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let corpus: RagCorpus = Self::parse("get corpus", response).await?;
        corpus.into_handle().map(Some)
    }

    async fn list_corpora(&self) -> CorpusResult<Vec<CorpusHandle>> {
        let url = self.url(&format!("{}/ragCorpora", self.parent()));
        self.list_all::<ListCorporaResponse>("list corpora", &url)
            .await?
            .into_iter()
            .map(RagCorpus::into_handle)
            .collect()
    }

    async fn list_files(&self, corpus: &CorpusHandle) -> CorpusResult<Vec<CorpusFile>> {
        let url = self.url(&format!("{}/ragFiles", corpus.id));
        Ok(self
            .list_all::<ListFilesResponse>("list files", &url)
            .await?
            .into_iter()
            .map(RagFile::into_corpus_file)
            .collect())
    }

    async fn import_files(
        &self,
        corpus: &CorpusHandle,
        files: &[ImportRequest],
    ) -> CorpusResult<Vec<ImportResult>> {
        let existing = self.files_by_uri(corpus).await?;

        // GCS imports are named after the object, so clashes are checked on that name.
        let by_name: HashMap<&str, &str> = existing
            .iter()
            .map(|(uri, file)| (file.display_name.as_str(), uri.as_str()))
            .collect();

        let mut statuses: Vec<Option<ImportStatus>> = Vec::with_capacity(files.len());
        let mut pending = Vec::new();

        for request in files {
            let status = if existing.contains_key(&request.uri) {
                Some(ImportStatus::AlreadyPresent)
            } else {
                let name = source_basename(&request.uri);
                by_name.get(name.as_str()).map(|uri| ImportStatus::Conflict {
                    existing: uri.to_string(),
                })
            };

            if status.is_none() && !pending.contains(&request.uri) {
                tracing::debug!(
                    "Importing {} under its object name; display name '{}' is not sent",
                    request.uri,
                    request.display_name
                );
                pending.push(request.uri.clone());
            }
            statuses.push(status);
        }

        if !pending.is_empty() {
            tracing::info!("Importing {} files into {}", pending.len(), corpus.id);

            let url = self.url(&format!("{}/ragFiles:import", corpus.id));
            let body = ImportBody {
                import_rag_files_config: ImportConfig {
                    gcs_source: GcsSource { uris: pending },
                },
            };
            let response = self
                .send("import files", Method::POST, &url, &[], Some(&body))
                .await?;
            let op: Operation = Self::parse("import files", response).await?;
            let result = self.wait("import files", op).await?;

            // Membership is re-checked below, so the counts are only logged
            match serde_json::from_value::<ImportResponse>(result) {
                Ok(counts) => tracing::info!(
                    "Import finished: {} imported, {} skipped, {} failed",
                    counts.imported_rag_files_count,
                    counts.skipped_rag_files_count,
                    counts.failed_rag_files_count
                ),
                Err(e) => tracing::warn!("Import finished with an unreadable response: {}", e),
            }
        }

        let after = if statuses.iter().any(Option::is_none) {
            self.files_by_uri(corpus).await?
        } else {
            HashMap::new()
        };

        Ok(files
            .iter()
            .zip(statuses)
            .map(|(request, status)| {
                let status = status.unwrap_or_else(|| {
                    if after.contains_key(&request.uri) {
                        ImportStatus::Imported
                    } else {
                        ImportStatus::Failed("file not present after import".to_string())
                    }
                });
                ImportResult {
                    uri: request.uri.clone(),
                    status,
                }
            })
            .collect())
    }
}
