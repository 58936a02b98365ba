//! Document sources.
//!
//! Fetches the content behind a document URI. Remote documents are
//! downloaded over HTTP(S); `file://` URIs are read from disk.

use crate::error::{CorpusError, CorpusResult};
use bytes::Bytes;
use url::Url;

/// Anything that can resolve a document URI to bytes.
#[async_trait::async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch the full content of `uri`.
    ///
    /// Transport failures and non-success statuses are `CorpusError::Download`.
    async fn fetch(&self, uri: &str) -> CorpusResult<Bytes>;
}

/// HTTP(S) and local-file document source.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> CorpusResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("crisis-corpus/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CorpusError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Use a preconfigured client (proxies, timeouts).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_http(&self, uri: &str) -> CorpusResult<Bytes> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| CorpusError::download(uri, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CorpusError::download(uri, format!("HTTP {}", status)));
        }

        response
            .bytes()
            .await
            .map_err(|e| CorpusError::download(uri, format!("reading body: {}", e)))
    }

    async fn fetch_file(&self, uri: &str, url: &Url) -> CorpusResult<Bytes> {
        let path = url
            .to_file_path()
            .map_err(|_| CorpusError::download(uri, "not a local file path"))?;

        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| CorpusError::download(uri, e))?;
        Ok(Bytes::from(content))
    }
}

#[async_trait::async_trait]
impl DocumentSource for HttpFetcher {
    async fn fetch(&self, uri: &str) -> CorpusResult<Bytes> {
        let url = Url::parse(uri.trim()).map_err(|e| CorpusError::download(uri, e))?;

        tracing::info!("Downloading {}", uri);
        let bytes = match url.scheme() {
            "http" | "https" => self.fetch_http(url.as_str()).await?,
            "file" => self.fetch_file(uri, &url).await?,
            other => {
                return Err(CorpusError::download(
                    uri,
                    format!("unsupported scheme '{}'", other),
                ))
            }
        };

        tracing::debug!("Downloaded {} bytes from {}", bytes.len(), uri);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fetch_file_uri() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("shelters.txt");
        std::fs::write(&path, b"Shelter list").unwrap();
        let uri = Url::from_file_path(&path).unwrap().to_string();

        let fetcher = HttpFetcher::new().unwrap();
        let bytes = fetcher.fetch(&uri).await.unwrap();
        assert_eq!(&bytes[..], b"Shelter list");
    }

    #[tokio::test]
    async fn test_missing_file_is_download_error() {
        let temp = TempDir::new().unwrap();
        let uri = Url::from_file_path(temp.path().join("missing.pdf"))
            .unwrap()
            .to_string();

        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch(&uri).await.unwrap_err();
        assert!(matches!(err, CorpusError::Download { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch("ftp://example.org/a.pdf").await.unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }
}
