//! Configuration management for the crisis corpus tooling.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Defaults
//! - The workspace `.env` file
//! - Config files (.crisis/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with local state stored in `.crisis/`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .crisis/ and .env)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Optional .env path (default: <workspace>/.env)
    pub env_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// Corpus synchronization settings
    pub corpus: CorpusSettings,

    /// Entries read from the `.env` file. They are not exported to the
    /// process environment.
    #[serde(skip)]
    pub dotenv: HashMap<String, String>,
}

/// Settings for the managed retrieval corpus and its mirror.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CorpusSettings {
    /// Display name used when a corpus has to be created
    pub display_name: String,

    /// Description used when a corpus has to be created
    pub description: String,

    /// YAML document manifest; the built-in list is used when unset
    pub manifest: Option<PathBuf>,

    /// Key under which the corpus identifier is persisted in .env
    pub state_key: String,

    /// Reuse a corpus with the same display name when no identifier is stored
    pub adopt_existing_by_name: bool,

    /// Skip downloading documents whose mirror object already exists
    pub skip_existing_downloads: bool,

    pub storage: StorageSettings,

    pub index: IndexSettings,
}

/// Object storage backend selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    Local,
    Gcs,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageSettings {
    pub kind: StorageKind,

    /// Bucket holding mirrored documents
    pub bucket: String,

    /// Object name prefix for mirrored documents
    pub prefix: String,

    /// Root directory for the local backend (relative paths resolve against the workspace)
    pub local_root: PathBuf,
}

/// Retrieval index backend selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// SQLite-backed corpus registry for offline runs
    Local,
    /// Vertex AI RAG Engine
    Vertex,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexSettings {
    pub kind: IndexKind,

    /// Cloud project id
    pub project: Option<String>,

    /// Cloud location (e.g. us-central1)
    pub location: Option<String>,

    /// Override for the REST endpoint (default: https://<location>-aiplatform.googleapis.com)
    pub endpoint: Option<String>,

    /// Environment variable holding an OAuth access token
    pub access_token_env: String,

    /// Publisher embedding model used for new corpora
    pub embedding_model: String,

    /// Path of the local SQLite index (relative paths resolve against the workspace)
    pub local_path: PathBuf,

    /// Delay between long-running operation polls
    pub poll_interval_ms: u64,

    /// Maximum number of long-running operation polls
    pub max_polls: u32,
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self {
            display_name: "Crisis_Response_Corpus".to_string(),
            description: "Corpus for Crisis Response Information Agent".to_string(),
            manifest: None,
            state_key: "RAG_CORPUS".to_string(),
            adopt_existing_by_name: false,
            skip_existing_downloads: true,
            storage: StorageSettings::default(),
            index: IndexSettings::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            kind: StorageKind::Local,
            bucket: "crisis-corpus".to_string(),
            prefix: "documents".to_string(),
            local_root: PathBuf::from(".crisis/objects"),
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            kind: IndexKind::Local,
            project: None,
            location: None,
            endpoint: None,
            access_token_env: "GOOGLE_OAUTH_ACCESS_TOKEN".to_string(),
            embedding_model: "publishers/google/models/text-embedding-004".to_string(),
            local_path: PathBuf::from(".crisis/index.sqlite"),
            poll_interval_ms: 2000,
            max_polls: 150,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    corpus: Option<CorpusSettings>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
    #[serde(rename = "envFile")]
    env_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            env_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            log_json: false,
            corpus: CorpusSettings::default(),
            dotenv: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the workspace, environment variables and defaults.
    ///
    /// Environment variables:
    /// - `CRISIS_WORKSPACE`: Override workspace path
    /// - `CRISIS_CONFIG`: Path to config file
    /// - `GOOGLE_CLOUD_PROJECT`, `GOOGLE_CLOUD_LOCATION`: Vertex AI project and location
    /// - `RAG_CORPUS_DISPLAY_NAME`, `RAG_CORPUS_DESCRIPTION`: Corpus creation parameters
    /// - `CORPUS_BUCKET_NAME`: Bucket for mirrored documents
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use crisis_core::config::AppConfig;
    ///
    /// let config = AppConfig::load(None).expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load(workspace: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) = workspace {
            config.workspace = workspace;
        } else if let Ok(workspace) = std::env::var("CRISIS_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("CRISIS_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        // .env sits below the config file; the process environment above it
        let env_path = config.env_file_path();
        if env_path.exists() {
            config.dotenv = read_dotenv(&env_path)?;
            let dotenv = config.dotenv.clone();
            config.apply_vars(|key| dotenv.get(key).cloned());
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.crisis_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_vars(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
            if let Some(env_file) = ws.env_file {
                result.env_file = Some(PathBuf::from(env_file));
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.log_json = json;
            }
        }

        if let Some(corpus) = config_file.corpus {
            result.corpus = corpus;
        }

        Ok(result)
    }

    /// Apply the recognised variables found through `lookup`.
    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let corpus = &mut self.corpus;

        if let Some(name) = lookup("RAG_CORPUS_DISPLAY_NAME") {
            corpus.display_name = name;
        }
        if let Some(description) = lookup("RAG_CORPUS_DESCRIPTION") {
            corpus.description = description;
        }
        if let Some(bucket) = lookup("CORPUS_BUCKET_NAME") {
            corpus.storage.bucket = bucket;
        }
        if let Some(project) = lookup("GOOGLE_CLOUD_PROJECT") {
            corpus.index.project = Some(project);
        }
        if let Some(location) = lookup("GOOGLE_CLOUD_LOCATION") {
            corpus.index.location = Some(location);
        }
        if let Some(level) = lookup("RUST_LOG") {
            self.log_level = Some(level);
        }
        if lookup("NO_COLOR").is_some() {
            self.no_color = true;
        }
    }

    /// Look up a variable in the process environment, then in `.env`.
    pub fn var(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .or_else(|| self.dotenv.get(key).cloned())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and
    /// config files.
    pub fn with_overrides(
        mut self,
        config_file: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
        log_json: bool,
    ) -> AppResult<Self> {
        if let Some(config_file) = config_file {
            if !config_file.exists() {
                return Err(AppError::Config(format!(
                    "Config file does not exist: {:?}",
                    config_file
                )));
            }
            self = self.merge_yaml(&config_file)?;
            self.config_file = Some(config_file);
            self.apply_vars(|key| std::env::var(key).ok());
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        if log_json {
            self.log_json = true;
        }

        Ok(self)
    }

    /// Get the path to the .crisis directory.
    pub fn crisis_dir(&self) -> PathBuf {
        self.workspace.join(".crisis")
    }

    /// Ensure the .crisis directory exists.
    pub fn ensure_crisis_dir(&self) -> AppResult<()> {
        let crisis_dir = self.crisis_dir();
        if !crisis_dir.exists() {
            std::fs::create_dir_all(&crisis_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .crisis directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Path of the .env file holding persisted state.
    pub fn env_file_path(&self) -> PathBuf {
        match &self.env_file {
            Some(path) => self.resolve(path),
            None => self.workspace.join(".env"),
        }
    }

    /// Resolve a possibly relative path against the workspace.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Validate the corpus backend combination.
    pub fn validate(&self) -> AppResult<()> {
        let corpus = &self.corpus;

        if corpus.display_name.trim().is_empty() {
            return Err(AppError::Config(
                "Corpus display name must not be empty".to_string(),
            ));
        }

        if corpus.state_key.trim().is_empty() {
            return Err(AppError::Config("Corpus state key must not be empty".to_string()));
        }

        if corpus.storage.bucket.trim().is_empty() {
            return Err(AppError::Config(
                "Storage bucket must be set via config or CORPUS_BUCKET_NAME".to_string(),
            ));
        }

        if corpus.index.kind == IndexKind::Vertex {
            if corpus.index.project.as_deref().map_or(true, str::is_empty) {
                return Err(AppError::Config(
                    "GOOGLE_CLOUD_PROJECT must be set for the vertex index".to_string(),
                ));
            }
            if corpus.index.location.as_deref().map_or(true, str::is_empty) {
                return Err(AppError::Config(
                    "GOOGLE_CLOUD_LOCATION must be set for the vertex index".to_string(),
                ));
            }
            if corpus.storage.kind != StorageKind::Gcs {
                return Err(AppError::Config(
                    "The vertex index imports from gs:// objects; set storage kind to gcs"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn read_dotenv(path: &Path) -> AppResult<HashMap<String, String>> {
    let iter = dotenvy::from_path_iter(path)
        .map_err(|e| AppError::Config(format!("Failed to load env file {:?}: {}", path, e)))?;

    iter.map(|item| {
        item.map_err(|e| AppError::Config(format!("Failed to parse env file {:?}: {}", path, e)))
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.corpus.display_name, "Crisis_Response_Corpus");
        assert_eq!(config.corpus.state_key, "RAG_CORPUS");
        assert_eq!(config.corpus.storage.kind, StorageKind::Local);
        assert_eq!(config.corpus.index.kind, IndexKind::Local);
        assert!(!config.verbose);
        assert!(!config.no_color);
    }

    #[test]
    fn test_crisis_dir() {
        let config = AppConfig::default();
        assert!(config.crisis_dir().ends_with(".crisis"));
    }

    #[test]
    fn test_env_file_path_resolves_against_workspace() {
        let mut config = AppConfig {
            workspace: PathBuf::from("/srv/agent"),
            ..AppConfig::default()
        };
        assert_eq!(config.env_file_path(), PathBuf::from("/srv/agent/.env"));

        config.env_file = Some(PathBuf::from("conf/agent.env"));
        assert_eq!(
            config.env_file_path(),
            PathBuf::from("/srv/agent/conf/agent.env")
        );
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default()
            .with_overrides(None, None, true, true, false)
            .unwrap();

        assert!(config.verbose);
        assert!(config.no_color);
        assert_eq!(config.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_with_overrides_missing_config_file() {
        let result = AppConfig::default().with_overrides(
            Some(PathBuf::from("/nonexistent/config.yaml")),
            None,
            false,
            false,
            false,
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_merge_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
logging:
  level: warn
  json: true
corpus:
  displayName: Test_Corpus
  storage:
    kind: gcs
    bucket: crisis-docs
  index:
    kind: vertex
    project: demo
    location: us-central1
"#,
        )
        .unwrap();

        let config = AppConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("warn"));
        assert!(config.log_json);
        assert_eq!(config.corpus.display_name, "Test_Corpus");
        assert_eq!(config.corpus.storage.kind, StorageKind::Gcs);
        assert_eq!(config.corpus.storage.bucket, "crisis-docs");
        assert_eq!(config.corpus.storage.prefix, "documents");
        assert_eq!(config.corpus.index.kind, IndexKind::Vertex);
        assert_eq!(config.corpus.state_key, "RAG_CORPUS");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_layers_dotenv_below_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".env"),
            "RAG_CORPUS_DISPLAY_NAME=From_Dotenv\nCRISIS_TEST_DOTENV_ONLY_KEY=token\n",
        )
        .unwrap();
        std::fs::create_dir_all(temp.path().join(".crisis")).unwrap();
        std::fs::write(
            temp.path().join(".crisis/config.yaml"),
            "corpus:\n  displayName: From_Yaml\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(temp.path().to_path_buf())).unwrap();

        assert_eq!(config.corpus.display_name, "From_Yaml");
        assert_eq!(
            config.var("CRISIS_TEST_DOTENV_ONLY_KEY").as_deref(),
            Some("token")
        );
        assert!(std::env::var("CRISIS_TEST_DOTENV_ONLY_KEY").is_err());
    }

    #[test]
    fn test_load_applies_dotenv_without_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".env"),
            "RAG_CORPUS_DESCRIPTION=\"Shelter guides\"\nRAG_CORPUS=projects/p/locations/l/ragCorpora/1\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(temp.path().to_path_buf())).unwrap();

        assert_eq!(config.corpus.description, "Shelter guides");
        assert_eq!(
            config.dotenv.get("RAG_CORPUS").map(String::as_str),
            Some("projects/p/locations/l/ragCorpora/1")
        );
    }

    #[test]
    fn test_validate_local_defaults() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_vertex_requires_project() {
        let mut config = AppConfig::default();
        config.corpus.index.kind = IndexKind::Vertex;
        config.corpus.storage.kind = StorageKind::Gcs;
        config.corpus.index.location = Some("us-central1".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_vertex_requires_gcs() {
        let mut config = AppConfig::default();
        config.corpus.index.kind = IndexKind::Vertex;
        config.corpus.index.project = Some("demo".to_string());
        config.corpus.index.location = Some("us-central1".to_string());
        config.corpus.storage.kind = StorageKind::Local;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("gs://"));
    }
}
