//! Durable key/value state kept in a dotenv file.
//!
//! The corpus identifier produced by a sync run is written here so that the
//! agent runtime and later runs pick it up. Unrelated lines (comments, other
//! keys) are preserved on update.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// A persisted key/value set read at the start of a run and updated at the end.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored for `key`, if any.
    fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Insert or replace the value for `key`.
    fn set(&self, key: &str, value: &str) -> AppResult<()>;

    /// Remove `key`. Returns whether it was present.
    fn unset(&self, key: &str) -> AppResult<bool>;
}

/// A `.env` file on disk.
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse every entry of the file. A missing file has no entries.
    pub fn entries(&self) -> AppResult<Vec<(String, String)>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let iter = dotenvy::from_path_iter(&self.path).map_err(|e| {
            AppError::State(format!("Failed to open {:?}: {}", self.path, e))
        })?;

        iter.map(|item| {
            item.map_err(|e| AppError::State(format!("Failed to parse {:?}: {}", self.path, e)))
        })
        .collect()
    }

    fn read_lines(&self) -> AppResult<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(content.lines().map(str::to_string).collect())
    }

    /// Write through a sibling temp file and rename so a crash never leaves a
    /// half-written file behind.
    fn write_lines(&self, lines: &[String]) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for EnvFile {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self
            .entries()?
            .into_iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v))
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut lines = self.read_lines()?;
        let rendered = format!("{}={}", key, quote_value(value));

        let mut replaced = false;
        lines.retain_mut(|line| {
            if line_key(line) != Some(key) {
                return true;
            }
            if replaced {
                return false;
            }
            replaced = true;
            *line = rendered.clone();
            true
        });

        if !replaced {
            lines.push(rendered);
        }

        self.write_lines(&lines)?;
        tracing::debug!("Set {} in {:?}", key, self.path);
        Ok(())
    }

    fn unset(&self, key: &str) -> AppResult<bool> {
        let mut lines = self.read_lines()?;
        let before = lines.len();
        lines.retain(|line| line_key(line) != Some(key));

        if lines.len() == before {
            return Ok(false);
        }

        self.write_lines(&lines)?;
        tracing::debug!("Removed {} from {:?}", key, self.path);
        Ok(true)
    }
}

/// Extract the key of an assignment line, skipping comments and blanks.
fn line_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, _) = trimmed.split_once('=')?;
    Some(key.trim())
}

/// Quote values that dotenv parsers would otherwise split or truncate.
fn quote_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '\\' | '$'));

    if !needs_quotes {
        return value.to_string();
    }

    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$");
    format!("\"{}\"", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_missing_file() {
        let temp = TempDir::new().unwrap();
        let store = EnvFile::new(temp.path().join(".env"));
        assert_eq!(store.get("RAG_CORPUS").unwrap(), None);
    }

    #[test]
    fn test_set_creates_file() {
        let temp = TempDir::new().unwrap();
        let store = EnvFile::new(temp.path().join(".env"));

        store
            .set("RAG_CORPUS", "projects/p/locations/us-central1/ragCorpora/42")
            .unwrap();

        assert_eq!(
            store.get("RAG_CORPUS").unwrap().as_deref(),
            Some("projects/p/locations/us-central1/ragCorpora/42")
        );
    }

    #[test]
    fn test_set_preserves_other_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");
        fs::write(
            &path,
            "# project settings\nGOOGLE_CLOUD_PROJECT=demo\nRAG_CORPUS=old\nMODEL_NAME=gemini\n",
        )
        .unwrap();

        let store = EnvFile::new(&path);
        store.set("RAG_CORPUS", "new").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "# project settings\nGOOGLE_CLOUD_PROJECT=demo\nRAG_CORPUS=new\nMODEL_NAME=gemini\n"
        );
    }

    #[test]
    fn test_set_quotes_values_with_spaces() {
        let temp = TempDir::new().unwrap();
        let store = EnvFile::new(temp.path().join(".env"));

        store.set("AGENT_DISPLAY_NAME", "Crisis Response Agent").unwrap();

        assert_eq!(
            store.get("AGENT_DISPLAY_NAME").unwrap().as_deref(),
            Some("Crisis Response Agent")
        );
    }

    #[test]
    fn test_unset() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");
        fs::write(&path, "A=1\nRAG_CORPUS=x\nB=2\n").unwrap();

        let store = EnvFile::new(&path);
        assert!(store.unset("RAG_CORPUS").unwrap());
        assert!(!store.unset("RAG_CORPUS").unwrap());

        assert_eq!(fs::read_to_string(&path).unwrap(), "A=1\nB=2\n");
    }

    #[test]
    fn test_line_key() {
        assert_eq!(line_key("export FOO=bar"), Some("FOO"));
        assert_eq!(line_key("  # FOO=bar"), None);
        assert_eq!(line_key(""), None);
        assert_eq!(line_key("NOEQUALS"), None);
    }
}
