//! Document manifests.
//!
//! A manifest is a YAML file listing the documents a corpus should contain:
//!
//! ```yaml
//! documents:
//!   - uri: https://www.ready.gov/sites/default/files/2024-03/ready.gov_earthquake_hazard-info-sheet.pdf
//!     display_name: earthquake_info_sheet.pdf
//!     description: FEMA Earthquake Information Sheet
//! ```

use crate::types::DocumentRef;
use crisis_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentManifest {
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
}

impl DocumentManifest {
    /// Load and validate a manifest file.
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read manifest {:?}: {}", path, e))
        })?;

        let manifest: DocumentManifest = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse manifest {:?}: {}", path, e))
        })?;

        manifest.validate()?;
        tracing::debug!(
            "Loaded {} documents from manifest {:?}",
            manifest.documents.len(),
            path
        );
        Ok(manifest)
    }

    /// Crisis guidance documents used when no manifest is configured.
    pub fn builtin() -> Self {
        Self {
            documents: vec![
                DocumentRef::new(
                    "https://www.ready.gov/sites/default/files/2024-03/ready.gov_earthquake_hazard-info-sheet.pdf",
                )
                .with_display_name("earthquake_info_sheet.pdf")
                .with_description("FEMA Earthquake Information Sheet"),
                DocumentRef::new(
                    "https://www.who.int/docs/default-source/coronaviruse/coping-with-stress.pdf?sfvrsn=9845bc3a_2",
                )
                .with_display_name("who_coping_with_stress.pdf")
                .with_description("WHO Guide on Coping with Stress During Outbreaks"),
            ],
        }
    }

    /// Append documents given as bare URIs.
    pub fn extend_uris<I, S>(&mut self, uris: I) -> AppResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for uri in uris {
            let doc = DocumentRef::new(uri);
            validate_uri(&doc.uri)?;
            self.documents.push(doc);
        }
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        for doc in &self.documents {
            validate_uri(&doc.uri)?;
            if let Some(name) = &doc.display_name {
                if name.trim().is_empty() {
                    return Err(AppError::Config(format!(
                        "Empty display name for document {}",
                        doc.uri
                    )));
                }
            }
        }
        Ok(())
    }
}

fn validate_uri(uri: &str) -> AppResult<()> {
    let url = Url::parse(uri.trim())
        .map_err(|e| AppError::Config(format!("Invalid document URI '{}': {}", uri, e)))?;

    match url.scheme() {
        "http" | "https" | "file" => Ok(()),
        other => Err(AppError::Config(format!(
            "Unsupported scheme '{}' in document URI '{}'",
            other, uri
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_is_valid() {
        let manifest = DocumentManifest::builtin();
        assert_eq!(manifest.documents.len(), 2);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_load_manifest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("documents.yaml");
        fs::write(
            &path,
            r#"
documents:
  - url: https://example.org/flood.pdf
    filename: flood.pdf
    description: Flood guidance
  - uri: file:///srv/docs/shelters.txt
"#,
        )
        .unwrap();

        let manifest = DocumentManifest::load(&path).unwrap();
        assert_eq!(manifest.documents.len(), 2);
        assert_eq!(manifest.documents[0].display_name.as_deref(), Some("flood.pdf"));
        assert_eq!(manifest.documents[1].uri, "file:///srv/docs/shelters.txt");
    }

    #[test]
    fn test_rejects_unsupported_scheme() {
        let manifest = DocumentManifest {
            documents: vec![DocumentRef::new("ftp://example.org/a.pdf")],
        };
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_extend_uris() {
        let mut manifest = DocumentManifest::default();
        manifest
            .extend_uris(["https://example.org/a.pdf", "https://example.org/b.pdf"])
            .unwrap();
        assert_eq!(manifest.documents.len(), 2);

        assert!(manifest.extend_uris(["not a uri"]).is_err());
    }
}
