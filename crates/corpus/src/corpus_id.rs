//! Corpus resource identifiers.

use crate::error::{CorpusError, CorpusResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource name of a corpus:
/// `projects/<project>/locations/<location>/ragCorpora/<corpus>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorpusId(String);

impl CorpusId {
    pub fn new(project: &str, location: &str, corpus: &str) -> CorpusResult<Self> {
        Self::parse_str(&format!(
            "projects/{}/locations/{}/ragCorpora/{}",
            project, location, corpus
        ))
    }

    /// Parse a configured identifier.
    ///
    /// Absent or blank input is `Ok(None)`, which means "create a corpus".
    /// Anything else must be a well-formed resource name.
    pub fn parse(raw: Option<&str>) -> CorpusResult<Option<Self>> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => Self::parse_str(value).map(Some),
        }
    }

    fn parse_str(value: &str) -> CorpusResult<Self> {
        let parts: Vec<&str> = value.split('/').collect();
        let well_formed = match parts.as_slice() {
            ["projects", project, "locations", location, "ragCorpora", corpus] => {
                [project, location, corpus].iter().all(|s| valid_segment(s))
            }
            _ => false,
        };

        if well_formed {
            Ok(Self(value.to_string()))
        } else {
            Err(CorpusError::InvalidCorpusId(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `projects/<project>/locations/<location>`
    pub fn parent(&self) -> &str {
        match self.0.rfind("/ragCorpora/") {
            Some(pos) => &self.0[..pos],
            None => &self.0,
        }
    }

    /// Trailing corpus segment.
    pub fn corpus(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl fmt::Display for CorpusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CorpusId {
    type Error = CorpusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_str(&value)
    }
}

impl From<CorpusId> for String {
    fn from(id: CorpusId) -> Self {
        id.0
    }
}
