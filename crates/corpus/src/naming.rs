//! Deterministic object names for mirrored documents.
//!
//! The same source URI always maps to the same object name, so repeated
//! mirrors overwrite (or reuse) a single object instead of piling up copies.

use sha2::{Digest, Sha256};
use url::Url;

/// Hex characters of the URI digest kept in the object name.
const DIGEST_CHARS: usize = 16;

/// Longest file-name component kept in the object name.
const MAX_BASENAME: usize = 80;

const FALLBACK_BASENAME: &str = "document";

/// Object name for a source URI: `<prefix>/<digest>-<basename>`.
///
/// The digest covers the whole trimmed URI (query included) so that two
/// sources sharing a file name never collide.
pub fn mirror_object_name(prefix: &str, uri: &str) -> String {
    let uri = uri.trim();
    let digest = hex_digest(uri.as_bytes());
    let short = &digest[..DIGEST_CHARS];
    let name = format!("{}-{}", short, source_basename(uri));

    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Last non-empty path segment of the URI, sanitized for object names.
pub fn source_basename(uri: &str) -> String {
    let segment = match Url::parse(uri.trim()) {
        Ok(url) => url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string),
        Err(_) => uri
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').find(|s| !s.is_empty()))
            .map(str::to_string),
    };

    let sanitized: String = segment
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_BASENAME)
        .collect();

    let trimmed = sanitized.trim_matches('.');
    if trimmed.is_empty() {
        FALLBACK_BASENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lowercase hex SHA-256.
pub fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHO: &str =
        "https://www.who.int/docs/default-source/coronaviruse/coping-with-stress.pdf?sfvrsn=9845bc3a_2";

    #[test]
    fn test_same_uri_same_name() {
        let first = mirror_object_name("documents", WHO);
        let second = mirror_object_name("documents", WHO);
        assert_eq!(first, second);
        assert!(first.starts_with("documents/"));
        assert!(first.ends_with("-coping-with-stress.pdf"));
    }

    #[test]
    fn test_query_changes_digest() {
        let a = mirror_object_name("documents", "https://example.org/guide.pdf?v=1");
        let b = mirror_object_name("documents", "https://example.org/guide.pdf?v=2");
        assert_ne!(a, b);
        assert_eq!(source_basename("https://example.org/guide.pdf?v=1"), "guide.pdf");
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        assert_eq!(
            mirror_object_name("documents", " https://example.org/a.pdf "),
            mirror_object_name("documents", "https://example.org/a.pdf")
        );
    }

    #[test]
    fn test_prefix_slashes_normalized() {
        let name = mirror_object_name("/crisis/docs/", "https://example.org/a.pdf");
        assert!(name.starts_with("crisis/docs/"));

        let bare = mirror_object_name("", "https://example.org/a.pdf");
        assert!(!bare.contains('/'));
    }

    #[test]
    fn test_basename_sanitized() {
        assert_eq!(
            source_basename("https://example.org/files/Flood%20Plan%20(2024).pdf"),
            "Flood_20Plan_20_2024_.pdf"
        );
        assert_eq!(source_basename("https://example.org/"), "document");
        assert_eq!(source_basename("https://example.org/dir/"), "dir");
        assert_eq!(source_basename("not a url/file.txt"), "file.txt");
    }

    #[test]
    fn test_digest_length() {
        let name = mirror_object_name("", "https://example.org/a.pdf");
        let (digest, _) = name.split_once('-').unwrap();
        assert_eq!(digest.len(), DIGEST_CHARS);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
