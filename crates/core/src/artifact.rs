//! Published artifacts and their names.

use crate::hash::FileFingerprint;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use time::OffsetDateTime;

/// Maximum artifact name length in bytes (common filesystem limit).
pub const MAX_NAME_LEN: usize = 255;

/// Name of a published artifact.
///
/// A name is a single path component: it never contains separators, never
/// starts with a dot (dot-prefixed entries are reserved for temporary files),
/// and never contains control characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactName(String);

impl ArtifactName {
    /// Parse and validate a name.
    pub fn parse(name: &str) -> crate::Result<Self> {
        if name.is_empty() {
            return Err(crate::Error::InvalidName(
                "name cannot be empty".to_string(),
            ));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(crate::Error::InvalidName(format!(
                "name is {} bytes, limit is {MAX_NAME_LEN}",
                name.len()
            )));
        }
        if name.starts_with('.') {
            return Err(crate::Error::InvalidName(format!(
                "name cannot start with '.': {name}"
            )));
        }
        for c in name.chars() {
            if matches!(c, '/' | '\\' | '\0') || c.is_control() {
                return Err(crate::Error::InvalidName(format!(
                    "invalid character in name: {c:?}"
                )));
            }
        }
        Ok(Self(name.to_string()))
    }

    /// Get the name string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactName({})", self.0)
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ArtifactName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ArtifactName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A merged, published file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Public name.
    pub name: ArtifactName,
    /// Fingerprint of the content. `None` when the file was placed in the
    /// publish root without going through a merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<FileFingerprint>,
    /// Size in bytes.
    pub size_bytes: u64,
    /// When the artifact was published, if recorded.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_at: Option<OffsetDateTime>,
}

/// Bytes left as-is in a locator path segment (RFC 3986 unreserved).
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

impl Artifact {
    /// Locator under a public base URL, e.g. `http://host/files/<name>`.
    ///
    /// The name is percent-encoded, so `?`, `#`, `%` and spaces in a valid
    /// name still resolve to the published file.
    pub fn locator(&self, public_base_url: &str) -> String {
        format!(
            "{}/files/{}",
            public_base_url.trim_end_matches('/'),
            utf8_percent_encode(self.name.as_str(), PATH_SEGMENT)
        )
    }
}
