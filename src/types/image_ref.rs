// ABOUTME: Container image reference parsing and validation.
// ABOUTME: Handles forms like alpine, alpine:3, registry:5000/org/app:tag@sha256:...

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: '{0}'")]
    InvalidChar(char),

    #[error("image reference has an empty {0}")]
    EmptyComponent(&'static str),
}

/// A pullable image reference.
///
/// The repository keeps its registry host (if any) so the reference can be
/// handed back to the runtime exactly as the operator wrote it. A reference
/// with neither tag nor digest is normalised to `:latest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }

        if let Some(c) = input
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '-' | '_' | '@')))
        {
            return Err(ParseImageRefError::InvalidChar(c));
        }

        let (name, digest) = match input.split_once('@') {
            Some((_, "")) => return Err(ParseImageRefError::EmptyComponent("digest")),
            Some((name, digest)) => (name, Some(digest.to_string())),
            None => (input, None),
        };

        // A colon after the last slash separates the tag; an earlier one is a
        // registry port.
        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match name[last_slash..].rfind(':') {
            Some(pos) => {
                let split = last_slash + pos;
                let tag = &name[split + 1..];
                if tag.is_empty() {
                    return Err(ParseImageRefError::EmptyComponent("tag"));
                }
                (&name[..split], Some(tag.to_string()))
            }
            None => (name, None),
        };

        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(ParseImageRefError::EmptyComponent("repository"));
        }

        let tag = match (tag, &digest) {
            (None, None) => Some("latest".to_string()),
            (tag, _) => tag,
        };

        Ok(Self {
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// Build a reference from known-good parts without validation.
    pub(crate) fn from_parts(repository: &str, tag: &str) -> Self {
        Self {
            repository: repository.to_string(),
            tag: Some(tag.to_string()),
            digest: None,
        }
    }

    /// Repository including the registry host, e.g. `ghcr.io/org/app`.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl FromStr for ImageRef {
    type Err = ParseImageRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
