// ABOUTME: The label marking containers and volumes as managed by upshift.
// ABOUTME: A key/value pair, `upshift.role=server` unless configured otherwise.

use serde::Deserialize;
use std::fmt;

/// Label identifying containers this tool installed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Provenance {
    pub key: String,
    pub value: String,
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            key: "upshift.role".to_string(),
            value: "server".to_string(),
        }
    }
}

impl Provenance {
    /// Label key recording when a backup volume was created.
    pub fn created_key(&self) -> String {
        format!("{}.created", self.key)
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}
