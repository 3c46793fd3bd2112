// ABOUTME: Opaque token naming an upgrade job's log file.
// ABOUTME: Validated against the generated file-name pattern to keep caller input inside the log dir.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Prefix of every generated job log file.
pub const LOG_FILE_PREFIX: &str = "upgrade.";
/// Suffix of every generated job log file.
pub const LOG_FILE_SUFFIX: &str = ".log";

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^upgrade\.[A-Za-z0-9_]+\.log$").expect("log token pattern is a valid regex")
});

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid log token: {0:?}")]
pub struct InvalidLogToken(pub String);

/// Identity of an upgrade job: the file name of its log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogToken(String);

impl LogToken {
    /// Accepts only names shaped like `upgrade.<alnum>.log`, so a token can be
    /// joined onto the log directory without escaping it.
    pub fn parse(value: &str) -> Result<Self, InvalidLogToken> {
        if TOKEN_PATTERN.is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(InvalidLogToken(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LogToken {
    type Err = InvalidLogToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for LogToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LogToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
