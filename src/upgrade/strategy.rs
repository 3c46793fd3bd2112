// ABOUTME: Replacement ordering for an upgrade.
// ABOUTME: Decides whether the old container stops before or after the new one starts.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Order in which the old container is retired and the replacement started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplacementOrder {
    /// Stop the old container, back up its volumes while they are quiescent,
    /// then start the replacement. Required when the replacement cannot bind
    /// the same host ports while the old container runs.
    #[default]
    StopThenStart,

    /// Back up live volumes, start and verify the replacement, then stop the
    /// old container. A failed replacement leaves the old one serving.
    StartThenStop,
}

impl ReplacementOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplacementOrder::StopThenStart => "stop-then-start",
            ReplacementOrder::StartThenStop => "start-then-stop",
        }
    }
}

impl fmt::Display for ReplacementOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplacementOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop-then-start" => Ok(ReplacementOrder::StopThenStart),
            "start-then-stop" => Ok(ReplacementOrder::StartThenStop),
            other => Err(format!(
                "unknown replacement order '{}' (expected stop-then-start or start-then-stop)",
                other
            )),
        }
    }
}
