//! Connection profile for ancientctl

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::format::OutputFormat;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:9797";

/// Settings loaded from a TOML profile. Command-line flags win over every
/// field present here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// HTTP URL or local socket path of the freezer service
    pub endpoint: Option<String>,

    /// Per-request timeout for HTTP endpoints, in seconds
    pub timeout_secs: Option<u64>,

    pub output: Option<OutputFormat>,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse profile {}", path.display()))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
