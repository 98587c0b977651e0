//! Preview configuration loaded from `indimap.toml`

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::number::NumberParser;

/// Main preview configuration
///
/// ```toml
/// [number]
/// separator_policy = "decimal-comma"
/// unparsed_text = "keep"
///
/// [preview]
/// include_inactive = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default)]
    pub number: NumberParser,
    #[serde(default)]
    pub preview: PreviewOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewOptions {
    /// Also evaluate rules marked inactive
    #[serde(default)]
    pub include_inactive: bool,
}

impl PreviewConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PreviewConfig = toml::from_str(content)?;
        Ok(config)
    }
}
