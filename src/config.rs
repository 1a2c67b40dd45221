//! YAML configuration file.
//!
//! Every section is optional; an empty file yields the built-in defaults.
//!
//! ```yaml
//! currency: AED
//! gateway:
//!   endpoint: http://localhost:11434
//!   model: llama3.2
//!   auto_tune: true
//! policy:
//!   concentration_high: 55.0
//! aliases:
//!   gpa: [term_average]
//! ```

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{columns::AliasTable, gateway::GatewayConfig, policy::AnalysisPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub policy: AnalysisPolicy,
    /// Extra candidate headers per semantic column, tried before the built-in ones.
    pub aliases: BTreeMap<String, Vec<String>>,
    pub currency: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            policy: AnalysisPolicy::default(),
            aliases: BTreeMap::new(),
            currency: "AED".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).context("Parsing configuration YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Reading configuration from {path:?}"))?;
        let config =
            Self::from_yaml(&text).with_context(|| format!("Loading configuration {path:?}"))?;
        debug!("Loaded configuration from {path:?}: {config:?}");
        Ok(config)
    }

    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn alias_table(&self) -> AliasTable {
        AliasTable::builtin().merged_with(&self.aliases)
    }
}
