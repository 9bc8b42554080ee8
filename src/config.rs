//! Agent configuration
//!
//! TOML-backed static configuration: identity, context window capacity,
//! generation parameters, ledger bounds, and the names of tools bound to the
//! agent at startup. Collaborator *instances* are never configured here —
//! they are values wired in by the composition root.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Main agent configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub agent: AgentSection,
    #[serde(default)]
    pub context: ContextSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub ledger: LedgerSection,
}

/// Agent identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    /// Agent identifier (must match [a-zA-Z0-9._-]+)
    pub id: String,
    /// Description of what this agent does
    #[serde(default)]
    pub description: String,
    /// Tools bound to the agent at startup
    #[serde(default)]
    pub tools: Vec<String>,
}

/// Context window sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSection {
    /// Token capacity of the context window
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_max_tokens() -> usize {
    4000
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

/// Parameters forwarded to the generator
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationSection {
    /// Optional temperature (0.0 to 2.0)
    pub temperature: Option<f32>,
    /// Optional max tokens
    pub max_tokens: Option<u32>,
}

/// Performance ledger bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerSection {
    /// Capacity of the bounded error log
    #[serde(default = "default_max_error_records")]
    pub max_error_records: usize,
}

fn default_max_error_records() -> usize {
    crate::ledger::DEFAULT_MAX_ERROR_RECORDS
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            max_error_records: default_max_error_records(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

static AGENT_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._-]+$").expect("agent id pattern is valid"));

impl AgentConfig {
    /// Minimal configuration with defaults for everything but the id
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            agent: AgentSection {
                id: id.into(),
                description: String::new(),
                tools: Vec::new(),
            },
            context: ContextSection::default(),
            generation: GenerationSection::default(),
            ledger: LedgerSection::default(),
        }
    }

    /// Load and validate configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !AGENT_ID_PATTERN.is_match(&self.agent.id) {
            return Err(ConfigError::InvalidConfig(format!(
                "Agent id '{}' must match [a-zA-Z0-9._-]+",
                self.agent.id
            )));
        }
        if self.context.max_tokens == 0 {
            return Err(ConfigError::InvalidConfig(
                "context.max_tokens must be greater than zero".to_string(),
            ));
        }
        if let Some(temperature) = self.generation.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidConfig(format!(
                    "generation.temperature {temperature} outside [0.0, 2.0]"
                )));
            }
        }
        if self.ledger.max_error_records == 0 {
            return Err(ConfigError::InvalidConfig(
                "ledger.max_error_records must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
