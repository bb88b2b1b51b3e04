//! `nexus.toml` and batch file parsing.

use anyhow::Context;
use nexus_orchestrator::{AgentKind, OrchestratorConfig, Parameters, TaskDescriptor, TaskPriority};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NexusConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NexusConfig {
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config")?;
        config.orchestrator.validate()?;
        Ok(config)
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config '{}'", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config '{}'", path.display()))
    }
}

/// One `[[tasks]]` entry of a batch file.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchTask {
    pub kind: AgentKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub parameters: Parameters,
}

impl BatchTask {
    pub fn into_descriptor(self) -> TaskDescriptor {
        TaskDescriptor::new(self.kind)
            .with_description(self.description)
            .with_priority(self.priority)
            .with_parameters(self.parameters)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchFile {
    #[serde(default)]
    pub tasks: Vec<BatchTask>,
}

impl BatchFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read batch file '{}'", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse batch file '{}'", path.display()))
    }
}
