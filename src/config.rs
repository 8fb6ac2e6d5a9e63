use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::transfer_case::WorkflowSettings;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// PostgreSQL connection URL, required by the postgres backend
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    /// YAML file with the contract and person directories
    #[serde(default)]
    pub directory_file: Option<String>,
    /// Root directory for generated resolution files; kept in memory when unset
    #[serde(default)]
    pub documents_dir: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkflowConfig {
    /// Times a rejected case may be reopened
    pub max_reopens: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_reopens: WorkflowSettings::default().max_reopens,
        }
    }
}

impl WorkflowConfig {
    pub fn settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            max_reopens: self.max_reopens,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        if config.storage.backend == StorageBackend::Postgres && config.postgres_url.is_none() {
            anyhow::bail!("storage.backend = postgres requires postgres_url");
        }
        Ok(config)
    }
}
