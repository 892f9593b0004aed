use crate::core::job::{ReferenceImageMapping, RenderParams};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub mod command;
pub mod http;

// --- Config ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_engine_provider")]
    pub provider: String, // "command" or "http"

    /// Upper bound for a single generation run. None waits forever.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    #[serde(default)]
    pub command: Option<command::CommandEngineConfig>,
    #[serde(default)]
    pub http: Option<http::HttpEngineConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: default_engine_provider(),
            timeout_seconds: None,
            command: None,
            http: None,
        }
    }
}

fn default_engine_provider() -> String {
    "command".to_string()
}

// --- Contract ---

/// Everything the automation engine needs for one run.
#[derive(Debug, Clone, Serialize)]
pub struct EngineJob {
    pub config_path: PathBuf,
    pub reference_images: ReferenceImageMapping,
    pub params: RenderParams,
    pub download_folder: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    /// Files the engine says it produced. May be empty if the engine only writes to disk.
    pub artifacts: Vec<PathBuf>,
}

#[async_trait]
pub trait GenerationEngine: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, job: &EngineJob) -> Result<EngineOutput>;
}

pub fn create_engine(config: &EngineConfig) -> Result<Arc<dyn GenerationEngine>> {
    match config.provider.as_str() {
        "command" => {
            let cfg = config.command.clone().unwrap_or_default();
            Ok(Arc::new(command::CommandEngine::new(cfg)))
        }
        "http" => {
            let cfg = config
                .http
                .clone()
                .ok_or_else(|| anyhow!("HTTP engine config missing"))?;
            Ok(Arc::new(http::HttpEngine::new(cfg)))
        }
        _ => Err(anyhow!("Unknown generation engine: {}", config.provider)),
    }
}
