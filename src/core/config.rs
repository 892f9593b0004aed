use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::job::RenderParams;
use crate::services::background::BackgroundConfig;
use crate::services::engine::EngineConfig;
use crate::services::scenes::SceneTemplate;

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default)]
    pub unattended: bool,

    #[serde(default = "default_story_title")]
    pub story_title: String,

    #[serde(default)]
    pub persona: PersonaConfig,

    #[serde(default)]
    pub generation: RenderParams,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub background: BackgroundConfig,

    /// Extra scene templates; an id matching a built-in replaces it.
    #[serde(default)]
    pub scenes: Vec<SceneTemplate>,
}

/// The fixed influencer identity composited into every image.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_id")]
    pub id: String,
    #[serde(default = "default_persona_name")]
    pub name: String,
    #[serde(default = "default_persona_description")]
    pub description: String,
    #[serde(default = "default_face_image")]
    pub face_image: PathBuf,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            id: default_persona_id(),
            name: default_persona_name(),
            description: default_persona_description(),
            face_image: default_face_image(),
        }
    }
}

fn default_output() -> String {
    "output".to_string()
}
fn default_story_title() -> String {
    "Product Review Image".to_string()
}
fn default_persona_id() -> String {
    "kusun".to_string()
}
fn default_persona_name() -> String {
    "Kusun".to_string()
}
fn default_persona_description() -> String {
    "Korean female influencer in her 30s".to_string()
}
fn default_face_image() -> PathBuf {
    PathBuf::from("persona/influencer-face.jpg")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_folder: default_output(),
            unattended: false,
            story_title: default_story_title(),
            persona: PersonaConfig::default(),
            generation: RenderParams::default(),
            engine: EngineConfig::default(),
            background: BackgroundConfig::default(),
            scenes: Vec::new(),
        }
    }
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.output_folder)?;
        Ok(())
    }
}
