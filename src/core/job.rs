use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ROLE_PERSONA: &str = "ref1";
pub const ROLE_PRODUCT: &str = "ref2";
pub const PRODUCT_SCENE_REF: &str = "product_scene";

// --- Engine config document ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CharacterRef {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SceneEntry {
    #[serde(rename = "ref")]
    pub scene_ref: String,
    pub prompt: String,
    #[serde(rename = "requiredRefs")]
    pub required_refs: Vec<String>,
}

/// What to generate, independent of rendering parameters.
///
/// Serializes to the exact document the automation engine parses.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct JobDescriptor {
    pub story_title: String,
    #[serde(rename = "characterRefs")]
    pub character_refs: Vec<CharacterRef>,
    pub scenes: Vec<SceneEntry>,
}

impl JobDescriptor {
    /// Prompt of the first (and in the default flow, only) scene.
    pub fn prompt(&self) -> Option<&str> {
        self.scenes.first().map(|s| s.prompt.as_str())
    }
}

/// Role name to image path. Ordered so the engine sees roles in a stable order.
pub type ReferenceImageMapping = BTreeMap<String, PathBuf>;

// --- Render parameters ---

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "3:4")]
    PortraitClassic,
    #[serde(rename = "4:3")]
    LandscapeClassic,
    #[serde(rename = "16:9")]
    Landscape,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Portrait => "9:16",
            Self::PortraitClassic => "3:4",
            Self::LandscapeClassic => "4:3",
            Self::Landscape => "16:9",
        }
    }

    pub fn all() -> [AspectRatio; 5] {
        [
            Self::Square,
            Self::Portrait,
            Self::PortraitClassic,
            Self::LandscapeClassic,
            Self::Landscape,
        ]
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| {
                let known: Vec<&str> = Self::all().iter().map(|r| r.as_str()).collect();
                format!("Unknown aspect ratio: {}. Available: {}", s, known.join(", "))
            })
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Resolution {
    #[serde(rename = "1K")]
    Low,
    #[default]
    #[serde(rename = "2K")]
    Standard,
    #[serde(rename = "4K")]
    High,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "1K",
            Self::Standard => "2K",
            Self::High => "4K",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1K" | "LOW" => Ok(Self::Low),
            "2K" | "STANDARD" => Ok(Self::Standard),
            "4K" | "HIGH" => Ok(Self::High),
            _ => Err(format!("Unknown resolution: {}. Available: 1K, 2K, 4K", s)),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RenderParams {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_unlimited_mode")]
    pub unlimited_mode: bool,
}

fn default_model() -> String {
    "nano_banana_2".to_string()
}
fn default_unlimited_mode() -> bool {
    true
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            model: default_model(),
            aspect_ratio: AspectRatio::default(),
            resolution: Resolution::default(),
            unlimited_mode: default_unlimited_mode(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub job: JobDescriptor,
    pub reference_images: ReferenceImageMapping,
    pub params: RenderParams,
    pub output_dir: PathBuf,
}

// --- Outcomes ---

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Building,
    Dispatching,
    Resolving,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Building => f.write_str("building"),
            Self::Dispatching => f.write_str("dispatching"),
            Self::Resolving => f.write_str("resolving"),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub enum GenerationResult {
    Succeeded { artifact: PathBuf },
    Failed { stage: Stage, cause: String },
}

impl GenerationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn artifact(&self) -> Option<&Path> {
        match self {
            Self::Succeeded { artifact } => Some(artifact),
            Self::Failed { .. } => None,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct SceneOutcome {
    pub scene_id: String,
    pub output_dir: PathBuf,
    pub result: GenerationResult,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct BatchResult {
    pub outcomes: Vec<SceneOutcome>,
}

impl BatchResult {
    pub fn push(&mut self, outcome: SceneOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_success()).count()
    }

    /// Artifact paths of successful scenes, in scene order.
    pub fn artifacts(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.artifact())
            .collect()
    }

    pub fn get(&self, scene_id: &str) -> Option<&SceneOutcome> {
        self.outcomes.iter().find(|o| o.scene_id == scene_id)
    }
}
