use crate::core::config::PersonaConfig;
use crate::core::error::GenerationError;
use crate::core::job::{
    CharacterRef, JobDescriptor, ReferenceImageMapping, SceneEntry, PRODUCT_SCENE_REF,
    ROLE_PERSONA, ROLE_PRODUCT,
};
use crate::services::scenes::{SceneRegistry, DEFAULT_SCENE};
use std::path::Path;
use std::sync::Arc;

/// Turns a scene selector or a custom prompt into a job descriptor.
pub struct JobBuilder {
    registry: Arc<SceneRegistry>,
    persona: PersonaConfig,
    story_title: String,
}

impl JobBuilder {
    pub fn new(registry: Arc<SceneRegistry>, persona: PersonaConfig, story_title: &str) -> Self {
        Self {
            registry,
            persona,
            story_title: story_title.to_string(),
        }
    }

    pub fn registry(&self) -> &SceneRegistry {
        &self.registry
    }

    /// Custom prompt wins over the scene; a blank custom prompt counts as none.
    pub fn resolve_prompt(
        &self,
        scene_id: Option<&str>,
        custom_prompt: Option<&str>,
    ) -> Result<String, GenerationError> {
        if let Some(prompt) = custom_prompt.filter(|p| !p.trim().is_empty()) {
            return Ok(prompt.to_string());
        }

        let scene_id = scene_id.unwrap_or(DEFAULT_SCENE);
        self.registry
            .lookup(scene_id)
            .map(|t| t.prompt.clone())
            .ok_or_else(|| self.registry.unknown_scene(scene_id))
    }

    pub fn build(
        &self,
        scene_id: Option<&str>,
        custom_prompt: Option<&str>,
    ) -> Result<JobDescriptor, GenerationError> {
        let prompt = self.resolve_prompt(scene_id, custom_prompt)?;

        Ok(JobDescriptor {
            story_title: self.story_title.clone(),
            character_refs: vec![CharacterRef {
                id: self.persona.id.clone(),
                name: self.persona.name.clone(),
                description: self.persona.description.clone(),
            }],
            scenes: vec![SceneEntry {
                scene_ref: PRODUCT_SCENE_REF.to_string(),
                prompt,
                required_refs: vec![ROLE_PERSONA.to_string(), ROLE_PRODUCT.to_string()],
            }],
        })
    }

    /// Persona face plus the caller's product image. Paths are checked by the dispatcher.
    pub fn reference_images(&self, product_image: &Path) -> ReferenceImageMapping {
        let mut mapping = ReferenceImageMapping::new();
        mapping.insert(ROLE_PERSONA.to_string(), self.persona.face_image.clone());
        mapping.insert(ROLE_PRODUCT.to_string(), product_image.to_path_buf());
        mapping
    }
}
