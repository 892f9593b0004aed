use crate::core::error::GenerationError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCENE: &str = "holding";
pub const DEFAULT_BATCH_SCENES: [&str; 3] = ["holding", "unboxing", "using"];

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SceneTemplate {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub description: String,
}

impl SceneTemplate {
    fn builtin(id: &str, prompt: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            prompt: prompt.to_string(),
            description: description.to_string(),
        }
    }
}

fn builtin_templates() -> Vec<SceneTemplate> {
    vec![
        SceneTemplate::builtin(
            "unboxing",
            "A Korean woman in her 30s opening a package box, looking excited, natural lighting, cozy home interior, casual outfit",
            "Unboxing a delivered package",
        ),
        SceneTemplate::builtin(
            "holding",
            "A Korean woman in her 30s holding a product in her hand, smiling at camera, natural lighting, clean background, casual home setting",
            "Holding the product",
        ),
        SceneTemplate::builtin(
            "using",
            "A Korean woman in her 30s using a product, focused expression, natural lighting, cozy room, lifestyle photo",
            "Using the product",
        ),
        SceneTemplate::builtin(
            "selfie",
            "A Korean woman in her 30s taking a mirror selfie with product, casual outfit, natural makeup, cozy bedroom",
            "Selfie with the product",
        ),
        SceneTemplate::builtin(
            "desk",
            "A Korean woman in her 30s sitting at desk with product placed in front, working from home, natural lighting, minimalist interior",
            "Product on the desk",
        ),
        SceneTemplate::builtin(
            "review",
            "A Korean woman in her 30s showing product to camera, explaining features, natural expression, home studio setup",
            "Review shoot",
        ),
        SceneTemplate::builtin(
            "daily",
            "A Korean woman in her 30s in daily life scene with product visible, natural candid moment, warm lighting, cozy apartment",
            "Product in daily life",
        ),
    ]
}

/// Fixed, ordered set of scene templates. Built once and shared read-only.
#[derive(Debug, Clone)]
pub struct SceneRegistry {
    templates: Vec<SceneTemplate>,
}

impl SceneRegistry {
    pub fn builtin() -> Self {
        Self {
            templates: builtin_templates(),
        }
    }

    /// Built-ins plus `extra`. An extra template with a built-in id replaces it in place.
    pub fn with_overrides(extra: &[SceneTemplate]) -> Result<Self, GenerationError> {
        let mut templates = builtin_templates();
        let mut seen: Vec<&str> = Vec::new();

        for template in extra {
            if template.id.trim().is_empty() {
                return Err(GenerationError::InvalidInput(
                    "scene template id must not be empty".to_string(),
                ));
            }
            if !is_folder_safe(&template.id) {
                return Err(GenerationError::InvalidInput(format!(
                    "scene template id '{}' must be a plain folder name",
                    template.id
                )));
            }
            if template.prompt.trim().is_empty() {
                return Err(GenerationError::InvalidInput(format!(
                    "scene template '{}' has an empty prompt",
                    template.id
                )));
            }
            if seen.contains(&template.id.as_str()) {
                return Err(GenerationError::InvalidInput(format!(
                    "scene template '{}' is defined twice",
                    template.id
                )));
            }
            seen.push(&template.id);

            match templates.iter_mut().find(|t| t.id == template.id) {
                Some(existing) => *existing = template.clone(),
                None => templates.push(template.clone()),
            }
        }

        Ok(Self { templates })
    }

    pub fn lookup(&self, id: &str) -> Option<&SceneTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.templates.iter().map(|t| t.id.clone()).collect()
    }

    pub fn templates(&self) -> &[SceneTemplate] {
        &self.templates
    }

    pub fn unknown_scene(&self, requested: &str) -> GenerationError {
        GenerationError::UnknownScene {
            requested: requested.to_string(),
            available: self.ids(),
        }
    }
}

/// Scene ids double as batch folder names.
fn is_folder_safe(id: &str) -> bool {
    id != "." && id != ".." && !id.contains(['/', '\\'])
}

impl Default for SceneRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids_in_order() {
        let registry = SceneRegistry::builtin();
        assert_eq!(
            registry.ids(),
            vec!["unboxing", "holding", "using", "selfie", "desk", "review", "daily"]
        );
    }

    #[test]
    fn test_defaults_are_registered() {
        let registry = SceneRegistry::builtin();
        assert!(registry.lookup(DEFAULT_SCENE).is_some());
        for id in DEFAULT_BATCH_SCENES {
            assert!(registry.lookup(id).is_some(), "missing default scene {}", id);
        }
    }

    #[test]
    fn test_all_builtin_prompts_non_empty() {
        for template in SceneRegistry::builtin().templates() {
            assert!(!template.prompt.trim().is_empty(), "{}", template.id);
        }
    }

    #[test]
    fn test_override_replaces_and_appends() {
        let registry = SceneRegistry::with_overrides(&[
            SceneTemplate::builtin("holding", "custom holding", "mine"),
            SceneTemplate::builtin("kitchen", "cooking with product", "kitchen"),
        ])
        .unwrap();

        assert_eq!(registry.lookup("holding").unwrap().prompt, "custom holding");
        assert_eq!(registry.ids()[1], "holding");
        assert_eq!(registry.ids().last().unwrap(), "kitchen");
    }

    #[test]
    fn test_override_rejects_bad_templates() {
        assert!(SceneRegistry::with_overrides(&[SceneTemplate::builtin("x", " ", "")]).is_err());
        assert!(SceneRegistry::with_overrides(&[SceneTemplate::builtin("", "p", "")]).is_err());
        assert!(SceneRegistry::with_overrides(&[
            SceneTemplate::builtin("x", "p", ""),
            SceneTemplate::builtin("x", "q", ""),
        ])
        .is_err());
    }

    #[test]
    fn test_override_rejects_path_like_ids() {
        for id in ["..", ".", "x/y", "..\\up", "../holding"] {
            let result = SceneRegistry::with_overrides(&[SceneTemplate::builtin(id, "p", "")]);
            assert!(
                matches!(result, Err(GenerationError::InvalidInput(_))),
                "accepted {}",
                id
            );
        }
        assert!(SceneRegistry::with_overrides(&[SceneTemplate::builtin("desk.v2", "p", "")]).is_ok());
    }

    #[test]
    fn test_unknown_scene_lists_ids() {
        let registry = SceneRegistry::builtin();
        let err = registry.unknown_scene("beach");
        let msg = err.to_string();
        assert!(msg.contains("beach"));
        for id in registry.ids() {
            assert!(msg.contains(&id));
        }
    }
}
