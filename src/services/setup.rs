use crate::core::config::Config;
use crate::services::engine::command::CommandEngineConfig;
use crate::services::scenes::{SceneRegistry, SceneTemplate};
use anyhow::{anyhow, Result};
use inquire::{Select, Text};
use std::path::{Path, PathBuf};

#[derive(Debug, PartialEq, Eq)]
pub enum SetupItem {
    PersonaFace,
    EngineCommand,
}

pub fn pending_setup(config: &Config) -> Vec<SetupItem> {
    let mut items = Vec::new();
    if !config.persona.face_image.is_file() {
        items.push(SetupItem::PersonaFace);
    }
    if config.engine.provider == "command" && config.engine.command.is_none() {
        items.push(SetupItem::EngineCommand);
    }
    items
}

/// Asks for whatever the config is missing and saves it back to `config_path`.
pub fn run_setup(config: &mut Config, config_path: &Path) -> Result<()> {
    let pending = pending_setup(config);
    if pending.is_empty() {
        return Ok(());
    }
    if config.unattended {
        if pending.contains(&SetupItem::PersonaFace) {
            log::warn!(
                "Persona face image not found: {}",
                config.persona.face_image.display()
            );
        }
        return Ok(());
    }

    let mut needs_save = false;
    for item in pending {
        match item {
            SetupItem::PersonaFace => {
                println!(
                    "Persona face image not found: {}",
                    config.persona.face_image.display()
                );
                let answer = Text::new("Path to the persona face image:").prompt()?;
                let path = PathBuf::from(answer.trim());
                if !path.is_file() {
                    return Err(anyhow!("Not a file: {}", path.display()));
                }
                config.persona.face_image = path;
                needs_save = true;
            }
            SetupItem::EngineCommand => {
                let program = Text::new("Image automation command:")
                    .with_default(&CommandEngineConfig::default().program)
                    .prompt()?;
                config.engine.command = Some(CommandEngineConfig {
                    program: program.trim().to_string(),
                    ..Default::default()
                });
                needs_save = true;
            }
        }
    }

    if needs_save {
        config.save_to(config_path)?;
        println!("Configuration saved.");
    }
    Ok(())
}

pub fn select_scene(registry: &SceneRegistry) -> Result<String> {
    let options: Vec<String> = registry.templates().iter().map(format_scene).collect();
    let selection = Select::new("Select scene:", options).prompt()?;

    selection
        .split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Empty selection"))
}

pub fn format_scene(template: &SceneTemplate) -> String {
    format!("{} - {}", template.id, template.description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_pending_setup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let face = temp_dir.path().join("face.jpg");

        let mut config = Config::default();
        config.persona.face_image = face.clone();
        assert_eq!(
            pending_setup(&config),
            vec![SetupItem::PersonaFace, SetupItem::EngineCommand]
        );

        fs::write(&face, b"face").unwrap();
        config.engine.command = Some(CommandEngineConfig::default());
        assert!(pending_setup(&config).is_empty());
    }

    #[test]
    fn test_unattended_setup_does_not_prompt() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yml");
        let mut config = Config {
            unattended: true,
            ..Default::default()
        };
        config.persona.face_image = temp_dir.path().join("missing.jpg");

        run_setup(&mut config, &path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_format_scene_starts_with_id() {
        let registry = SceneRegistry::builtin();
        for template in registry.templates() {
            let line = format_scene(template);
            assert_eq!(line.split_whitespace().next(), Some(template.id.as_str()));
        }
    }
}
