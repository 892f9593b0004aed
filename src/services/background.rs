//! Optional product-photo background removal, run before generation when wanted.

use crate::core::error::GenerationError;
use crate::utils::paths::default_nobg_path;
use async_trait::async_trait;
use log::{info, warn};
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

pub const API_KEY_ENV: &str = "REMOVE_BG_API_KEY";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMode {
    #[default]
    Local,
    Hosted,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackgroundConfig {
    #[serde(default)]
    pub provider: BackgroundMode,
    pub api_key: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Program and leading args; input and output paths are appended.
    #[serde(default = "default_local_command")]
    pub local_command: Vec<String>,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            provider: BackgroundMode::default(),
            api_key: None,
            api_url: default_api_url(),
            local_command: default_local_command(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.remove.bg/v1.0/removebg".to_string()
}
fn default_local_command() -> Vec<String> {
    vec!["rembg".to_string(), "i".to_string()]
}

#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    async fn remove(&self, input: &Path, output: &Path) -> Result<(), GenerationError>;
}

// --- Local segmentation command ---

pub struct LocalRemover {
    command: Vec<String>,
}

impl LocalRemover {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl BackgroundRemover for LocalRemover {
    async fn remove(&self, input: &Path, output: &Path) -> Result<(), GenerationError> {
        let (program, args) = self.command.split_first().ok_or_else(|| {
            GenerationError::BackgroundRemoval("local_command is empty".to_string())
        })?;

        let result = Command::new(program)
            .args(args)
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                GenerationError::BackgroundRemoval(format!("Failed to start {}: {}", program, e))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(GenerationError::BackgroundRemoval(format!(
                "{} exited with {}: {}",
                program,
                result.status,
                stderr.trim()
            )));
        }
        if !tokio::fs::try_exists(output).await? {
            return Err(GenerationError::BackgroundRemoval(format!(
                "{} finished but wrote no {}",
                program,
                output.display()
            )));
        }
        Ok(())
    }
}

// --- remove.bg ---

pub struct HostedRemover {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HostedRemover {
    pub fn new(api_url: &str, api_key: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl BackgroundRemover for HostedRemover {
    async fn remove(&self, input: &Path, output: &Path) -> Result<(), GenerationError> {
        let data = tokio::fs::read(input).await?;
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());

        let part = multipart::Part::bytes(data).file_name(file_name);
        let form = multipart::Form::new()
            .part("image_file", part)
            .text("size", "auto");

        let resp = self
            .client
            .post(&self.api_url)
            .header("X-Api-Key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| GenerationError::BackgroundRemoval(format!("Request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::BackgroundRemoval(format!(
                "API error: {} - {}",
                status, body
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| GenerationError::BackgroundRemoval(format!("Failed to read body: {}", e)))?;
        tokio::fs::write(output, &bytes).await?;
        Ok(())
    }
}

/// Explicit key, then config, then the environment value. Blank keys count as absent.
pub fn resolve_api_key(
    explicit: Option<&str>,
    configured: Option<&str>,
    from_env: Option<String>,
) -> Option<String> {
    [explicit.map(str::to_string), configured.map(str::to_string), from_env]
        .into_iter()
        .flatten()
        .find(|k| !k.trim().is_empty())
}

pub fn create_remover(
    config: &BackgroundConfig,
    mode: BackgroundMode,
    api_key: Option<&str>,
) -> Result<Box<dyn BackgroundRemover>, GenerationError> {
    match mode {
        BackgroundMode::Local => Ok(Box::new(LocalRemover::new(config.local_command.clone()))),
        BackgroundMode::Hosted => {
            let key = resolve_api_key(
                api_key,
                config.api_key.as_deref(),
                std::env::var(API_KEY_ENV).ok(),
            )
            .ok_or_else(|| {
                GenerationError::MissingCredential(format!(
                    "{} environment variable or api_key parameter required",
                    API_KEY_ENV
                ))
            })?;
            Ok(Box::new(HostedRemover::new(&config.api_url, &key)))
        }
    }
}

/// Removes the background of `input`, writing `<stem>_nobg.png` next to it unless `output` is given.
pub async fn remove_background(
    remover: &dyn BackgroundRemover,
    input: &Path,
    output: Option<&Path>,
) -> Result<PathBuf, GenerationError> {
    if !tokio::fs::try_exists(input).await? {
        return Err(GenerationError::MissingReferenceFile {
            role: "input".to_string(),
            path: input.to_path_buf(),
        });
    }

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_nobg_path(input));

    info!("Removing background: {:?}", input);
    match remover.remove(input, &output).await {
        Ok(()) => {
            info!("Background removed: {:?}", output);
            Ok(output)
        }
        Err(e) => {
            warn!("Background removal failed for {:?}: {}", input, e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::{Arc, Mutex};

    struct CopyRemover {
        calls: Arc<Mutex<Vec<PathBuf>>>,
    }

    #[async_trait]
    impl BackgroundRemover for CopyRemover {
        async fn remove(&self, input: &Path, output: &Path) -> Result<(), GenerationError> {
            self.calls.lock().unwrap().push(output.to_path_buf());
            fs::copy(input, output)?;
            Ok(())
        }
    }

    #[test]
    fn test_resolve_api_key_precedence() {
        assert_eq!(
            resolve_api_key(Some("a"), Some("b"), Some("c".to_string())).as_deref(),
            Some("a")
        );
        assert_eq!(
            resolve_api_key(None, Some("b"), Some("c".to_string())).as_deref(),
            Some("b")
        );
        assert_eq!(resolve_api_key(None, None, Some("c".to_string())).as_deref(), Some("c"));
        assert_eq!(resolve_api_key(None, None, None), None);
        assert_eq!(resolve_api_key(Some(" "), None, None), None);
    }

    #[test]
    fn test_hosted_without_key_fails_closed() {
        if std::env::var(API_KEY_ENV).is_ok() {
            return;
        }
        let result = create_remover(&BackgroundConfig::default(), BackgroundMode::Hosted, None);
        assert!(matches!(result, Err(GenerationError::MissingCredential(_))));
    }

    #[test]
    fn test_hosted_with_explicit_key() {
        let result = create_remover(
            &BackgroundConfig::default(),
            BackgroundMode::Hosted,
            Some("key"),
        );
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_default_output_path() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let input = temp_dir.path().join("bottle.jpg");
        fs::write(&input, b"jpg")?;

        let calls = Arc::new(Mutex::new(Vec::new()));
        let remover = CopyRemover {
            calls: calls.clone(),
        };
        let output = remove_background(&remover, &input, None).await?;

        assert_eq!(output, temp_dir.path().join("bottle_nobg.png"));
        assert!(output.exists());
        assert_eq!(calls.lock().unwrap().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_input_is_rejected_before_remover() {
        let temp_dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let remover = CopyRemover {
            calls: calls.clone(),
        };

        let result = remove_background(&remover, &temp_dir.path().join("nope.jpg"), None).await;
        assert!(matches!(
            result,
            Err(GenerationError::MissingReferenceFile { .. })
        ));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_command_receives_paths() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let input = temp_dir.path().join("bottle.jpg");
        let output = temp_dir.path().join("cut.png");
        fs::write(&input, b"jpg")?;

        let remover = LocalRemover::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "cp \"$1\" \"$2\"".to_string(),
            "rembg".to_string(),
        ]);
        let written = remove_background(&remover, &input, Some(&output)).await?;

        assert_eq!(written, output);
        assert_eq!(fs::read(&output)?, b"jpg");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_command_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("bottle.jpg");
        fs::write(&input, b"jpg").unwrap();

        let remover = LocalRemover::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo 'model missing' >&2; exit 1".to_string(),
            "rembg".to_string(),
        ]);
        match remove_background(&remover, &input, None).await {
            Err(GenerationError::BackgroundRemoval(msg)) => assert!(msg.contains("model missing")),
            other => panic!("expected BackgroundRemoval, got {:?}", other),
        }
    }
}
