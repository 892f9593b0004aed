use super::{EngineJob, EngineOutput, GenerationEngine};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Stdout prefix the automation tool uses to report a saved image.
pub const ARTIFACT_PREFIX: &str = "ARTIFACT:";
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommandEngineConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Placed before the generated flags.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for CommandEngineConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            working_dir: None,
        }
    }
}

fn default_program() -> String {
    "higgs-automation".to_string()
}

/// Runs the image automation tool as a child process and waits for it to exit.
pub struct CommandEngine {
    config: CommandEngineConfig,
}

impl CommandEngine {
    pub fn new(config: CommandEngineConfig) -> Self {
        Self { config }
    }

    pub fn build_args(&self, job: &EngineJob) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.push("--config".to_string());
        args.push(job.config_path.to_string_lossy().to_string());
        for (role, path) in &job.reference_images {
            args.push("--ref".to_string());
            args.push(format!("{}={}", role, path.display()));
        }
        args.push("--aspect-ratio".to_string());
        args.push(job.params.aspect_ratio.to_string());
        args.push("--resolution".to_string());
        args.push(job.params.resolution.to_string());
        args.push("--download-folder".to_string());
        args.push(job.download_folder.to_string_lossy().to_string());
        args.push("--model".to_string());
        args.push(job.params.model.clone());
        if job.params.unlimited_mode {
            args.push("--unlimited".to_string());
        }
        args
    }
}

/// Next line of output with invalid UTF-8 replaced.
async fn next_lossy_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(&buf[..]);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

pub fn parse_artifact_line(line: &str) -> Option<PathBuf> {
    line.trim()
        .strip_prefix(ARTIFACT_PREFIX)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

#[async_trait]
impl GenerationEngine for CommandEngine {
    fn name(&self) -> &str {
        "command"
    }

    async fn execute(&self, job: &EngineJob) -> Result<EngineOutput> {
        let args = self.build_args(job);
        info!("Running {} {}", self.config.program, args.join(" "));

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&args)
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to start {}", self.config.program))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Failed to open stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("Failed to open stderr"))?;

        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES + 1);
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            while let Ok(Some(line)) = next_lossy_line(&mut reader, &mut buf).await {
                warn!("[engine] {}", line);
                tail.push_back(line);
                if tail.len() > STDERR_TAIL_LINES {
                    tail.pop_front();
                }
            }
            Vec::from(tail)
        });

        let mut artifacts = Vec::new();
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = next_lossy_line(&mut reader, &mut buf).await? {
            debug!("[engine] {}", line);
            if let Some(path) = parse_artifact_line(&line) {
                artifacts.push(path);
            }
        }

        let status = child.wait().await.context("Failed to wait for engine")?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let detail = if stderr_tail.is_empty() {
                String::new()
            } else {
                format!(": {}", stderr_tail.join(" | "))
            };
            return Err(anyhow!("{} exited with {}{}", self.config.program, status, detail));
        }

        Ok(EngineOutput { artifacts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::{AspectRatio, ReferenceImageMapping, RenderParams, Resolution};

    fn job(download_folder: PathBuf) -> EngineJob {
        let mut refs = ReferenceImageMapping::new();
        refs.insert("ref1".to_string(), PathBuf::from("/faces/a.jpg"));
        refs.insert("ref2".to_string(), PathBuf::from("/products/b.png"));
        EngineJob {
            config_path: download_folder.join("scene_config.json"),
            reference_images: refs,
            params: RenderParams {
                model: "nano_banana_pro".to_string(),
                aspect_ratio: AspectRatio::Portrait,
                resolution: Resolution::High,
                unlimited_mode: true,
            },
            download_folder,
        }
    }

    #[test]
    fn test_build_args() {
        let engine = CommandEngine::new(CommandEngineConfig {
            program: "python".to_string(),
            args: vec!["run_automation.py".to_string()],
            working_dir: None,
        });
        let args = engine.build_args(&job(PathBuf::from("/out")));

        assert_eq!(
            args,
            vec![
                "run_automation.py",
                "--config",
                "/out/scene_config.json",
                "--ref",
                "ref1=/faces/a.jpg",
                "--ref",
                "ref2=/products/b.png",
                "--aspect-ratio",
                "9:16",
                "--resolution",
                "4K",
                "--download-folder",
                "/out",
                "--model",
                "nano_banana_pro",
                "--unlimited",
            ]
        );
    }

    #[test]
    fn test_limited_mode_omits_flag() {
        let engine = CommandEngine::new(CommandEngineConfig::default());
        let mut job = job(PathBuf::from("/out"));
        job.params.unlimited_mode = false;
        assert!(!engine.build_args(&job).contains(&"--unlimited".to_string()));
    }

    #[test]
    fn test_parse_artifact_line() {
        assert_eq!(
            parse_artifact_line("ARTIFACT: /out/img 1.png"),
            Some(PathBuf::from("/out/img 1.png"))
        );
        assert_eq!(parse_artifact_line("ARTIFACT:   "), None);
        assert_eq!(parse_artifact_line("progress 50%"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_collects_reported_artifacts() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let script = r#"while [ $# -gt 0 ]; do
  if [ "$1" = "--download-folder" ]; then d="$2"; fi
  shift
done
touch "$d/generated.png"
echo "progress 100%"
echo "ARTIFACT: $d/generated.png""#;
        let engine = CommandEngine::new(CommandEngineConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "engine".to_string()],
            working_dir: None,
        });

        let output = engine.execute(&job(temp_dir.path().to_path_buf())).await?;
        assert_eq!(output.artifacts, vec![temp_dir.path().join("generated.png")]);
        assert!(temp_dir.path().join("generated.png").exists());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_survives_undecodable_output() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let script = r#"while [ $# -gt 0 ]; do
  if [ "$1" = "--download-folder" ]; then d="$2"; fi
  shift
done
printf '\377\376 progress\n'
printf '\377 warning\n' >&2
touch "$d/gen.png"
echo "ARTIFACT: $d/gen.png""#;
        let engine = CommandEngine::new(CommandEngineConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "engine".to_string()],
            working_dir: None,
        });

        let output = engine.execute(&job(temp_dir.path().to_path_buf())).await?;
        assert_eq!(output.artifacts, vec![temp_dir.path().join("gen.png")]);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_tail_keeps_last_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let engine = CommandEngine::new(CommandEngineConfig {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "i=1; while [ $i -le 30 ]; do echo \"line $i\" >&2; i=$((i+1)); done; exit 1"
                    .to_string(),
                "engine".to_string(),
            ],
            working_dir: None,
        });

        let err = engine
            .execute(&job(temp_dir.path().to_path_buf()))
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("line 30"), "{}", err);
        assert!(err.contains("line 11 |"), "{}", err);
        assert!(!err.contains("line 10 |"), "{}", err);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_failure_carries_stderr() {
        let temp_dir = tempfile::tempdir().unwrap();
        let engine = CommandEngine::new(CommandEngineConfig {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo 'quota exceeded' >&2; exit 3".to_string(),
                "engine".to_string(),
            ],
            working_dir: None,
        });

        let err = engine
            .execute(&job(temp_dir.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"), "{}", err);
    }

    #[tokio::test]
    async fn test_execute_missing_program() {
        let temp_dir = tempfile::tempdir().unwrap();
        let engine = CommandEngine::new(CommandEngineConfig {
            program: "definitely-not-a-real-engine-binary".to_string(),
            ..Default::default()
        });
        let err = engine
            .execute(&job(temp_dir.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to start"));
    }
}
