use super::{EngineJob, EngineOutput, GenerationEngine};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpEngineConfig {
    pub base_url: String,
}

/// Automation engine exposed as a local HTTP service.
pub struct HttpEngine {
    base_url: String,
    client: reqwest::Client,
}

impl HttpEngine {
    pub fn new(config: HttpEngineConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/generate", self.base_url)
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct GenerateResponse {
    status: String,
    #[serde(default)]
    artifacts: Vec<PathBuf>,
    error: Option<String>,
}

pub(crate) fn interpret_response(result: GenerateResponse) -> Result<EngineOutput> {
    match result.status.as_str() {
        "success" => Ok(EngineOutput {
            artifacts: result.artifacts,
        }),
        "error" => {
            let error_msg = result.error.unwrap_or_else(|| "Unknown error".to_string());
            Err(anyhow!("Engine service error: {}", error_msg))
        }
        other => Err(anyhow!("Unexpected engine status: {}", other)),
    }
}

#[async_trait]
impl GenerationEngine for HttpEngine {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(&self, job: &EngineJob) -> Result<EngineOutput> {
        let url = self.endpoint();
        info!("Submitting generation job to {}", url);

        let resp = self
            .client
            .post(&url)
            .json(job)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to connect to engine service at {}: {}", url, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Engine service returned {}: {}", status, error_text));
        }

        let response_text = resp.text().await?;
        let result: GenerateResponse = serde_json::from_str(&response_text).map_err(|e| {
            anyhow!(
                "Failed to parse engine response: {}. Body: {}",
                e,
                response_text
            )
        })?;

        interpret_response(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_slash() {
        let engine = HttpEngine::new(HttpEngineConfig {
            base_url: "http://127.0.0.1:9000/".to_string(),
        });
        assert_eq!(engine.endpoint(), "http://127.0.0.1:9000/generate");
    }

    #[test]
    fn test_success_response() {
        let resp: GenerateResponse =
            serde_json::from_str(r#"{"status": "success", "artifacts": ["/out/a.png"]}"#).unwrap();
        let output = interpret_response(resp).unwrap();
        assert_eq!(output.artifacts, vec![PathBuf::from("/out/a.png")]);
    }

    #[test]
    fn test_success_without_artifacts() {
        let resp: GenerateResponse = serde_json::from_str(r#"{"status": "success"}"#).unwrap();
        assert!(interpret_response(resp).unwrap().artifacts.is_empty());
    }

    #[test]
    fn test_error_responses() {
        let resp: GenerateResponse =
            serde_json::from_str(r#"{"status": "error", "error": "login expired"}"#).unwrap();
        let err = interpret_response(resp).unwrap_err();
        assert!(err.to_string().contains("login expired"));

        let resp: GenerateResponse = serde_json::from_str(r#"{"status": "pending"}"#).unwrap();
        assert!(interpret_response(resp).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        let engine = HttpEngine::new(HttpEngineConfig {
            base_url: "http://127.0.0.1:1".to_string(),
        });
        let job = EngineJob {
            config_path: PathBuf::from("/tmp/scene_config.json"),
            reference_images: Default::default(),
            params: Default::default(),
            download_folder: PathBuf::from("/tmp"),
        };
        assert!(engine.execute(&job).await.is_err());
    }
}
