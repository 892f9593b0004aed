use crate::core::error::GenerationError;
use crate::core::io::Storage;
use crate::core::job::{GenerationRequest, ReferenceImageMapping};
use crate::services::engine::{EngineJob, GenerationEngine};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const JOB_CONFIG_FILE: &str = "scene_config.json";

/// What a finished dispatch leaves behind for artifact resolution.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    pub config_path: PathBuf,
    pub output_dir: PathBuf,
    pub reported_artifacts: Vec<PathBuf>,
}

/// Writes the job config and hands it to the generation engine. Never retries.
pub struct Dispatcher {
    engine: Arc<dyn GenerationEngine>,
    storage: Arc<dyn Storage>,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<dyn GenerationEngine>,
        storage: Arc<dyn Storage>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            engine,
            storage,
            timeout,
        }
    }

    pub async fn dispatch(
        &self,
        request: &GenerationRequest,
    ) -> Result<DispatchHandle, GenerationError> {
        for scene in &request.job.scenes {
            for role in &scene.required_refs {
                if !request.reference_images.contains_key(role) {
                    return Err(GenerationError::InvalidJob {
                        scene: scene.scene_ref.clone(),
                        role: role.clone(),
                    });
                }
            }
        }

        let reference_images = resolve_reference_images(&request.reference_images).await?;

        let config_path = request.output_dir.join(JOB_CONFIG_FILE);
        let content = serde_json::to_string_pretty(&request.job)?;
        self.storage
            .write(&config_path, content.as_bytes())
            .await
            .map_err(|e| GenerationError::Io(std::io::Error::other(format!("{:#}", e))))?;

        let engine_job = EngineJob {
            config_path: config_path.clone(),
            reference_images,
            params: request.params.clone(),
            download_folder: request.output_dir.clone(),
        };

        info!(
            "Dispatching job to {} engine (model {}, {}, {})",
            self.engine.name(),
            request.params.model,
            request.params.aspect_ratio,
            request.params.resolution
        );

        let run = self.engine.execute(&engine_job);
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    error!("Generation engine timed out after {:?}", limit);
                    return Err(GenerationError::DispatchTimeout(limit));
                }
            },
            None => run.await,
        };

        match outcome {
            Ok(output) => Ok(DispatchHandle {
                config_path,
                output_dir: request.output_dir.clone(),
                reported_artifacts: output.artifacts,
            }),
            Err(e) => {
                error!("Generation engine failed: {:#}", e);
                Err(GenerationError::Dispatch(format!("{:#}", e)))
            }
        }
    }
}

/// Absolute paths for every role; the first missing file fails the whole job.
pub async fn resolve_reference_images(
    mapping: &ReferenceImageMapping,
) -> Result<ReferenceImageMapping, GenerationError> {
    let mut resolved = ReferenceImageMapping::new();
    for (role, path) in mapping {
        let missing = || GenerationError::MissingReferenceFile {
            role: role.clone(),
            path: path.clone(),
        };
        let metadata = tokio::fs::metadata(path).await.map_err(|_| missing())?;
        if !metadata.is_file() {
            return Err(missing());
        }
        let absolute = tokio::fs::canonicalize(path).await.map_err(|_| missing())?;
        resolved.insert(role.clone(), absolute);
    }
    Ok(resolved)
}
