use crate::core::config::Config;
use crate::core::error::GenerationError;
use crate::core::io::Storage;
use crate::core::job::{
    BatchResult, GenerationRequest, GenerationResult, RenderParams, SceneOutcome, Stage,
};
use crate::services::artifacts::ArtifactResolver;
use crate::services::dispatcher::Dispatcher;
use crate::services::engine::GenerationEngine;
use crate::services::job_builder::JobBuilder;
use crate::services::scenes::{SceneRegistry, DEFAULT_BATCH_SCENES, DEFAULT_SCENE};
use crate::utils::paths::{claim_unique_dir, scene_folder_names};
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// One "produce one image" request.
#[derive(Debug, Clone)]
pub struct SceneJob {
    pub product_image: PathBuf,
    pub scene_id: Option<String>,
    pub custom_prompt: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub params: RenderParams,
}

impl SceneJob {
    pub fn new(product_image: impl Into<PathBuf>, params: RenderParams) -> Self {
        Self {
            product_image: product_image.into(),
            scene_id: None,
            custom_prompt: None,
            output_dir: None,
            params,
        }
    }

    pub fn with_scene(mut self, scene_id: &str) -> Self {
        self.scene_id = Some(scene_id.to_string());
        self
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.custom_prompt = Some(prompt.to_string());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    fn scene_label(&self) -> &str {
        if self.custom_prompt.as_deref().is_some_and(|p| !p.trim().is_empty()) {
            "custom"
        } else {
            self.scene_id.as_deref().unwrap_or(DEFAULT_SCENE)
        }
    }
}

pub struct WorkflowManager {
    config: Config,
    builder: JobBuilder,
    dispatcher: Dispatcher,
    resolver: ArtifactResolver,
    storage: Arc<dyn Storage>,
}

impl WorkflowManager {
    pub fn new(
        config: Config,
        engine: Arc<dyn GenerationEngine>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        let registry = Arc::new(SceneRegistry::with_overrides(&config.scenes)?);
        let builder = JobBuilder::new(registry, config.persona.clone(), &config.story_title);
        let timeout = config.engine.timeout_seconds.map(Duration::from_secs);
        let dispatcher = Dispatcher::new(engine, storage.clone(), timeout);
        let resolver = ArtifactResolver::new(storage.clone());

        Ok(Self {
            config,
            builder,
            dispatcher,
            resolver,
            storage,
        })
    }

    pub fn registry(&self) -> &SceneRegistry {
        self.builder.registry()
    }

    /// Building -> Dispatching -> Resolving. Every failure comes back as a value.
    pub async fn generate_one(&self, job: &SceneJob) -> GenerationResult {
        self.run_scene(job, None).await.1
    }

    async fn run_scene(
        &self,
        job: &SceneJob,
        pb: Option<&ProgressBar>,
    ) -> (Option<PathBuf>, GenerationResult) {
        let scene = job.scene_label().to_string();
        info!("[{}] building job", scene);

        let descriptor = match self
            .builder
            .build(job.scene_id.as_deref(), job.custom_prompt.as_deref())
        {
            Ok(d) => d,
            Err(e) => return (None, self.fail(pb, &scene, Stage::Building, e)),
        };

        let output_dir = match self.prepare_output_dir(job.output_dir.as_deref()).await {
            Ok(dir) => dir,
            Err(e) => {
                let cause = format!("{:#}", e);
                return (None, self.fail(pb, &scene, Stage::Dispatching, cause));
            }
        };

        let prompt = descriptor.prompt().unwrap_or_default();
        say(pb, "Generating image");
        say(pb, &format!("   - Persona image: {}", self.config.persona.face_image.display()));
        say(pb, &format!("   - Product image: {}", job.product_image.display()));
        say(pb, &format!("   - Scene: {}", scene));
        say(pb, &format!("   - Prompt: {}...", prompt.chars().take(50).collect::<String>()));

        let request = GenerationRequest {
            reference_images: self.builder.reference_images(&job.product_image),
            job: descriptor,
            params: job.params.clone(),
            output_dir: output_dir.clone(),
        };

        info!("[{}] dispatching into {:?}", scene, output_dir);
        let handle = match self.dispatcher.dispatch(&request).await {
            Ok(h) => h,
            Err(e) => return (Some(output_dir), self.fail(pb, &scene, Stage::Dispatching, e)),
        };

        info!("[{}] resolving artifact", scene);
        let result = match self
            .resolver
            .resolve(&handle.output_dir, &handle.reported_artifacts)
            .await
        {
            Ok(Some(artifact)) => {
                say(pb, &format!("Image generated: {}", artifact.display()));
                GenerationResult::Succeeded { artifact }
            }
            Ok(None) => self.fail(
                pb,
                &scene,
                Stage::Resolving,
                GenerationError::ArtifactNotFound(handle.output_dir.clone()),
            ),
            Err(e) => self.fail(pb, &scene, Stage::Resolving, format!("{:#}", e)),
        };
        (Some(output_dir), result)
    }

    fn fail(
        &self,
        pb: Option<&ProgressBar>,
        scene: &str,
        stage: Stage,
        cause: impl ToString,
    ) -> GenerationResult {
        let cause = cause.to_string();
        warn!("[{}] failed while {}: {}", scene, stage, cause);
        say(pb, &format!("Image generation failed: {}", cause));
        GenerationResult::Failed { stage, cause }
    }

    async fn prepare_output_dir(&self, requested: Option<&Path>) -> Result<PathBuf> {
        let dir = match requested {
            Some(dir) => {
                self.storage.create_dir_all(dir).await?;
                dir.to_path_buf()
            }
            None => claim_unique_dir(Path::new(&self.config.output_folder), "product_output")?,
        };
        Ok(std::path::absolute(&dir)?)
    }

    /// Runs scenes one after another into `<root>/<scene>`; a failed scene never stops the batch.
    pub async fn generate_many(
        &self,
        product_image: &Path,
        scene_ids: &[String],
        output_root: Option<&Path>,
        params: &RenderParams,
    ) -> BatchResult {
        let scene_ids: Vec<String> = if scene_ids.is_empty() {
            DEFAULT_BATCH_SCENES.iter().map(|s| s.to_string()).collect()
        } else {
            scene_ids.to_vec()
        };
        let folders = scene_folder_names(&scene_ids);
        let total = scene_ids.len();
        let mut batch = BatchResult::default();

        let root = match output_root {
            Some(root) => self.storage.create_dir_all(root).await.map(|_| root.to_path_buf()),
            None => claim_unique_dir(Path::new(&self.config.output_folder), "product_batch")
                .map_err(anyhow::Error::from),
        };
        let root = match root {
            Ok(root) => root,
            Err(e) => {
                let cause = format!("Failed to prepare batch folder: {:#}", e);
                for (scene_id, folder) in scene_ids.iter().zip(&folders) {
                    batch.push(SceneOutcome {
                        scene_id: scene_id.clone(),
                        output_dir: PathBuf::from(folder),
                        result: self.fail(None, scene_id, Stage::Dispatching, &cause),
                    });
                }
                return batch;
            }
        };

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        for (i, (scene_id, folder)) in scene_ids.iter().zip(&folders).enumerate() {
            pb.set_message(scene_id.clone());
            pb.println(format!("\n[{}/{}] Generating {} scene...", i + 1, total, scene_id));

            let job = SceneJob {
                product_image: product_image.to_path_buf(),
                scene_id: Some(scene_id.clone()),
                custom_prompt: None,
                output_dir: Some(root.join(folder)),
                params: params.clone(),
            };
            let (dir, result) = self.run_scene(&job, Some(&pb)).await;

            batch.push(SceneOutcome {
                scene_id: scene_id.clone(),
                output_dir: dir.unwrap_or_else(|| root.join(folder)),
                result,
            });
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!("Batch finished: {}/{} succeeded", batch.succeeded(), batch.attempted());
        println!(
            "\nGenerated {}/{} images",
            batch.succeeded(),
            batch.attempted()
        );
        batch
    }
}

/// Prints above the progress bar when one is drawing.
fn say(pb: Option<&ProgressBar>, line: &str) {
    match pb {
        Some(pb) => pb.println(line),
        None => println!("{}", line),
    }
}
