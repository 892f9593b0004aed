use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use product2image::core::config::{Config, DEFAULT_CONFIG_PATH};
use product2image::core::io::NativeStorage;
use product2image::core::job::{AspectRatio, RenderParams, Resolution};
use product2image::services::background::{create_remover, remove_background, BackgroundMode};
use product2image::services::engine::create_engine;
use product2image::services::scenes::{SceneRegistry, DEFAULT_SCENE};
use product2image::services::setup;
use product2image::services::workflow::{SceneJob, WorkflowManager};
use std::path::PathBuf;
use std::sync::Arc;

/// Persona + product marketing image generator
#[derive(Parser)]
#[command(name = "product2image")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one image of the persona with the product
    Generate {
        /// Product image (background removed works best)
        product_image: PathBuf,
        /// Scene template id
        #[arg(long, default_value = DEFAULT_SCENE)]
        scene: String,
        /// Pick the scene interactively
        #[arg(long, conflicts_with = "prompt")]
        pick: bool,
        /// Custom prompt, used instead of the scene template
        #[arg(long)]
        prompt: Option<String>,
        /// Output folder (auto-generated if omitted)
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Generate several scenes for the same product, one after another
    Batch {
        product_image: PathBuf,
        /// Comma-separated scene ids (default: holding,unboxing,using)
        #[arg(long, value_delimiter = ',')]
        scenes: Vec<String>,
        /// Batch output folder (auto-generated if omitted)
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Remove the background of a product photo
    RemoveBg {
        input: PathBuf,
        /// Output image path (default: <name>_nobg.png)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Use the remove.bg API instead of the local model
        #[arg(long)]
        api: bool,
        /// remove.bg API key (falls back to config, then REMOVE_BG_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
    },
    /// List scene templates
    Scenes,
}

#[derive(Args)]
struct RenderArgs {
    /// Engine model code (e.g. nano_banana_2, nano_banana_pro)
    #[arg(long)]
    model: Option<String>,
    /// Aspect ratio (1:1, 9:16, 3:4, 4:3, 16:9)
    #[arg(long)]
    aspect_ratio: Option<AspectRatio>,
    /// Resolution (1K, 2K, 4K)
    #[arg(long)]
    resolution: Option<Resolution>,
    /// Turn off unlimited mode
    #[arg(long)]
    limited: bool,
}

impl RenderArgs {
    fn apply(&self, defaults: &RenderParams) -> RenderParams {
        RenderParams {
            model: self.model.clone().unwrap_or_else(|| defaults.model.clone()),
            aspect_ratio: self.aspect_ratio.unwrap_or(defaults.aspect_ratio),
            resolution: self.resolution.unwrap_or(defaults.resolution),
            unlimited_mode: defaults.unlimited_mode && !self.limited,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        match Config::load_from(&cli.config) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Error loading config: {:#}", e);
                return Err(e);
            }
        }
    } else {
        log::info!("{} not found, using defaults", cli.config.display());
        Config::default()
    };

    match cli.command {
        Commands::Scenes => {
            let registry = SceneRegistry::with_overrides(&config.scenes)?;
            for template in registry.templates() {
                println!("{:<10} {}", template.id, template.description);
                println!("{:<10} {}", "", template.prompt);
            }
        }
        Commands::RemoveBg {
            input,
            output,
            api,
            api_key,
        } => {
            let mode = if api {
                BackgroundMode::Hosted
            } else {
                config.background.provider
            };
            let result = match create_remover(&config.background, mode, api_key.as_deref()) {
                Ok(remover) => remove_background(remover.as_ref(), &input, output.as_deref()).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(path) => println!("Background removed: {}", path.display()),
                Err(e) => println!("Background removal failed: {}", e),
            }
        }
        Commands::Generate {
            product_image,
            scene,
            pick,
            prompt,
            output,
            render,
        } => {
            setup::run_setup(&mut config, &cli.config)?;
            config.ensure_directories()?;
            let params = render.apply(&config.generation);
            let manager = build_manager(&config)?;

            let scene = if pick {
                setup::select_scene(manager.registry())?
            } else {
                scene
            };
            let mut job = SceneJob::new(product_image, params).with_scene(&scene);
            if let Some(prompt) = prompt {
                job = job.with_prompt(&prompt);
            }
            if let Some(output) = output {
                job = job.with_output_dir(output);
            }

            match manager.generate_one(&job).await.artifact() {
                Some(path) => println!("{}", path.display()),
                None => println!("null"),
            }
        }
        Commands::Batch {
            product_image,
            scenes,
            output,
            render,
        } => {
            setup::run_setup(&mut config, &cli.config)?;
            config.ensure_directories()?;
            let params = render.apply(&config.generation);
            let manager = build_manager(&config)?;

            let batch = manager
                .generate_many(&product_image, &scenes, output.as_deref(), &params)
                .await;
            for outcome in &batch.outcomes {
                match outcome.result.artifact() {
                    Some(path) => println!("{:<10} {}", outcome.scene_id, path.display()),
                    None => println!("{:<10} null", outcome.scene_id),
                }
            }
        }
    }

    Ok(())
}

fn build_manager(config: &Config) -> Result<WorkflowManager> {
    let engine = create_engine(&config.engine)?;
    let storage = Arc::new(NativeStorage::new());
    WorkflowManager::new(config.clone(), engine, storage)
}
