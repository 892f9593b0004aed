use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Unknown scene: {requested}. Available: [{}]", available.join(", "))]
    UnknownScene {
        requested: String,
        available: Vec<String>,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid job: scene '{scene}' requires reference role '{role}' which has no image")]
    InvalidJob { scene: String, role: String },

    #[error("Missing reference file for role '{role}': {}", path.display())]
    MissingReferenceFile { role: String, path: PathBuf },

    #[error("Generation engine failed: {0}")]
    Dispatch(String),

    #[error("Generation engine did not finish within {}s", .0.as_secs())]
    DispatchTimeout(Duration),

    #[error("No artifact produced in {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Background removal failed: {0}")]
    BackgroundRemoval(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
