use crate::core::io::{FileEntry, Storage};
use anyhow::Result;
use log::{debug, warn};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub const RASTER_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

pub fn is_raster_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| RASTER_EXTENSIONS.iter().any(|r| e.eq_ignore_ascii_case(r)))
        .unwrap_or(false)
}

/// Finds the image a finished dispatch produced.
///
/// Engine-reported paths are trusted first when they exist inside the output
/// directory. Otherwise the directory is scanned (non-recursively) and the most
/// recently modified raster file wins; equal timestamps fall back to file name
/// so the choice does not depend on directory-listing order.
pub struct ArtifactResolver {
    storage: Arc<dyn Storage>,
}

impl ArtifactResolver {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn resolve(&self, output_dir: &Path, reported: &[PathBuf]) -> Result<Option<PathBuf>> {
        for path in reported {
            let candidate = if path.is_absolute() {
                path.clone()
            } else {
                output_dir.join(path)
            };
            if !is_raster_image(&candidate) || !is_inside(&candidate, output_dir) {
                warn!("Ignoring reported artifact outside output folder: {:?}", candidate);
                continue;
            }
            if self.storage.exists(&candidate).await? {
                debug!("Using engine-reported artifact {:?}", candidate);
                return Ok(Some(candidate));
            }
            warn!("Engine reported {:?} but it does not exist", candidate);
        }

        let entries = self.storage.list(output_dir).await?;
        Ok(pick_most_recent(entries))
    }
}

/// Component-wise containment; any `..` disqualifies the path.
fn is_inside(candidate: &Path, dir: &Path) -> bool {
    candidate.starts_with(dir)
        && !candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
}

fn pick_most_recent(entries: Vec<FileEntry>) -> Option<PathBuf> {
    entries
        .into_iter()
        .filter(|e| e.is_file && is_raster_image(&e.path))
        .max_by(|a, b| {
            a.modified
                .cmp(&b.modified)
                .then_with(|| b.path.file_name().cmp(&a.path.file_name()))
        })
        .map(|e| e.path)
}
