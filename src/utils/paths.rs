use chrono::Local;
use std::io;
use std::path::{Path, PathBuf};

const MAX_SUFFIX: u32 = 1000;

pub fn timestamp() -> String {
    Local::now().format("%y%m%d_%H%M%S_%3f").to_string()
}

/// Creates and returns a new `<root>/<prefix>_<timestamp>` directory.
///
/// The directory is claimed with a non-recursive create, so two callers racing
/// on the same timestamp end up with different suffixed names.
pub fn claim_unique_dir(root: &Path, prefix: &str) -> io::Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    let base = format!("{}_{}", prefix, timestamp());

    for n in 0..MAX_SUFFIX {
        let name = if n == 0 {
            base.clone()
        } else {
            format!("{}_{}", base, n)
        };
        let candidate = root.join(name);
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("could not claim a unique folder for {} under {}", prefix, root.display()),
    ))
}

/// `<dir>/<stem>_nobg.png`, next to the input image.
pub fn default_nobg_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    let parent = input.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{}_nobg.png", stem))
}

/// Folder names for each scene of a batch. Repeated ids get `_2`, `_3`, ...
pub fn scene_folder_names(scene_ids: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(scene_ids.len());
    for id in scene_ids {
        let mut name = id.clone();
        let mut n = 1;
        while names.contains(&name) {
            n += 1;
            name = format!("{}_{}", id, n);
        }
        names.push(name);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_unique_dir_never_reuses() -> io::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let a = claim_unique_dir(temp_dir.path(), "product_output")?;
        let b = claim_unique_dir(temp_dir.path(), "product_output")?;

        assert_ne!(a, b);
        assert!(a.is_dir());
        assert!(b.is_dir());
        assert!(a
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("product_output_"));
        Ok(())
    }

    #[test]
    fn test_default_nobg_path() {
        assert_eq!(
            default_nobg_path(Path::new("/photos/bottle.jpg")),
            PathBuf::from("/photos/bottle_nobg.png")
        );
        assert_eq!(
            default_nobg_path(Path::new("bottle.webp")),
            PathBuf::from("bottle_nobg.png")
        );
    }

    #[test]
    fn test_scene_folder_names_are_disjoint() {
        let ids: Vec<String> = ["holding", "using", "holding", "holding"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            scene_folder_names(&ids),
            vec!["holding", "using", "holding_2", "holding_3"]
        );
    }
}
