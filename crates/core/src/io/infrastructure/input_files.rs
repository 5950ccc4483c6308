use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::settings::ConfigError;
use crate::shared::constants::IMAGE_EXTENSIONS;

#[derive(Error, Debug)]
pub enum InputFilesError {
    #[error("invalid glob pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("cannot read {0}")]
    Entry(#[from] glob::GlobError),
}

/// Expand `pattern` into image files sorted by path.
///
/// Directories and files without a known image extension are skipped.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>, InputFilesError> {
    let entries = glob::glob(pattern).map_err(|source| InputFilesError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?;
        if !path.is_file() {
            continue;
        }
        if !has_image_extension(&path) {
            log::debug!("Skipping non-image file {}", path.display());
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// Aligned frames in `dir` with extension `ext`, sorted by name.
pub fn aligned_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, InputFilesError> {
    expand_glob(&aligned_pattern(dir, ext))
}

/// Create `dir` if needed and delete existing `*.{ext}` files from it.
///
/// Returns the number of files removed.
pub fn prepare_output_dir(dir: &Path, ext: &str) -> Result<usize, Box<dyn std::error::Error>> {
    if dir.exists() && !dir.is_dir() {
        return Err(ConfigError::NotADirectory(dir.to_path_buf()).into());
    }
    fs::create_dir_all(dir)?;

    let mut removed = 0;
    for entry in glob::glob(&aligned_pattern(dir, ext))? {
        let path = entry?;
        if path.is_file() {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    if removed > 0 {
        log::info!("Removed {removed} existing files from {}", dir.display());
    }
    Ok(removed)
}

fn aligned_pattern(dir: &Path, ext: &str) -> String {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    format!("{escaped}/*.{ext}")
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
