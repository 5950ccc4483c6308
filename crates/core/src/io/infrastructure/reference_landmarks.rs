use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::landmark_set::LandmarkSet;
use crate::shared::constants::REFERENCE_FILE_NAME;

#[derive(Error, Debug)]
pub enum ReferenceFileError {
    #[error("failed to access reference landmarks {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed reference landmarks {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Serialize, Deserialize)]
struct ReferenceFile {
    landmarks: Vec<[f64; 2]>,
}

/// Where the reference landmarks of the frames in `dir` are kept.
pub fn reference_path(dir: &Path) -> PathBuf {
    dir.join(REFERENCE_FILE_NAME)
}

/// Store the landmarks every frame in `dir` was aligned onto.
pub fn save_reference(dir: &Path, landmarks: &LandmarkSet) -> Result<(), ReferenceFileError> {
    let path = reference_path(dir);
    let file = ReferenceFile {
        landmarks: landmarks.points().iter().map(|&(x, y)| [x, y]).collect(),
    };
    let text = serde_json::to_string_pretty(&file).map_err(|source| ReferenceFileError::Format {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, text).map_err(|source| ReferenceFileError::Io { path, source })
}

/// Landmarks saved by the last alignment into `dir`, if any.
pub fn load_reference(dir: &Path) -> Result<Option<LandmarkSet>, ReferenceFileError> {
    let path = reference_path(dir);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(ReferenceFileError::Io { path, source }),
    };
    let file: ReferenceFile =
        serde_json::from_str(&text).map_err(|source| ReferenceFileError::Format {
            path: path.clone(),
            source,
        })?;
    Ok(Some(LandmarkSet::new(
        file.landmarks.into_iter().map(|[x, y]| (x, y)).collect(),
    )))
}

/// Remove a reference left by an earlier run. Missing is fine.
pub fn clear_reference(dir: &Path) -> Result<(), ReferenceFileError> {
    let path = reference_path(dir);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ReferenceFileError::Io { path, source }),
    }
}
