use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::detection::domain::landmark_detector::{DetectionError, LandmarkDetector};
use crate::detection::domain::landmark_set::LandmarkSet;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum LandmarkFileError {
    #[error("failed to read landmarks file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse landmarks file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Faces per file name, each face a list of `[x, y]` points.
type FaceTable = HashMap<String, Vec<Vec<[f64; 2]>>>;

/// Precomputed landmarks loaded once and shared between workers.
#[derive(Debug)]
pub struct LandmarkTable {
    faces: FaceTable,
    cardinality: Option<usize>,
}

impl LandmarkTable {
    pub fn load(path: &Path) -> Result<Self, LandmarkFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| LandmarkFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let faces: FaceTable =
            serde_json::from_str(&text).map_err(|source| LandmarkFileError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        log::debug!(
            "Loaded landmarks for {} files from {}",
            faces.len(),
            path.display()
        );
        Ok(Self::from_faces(faces))
    }

    fn from_faces(faces: FaceTable) -> Self {
        // First face in file-name order fixes the expected point count.
        let mut names: Vec<&String> = faces.keys().collect();
        names.sort();
        let cardinality = names
            .iter()
            .filter_map(|name| faces[*name].first())
            .map(Vec::len)
            .next();
        Self { faces, cardinality }
    }

    pub fn cardinality(&self) -> Option<usize> {
        self.cardinality
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

/// Replays precomputed landmarks keyed by the frame's source file name.
pub struct JsonLandmarkDetector {
    table: Arc<LandmarkTable>,
}

impl JsonLandmarkDetector {
    pub fn new(table: Arc<LandmarkTable>) -> Self {
        Self { table }
    }
}

impl LandmarkDetector for JsonLandmarkDetector {
    fn detect(&mut self, frame: &Frame) -> Result<LandmarkSet, DetectionError> {
        let key = Path::new(frame.name())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| frame.name().to_string());

        let faces = match self.table.faces.get(&key) {
            Some(faces) => faces,
            None => return Err(DetectionError::NoFaceDetected),
        };
        let face = match faces.as_slice() {
            [] => return Err(DetectionError::NoFaceDetected),
            [face] => face,
            many => return Err(DetectionError::MultipleFacesDetected(many.len())),
        };

        let expected = self.table.cardinality.unwrap_or(face.len());
        if face.len() != expected {
            return Err(DetectionError::IncompleteLandmarks {
                found: face.len(),
                expected,
            });
        }
        Ok(LandmarkSet::new(face.iter().map(|[x, y]| (*x, *y)).collect()))
    }
}
