use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::detection::domain::landmark_detector::LandmarkDetector;
use crate::detection::domain::landmark_set::LandmarkSet;
use crate::io::domain::frame_reader::FrameReader;
use crate::io::infrastructure::reference_landmarks::{load_reference, reference_path};
use crate::masking::domain::face_mask::FaceMask;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::selection::domain::frame_graph::{FrameGraph, SelectionError};
use crate::selection::domain::shortest_path::select_path;
use crate::shared::frame::Frame;

/// Where the face mask's landmarks come from.
pub enum MaskSource {
    /// Detect the face on the first aligned frame.
    Detect(Box<dyn LandmarkDetector>),
    /// Landmarks saved when the frames were aligned.
    Landmarks(LandmarkSet),
}

impl MaskSource {
    /// The reference landmarks saved by `align` into `aligned_dir`.
    pub fn saved(aligned_dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        match load_reference(aligned_dir)? {
            Some(landmarks) => Ok(Self::Landmarks(landmarks)),
            None => Err(format!(
                "No reference landmarks at {}; run align into this directory first",
                reference_path(aligned_dir).display()
            )
            .into()),
        }
    }
}

/// Orchestrates the `framedrop` command: picks one aligned frame per layer
/// of `frame_skip` so that consecutive picks change as little as possible
/// inside the face.
pub struct SelectFramesUseCase {
    reader: Box<dyn FrameReader>,
    mask_source: MaskSource,
    logger: Box<dyn PipelineLogger>,
}

impl SelectFramesUseCase {
    pub fn new(
        reader: Box<dyn FrameReader>,
        mask_source: MaskSource,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            reader,
            mask_source,
            logger,
        }
    }

    /// Returns the retained subset of `files`, in time order.
    ///
    /// The face mask is drawn on the first file's canvas; every file must
    /// share its dimensions.
    pub fn execute(
        &mut self,
        files: &[PathBuf],
        frame_skip: usize,
        erode_amount: usize,
    ) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
        if frame_skip == 0 {
            return Err(SelectionError::InvalidLayerSize.into());
        }
        if files.len() <= frame_skip {
            return Err(SelectionError::InsufficientFrames {
                required: frame_skip + 1,
                found: files.len(),
            }
            .into());
        }

        let first = self.reader.read(&files[0], 0)?;
        let landmarks = match &mut self.mask_source {
            MaskSource::Detect(detector) => detector
                .detect(&first)
                .map_err(|e| format!("Cannot build face mask from {}: {e}", first.name()))?,
            MaskSource::Landmarks(landmarks) => landmarks.clone(),
        };
        let mask =
            FaceMask::from_landmarks(first.width(), first.height(), &landmarks).eroded(erode_amount);
        if mask.sum() == 0.0 {
            log::warn!("Face mask is empty after erosion by {erode_amount}; all frames weigh equally");
        }
        log::debug!("Face mask covers {} pixels", mask.sum());

        let start = Instant::now();
        let total = files.len();
        let reader = self.reader.as_ref();
        let logger = self.logger.as_mut();
        let rest = files.iter().enumerate().skip(1).map(|(index, path)| {
            logger.progress(index + 1, total);
            reader.read(path, index)
        });
        let frames = std::iter::once(Ok::<Frame, Box<dyn std::error::Error>>(first)).chain(rest);
        let graph = FrameGraph::build(frames, &mask, frame_skip)?;
        self.logger
            .timing("graph", start.elapsed().as_secs_f64() * 1000.0);

        let start = Instant::now();
        let selection = select_path(&graph)?;
        self.logger
            .timing("select", start.elapsed().as_secs_f64() * 1000.0);
        log::debug!("Selected path cost {:.1}", selection.cost());

        self.logger.info(&format!(
            "Kept {} / {} ({:.1} %) frames",
            selection.ids().len(),
            selection.total(),
            selection.kept_percent()
        ));
        self.logger.summary();

        Ok(selection.ids().iter().map(|&id| files[id].clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::infrastructure::bilinear_warper::BilinearWarper;
    use crate::detection::domain::landmark_detector::{DetectionError, LandmarkDetectorFactory};
    use crate::detection::infrastructure::json_landmark_detector::{
        JsonLandmarkDetector, LandmarkTable,
    };
    use crate::io::infrastructure::image_file_reader::ImageFileReader;
    use crate::io::infrastructure::image_file_writer::ImageFileWriter;
    use crate::io::infrastructure::input_files::aligned_files;
    use crate::pipeline::align_executor::AlignConfig;
    use crate::pipeline::align_frames_use_case::AlignFramesUseCase;
    use crate::pipeline::infrastructure::threaded_align_executor::ThreadedAlignExecutor;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use tempfile::TempDir;
    use std::sync::{Arc, Mutex};

    // --- Stubs ---

    /// Uniform gray frames; the level for `frames/{i}.png` is `levels[i]`.
    struct StubReader {
        levels: Vec<u8>,
        reads: Arc<Mutex<Vec<usize>>>,
    }

    impl FrameReader for StubReader {
        fn read(&self, path: &Path, index: usize) -> Result<Frame, Box<dyn std::error::Error>> {
            self.reads.lock().unwrap().push(index);
            let level = *self.levels.get(index).ok_or("no such frame")?;
            let (w, h) = if path.ends_with("small.png") { (8, 8) } else { (16, 12) };
            Ok(Frame::new(vec![level; w * h * 3], w as u32, h as u32, 3, index)
                .with_name(path.to_string_lossy()))
        }
    }

    struct StubDetector {
        result: Result<LandmarkSet, DetectionError>,
    }

    impl LandmarkDetector for StubDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<LandmarkSet, DetectionError> {
            self.result.clone()
        }
    }

    struct RecordingLogger {
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl PipelineLogger for RecordingLogger {
        fn progress(&mut self, _current: usize, _total: usize) {}
        fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
        fn metric(&mut self, _name: &str, _value: f64) {}
        fn info(&mut self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    // --- Helpers ---

    fn face() -> LandmarkSet {
        LandmarkSet::new(vec![(3.0, 2.0), (12.0, 2.0), (12.0, 9.0), (3.0, 9.0)])
    }

    fn files(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("frames/{i}.png"))).collect()
    }

    struct Harness {
        use_case: SelectFramesUseCase,
        reads: Arc<Mutex<Vec<usize>>>,
        messages: Arc<Mutex<Vec<String>>>,
    }

    fn harness(levels: Vec<u8>, detection: Result<LandmarkSet, DetectionError>) -> Harness {
        let reads = Arc::new(Mutex::new(Vec::new()));
        let messages = Arc::new(Mutex::new(Vec::new()));
        let use_case = SelectFramesUseCase::new(
            Box::new(StubReader {
                levels,
                reads: reads.clone(),
            }),
            MaskSource::Detect(Box::new(StubDetector { result: detection })),
            Box::new(RecordingLogger {
                messages: messages.clone(),
            }),
        );
        Harness {
            use_case,
            reads,
            messages,
        }
    }

    // --- Tests ---

    #[test]
    fn test_keeps_smoothest_frame_per_layer() {
        let mut h = harness(vec![100, 150, 152, 10], Ok(face()));
        let kept = h.use_case.execute(&files(4), 2, 1).unwrap();
        assert_eq!(
            kept,
            vec![PathBuf::from("frames/1.png"), PathBuf::from("frames/2.png")]
        );
        assert!(h
            .messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m == "Kept 2 / 4 (50.0 %) frames"));
    }

    #[test]
    fn test_each_file_is_read_once_in_order() {
        let mut h = harness(vec![10, 20, 30, 40, 50], Ok(face()));
        let kept = h.use_case.execute(&files(5), 2, 1).unwrap();
        assert_eq!(kept.len(), 3);
        assert_eq!(*h.reads.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_too_few_frames_fails_before_reading() {
        let mut h = harness(vec![10, 20], Ok(face()));
        let err = h.use_case.execute(&files(2), 2, 1).unwrap_err();
        assert!(err.to_string().contains("need at least 3 frames, found 2"));
        assert!(h.reads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_zero_frame_skip_is_rejected() {
        let mut h = harness(vec![10, 20], Ok(face()));
        let err = h.use_case.execute(&files(2), 0, 1).unwrap_err();
        assert!(err.to_string().contains("layer size"));
    }

    #[test]
    fn test_mask_detection_failure_is_fatal() {
        let mut h = harness(vec![10, 20, 30], Err(DetectionError::NoFaceDetected));
        let err = h.use_case.execute(&files(3), 1, 1).unwrap_err();
        assert!(err.to_string().contains("Cannot build face mask from frames/0.png"));
    }

    #[test]
    fn test_mismatched_frame_size_is_fatal() {
        let mut h = harness(vec![10, 20, 30], Ok(face()));
        let mut paths = files(2);
        paths.push(PathBuf::from("frames/small.png"));
        let err = h.use_case.execute(&paths, 1, 1).unwrap_err();
        assert!(err.to_string().contains("frames/small.png"));
    }

    #[test]
    fn test_saved_landmarks_replace_detection() {
        let reads = Arc::new(Mutex::new(Vec::new()));
        let mut use_case = SelectFramesUseCase::new(
            Box::new(StubReader {
                levels: vec![100, 150, 152, 10],
                reads: reads.clone(),
            }),
            MaskSource::Landmarks(face()),
            Box::new(RecordingLogger {
                messages: Arc::new(Mutex::new(Vec::new())),
            }),
        );
        let kept = use_case.execute(&files(4), 2, 1).unwrap();
        assert_eq!(
            kept,
            vec![PathBuf::from("frames/1.png"), PathBuf::from("frames/2.png")]
        );
    }

    #[test]
    fn test_missing_saved_landmarks_is_error() {
        let tmp = TempDir::new().unwrap();
        let err = MaskSource::saved(tmp.path()).err().unwrap();
        assert!(err.to_string().contains("run align"));
    }

    /// Aligns photos with precomputed landmarks, then selects from the
    /// aligned output. The table only knows the original photo names.
    #[test]
    fn test_framedrop_after_alignment_with_precomputed_landmarks() {
        let tmp = TempDir::new().unwrap();
        let mut faces = serde_json::Map::new();
        let mut photos = Vec::new();
        for i in 0..6u32 {
            let name = format!("IMG_{:04}.png", i + 1);
            let path = tmp.path().join(&name);
            image::RgbImage::from_pixel(40, 32, image::Rgb([60 + 15 * i as u8, 80, 90]))
                .save(&path)
                .unwrap();
            let dx = i as f64;
            faces.insert(
                name,
                serde_json::json!([[[10.0 + dx, 8.0], [26.0 + dx, 8.0], [18.0 + dx, 22.0]]]),
            );
            photos.push(path);
        }
        let table_path = tmp.path().join("landmarks.json");
        std::fs::write(&table_path, serde_json::Value::Object(faces).to_string()).unwrap();
        let table = Arc::new(LandmarkTable::load(&table_path).unwrap());

        let aligned_dir = tmp.path().join("aligned");
        let factory_table = table.clone();
        let factory: LandmarkDetectorFactory = Box::new(move || {
            Ok(Box::new(JsonLandmarkDetector::new(factory_table.clone())) as Box<dyn LandmarkDetector>)
        });
        let mut align = AlignFramesUseCase::new(
            Box::new(ImageFileReader::new()),
            Box::new(ImageFileWriter::new()),
            factory,
            Box::new(BilinearWarper::new()),
            Box::new(ThreadedAlignExecutor::new()),
            Box::new(NullPipelineLogger),
        );
        let config = AlignConfig {
            img_thresh: 0.0,
            ref_color: None,
            output_dir: aligned_dir.clone(),
            out_extension: "png".into(),
        };
        let summary = align.execute(photos, &config, 2).unwrap();
        assert_eq!(summary.written, 6);

        let aligned = aligned_files(&aligned_dir, "png").unwrap();
        assert_eq!(aligned.len(), 6);

        // The aligned names are unknown to the table.
        let mut by_detection = SelectFramesUseCase::new(
            Box::new(ImageFileReader::new()),
            MaskSource::Detect(Box::new(JsonLandmarkDetector::new(table))),
            Box::new(NullPipelineLogger),
        );
        let err = by_detection.execute(&aligned, 2, 3).unwrap_err();
        assert!(err.to_string().contains("Cannot build face mask"));

        let mut by_reference = SelectFramesUseCase::new(
            Box::new(ImageFileReader::new()),
            MaskSource::saved(&aligned_dir).unwrap(),
            Box::new(NullPipelineLogger),
        );
        let kept = by_reference.execute(&aligned, 2, 3).unwrap();
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|p| aligned.contains(p)));
        assert!(kept.windows(2).all(|w| w[0] < w[1]));
    }
}
