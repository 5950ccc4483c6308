use std::path::PathBuf;

use crate::alignment::domain::frame_warper::FrameWarper;
use crate::detection::domain::landmark_detector::{LandmarkDetector, LandmarkDetectorFactory};
use crate::io::domain::frame_reader::FrameReader;
use crate::io::domain::image_writer::ImageWriter;
use crate::io::infrastructure::reference_landmarks::{clear_reference, save_reference};
use crate::pipeline::align_executor::{AlignConfig, AlignExecutor, AlignSummary};
use crate::pipeline::pipeline_logger::PipelineLogger;

/// Orchestrates the `align` command: dedup, detect, register, write.
///
/// The reference landmarks are saved next to the aligned frames so that
/// `framedrop` can build its face mask without detecting again.
///
/// Single-use: `execute` consumes the owned reader and writer, so calling it
/// twice fails.
pub struct AlignFramesUseCase {
    reader: Option<Box<dyn FrameReader>>,
    writer: Option<Box<dyn ImageWriter>>,
    detector_factory: LandmarkDetectorFactory,
    warper: Box<dyn FrameWarper>,
    executor: Box<dyn AlignExecutor>,
    logger: Box<dyn PipelineLogger>,
}

impl AlignFramesUseCase {
    pub fn new(
        reader: Box<dyn FrameReader>,
        writer: Box<dyn ImageWriter>,
        detector_factory: LandmarkDetectorFactory,
        warper: Box<dyn FrameWarper>,
        executor: Box<dyn AlignExecutor>,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            reader: Some(reader),
            writer: Some(writer),
            detector_factory,
            warper,
            executor,
            logger,
        }
    }

    /// Align `inputs` (already sorted in time order) into `config.output_dir`
    /// using `workers` detection threads.
    pub fn execute(
        &mut self,
        inputs: Vec<PathBuf>,
        config: &AlignConfig,
        workers: usize,
    ) -> Result<AlignSummary, Box<dyn std::error::Error>> {
        let reader = self.reader.take().ok_or("Pipeline already executed")?;
        let writer = self.writer.take().ok_or("Pipeline already executed")?;

        let mut detectors: Vec<Box<dyn LandmarkDetector>> = Vec::with_capacity(workers);
        for _ in 0..workers.max(1) {
            detectors.push((self.detector_factory)().map_err(|e| e.to_string())?);
        }

        self.logger
            .info(&format!("Aligning {} images with {} workers", inputs.len(), detectors.len()));

        let summary = self.executor.execute(
            inputs,
            reader,
            writer,
            detectors,
            self.warper.as_ref(),
            config,
            self.logger.as_mut(),
        )?;

        self.logger.info(&format!(
            "Read {} / {} images",
            summary.read - summary.duplicates,
            summary.read
        ));
        self.logger.info(&format!(
            "Aligned {} images ({} skipped)",
            summary.written, summary.skipped
        ));
        match &summary.reference {
            Some(landmarks) => save_reference(&config.output_dir, landmarks)?,
            None => clear_reference(&config.output_dir)?,
        }
        self.logger.summary();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::infrastructure::bilinear_warper::BilinearWarper;
    use crate::detection::domain::landmark_detector::DetectionError;
    use crate::detection::domain::landmark_set::LandmarkSet;
    use crate::pipeline::infrastructure::threaded_align_executor::ThreadedAlignExecutor;
    use crate::io::infrastructure::reference_landmarks::{load_reference, reference_path};
    use crate::shared::frame::Frame;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    // --- Stubs ---

    /// Every path decodes to a uniform gray frame whose level is the index.
    struct StubReader;

    impl FrameReader for StubReader {
        fn read(&self, path: &Path, index: usize) -> Result<Frame, Box<dyn std::error::Error>> {
            let level = 60 + index as u8 * 20;
            Ok(Frame::new(vec![level; 16 * 12 * 3], 16, 12, 3, index)
                .with_name(path.to_string_lossy()))
        }
    }

    struct StubWriter {
        paths: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl ImageWriter for StubWriter {
        fn write(&self, path: &Path, _frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            self.paths.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    struct FixedDetector;

    impl LandmarkDetector for FixedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<LandmarkSet, DetectionError> {
            Ok(face())
        }
    }

    struct NoFaceDetector;

    impl LandmarkDetector for NoFaceDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<LandmarkSet, DetectionError> {
            Err(DetectionError::NoFaceDetected)
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

    fn counting_factory(created: Arc<AtomicUsize>) -> LandmarkDetectorFactory {
        Box::new(move || {
            created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FixedDetector) as Box<dyn LandmarkDetector>)
        })
    }

    fn face() -> LandmarkSet {
        LandmarkSet::new(vec![(4.0, 3.0), (11.0, 3.0), (7.5, 9.0)])
    }

    fn config(output_dir: &Path) -> AlignConfig {
        AlignConfig {
            img_thresh: 0.0,
            ref_color: None,
            output_dir: output_dir.to_path_buf(),
            out_extension: "jpg".into(),
        }
    }

    fn use_case(factory: LandmarkDetectorFactory) -> AlignFramesUseCase {
        AlignFramesUseCase::new(
            Box::new(StubReader),
            Box::new(StubWriter {
                paths: Arc::new(Mutex::new(Vec::new())),
            }),
            factory,
            Box::new(BilinearWarper::new()),
            Box::new(ThreadedAlignExecutor::new()),
            Box::new(RecordingLogger {
                messages: Arc::new(Mutex::new(Vec::new())),
            }),
        )
    }

    fn inputs(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("img_{i}.jpg"))).collect()
    }

    // --- Tests ---

    #[test]
    fn test_builds_one_detector_per_worker_and_writes_all() {
        let created = Arc::new(AtomicUsize::new(0));
        let paths = Arc::new(Mutex::new(Vec::new()));
        let messages = Arc::new(Mutex::new(Vec::new()));
        let mut use_case = AlignFramesUseCase::new(
            Box::new(StubReader),
            Box::new(StubWriter {
                paths: paths.clone(),
            }),
            counting_factory(created.clone()),
            Box::new(BilinearWarper::new()),
            Box::new(ThreadedAlignExecutor::new()),
            Box::new(RecordingLogger {
                messages: messages.clone(),
            }),
        );

        let tmp = TempDir::new().unwrap();
        let summary = use_case.execute(inputs(3), &config(tmp.path()), 2).unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(summary.written, 3);
        assert_eq!(paths.lock().unwrap()[2], tmp.path().join("00000002.jpg"));
        let messages = messages.lock().unwrap();
        assert!(messages.iter().any(|m| m == "Read 3 / 3 images"));
        assert!(messages.iter().any(|m| m == "Aligned 3 images (0 skipped)"));
    }

    #[test]
    fn test_factory_failure_is_reported() {
        let factory: LandmarkDetectorFactory = Box::new(|| Err("model missing".into()));
        let mut use_case = AlignFramesUseCase::new(
            Box::new(StubReader),
            Box::new(StubWriter {
                paths: Arc::new(Mutex::new(Vec::new())),
            }),
            factory,
            Box::new(BilinearWarper::new()),
            Box::new(ThreadedAlignExecutor::new()),
            Box::new(RecordingLogger {
                messages: Arc::new(Mutex::new(Vec::new())),
            }),
        );

        let tmp = TempDir::new().unwrap();
        let err = use_case.execute(inputs(1), &config(tmp.path()), 1).unwrap_err();
        assert!(err.to_string().contains("model missing"));
    }

    #[test]
    fn test_second_execute_fails() {
        let tmp = TempDir::new().unwrap();
        let mut use_case = use_case(counting_factory(Arc::new(AtomicUsize::new(0))));

        use_case.execute(inputs(1), &config(tmp.path()), 1).unwrap();
        let err = use_case.execute(inputs(1), &config(tmp.path()), 1).unwrap_err();
        assert!(err.to_string().contains("already executed"));
    }

    #[test]
    fn test_reference_landmarks_are_saved_with_output() {
        let tmp = TempDir::new().unwrap();
        let mut use_case = use_case(counting_factory(Arc::new(AtomicUsize::new(0))));

        use_case.execute(inputs(2), &config(tmp.path()), 1).unwrap();

        assert_eq!(load_reference(tmp.path()).unwrap(), Some(face()));
    }

    #[test]
    fn test_stale_reference_is_removed_when_nothing_aligns() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(reference_path(tmp.path()), "{\"landmarks\": []}").unwrap();
        let factory: LandmarkDetectorFactory =
            Box::new(|| Ok(Box::new(NoFaceDetector) as Box<dyn LandmarkDetector>));
        let mut use_case = use_case(factory);

        let summary = use_case.execute(inputs(2), &config(tmp.path()), 1).unwrap();

        assert_eq!(summary.written, 0);
        assert!(!reference_path(tmp.path()).exists());
    }
}
