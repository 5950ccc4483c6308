use std::path::PathBuf;

use crate::alignment::domain::frame_warper::FrameWarper;
use crate::detection::domain::landmark_detector::LandmarkDetector;
use crate::detection::domain::landmark_set::LandmarkSet;
use crate::io::domain::frame_reader::FrameReader;
use crate::io::domain::image_writer::ImageWriter;
use crate::pipeline::pipeline_logger::PipelineLogger;

/// Configuration for one alignment run.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignConfig {
    pub img_thresh: f64,
    pub ref_color: Option<Vec<f64>>,
    pub output_dir: PathBuf,
    pub out_extension: String,
}

impl AlignConfig {
    /// Path of the `n`-th written frame.
    pub fn output_path(&self, n: usize) -> PathBuf {
        self.output_dir
            .join(format!("{n:08}.{}", self.out_extension))
    }
}

/// Frame counts reported at the end of an alignment run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignSummary {
    /// Input files decoded.
    pub read: usize,
    /// Frames dropped as near-duplicates of their predecessor.
    pub duplicates: usize,
    /// Frames dropped by detection or alignment failures.
    pub skipped: usize,
    pub written: usize,
    /// Landmarks of the reference frame, in output coordinates. `None` when
    /// no frame aligned.
    pub reference: Option<LandmarkSet>,
}

/// Abstracts how the read → dedup → detect → align → write pipeline runs.
///
/// One detector is handed over per detection worker; the same number of
/// threads aligns frames once the reference is known.
pub trait AlignExecutor: Send {
    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        inputs: Vec<PathBuf>,
        reader: Box<dyn FrameReader>,
        writer: Box<dyn ImageWriter>,
        detectors: Vec<Box<dyn LandmarkDetector>>,
        warper: &dyn FrameWarper,
        config: &AlignConfig,
        logger: &mut dyn PipelineLogger,
    ) -> Result<AlignSummary, Box<dyn std::error::Error>>;
}
