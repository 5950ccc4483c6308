use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{JoinHandle, Scope, ScopedJoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::alignment::domain::alignment_error::AlignmentError;
use crate::alignment::domain::frame_aligner::{align_to_reference, FrameAligner};
use crate::alignment::domain::frame_warper::FrameWarper;
use crate::alignment::domain::reference_state::ReferenceState;
use crate::dedup::domain::frame_deduplicator::FrameDeduplicator;
use crate::detection::domain::landmark_detector::{DetectionError, LandmarkDetector};
use crate::detection::domain::landmark_set::LandmarkSet;
use crate::io::domain::frame_reader::FrameReader;
use crate::io::domain::image_writer::ImageWriter;
use crate::pipeline::align_executor::{AlignConfig, AlignExecutor, AlignSummary};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::frame::Frame;

const DEFAULT_CHANNEL_CAPACITY: usize = 8;

type SendError = Box<dyn std::error::Error + Send + Sync>;

/// A deduplicated frame tagged with its position among kept frames.
type Sequenced = (usize, Frame);

struct Detected {
    seq: usize,
    frame: Frame,
    landmarks: Result<LandmarkSet, DetectionError>,
    detect_ms: f64,
}

/// A frame to align against the latched reference.
struct AlignJob {
    seq: usize,
    frame: Frame,
    landmarks: LandmarkSet,
    reference: Arc<ReferenceState>,
    detect_ms: f64,
}

enum Outcome {
    Skipped,
    Aligned { frame: Frame, align_ms: f64 },
    Failed(AlignmentError),
}

/// The result for one kept frame, in whatever order it finished.
struct Finished {
    seq: usize,
    name: String,
    index: usize,
    detect_ms: f64,
    outcome: Outcome,
}

impl Finished {
    fn new(seq: usize, frame: &Frame, detect_ms: f64, outcome: Outcome) -> Self {
        Self {
            seq,
            name: frame.name().to_string(),
            index: frame.index(),
            detect_ms,
            outcome,
        }
    }
}

#[derive(Default)]
struct ReadStats {
    read: usize,
    kept: usize,
}

#[derive(Default)]
struct AlignStats {
    skipped: usize,
    written: usize,
}

/// Executes alignment with dedicated threads for I/O, detection and
/// registration.
///
/// Layout:
/// `reader [decode/dedup] → N × detect → dispatch [reorder/latch] → N × align → main [reorder/name] → writer`
///
/// Detection results are put back into time order before the reference is
/// chosen, and aligned frames are put back into time order before they are
/// named, so the output does not depend on the number of workers.
pub struct ThreadedAlignExecutor {
    channel_capacity: usize,
}

impl ThreadedAlignExecutor {
    pub fn new() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Default for ThreadedAlignExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl AlignExecutor for ThreadedAlignExecutor {
    fn execute(
        &self,
        inputs: Vec<PathBuf>,
        reader: Box<dyn FrameReader>,
        writer: Box<dyn ImageWriter>,
        detectors: Vec<Box<dyn LandmarkDetector>>,
        warper: &dyn FrameWarper,
        config: &AlignConfig,
        logger: &mut dyn PipelineLogger,
    ) -> Result<AlignSummary, Box<dyn std::error::Error>> {
        if detectors.is_empty() {
            return Err("At least one landmark detector is required".into());
        }
        let cap = self.channel_capacity;
        let total_inputs = inputs.len();
        let align_workers = detectors.len();

        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Result<Sequenced, SendError>>(cap);
        let (detected_tx, detected_rx) =
            crossbeam_channel::bounded::<Result<Detected, SendError>>(cap);
        let (write_tx, write_rx) = crossbeam_channel::bounded::<(PathBuf, Frame)>(cap);

        let reader_handle = spawn_reader(reader, inputs, config.img_thresh, frame_tx);
        let detect_handles: Vec<_> = detectors
            .into_iter()
            .map(|detector| spawn_detector(detector, frame_rx.clone(), detected_tx.clone()))
            .collect();
        drop(frame_rx);
        drop(detected_tx);
        let writer_handle = spawn_writer(writer, write_rx);

        let (main_result, reference) = std::thread::scope(|scope| {
            let (job_tx, job_rx) = crossbeam_channel::bounded::<AlignJob>(cap);
            let (finished_tx, finished_rx) = crossbeam_channel::bounded::<Finished>(cap);

            let align_handles: Vec<_> = (0..align_workers)
                .map(|_| spawn_aligner(scope, warper, job_rx.clone(), finished_tx.clone()))
                .collect();
            drop(job_rx);
            let ref_color = config.ref_color.clone();
            let dispatch_handle = scope.spawn(move || {
                dispatch(detected_rx, job_tx, finished_tx, ref_color, warper)
            });

            let collected = collect(finished_rx, &write_tx, config, total_inputs, logger);
            join_scoped(dispatch_handle, align_handles, collected)
        });

        drop(write_tx);

        let (read_stats, align_stats) =
            join_threads(reader_handle, detect_handles, writer_handle, main_result)?;

        Ok(AlignSummary {
            read: read_stats.read,
            duplicates: read_stats.read - read_stats.kept,
            skipped: align_stats.skipped,
            written: align_stats.written,
            reference,
        })
    }
}

fn spawn_reader(
    reader: Box<dyn FrameReader>,
    inputs: Vec<PathBuf>,
    img_thresh: f64,
    frame_tx: Sender<Result<Sequenced, SendError>>,
) -> JoinHandle<ReadStats> {
    std::thread::spawn(move || {
        let mut dedup = FrameDeduplicator::new(img_thresh);
        let mut stats = ReadStats::default();
        for (index, path) in inputs.iter().enumerate() {
            let frame = match reader.read(path, index) {
                Ok(frame) => frame,
                Err(e) => {
                    let _ = frame_tx.send(Err(e.to_string().into()));
                    break;
                }
            };
            stats.read += 1;
            if !dedup.admit(&frame) {
                continue;
            }
            if frame_tx.send(Ok((stats.kept, frame))).is_err() {
                break;
            }
            stats.kept += 1;
        }
        stats
    })
}

fn spawn_detector(
    mut detector: Box<dyn LandmarkDetector>,
    frame_rx: Receiver<Result<Sequenced, SendError>>,
    detected_tx: Sender<Result<Detected, SendError>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for item in frame_rx {
            let result = item.map(|(seq, frame)| {
                let start = Instant::now();
                let landmarks = detector.detect(&frame);
                Detected {
                    seq,
                    frame,
                    landmarks,
                    detect_ms: start.elapsed().as_secs_f64() * 1000.0,
                }
            });
            if detected_tx.send(result).is_err() {
                break;
            }
        }
    })
}

fn spawn_writer(
    writer: Box<dyn ImageWriter>,
    write_rx: Receiver<(PathBuf, Frame)>,
) -> JoinHandle<Result<(), SendError>> {
    std::thread::spawn(move || {
        for (path, frame) in write_rx {
            writer.write(&path, &frame).map_err(|e| -> SendError {
                format!("Failed to write {}: {e}", path.display()).into()
            })?;
        }
        Ok(())
    })
}

fn spawn_aligner<'scope, 'env>(
    scope: &'scope Scope<'scope, 'env>,
    warper: &'scope dyn FrameWarper,
    job_rx: Receiver<AlignJob>,
    finished_tx: Sender<Finished>,
) -> ScopedJoinHandle<'scope, ()> {
    scope.spawn(move || {
        for job in job_rx {
            let start = Instant::now();
            let outcome =
                match align_to_reference(&job.frame, &job.landmarks, &job.reference, warper) {
                    Ok(frame) => Outcome::Aligned {
                        frame,
                        align_ms: start.elapsed().as_secs_f64() * 1000.0,
                    },
                    Err(e) => Outcome::Failed(e),
                };
            let finished = Finished::new(job.seq, &job.frame, job.detect_ms, outcome);
            if finished_tx.send(finished).is_err() {
                break;
            }
        }
    })
}

/// Restores detection order and latches the reference on the first frame
/// that aligns. Frames up to and including that one are aligned here; the
/// rest go to the align workers.
///
/// Returns the reference landmarks, if any frame aligned.
fn dispatch(
    detected_rx: Receiver<Result<Detected, SendError>>,
    job_tx: Sender<AlignJob>,
    finished_tx: Sender<Finished>,
    ref_color: Option<Vec<f64>>,
    warper: &dyn FrameWarper,
) -> Result<Option<LandmarkSet>, SendError> {
    let mut aligner = FrameAligner::new(ref_color);
    let mut latched: Option<Arc<ReferenceState>> = None;
    let mut pending: BTreeMap<usize, Detected> = BTreeMap::new();
    let mut next_seq = 0;

    for item in detected_rx {
        let detected = item?;
        pending.insert(detected.seq, detected);

        while let Some(detected) = pending.remove(&next_seq) {
            next_seq += 1;
            let Detected {
                seq,
                frame,
                landmarks,
                detect_ms,
            } = detected;
            let landmarks = match landmarks {
                Ok(landmarks) => landmarks,
                Err(e) if e.is_recoverable() => {
                    log::warn!("Skipping {}: {e}", frame.name());
                    let skipped = Finished::new(seq, &frame, detect_ms, Outcome::Skipped);
                    if finished_tx.send(skipped).is_err() {
                        return Ok(None);
                    }
                    continue;
                }
                Err(e) => {
                    return Err(format!("Landmark detection failed on {}: {e}", frame.name()).into())
                }
            };

            if let Some(reference) = &latched {
                let job = AlignJob {
                    seq,
                    frame,
                    landmarks,
                    reference: Arc::clone(reference),
                    detect_ms,
                };
                if job_tx.send(job).is_err() {
                    return Ok(None);
                }
                continue;
            }

            let start = Instant::now();
            let outcome = match aligner.align(&frame, &landmarks, warper) {
                Ok(aligned) => Outcome::Aligned {
                    frame: aligned,
                    align_ms: start.elapsed().as_secs_f64() * 1000.0,
                },
                Err(e) => Outcome::Failed(e),
            };
            latched = aligner.reference().cloned().map(Arc::new);
            if finished_tx.send(Finished::new(seq, &frame, detect_ms, outcome)).is_err() {
                return Ok(None);
            }
        }
    }

    if !pending.is_empty() {
        return Err(format!(
            "Detection results missing from frame {next_seq}; {} frames left unaligned",
            pending.len()
        )
        .into());
    }
    Ok(latched.map(|reference| reference.landmarks().clone()))
}

/// Receives finished frames, restores time order, names the aligned ones
/// and forwards them to the writer.
fn collect(
    finished_rx: Receiver<Finished>,
    write_tx: &Sender<(PathBuf, Frame)>,
    config: &AlignConfig,
    total_inputs: usize,
    logger: &mut dyn PipelineLogger,
) -> Result<AlignStats, Box<dyn std::error::Error>> {
    let mut pending: BTreeMap<usize, Finished> = BTreeMap::new();
    let mut next_seq = 0;
    let mut stats = AlignStats::default();

    for finished in finished_rx {
        pending.insert(finished.seq, finished);
        logger.metric("reorder_depth", pending.len() as f64);

        while let Some(finished) = pending.remove(&next_seq) {
            next_seq += 1;
            logger.timing("detect", finished.detect_ms);
            logger.progress(finished.index + 1, total_inputs);

            match finished.outcome {
                Outcome::Skipped => stats.skipped += 1,
                Outcome::Failed(e) => {
                    log::error!("Cannot align {}: {e}", finished.name);
                    stats.skipped += 1;
                }
                Outcome::Aligned { frame, align_ms } => {
                    logger.timing("align", align_ms);
                    let path = config.output_path(stats.written);
                    log::debug!("{} -> {}", finished.name, path.display());
                    write_tx
                        .send((path, frame))
                        .map_err(|_| "Writer channel closed unexpectedly")?;
                    stats.written += 1;
                }
            }
        }
    }

    if !pending.is_empty() {
        return Err(format!(
            "Aligned frames missing from frame {next_seq}; {} frames left unwritten",
            pending.len()
        )
        .into());
    }
    Ok(stats)
}

/// Joins the dispatcher and align workers. A dispatcher error outranks the
/// collector's, since it is what stopped the stream.
fn join_scoped(
    dispatch_handle: ScopedJoinHandle<'_, Result<Option<LandmarkSet>, SendError>>,
    align_handles: Vec<ScopedJoinHandle<'_, ()>>,
    collected: Result<AlignStats, Box<dyn std::error::Error>>,
) -> (
    Result<AlignStats, Box<dyn std::error::Error>>,
    Option<LandmarkSet>,
) {
    let dispatched = dispatch_handle.join();
    let mut panicked = false;
    for handle in align_handles {
        panicked |= handle.join().is_err();
    }

    match dispatched {
        Ok(Ok(reference)) if panicked => (Err("Align thread panicked".into()), reference),
        Ok(Ok(reference)) => (collected, reference),
        Ok(Err(e)) => (Err(e.to_string().into()), None),
        Err(_) => (Err("Dispatch thread panicked".into()), None),
    }
}

/// Joins all pipeline threads and coalesces the first error encountered.
fn join_threads(
    reader_handle: JoinHandle<ReadStats>,
    detect_handles: Vec<JoinHandle<()>>,
    writer_handle: JoinHandle<Result<(), SendError>>,
    main_result: Result<AlignStats, Box<dyn std::error::Error>>,
) -> Result<(ReadStats, AlignStats), Box<dyn std::error::Error>> {
    let mut first_error: Option<Box<dyn std::error::Error>> = None;
    fn set_if_none(slot: &mut Option<Box<dyn std::error::Error>>, err: Box<dyn std::error::Error>) {
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    let align_stats = match main_result {
        Ok(stats) => Some(stats),
        Err(e) => {
            first_error = Some(e);
            None
        }
    };

    let read_stats = match reader_handle.join() {
        Ok(stats) => Some(stats),
        Err(_) => {
            set_if_none(&mut first_error, "Reader thread panicked".into());
            None
        }
    };

    for handle in detect_handles {
        if handle.join().is_err() {
            set_if_none(&mut first_error, "Detect thread panicked".into());
        }
    }

    match writer_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => set_if_none(&mut first_error, e.to_string().into()),
        Err(_) => set_if_none(&mut first_error, "Writer thread panicked".into()),
    }

    match (first_error, read_stats, align_stats) {
        (Some(e), _, _) => Err(e),
        (None, Some(read), Some(align)) => Ok((read, align)),
        _ => Err("Alignment pipeline ended without results".into()),
    }
}
