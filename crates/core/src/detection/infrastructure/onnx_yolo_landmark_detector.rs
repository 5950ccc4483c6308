/// YOLO-pose face landmark detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, confidence filtering and NMS,
/// then insists on exactly one face whose five keypoints were all located.
use std::path::Path;

use crate::detection::domain::landmark_detector::{DetectionError, LandmarkDetector};
use crate::detection::domain::landmark_set::LandmarkSet;
use crate::shared::constants::YOLO_LANDMARK_COUNT;
use crate::shared::frame::Frame;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Values per keypoint in a YOLO-pose row: x, y, conf.
const KEYPOINT_STRIDE: usize = 3;

/// Minimum keypoint confidence to treat a landmark as located.
const KEYPOINT_CONF_THRESH: f64 = 0.5;

/// Landmark detector backed by an ONNX Runtime session.
pub struct OnnxYoloLandmarkDetector {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloLandmarkDetector {
    /// Load a YOLO-pose ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(
        model_path: &Path,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let session = ort::session::Session::builder()?
            .with_intra_threads(1)?
            .with_execution_providers(platform_providers())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::debug!(
            "Loaded landmark model {} (input {input_size}px)",
            model_path.display()
        );

        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let letterbox = Letterbox {
            scale,
            pad_x: pad_x as f64,
            pad_y: pad_y as f64,
        };
        parse_detections(data, &shape, self.confidence, &letterbox)
    }
}

impl LandmarkDetector for OnnxYoloLandmarkDetector {
    fn detect(&mut self, frame: &Frame) -> Result<LandmarkSet, DetectionError> {
        let mut dets = self
            .infer(frame)
            .map_err(|e| DetectionError::Backend(e.to_string()))?;
        let faces = nms(&mut dets, NMS_IOU_THRESH);
        single_face_landmarks(&faces)
    }
}

/// Hardware provider for this platform; ort falls back to CPU when it is
/// unavailable.
fn platform_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    return vec![ort::execution_providers::CoreMLExecutionProvider::default().build()];
    #[cfg(target_os = "windows")]
    return vec![ort::execution_providers::DirectMLExecutionProvider::default().build()];
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    Vec::new()
}

/// Exactly one face, with every keypoint located, or the reason why not.
fn single_face_landmarks(faces: &[RawDetection]) -> Result<LandmarkSet, DetectionError> {
    let face = match faces {
        [] => return Err(DetectionError::NoFaceDetected),
        [face] => face,
        many => return Err(DetectionError::MultipleFacesDetected(many.len())),
    };

    let located: Vec<(f64, f64)> = face.keypoints.iter().flatten().copied().collect();
    if located.len() != YOLO_LANDMARK_COUNT {
        return Err(DetectionError::IncompleteLandmarks {
            found: located.len(),
            expected: YOLO_LANDMARK_COUNT,
        });
    }
    Ok(LandmarkSet::new(located))
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Mapping from letterboxed model coordinates back to frame coordinates.
struct Letterbox {
    scale: f64,
    pad_x: f64,
    pad_y: f64,
}

impl Letterbox {
    fn to_frame(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = (fw * scale).round() as u32;
    let new_h = (fh * scale).round() as u32;
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding is 114/255 gray, the YOLO convention.
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    bbox: [f64; 4],
    confidence: f64,
    /// `None` marks a keypoint below the confidence threshold.
    keypoints: Vec<Option<(f64, f64)>>,
}

/// Decode a `[1, features, detections]` or `[1, detections, features]` tensor.
///
/// Row layout: `[cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]`.
fn parse_detections(
    data: &[f32],
    shape: &[usize],
    confidence: f64,
    letterbox: &Letterbox,
) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if data.len() < num_dets * num_feats {
        return Err(format!("YOLO output too short for shape {shape:?}").into());
    }

    let mut dets = Vec::new();
    for i in 0..num_dets {
        let row: Vec<f32> = if transposed {
            (0..num_feats).map(|f| data[f * num_dets + i]).collect()
        } else {
            data[i * num_feats..(i + 1) * num_feats].to_vec()
        };
        if row.len() < 5 {
            continue;
        }
        let conf = row[4] as f64;
        if conf < confidence {
            continue;
        }

        let (cx, cy, w, h) = (row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64);
        let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);

        let keypoints = row[5..]
            .chunks_exact(KEYPOINT_STRIDE)
            .take(YOLO_LANDMARK_COUNT)
            .map(|kp| {
                if kp[2] as f64 >= KEYPOINT_CONF_THRESH {
                    Some(letterbox.to_frame(kp[0] as f64, kp[1] as f64))
                } else {
                    None
                }
            })
            .collect();

        dets.push(RawDetection {
            bbox: [x1, y1, x2, y2],
            confidence: conf,
            keypoints,
        });
    }
    Ok(dets)
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        if keep.iter().all(|k| bbox_iou(&k.bbox, &det.bbox) <= iou_thresh) {
            keep.push(det.clone());
        }
    }
    keep
}

/// IoU between two bounding boxes represented as `[x1, y1, x2, y2]`.
fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
