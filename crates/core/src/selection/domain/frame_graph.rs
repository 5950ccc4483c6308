use std::ops::Range;

use rayon::prelude::*;
use thiserror::Error;

use crate::masking::domain::face_mask::FaceMask;
use crate::shared::frame::Frame;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("need at least {required} frames, found {found}")]
    InsufficientFrames { required: usize, found: usize },
    #[error("no path from the first layer to the last")]
    NoPathFound,
    #[error("{name} is {found:?}, expected {expected:?} to match the mask")]
    ShapeMismatch {
        name: String,
        expected: (u32, u32),
        found: (u32, u32),
    },
    #[error("layer size must be at least 1")]
    InvalidLayerSize,
    #[error("failed to read frame: {0}")]
    FrameRead(String),
}

/// Complete bipartite weights between two adjacent layers, row-major
/// `rows x cols` (earlier layer on rows).
#[derive(Clone, Debug, PartialEq)]
pub struct LayerWeights {
    rows: usize,
    cols: usize,
    weights: Vec<f64>,
}

impl LayerWeights {
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.weights[row * self.cols + col]
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }
}

/// Time-ordered frames split into layers of `layer_size` consecutive ids,
/// with edges only between adjacent layers.
///
/// Frame ids are dense: the n-th frame fed to [`FrameGraph::build`] is id n.
#[derive(Debug)]
pub struct FrameGraph {
    layer_size: usize,
    frame_count: usize,
    pairs: Vec<LayerWeights>,
}

impl FrameGraph {
    /// Stream `frames` into a layered graph, weighting each edge by the
    /// squared pixel difference inside `mask`.
    ///
    /// Only the masked samples of two layers are held at any time.
    pub fn build<I>(frames: I, mask: &FaceMask, layer_size: usize) -> Result<Self, SelectionError>
    where
        I: IntoIterator<Item = Result<Frame, Box<dyn std::error::Error>>>,
    {
        if layer_size == 0 {
            return Err(SelectionError::InvalidLayerSize);
        }
        let on_pixels = mask.on_pixels();
        let mut pairs = Vec::new();
        let mut previous: Option<Vec<Vec<u8>>> = None;
        let mut current: Vec<Vec<u8>> = Vec::with_capacity(layer_size);
        let mut frame_count = 0;

        for frame in frames {
            let frame = frame.map_err(|e| SelectionError::FrameRead(e.to_string()))?;
            if (frame.width(), frame.height()) != (mask.width(), mask.height()) {
                return Err(SelectionError::ShapeMismatch {
                    name: frame.name().to_string(),
                    expected: (mask.width(), mask.height()),
                    found: (frame.width(), frame.height()),
                });
            }
            current.push(masked_samples(&frame, &on_pixels));
            frame_count += 1;

            if current.len() == layer_size {
                let layer = std::mem::replace(&mut current, Vec::with_capacity(layer_size));
                if let Some(prev) = previous.take() {
                    pairs.push(pair_weights(&prev, &layer));
                }
                log::debug!("Layer of {} frames ending at id {}", layer.len(), frame_count - 1);
                previous = Some(layer);
            }
        }

        if frame_count <= layer_size {
            return Err(SelectionError::InsufficientFrames {
                required: layer_size + 1,
                found: frame_count,
            });
        }
        if !current.is_empty() {
            if let Some(prev) = previous.as_ref() {
                pairs.push(pair_weights(prev, &current));
            }
        }

        Ok(Self {
            layer_size,
            frame_count,
            pairs,
        })
    }

    /// Graph over explicit pair weights, for exercising path selection.
    #[cfg(test)]
    pub(crate) fn from_weights(
        layer_size: usize,
        frame_count: usize,
        pairs: Vec<Vec<f64>>,
    ) -> Self {
        let mut graph = Self {
            layer_size,
            frame_count,
            pairs: Vec::new(),
        };
        for (i, weights) in pairs.into_iter().enumerate() {
            let rows = graph.layer(i).len();
            let cols = graph.layer(i + 1).len();
            assert_eq!(weights.len(), rows * cols);
            graph.pairs.push(LayerWeights {
                rows,
                cols,
                weights,
            });
        }
        assert_eq!(graph.pairs.len() + 1, graph.layer_count());
        graph
    }

    pub fn layer_size(&self) -> usize {
        self.layer_size
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Number of layers, the last one possibly partial.
    pub fn layer_count(&self) -> usize {
        self.frame_count.div_ceil(self.layer_size)
    }

    /// Ids belonging to layer `i`.
    pub fn layer(&self, i: usize) -> Range<usize> {
        let start = i * self.layer_size;
        start.min(self.frame_count)..(start + self.layer_size).min(self.frame_count)
    }

    /// Weights between layer `i` and layer `i + 1`.
    pub fn pair(&self, i: usize) -> &LayerWeights {
        &self.pairs[i]
    }

    /// Edge weight between two frame ids, if they sit in adjacent layers.
    pub fn weight(&self, u: usize, v: usize) -> Option<f64> {
        let (lu, lv) = (u / self.layer_size, v / self.layer_size);
        if v >= self.frame_count || lv != lu + 1 {
            return None;
        }
        let pair = self.pairs.get(lu)?;
        Some(pair.get(u - lu * self.layer_size, v - lv * self.layer_size))
    }
}

fn masked_samples(frame: &Frame, on_pixels: &[usize]) -> Vec<u8> {
    let channels = frame.channels() as usize;
    let data = frame.data();
    on_pixels
        .iter()
        .flat_map(|&p| data[p * channels..(p + 1) * channels].iter().copied())
        .collect()
}

fn squared_distance(a: &[u8], b: &[u8]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as i64 - y as i64;
            (d * d) as u64
        })
        .sum::<u64>() as f64
}

fn pair_weights(from: &[Vec<u8>], to: &[Vec<u8>]) -> LayerWeights {
    let cols = to.len();
    let weights: Vec<f64> = (0..from.len() * cols)
        .into_par_iter()
        .map(|i| squared_distance(&from[i / cols], &to[i % cols]))
        .collect();
    LayerWeights {
        rows: from.len(),
        cols,
        weights,
    }
}
