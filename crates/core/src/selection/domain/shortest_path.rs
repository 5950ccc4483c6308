use crate::selection::domain::frame_graph::{FrameGraph, SelectionError};

/// The retained frames: one id per layer, in time order.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    ids: Vec<usize>,
    cost: f64,
    total: usize,
}

impl Selection {
    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    /// Sum of edge weights along the path.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Number of frames the selection was drawn from.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn kept_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.ids.len() as f64 / self.total as f64 * 100.0
    }
}

/// Minimum-cost path from any first-layer frame to any last-layer frame.
///
/// A single relaxation pass in time order is exact because edges only run
/// forward between adjacent layers. Ties keep the earliest predecessor and,
/// among drains, the lowest id. Non-finite edges are treated as absent, so a
/// graph whose last layer cannot be reached is `NoPathFound`.
pub fn select_path(graph: &FrameGraph) -> Result<Selection, SelectionError> {
    let n = graph.frame_count();
    let layers = graph.layer_count();
    let mut dist: Vec<Option<f64>> = vec![None; n];
    let mut parent: Vec<Option<usize>> = vec![None; n];

    for id in graph.layer(0) {
        dist[id] = Some(0.0);
    }

    for i in 0..layers.saturating_sub(1) {
        let pair = graph.pair(i);
        let from = graph.layer(i);
        let to = graph.layer(i + 1);
        for (row, u) in from.enumerate() {
            let Some(du) = dist[u] else { continue };
            for (col, v) in to.clone().enumerate() {
                let candidate = du + pair.get(row, col);
                if !candidate.is_finite() {
                    continue;
                }
                if dist[v].map_or(true, |dv| candidate < dv) {
                    dist[v] = Some(candidate);
                    parent[v] = Some(u);
                }
            }
        }
    }

    let mut best: Option<(usize, f64)> = None;
    for v in graph.layer(layers.saturating_sub(1)) {
        if let Some(dv) = dist[v] {
            if best.map_or(true, |(_, db)| dv < db) {
                best = Some((v, dv));
            }
        }
    }
    let (drain, cost) = best.ok_or(SelectionError::NoPathFound)?;

    let mut ids = vec![drain];
    let mut node = drain;
    while let Some(p) = parent[node] {
        ids.push(p);
        node = p;
    }
    ids.reverse();

    Ok(Selection {
        ids,
        cost,
        total: n,
    })
}
