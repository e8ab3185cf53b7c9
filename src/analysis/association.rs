// src/analysis/association.rs
//
// Cost matrices and optimal assignment for detection-to-track matching.
// Both association stages minimize total cost over the full matrix (lapjv)
// rather than matching greedily, so a detection is never stolen from a
// better-fitting track by iteration order.

use super::track::Track;
use crate::types::Detection;
use ndarray::Array2;

/// Cost entry used for matrix padding; any real cost is far below this.
const PAD_COST: f64 = 1e6;

#[derive(Debug, Clone)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Solve min-cost assignment over `cost`, keeping only pairs at or below
/// `thresh`. Rows are tracks, columns detections.
pub fn linear_assignment(cost: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost.dim();

    if num_rows == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: vec![],
            unmatched_detections: (0..num_cols).collect(),
        };
    }
    if num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: vec![],
        };
    }

    // lapjv wants a square matrix; pad with a cost no real pair can reach.
    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), PAD_COST);
    for i in 0..num_rows {
        for j in 0..num_cols {
            padded[[i, j]] = cost[[i, j]] as f64;
        }
    }

    let mut matches = vec![];
    let mut unmatched_tracks = vec![];
    let mut unmatched_detections_mask = vec![true; num_cols];

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row_idx, &col_idx) in row_to_col.iter().enumerate() {
                if row_idx >= num_rows {
                    continue;
                }
                if col_idx >= num_cols {
                    unmatched_tracks.push(row_idx);
                } else if cost[[row_idx, col_idx]] <= thresh {
                    matches.push((row_idx, col_idx));
                    unmatched_detections_mask[col_idx] = false;
                } else {
                    unmatched_tracks.push(row_idx);
                }
            }
        }
        Err(_) => {
            unmatched_tracks = (0..num_rows).collect();
        }
    }

    let unmatched_detections = unmatched_detections_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &u)| if u { Some(i) } else { None })
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}

/// Appearance-stage cost: cosine distance between each detection's embedding
/// and the track's mean buffered embedding. Tracks without embeddings (or
/// detections without one) sit at the maximum distance of 1.0.
pub fn appearance_distance(tracks: &[Track], detections: &[Detection]) -> Array2<f32> {
    let mut dists = Array2::from_elem((tracks.len(), detections.len()), 1.0f32);

    for (i, track) in tracks.iter().enumerate() {
        let mean = match track.mean_feature() {
            Some(m) => m,
            None => continue,
        };
        for (j, det) in detections.iter().enumerate() {
            if let Some(feat) = &det.embedding {
                dists[[i, j]] = cosine_distance(&mean, feat);
            }
        }
    }

    dists
}

/// Geometry-stage cost: 1 - IoU between the track's predicted box and the
/// detection box.
pub fn iou_distance(track_boxes: &[[f64; 4]], detections: &[Detection]) -> Array2<f32> {
    let mut dists = Array2::zeros((track_boxes.len(), detections.len()));
    for (i, tb) in track_boxes.iter().enumerate() {
        let tb = [tb[0] as f32, tb[1] as f32, tb[2] as f32, tb[3] as f32];
        for (j, det) in detections.iter().enumerate() {
            dists[[i, j]] = 1.0 - iou(&tb, &det.bbox);
        }
    }
    dists
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);

    inter / (area_a + area_b - inter + 1e-6)
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }

    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }

    let denom = na.sqrt() * nb.sqrt() + 1e-6;
    (1.0 - dot / denom).clamp(0.0, 2.0)
}
