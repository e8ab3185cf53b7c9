// src/embedding.rs
//
// Appearance embeddings for re-identification and team clustering. Crops are
// cut from the frame per detection box, pushed through an external embedding
// model, and L2-normalized. A degenerate box yields a fixed zero placeholder
// patch instead of an error so one bad detection never stalls a frame.

use crate::interface::EmbeddingModel;
use crate::types::Frame;
use std::sync::Arc;
use tracing::warn;

const NORM_EPSILON: f32 = 1e-6;
/// Placeholder patch size for empty/out-of-frame crops
const PLACEHOLDER_SIDE: usize = 10;

/// An RGB patch cut from a frame.
#[derive(Debug, Clone)]
pub struct Crop {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Crop {
    pub fn zero_placeholder() -> Self {
        Self {
            data: vec![0u8; PLACEHOLDER_SIDE * PLACEHOLDER_SIDE * 3],
            width: PLACEHOLDER_SIDE,
            height: PLACEHOLDER_SIDE,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }
}

pub struct EmbeddingExtractor {
    /// Shared across jobs; the model must be stateless per call.
    model: Arc<dyn EmbeddingModel>,
}

impl EmbeddingExtractor {
    pub fn new(model: Arc<dyn EmbeddingModel>) -> Self {
        Self { model }
    }

    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    /// One normalized feature vector per box, in input order. Model failures
    /// degrade to zero vectors for the whole batch.
    pub fn extract(&self, frame: &Frame, boxes: &[[f32; 4]]) -> Vec<Vec<f32>> {
        if boxes.is_empty() {
            return vec![];
        }

        let crops: Vec<Crop> = boxes.iter().map(|b| crop_frame(frame, b)).collect();

        let features = match self.model.embed(&crops) {
            Ok(f) if f.len() == boxes.len() => f,
            Ok(f) => {
                warn!(
                    "Embedding model returned {} vectors for {} crops, substituting zeros",
                    f.len(),
                    boxes.len()
                );
                vec![vec![0.0; self.model.dimension()]; boxes.len()]
            }
            Err(e) => {
                warn!("Embedding extraction failed: {}, substituting zeros", e);
                vec![vec![0.0; self.model.dimension()]; boxes.len()]
            }
        };

        features.into_iter().map(|f| l2_normalize(f)).collect()
    }
}

/// Cut `bbox` out of the frame, clamped to bounds. A box that clips down to
/// nothing becomes the zero placeholder patch.
pub fn crop_frame(frame: &Frame, bbox: &[f32; 4]) -> Crop {
    let x1 = (bbox[0].floor().max(0.0) as usize).min(frame.width);
    let y1 = (bbox[1].floor().max(0.0) as usize).min(frame.height);
    let x2 = (bbox[2].ceil().max(0.0) as usize).min(frame.width);
    let y2 = (bbox[3].ceil().max(0.0) as usize).min(frame.height);

    if x2 <= x1 || y2 <= y1 || frame.data.len() < frame.width * frame.height * 3 {
        return Crop::zero_placeholder();
    }

    let width = x2 - x1;
    let height = y2 - y1;
    let mut data = Vec::with_capacity(width * height * 3);

    for row in y1..y2 {
        let start = (row * frame.width + x1) * 3;
        data.extend_from_slice(&frame.data[start..start + width * 3]);
    }

    Crop {
        data,
        width,
        height,
    }
}

pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm + NORM_EPSILON;
    for x in &mut v {
        *x /= denom;
    }
    v
}

/// Unsupervised 2-cluster split over player embeddings, used for team
/// assignment. Plain Lloyd's iterations with a deterministic farthest-point
/// seed; k is fixed at 2 so nothing fancier is warranted.
pub fn cluster_teams(embeddings: &[Vec<f32>]) -> Vec<usize> {
    if embeddings.is_empty() {
        return vec![];
    }
    if embeddings.len() == 1 {
        return vec![0];
    }

    let dim = embeddings[0].len();

    // Seed: first point, and the point farthest from it
    let mut c0 = embeddings[0].clone();
    let far = embeddings
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            sq_dist(&c0, a)
                .partial_cmp(&sq_dist(&c0, b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut c1 = embeddings[far].clone();

    let mut labels = vec![0usize; embeddings.len()];

    for _ in 0..100 {
        let mut changed = false;
        for (i, e) in embeddings.iter().enumerate() {
            let label = if sq_dist(e, &c0) <= sq_dist(e, &c1) { 0 } else { 1 };
            if labels[i] != label {
                labels[i] = label;
                changed = true;
            }
        }

        if !changed {
            break;
        }

        let mut sums = [vec![0.0f32; dim], vec![0.0f32; dim]];
        let mut counts = [0usize; 2];
        for (e, &label) in embeddings.iter().zip(labels.iter()) {
            counts[label] += 1;
            for (s, v) in sums[label].iter_mut().zip(e.iter()) {
                *s += v;
            }
        }

        for (cluster, (sum, count)) in sums.iter().zip(counts.iter()).enumerate() {
            if *count == 0 {
                continue;
            }
            let mean: Vec<f32> = sum.iter().map(|s| s / *count as f32).collect();
            if cluster == 0 {
                c0 = mean;
            } else {
                c1 = mean;
            }
        }
    }

    labels
}

fn sq_dist(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
