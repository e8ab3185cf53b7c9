// src/analysis/track.rs
//
// A persistent identity across frames. The box estimate always comes from
// the motion model once a predict step has run; raw detections only enter
// through the Kalman correction.

use super::kalman::BoxMotionModel;
use crate::types::{Detection, ObjectClass};
use std::collections::VecDeque;

/// Appearance buffer cap — oldest embedding evicted beyond this.
pub const MAX_FEATURES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Active,
    Lost,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub score: f32,
    pub class: ObjectClass,
    /// Successful matches over the track's lifetime
    pub hits: u32,
    /// Frames since creation
    pub age: u32,
    pub time_since_update: u32,
    kf: BoxMotionModel,
    features: VecDeque<Vec<f32>>,
}

impl Track {
    pub fn new(id: u32, detection: &Detection) -> Self {
        let mut features = VecDeque::new();
        if let Some(f) = &detection.embedding {
            features.push_back(f.clone());
        }

        Self {
            id,
            score: detection.confidence,
            class: detection.class,
            hits: 1,
            age: 1,
            time_since_update: 0,
            kf: BoxMotionModel::new(detection.bbox),
            features,
        }
    }

    /// Advance the motion model one frame and return the predicted box.
    pub fn predict(&mut self) -> [f64; 4] {
        self.age += 1;
        self.time_since_update += 1;
        self.kf.predict()
    }

    /// Fold a matched detection into the state.
    pub fn update(&mut self, detection: &Detection) {
        self.hits += 1;
        self.time_since_update = 0;
        self.score = detection.confidence;
        self.kf.update(detection.bbox);

        if let Some(f) = &detection.embedding {
            self.features.push_back(f.clone());
            if self.features.len() > MAX_FEATURES {
                self.features.pop_front();
            }
        }
    }

    /// Current box estimate from the motion model.
    pub fn bbox(&self) -> [f64; 4] {
        self.kf.state_box()
    }

    pub fn state(&self) -> TrackState {
        if self.time_since_update == 0 {
            TrackState::Active
        } else {
            TrackState::Lost
        }
    }

    pub fn is_confirmed(&self, min_hits: u32) -> bool {
        self.hits >= min_hits
    }

    pub fn has_features(&self) -> bool {
        !self.features.is_empty()
    }

    /// Mean of the buffered appearance embeddings. `None` until the track
    /// has seen at least one embedding.
    pub fn mean_feature(&self) -> Option<Vec<f32>> {
        let first = self.features.front()?;
        let dim = first.len();
        let mut mean = vec![0.0f32; dim];

        for f in &self.features {
            for (m, v) in mean.iter_mut().zip(f.iter()) {
                *m += v;
            }
        }
        let n = self.features.len() as f32;
        for m in &mut mean {
            *m /= n;
        }
        Some(mean)
    }
}
