// src/analysis/tracker.rs
//
// Hybrid multi-object tracker: Kalman motion prediction fused with two-stage
// association — appearance (ReID cosine distance) first, IoU geometry for
// whatever remains. One call per frame, frames strictly in order.

use super::association::{self, linear_assignment};
use super::track::Track;
use crate::embedding::EmbeddingExtractor;
use crate::types::{Detection, Frame, ObjectClass};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HybridTrackerConfig {
    /// Detections below this confidence are discarded before association
    pub confidence_threshold: f32,
    /// Minimum IoU for a geometry-stage match
    pub iou_threshold: f32,
    /// Maximum cosine distance for an appearance-stage match
    pub reid_threshold: f32,
    /// Hits required before a track is emitted
    pub min_hits: u32,
    /// Frames a track may go unmatched before removal
    pub max_age_frames: u32,
}

impl Default for HybridTrackerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            iou_threshold: 0.3,
            reid_threshold: 0.4,
            min_hits: 3,
            max_age_frames: 60,
        }
    }
}

impl HybridTrackerConfig {
    /// Default thresholds with the lost-track window scaled to the video:
    /// a track survives two seconds without a match.
    pub fn for_frame_rate(fps: f64) -> Self {
        Self {
            max_age_frames: (fps * 2.0).round().max(1.0) as u32,
            ..Self::default()
        }
    }
}

/// Per-frame output for one confirmed, just-updated track.
#[derive(Debug, Clone)]
pub struct TrackObservation {
    pub id: u32,
    /// Box estimate from the motion model, not the raw detection
    pub bbox: [f64; 4],
    pub confidence: f32,
    pub class: ObjectClass,
}

pub struct HybridTracker {
    config: HybridTrackerConfig,
    extractor: Option<EmbeddingExtractor>,
    tracks: Vec<Track>,
    next_id: u32,
}

impl HybridTracker {
    pub fn new(config: HybridTrackerConfig) -> Self {
        Self {
            config,
            extractor: None,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    /// Attach an appearance-embedding extractor. Without one, association
    /// runs on geometry alone (every appearance distance sits at 1.0).
    pub fn with_embedder(mut self, extractor: EmbeddingExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Process one frame of detections. Returns observations for tracks that
    /// were updated this frame and have reached the confirmation hit count —
    /// single-frame spurious detections never surface.
    pub fn update(&mut self, frame: &Frame, detections: Vec<Detection>) -> Vec<TrackObservation> {
        let mut dets: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.confidence >= self.config.confidence_threshold)
            .collect();

        if let Some(extractor) = &self.extractor {
            let boxes: Vec<[f32; 4]> = dets.iter().map(|d| d.bbox).collect();
            let features = extractor.extract(frame, &boxes);
            for (det, feat) in dets.iter_mut().zip(features) {
                if det.embedding.is_none() {
                    det.embedding = Some(feat);
                }
            }
        }

        // Advance every motion model before matching; unmatched tracks keep
        // the predicted box as their estimate.
        let predicted: Vec<[f64; 4]> = self.tracks.iter_mut().map(|t| t.predict()).collect();

        // Stage 1: appearance
        let appearance = association::appearance_distance(&self.tracks, &dets);
        let stage1 = linear_assignment(&appearance, self.config.reid_threshold);

        for &(t_idx, d_idx) in &stage1.matches {
            self.tracks[t_idx].update(&dets[d_idx]);
        }

        // Stage 2: IoU over the leftovers
        let leftover_tracks = stage1.unmatched_tracks;
        let leftover_dets = stage1.unmatched_detections;

        let leftover_boxes: Vec<[f64; 4]> =
            leftover_tracks.iter().map(|&i| predicted[i]).collect();
        let leftover_det_refs: Vec<Detection> =
            leftover_dets.iter().map(|&j| dets[j].clone()).collect();

        let geometry = association::iou_distance(&leftover_boxes, &leftover_det_refs);
        let stage2 = linear_assignment(&geometry, 1.0 - self.config.iou_threshold);

        for &(local_t, local_d) in &stage2.matches {
            let t_idx = leftover_tracks[local_t];
            let d_idx = leftover_dets[local_d];
            self.tracks[t_idx].update(&dets[d_idx]);
        }

        // Unmatched detections spawn tracks
        for &local_d in &stage2.unmatched_detections {
            let det = &dets[leftover_dets[local_d]];
            debug!(
                "New track {} at [{:.0},{:.0},{:.0},{:.0}]",
                self.next_id, det.bbox[0], det.bbox[1], det.bbox[2], det.bbox[3]
            );
            self.tracks.push(Track::new(self.next_id, det));
            self.next_id += 1;
        }

        // Retire tracks that have been lost for too long. Their ids are
        // never reused; a reappearing object gets a fresh identity.
        let max_age = self.config.max_age_frames;
        self.tracks.retain(|t| {
            if t.time_since_update >= max_age {
                debug!(
                    "Track {} removed after {} frames unmatched",
                    t.id, t.time_since_update
                );
                false
            } else {
                true
            }
        });

        let min_hits = self.config.min_hits;
        self.tracks
            .iter()
            .filter(|t| t.time_since_update == 0 && t.is_confirmed(min_hits))
            .map(|t| TrackObservation {
                id: t.id,
                bbox: t.bbox(),
                confidence: t.score,
                class: t.class,
            })
            .collect()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Detection, Frame, ObjectClass};

    fn frame(t: f64) -> Frame {
        Frame {
            data: vec![],
            width: 1920,
            height: 1080,
            timestamp: t,
        }
    }

    fn det(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new([x1, y1, x2, y2], 0.9, ObjectClass::Player)
    }

    fn det_with_embedding(x1: f32, y1: f32, x2: f32, y2: f32, emb: Vec<f32>) -> Detection {
        let mut d = det(x1, y1, x2, y2);
        d.embedding = Some(emb);
        d
    }

    #[test]
    fn test_single_smooth_track_keeps_one_id() {
        let mut tracker = HybridTracker::new(HybridTrackerConfig::default());
        let mut seen_ids = std::collections::HashSet::new();

        for i in 0..30 {
            // 5px/frame rightward drift, well inside the IoU gate
            let x = 100.0 + i as f32 * 5.0;
            let obs = tracker.update(&frame(i as f64 / 30.0), vec![det(x, 200.0, x + 60.0, 340.0)]);

            if i >= 2 {
                assert_eq!(obs.len(), 1, "exactly one confirmed track at frame {}", i);
            }
            for o in obs {
                seen_ids.insert(o.id);
            }
        }

        assert_eq!(
            seen_ids.len(),
            1,
            "smooth motion must keep a single persistent id, got {:?}",
            seen_ids
        );
        assert_eq!(tracker.track_count(), 1);
    }

    #[test]
    fn test_reappearance_after_max_age_gets_new_id() {
        let config = HybridTrackerConfig {
            min_hits: 1,
            max_age_frames: 3,
            ..HybridTrackerConfig::default()
        };
        let mut tracker = HybridTracker::new(config);

        let mut first_id = None;
        for i in 0..4 {
            let obs = tracker.update(&frame(i as f64), vec![det(100.0, 100.0, 160.0, 240.0)]);
            first_id = obs.first().map(|o| o.id);
        }
        let first_id = first_id.expect("track should be emitted");

        // Occlude past the max-age window; the track is removed
        for i in 4..10 {
            tracker.update(&frame(i as f64), vec![]);
        }
        assert_eq!(tracker.track_count(), 0, "lost track must be retired");

        // Same location again — must be a NEW identity, never a resurrection
        let obs = tracker.update(&frame(10.0), vec![det(100.0, 100.0, 160.0, 240.0)]);
        assert_eq!(obs.len(), 1);
        assert_ne!(
            obs[0].id, first_id,
            "a removed track id must not be reassigned"
        );
    }

    #[test]
    fn test_brief_occlusion_keeps_id() {
        let config = HybridTrackerConfig {
            min_hits: 1,
            max_age_frames: 10,
            ..HybridTrackerConfig::default()
        };
        let mut tracker = HybridTracker::new(config);

        let id = tracker.update(&frame(0.0), vec![det(100.0, 100.0, 160.0, 240.0)])[0].id;
        tracker.update(&frame(1.0), vec![]);
        tracker.update(&frame(2.0), vec![]);

        let obs = tracker.update(&frame(3.0), vec![det(102.0, 100.0, 162.0, 240.0)]);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].id, id, "short occlusions must not split the track");
    }

    #[test]
    fn test_iou_stage_resolves_zero_similarity_embeddings() {
        let config = HybridTrackerConfig {
            min_hits: 1,
            ..HybridTrackerConfig::default()
        };
        let mut tracker = HybridTracker::new(config);

        // Two well-separated tracks whose embeddings are orthogonal to every
        // later detection embedding — the appearance stage can never match.
        let left_id;
        let right_id;
        {
            let obs = tracker.update(
                &frame(0.0),
                vec![
                    det_with_embedding(100.0, 100.0, 160.0, 240.0, vec![1.0, 0.0, 0.0, 0.0]),
                    det_with_embedding(900.0, 100.0, 960.0, 240.0, vec![0.0, 1.0, 0.0, 0.0]),
                ],
            );
            left_id = obs.iter().find(|o| o.bbox[0] < 500.0).unwrap().id;
            right_id = obs.iter().find(|o| o.bbox[0] >= 500.0).unwrap().id;
        }

        let obs = tracker.update(
            &frame(1.0),
            vec![
                det_with_embedding(905.0, 100.0, 965.0, 240.0, vec![0.0, 0.0, 0.0, 1.0]),
                det_with_embedding(105.0, 100.0, 165.0, 240.0, vec![0.0, 0.0, 1.0, 0.0]),
            ],
        );

        assert_eq!(obs.len(), 2);
        let left = obs.iter().find(|o| o.bbox[0] < 500.0).unwrap();
        let right = obs.iter().find(|o| o.bbox[0] >= 500.0).unwrap();
        assert_eq!(
            left.id, left_id,
            "geometry stage must pair the spatially overlapping detection"
        );
        assert_eq!(right.id, right_id);
    }

    #[test]
    fn test_low_confidence_detections_ignored() {
        let mut tracker = HybridTracker::new(HybridTrackerConfig::default());
        let mut d = det(100.0, 100.0, 160.0, 240.0);
        d.confidence = 0.2;

        let obs = tracker.update(&frame(0.0), vec![d]);
        assert!(obs.is_empty());
        assert_eq!(tracker.track_count(), 0);
    }

    #[test]
    fn test_confirmation_suppresses_flicker() {
        let mut tracker = HybridTracker::new(HybridTrackerConfig::default());

        // A detection that appears once and vanishes never gets emitted
        let obs = tracker.update(&frame(0.0), vec![det(500.0, 500.0, 560.0, 640.0)]);
        assert!(obs.is_empty(), "unconfirmed tracks must not be emitted");

        for i in 1..5 {
            let obs = tracker.update(&frame(i as f64), vec![]);
            assert!(obs.is_empty());
        }
    }
}
