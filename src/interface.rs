// src/interface.rs
//
// Collaborator-facing traits. Detection, appearance embedding, and frame
// decoding are external concerns; the core only sees these interfaces and
// the canonical `Detection` shape produced by the backend adapter.

use crate::embedding::Crop;
use crate::error::AnalysisError;
use crate::types::{ClassMap, Detection, Frame, ModelConfig, VideoMetadata};

/// Object detector backend, called once per processed frame.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, AnalysisError>;
}

/// Appearance feature model. Implementations must be safe to call from
/// independent job threads concurrently — a shared instance carries no
/// per-call mutable state.
pub trait EmbeddingModel: Send + Sync {
    /// One vector per crop, same order, fixed dimensionality.
    fn embed(&self, crops: &[Crop]) -> Result<Vec<Vec<f32>>, AnalysisError>;

    fn dimension(&self) -> usize;
}

/// Decoded-frame provider for one video. Frame reads are the pipeline's
/// only suspension points besides model inference.
pub trait VideoSource {
    fn metadata(&self) -> VideoMetadata;

    /// Position the source so the next read returns `frame_index`.
    fn seek(&mut self, frame_index: usize) -> Result<(), AnalysisError>;

    /// `Ok(None)` at end of stream. A failed mid-stream read is the
    /// caller's cue to skip ahead, not to abort.
    fn read_frame(&mut self) -> Result<Option<Frame>, AnalysisError>;
}

/// Options handed to a backend when it loads its weight artifact.
#[derive(Debug, Clone)]
pub struct ModelLoadOptions {
    pub path: String,
    /// Explicitly trust a locally-specified artifact at load time. Backends
    /// that distinguish trusted deserialization must honor this flag instead
    /// of patching it in at runtime.
    pub trust_local_weights: bool,
}

impl From<&ModelConfig> for ModelLoadOptions {
    fn from(config: &ModelConfig) -> Self {
        Self {
            path: config.path.clone(),
            trust_local_weights: config.trust_local_weights,
        }
    }
}

/// Raw backend output before class-id normalization.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: u32,
}

/// Adapter from backend class ids to canonical detections. Classes outside
/// the map (spectators, staff, benches) are dropped here so the tracker
/// never sees them.
pub fn adapt_detections(raw: Vec<RawDetection>, classes: &ClassMap) -> Vec<Detection> {
    raw.into_iter()
        .filter_map(|r| {
            classes
                .resolve(r.class_id)
                .map(|class| Detection::new(r.bbox, r.confidence, class))
        })
        .collect()
}
