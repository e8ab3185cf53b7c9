pub mod analysis;
pub mod analyzer;
pub mod calibration;
pub mod embedding;
pub mod error;
pub mod interface;
pub mod jobs;
pub mod types;

mod config;

pub use analysis::{HybridTracker, HybridTrackerConfig, MetricsEngine, TeamMethod};
pub use analyzer::{MatchAnalyzer, ProgressCallback, BALL_TRACK_ID};
pub use calibration::HomographyTransform;
pub use embedding::EmbeddingExtractor;
pub use error::AnalysisError;
pub use interface::{Detector, EmbeddingModel, VideoSource};
pub use jobs::{JobRegistry, JobStatus};
pub use types::{
    AnalysisConfig, AnalysisPayload, AnalysisReport, ClipRange, Detection, Frame, ObjectClass,
    PassEvent, PlayerStats, PressingEvent, TeamLabel, TrackPoint, VideoMetadata,
};
