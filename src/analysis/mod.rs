// src/analysis/mod.rs
//
// Tracking-and-metrics pipeline modules.
//
// Signal flow:
//   Detections → tracker (kalman + association) ─→ TrackPoints
//   TrackPoints → metrics (smoothing, velocity, sprints, xthreat)
//   Metrics     → passes / pressing / tactical → events
//
// Orchestrated by analyzer::MatchAnalyzer.

pub mod association;
pub mod kalman;
pub mod metrics;
pub mod passes;
pub mod pressing;
pub mod tactical;
pub mod team;
pub mod track;
pub mod tracker;
pub mod xthreat;

// Re-exports for ergonomic access from the crate root
pub use association::AssignmentResult;
pub use kalman::BoxMotionModel;
pub use metrics::MetricsEngine;
pub use passes::{PassDetector, PassingNetworkAnalyzer};
pub use pressing::PressingDetector;
pub use tactical::{PassingEngine, TacticalEngine};
pub use team::{TeamClassifier, TeamMethod};
pub use track::{Track, TrackState};
pub use tracker::{HybridTracker, HybridTrackerConfig, TrackObservation};
pub use xthreat::XThreatGrid;
