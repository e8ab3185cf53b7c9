// src/types.rs
//
// Canonical data model shared across the analysis pipeline: configuration,
// frame/detection inputs, track points, derived events, and the final report.
// Detector backends are adapted into the single `Detection` shape here so the
// tracker and metrics code never see backend-specific output.

use crate::analysis::team::TeamMethod;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Minimum detection confidence accepted by the tracker
    pub confidence_threshold: f32,
    /// Tracks shorter than this (seconds) are dropped before metrics
    pub min_track_length_seconds: f64,
    /// Hard cap on computed player speed (m/s)
    pub max_speed_ms: f64,
    /// Speed above which a point is flagged as sprinting (m/s)
    pub sprint_threshold_ms: f64,
    /// Defender-attacker distance below which pressing is considered (m)
    pub pressing_distance_m: f64,
    /// Minimum defender speed for a pressing event (m/s)
    pub pressing_speed_threshold_ms: f64,
    /// Savitzky-Golay window length (points, forced odd)
    pub smoothing_window: usize,
    /// Time gaps above this (seconds) zero the velocity for that step
    pub max_frame_gap_seconds: f64,
    /// Displacements above this (meters) zero the velocity for that step
    pub max_distance_jump_m: f64,
    pub field_length_m: f64,
    pub field_width_m: f64,
    pub max_video_size_mb: f64,
    /// Process every Nth frame within a clip range
    pub frame_skip: usize,

    pub enable_pass_detection: bool,
    /// Players closer than this (m) open a potential pass
    pub pass_proximity_threshold_m: f64,
    /// Minimum receiver displacement for a valid pass (m)
    pub pass_min_distance_m: f64,
    /// Maximum realistic pass distance (m)
    pub pass_max_distance_m: f64,
    /// Maximum time between pass start and completion (s)
    pub pass_max_duration_s: f64,
    /// Receiver speed above which a completed pass counts as controlled (m/s)
    pub pass_velocity_threshold_ms: f64,

    /// Maximum foot-to-ball distance for possession assignment (px)
    pub ball_possession_radius_px: f64,

    /// How players are assigned to teams when no clustering is available
    pub team_method: TeamMethod,

    pub model: ModelConfig,
    pub classes: ClassMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the detector/embedding weights, resolved by the backend
    pub path: String,
    /// Allow loading a locally supplied weight artifact without a
    /// provenance check. Off unless the artifact is under the operator's
    /// control.
    pub trust_local_weights: bool,
}

/// Backend class-id mapping used when adapting raw detector output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMap {
    pub player: u32,
    pub ball: u32,
    pub referee: Option<u32>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            min_track_length_seconds: 1.0,
            max_speed_ms: 12.5,
            sprint_threshold_ms: 7.0,
            pressing_distance_m: 3.5,
            pressing_speed_threshold_ms: 2.5,
            smoothing_window: 15,
            max_frame_gap_seconds: 0.5,
            max_distance_jump_m: 10.0,
            field_length_m: 105.0,
            field_width_m: 68.0,
            max_video_size_mb: 2000.0,
            frame_skip: 1,
            enable_pass_detection: true,
            pass_proximity_threshold_m: 3.0,
            pass_min_distance_m: 2.0,
            pass_max_distance_m: 40.0,
            pass_max_duration_s: 3.0,
            pass_velocity_threshold_ms: 1.5,
            ball_possession_radius_px: 70.0,
            team_method: TeamMethod::Position,
            model: ModelConfig {
                path: "yolov8n.onnx".to_string(),
                trust_local_weights: false,
            },
            classes: ClassMap::default(),
        }
    }
}

impl Default for ClassMap {
    fn default() -> Self {
        // COCO ids: 0 = person, 32 = sports ball
        Self {
            player: 0,
            ball: 32,
            referee: None,
        }
    }
}

/// Decoded video frame in RGB, row-major.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    /// Seconds from video start
    pub timestamp: f64,
}

#[derive(Debug, Clone)]
pub struct VideoMetadata {
    pub path: String,
    pub width: usize,
    pub height: usize,
    pub fps: f64,
    pub total_frames: usize,
    pub duration_seconds: f64,
    pub size_mb: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectClass {
    Player,
    Ball,
    Referee,
}

impl ObjectClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "PLAYER",
            Self::Ball => "BALL",
            Self::Referee => "REFEREE",
        }
    }
}

impl ClassMap {
    /// Map a backend class id onto the canonical object class.
    /// Ids outside the map are not pitch objects and yield `None`.
    pub fn resolve(&self, class_id: u32) -> Option<ObjectClass> {
        if class_id == self.player {
            Some(ObjectClass::Player)
        } else if class_id == self.ball {
            Some(ObjectClass::Ball)
        } else if self.referee == Some(class_id) {
            Some(ObjectClass::Referee)
        } else {
            None
        }
    }
}

/// Canonical per-frame detection, produced by a backend adapter.
#[derive(Debug, Clone)]
pub struct Detection {
    /// [x1, y1, x2, y2] pixels
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class: ObjectClass,
    /// Appearance vector, filled in by the embedding extractor
    pub embedding: Option<Vec<f32>>,
}

impl Detection {
    pub fn new(bbox: [f32; 4], confidence: f32, class: ObjectClass) -> Self {
        Self {
            bbox,
            confidence,
            class,
            embedding: None,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.bbox[0] + self.bbox[2]) * 0.5,
            (self.bbox[1] + self.bbox[3]) * 0.5,
        )
    }

    /// Bottom-center of the box — the ground contact point used for
    /// pitch-plane projection.
    pub fn foot_position(&self) -> (f32, f32) {
        ((self.bbox[0] + self.bbox[2]) * 0.5, self.bbox[3])
    }

    pub fn area(&self) -> f32 {
        (self.bbox[2] - self.bbox[0]).max(0.0) * (self.bbox[3] - self.bbox[1]).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamLabel {
    TeamA,
    TeamB,
    Ball,
    Unknown,
}

impl TeamLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TeamA => "A",
            Self::TeamB => "B",
            Self::Ball => "BALL",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn is_team(&self) -> bool {
        matches!(self, Self::TeamA | Self::TeamB)
    }

    pub fn opponent(&self) -> Option<TeamLabel> {
        match self {
            Self::TeamA => Some(Self::TeamB),
            Self::TeamB => Some(Self::TeamA),
            _ => None,
        }
    }
}

/// One observation of one track in one processed frame. Owned by the
/// metrics engine once created; immutable after the metrics pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackPoint {
    pub frame: usize,
    pub timestamp: f64,
    /// Pixel center
    pub x: f64,
    pub y: f64,
    /// Raw pitch coordinates (meters), absent when calibration is disabled
    pub xm: Option<f64>,
    pub ym: Option<f64>,
    /// Smoothed pitch coordinates, filled by the metrics pass
    pub xm_smooth: Option<f64>,
    pub ym_smooth: Option<f64>,
    pub velocity: f64,
    pub acceleration: f64,
    pub is_sprinting: bool,
    pub xthreat: f64,
    pub team: TeamLabel,
    pub confidence: f32,
    pub bbox: [f32; 4],
    pub has_ball: bool,
}

impl TrackPoint {
    pub fn new(
        frame: usize,
        timestamp: f64,
        x: f64,
        y: f64,
        team: TeamLabel,
        confidence: f32,
        bbox: [f32; 4],
    ) -> Self {
        Self {
            frame,
            timestamp,
            x,
            y,
            xm: None,
            ym: None,
            xm_smooth: None,
            ym_smooth: None,
            velocity: 0.0,
            acceleration: 0.0,
            is_sprinting: false,
            xthreat: 0.0,
            team,
            confidence,
            bbox,
            has_ball: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStats {
    pub player_id: u32,
    pub total_distance: f64,
    pub max_speed: f64,
    pub avg_speed: f64,
    pub sprints: usize,
    pub team: TeamLabel,
    pub track_duration: f64,
    pub frames_tracked: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressingEvent {
    pub frame: usize,
    pub timestamp: f64,
    pub defender_id: u32,
    pub attacker_id: u32,
    pub distance: f64,
    pub defender_speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassType {
    Short,
    Medium,
    Long,
}

impl PassType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassEvent {
    pub frame: usize,
    pub timestamp: f64,
    pub passer_id: u32,
    pub receiver_id: u32,
    pub team: TeamLabel,
    /// Receiver displacement over the pass (m)
    pub distance: f64,
    pub duration: f64,
    pub pass_type: PassType,
    /// Receiver was moving fast enough to have controlled the ball
    pub success: bool,
    pub start_position: (f64, f64),
    pub end_position: (f64, f64),
    pub xthreat_delta: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassingNetworkMetrics {
    pub team: TeamLabel,
    pub total_passes: usize,
    pub successful_passes: usize,
    pub pass_completion_rate: f64,
    pub avg_pass_distance: f64,
    /// (player id, pass count), highest volume first
    pub key_passers: Vec<(u32, usize)>,
    pub key_receivers: Vec<(u32, usize)>,
    /// Player triples forming directed 3-cycles in the pass graph
    pub passing_triangles: Vec<(u32, u32, u32)>,
    /// Normalized degree centrality per player
    pub network_centrality: Vec<(u32, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassingPrediction {
    pub frame: usize,
    pub timestamp: f64,
    pub ball_carrier_id: u32,
    pub receiver_id: u32,
    pub probability: f64,
    pub distance: f64,
    pub receiver_position: (f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TacticalEventType {
    CounterAttack,
    HighPress,
}

impl TacticalEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CounterAttack => "counter_attack",
            Self::HighPress => "high_press",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TacticalAlert {
    pub frame: usize,
    pub timestamp: f64,
    pub event_type: TacticalEventType,
    pub team: TeamLabel,
    pub severity: AlertSeverity,
    pub description: String,
    pub players_involved: Vec<u32>,
}

/// A time range of the source video to analyze, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClipRange {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub video_path: String,
    pub duration: f64,
    pub fps: f64,
    pub resolution: (usize, usize),
    pub processing_time: f64,
    /// Processing stopped early on a cooperative cancel; the payload holds
    /// everything collected up to that point
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub metadata: ReportMetadata,
    pub stats: Vec<PlayerStats>,
    /// (track id, observations) per persistent identity
    pub tracks: Vec<(u32, Vec<TrackPoint>)>,
    pub pressing_events: Vec<PressingEvent>,
    pub passes: Vec<PassEvent>,
    pub network_metrics: Vec<PassingNetworkMetrics>,
    pub passing_predictions: Vec<PassingPrediction>,
    pub tactical_alerts: Vec<TacticalAlert>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable classification string, e.g. "VideoError"
    pub kind: String,
    pub message: String,
}

/// What the orchestrator hands back for every job: either a payload or a
/// classified error, never a raw fault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub success: bool,
    pub error: Option<ErrorInfo>,
    pub payload: Option<AnalysisPayload>,
}

impl AnalysisReport {
    pub fn ok(payload: AnalysisPayload) -> Self {
        Self {
            success: true,
            error: None,
            payload: Some(payload),
        }
    }

    pub fn failed(kind: &str, message: String) -> Self {
        Self {
            success: false,
            error: Some(ErrorInfo {
                kind: kind.to_string(),
                message,
            }),
            payload: None,
        }
    }
}
