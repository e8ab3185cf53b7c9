// src/error.rs

use thiserror::Error;

/// Error taxonomy for the analysis core. Input problems (video, calibration,
/// configuration) stop a job before processing; `Processing` is the terminal
/// failure class for a job that started but could not produce results.
/// Per-frame anomalies and numerical degeneracy are handled inline with safe
/// fallbacks and never surface here.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("video error: {0}")]
    Video(String),

    #[error("calibration error: {0}")]
    Calibration(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read config file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("processing error: {0}")]
    Processing(String),
}

impl AnalysisError {
    /// Stable classification string carried into `AnalysisReport.error.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Video(_) => "VideoError",
            Self::Calibration(_) => "CalibrationError",
            Self::Config(_) | Self::ConfigIo(_) | Self::ConfigParse(_) => "ConfigError",
            Self::Processing(_) => "ProcessingError",
        }
    }
}
