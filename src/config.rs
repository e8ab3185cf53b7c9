// src/config.rs

use crate::error::AnalysisError;
use crate::types::AnalysisConfig;
use std::fs;
use std::path::Path;

impl AnalysisConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let contents = fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0) {
            return Err(AnalysisError::Config(format!(
                "confidence_threshold must be in (0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.max_speed_ms <= 0.0 {
            return Err(AnalysisError::Config(
                "max_speed_ms must be positive".to_string(),
            ));
        }
        if self.min_track_length_seconds <= 0.0 {
            return Err(AnalysisError::Config(
                "min_track_length_seconds must be positive".to_string(),
            ));
        }
        if self.smoothing_window < 3 {
            return Err(AnalysisError::Config(format!(
                "smoothing_window must be at least 3, got {}",
                self.smoothing_window
            )));
        }
        if self.frame_skip == 0 {
            return Err(AnalysisError::Config(
                "frame_skip must be at least 1".to_string(),
            ));
        }
        if self.pass_min_distance_m > self.pass_max_distance_m {
            return Err(AnalysisError::Config(format!(
                "pass_min_distance_m ({}) exceeds pass_max_distance_m ({})",
                self.pass_min_distance_m, self.pass_max_distance_m
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::types::AnalysisConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let mut config = AnalysisConfig::default();
        config.confidence_threshold = 0.0;
        assert!(config.validate().is_err());

        config.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nonpositive_speed_rejected() {
        let mut config = AnalysisConfig::default();
        config.max_speed_ms = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrips_through_yaml() {
        let config = AnalysisConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: AnalysisConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.confidence_threshold, config.confidence_threshold);
        assert_eq!(parsed.smoothing_window, config.smoothing_window);
        assert_eq!(parsed.classes.ball, 32);
    }
}
