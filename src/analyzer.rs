// src/analyzer.rs
//
// Analysis orchestrator: validates the video, resolves clip ranges, drives
// detector → tracker → transform per frame, then runs the metrics and event
// passes and assembles the report. One analyzer processes one video end to
// end on one thread; run concurrent jobs with independent analyzers.

use crate::analysis::metrics::MetricsEngine;
use crate::analysis::passes::{PassDetector, PassingNetworkAnalyzer};
use crate::analysis::pressing::PressingDetector;
use crate::analysis::tactical::{PassingEngine, TacticalEngine};
use crate::analysis::team::{TeamClassifier, TeamMethod};
use crate::analysis::tracker::{HybridTracker, HybridTrackerConfig, TrackObservation};
use crate::calibration::HomographyTransform;
use crate::embedding::{cluster_teams, EmbeddingExtractor};
use crate::error::AnalysisError;
use crate::interface::{Detector, EmbeddingModel, VideoSource};
use crate::types::{
    AnalysisConfig, AnalysisPayload, AnalysisReport, ClipRange, Detection, ObjectClass,
    ReportMetadata, TeamLabel, TrackPoint, VideoMetadata,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Synthetic track id collecting all (untracked) ball detections. Player
/// ids count up from 1 and never reach it.
pub const BALL_TRACK_ID: u32 = u32::MAX;

/// Frames between progress reports during tracking (~1s at 30fps).
const PROGRESS_INTERVAL: usize = 30;

pub type ProgressCallback = Box<dyn Fn(usize, usize, &str) + Send>;

pub struct MatchAnalyzer {
    config: AnalysisConfig,
    detector: Box<dyn Detector>,
    embedder: Option<Arc<dyn EmbeddingModel>>,
    homography: HomographyTransform,
    progress: Option<ProgressCallback>,
    stop_flag: Arc<AtomicBool>,
}

impl MatchAnalyzer {
    pub fn new(config: AnalysisConfig, detector: Box<dyn Detector>) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            config,
            detector,
            embedder: None,
            homography: HomographyTransform::disabled(),
            progress: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_embedding_model(mut self, model: Arc<dyn EmbeddingModel>) -> Self {
        self.embedder = Some(model);
        self
    }

    pub fn with_homography(mut self, homography: HomographyTransform) -> Self {
        self.homography = homography;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Cooperative cancel handle: set it and the frame loop stops at the
    /// next iteration, returning whatever was collected.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    fn report_progress(&self, current: usize, total: usize, message: &str) {
        if let Some(callback) = &self.progress {
            callback(current, total, message);
        }
    }

    /// Run the full pipeline. Always returns a report: a payload on
    /// success (or cancellation), a classified error otherwise.
    pub fn analyze(
        &mut self,
        source: &mut dyn VideoSource,
        clips: Option<&[ClipRange]>,
    ) -> AnalysisReport {
        match self.try_analyze(source, clips) {
            Ok(payload) => AnalysisReport::ok(payload),
            Err(e) => {
                error!("Analysis failed: {}", e);
                AnalysisReport::failed(e.kind(), e.to_string())
            }
        }
    }

    fn try_analyze(
        &mut self,
        source: &mut dyn VideoSource,
        clips: Option<&[ClipRange]>,
    ) -> Result<AnalysisPayload, AnalysisError> {
        let started = Instant::now();

        let metadata = source.metadata();
        self.validate_video(&metadata)?;

        let ranges = self.parse_clips(clips, metadata.fps, metadata.total_frames);

        self.report_progress(0, 100, "Starting player tracking");
        let (mut tracks, cancelled) = self.track_objects(source, &ranges, &metadata)?;

        if tracks.is_empty() && !cancelled {
            return Err(AnalysisError::Processing(
                "no players detected in video".to_string(),
            ));
        }

        self.report_progress(50, 100, "Computing metrics");
        let metrics = MetricsEngine::new(self.config.clone());
        metrics.compute(&mut tracks, metadata.fps);

        let stats = metrics.player_stats(&tracks);

        self.report_progress(80, 100, "Detecting events");
        let pressing_events = PressingDetector::new(self.config.clone()).detect(&tracks);

        self.assign_ball_possession(&mut tracks);

        let mut passes = vec![];
        let mut network_metrics = vec![];
        if self.config.enable_pass_detection {
            self.report_progress(85, 100, "Detecting passes");
            passes = PassDetector::new(self.config.clone()).detect(&tracks);

            self.report_progress(90, 100, "Analyzing passing networks");
            network_metrics = vec![
                PassingNetworkAnalyzer::analyze(&passes, TeamLabel::TeamA),
                PassingNetworkAnalyzer::analyze(&passes, TeamLabel::TeamB),
            ];
        }

        self.report_progress(92, 100, "Computing passing predictions");
        let passing_predictions = PassingEngine::new(self.config.clone()).predict(&tracks);

        self.report_progress(94, 100, "Detecting tactical events");
        let tactical_alerts = TacticalEngine::new(self.config.clone()).detect(&tracks);

        let payload = AnalysisPayload {
            metadata: ReportMetadata {
                video_path: metadata.path.clone(),
                duration: metadata.duration_seconds,
                fps: metadata.fps,
                resolution: (metadata.width, metadata.height),
                processing_time: started.elapsed().as_secs_f64(),
                cancelled,
            },
            stats,
            tracks: tracks.into_iter().collect(),
            pressing_events,
            passes,
            network_metrics,
            passing_predictions,
            tactical_alerts,
        };

        self.report_progress(100, 100, "Analysis complete");
        info!(
            "Analysis completed in {:.1}s",
            payload.metadata.processing_time
        );
        Ok(payload)
    }

    fn validate_video(&self, metadata: &VideoMetadata) -> Result<(), AnalysisError> {
        if metadata.size_mb > self.config.max_video_size_mb {
            return Err(AnalysisError::Video(format!(
                "video size ({:.1}MB) exceeds limit ({}MB)",
                metadata.size_mb, self.config.max_video_size_mb
            )));
        }
        if metadata.fps <= 0.0 || metadata.total_frames == 0 {
            return Err(AnalysisError::Video("invalid video metadata".to_string()));
        }

        info!(
            "Video validated: {}x{}, {:.1}fps, {:.1}s",
            metadata.width, metadata.height, metadata.fps, metadata.duration_seconds
        );
        Ok(())
    }

    /// Resolve second-based clip ranges into frame ranges. Invalid entries
    /// are skipped with a warning; no usable range falls back to the whole
    /// video.
    fn parse_clips(
        &self,
        clips: Option<&[ClipRange]>,
        fps: f64,
        total_frames: usize,
    ) -> Vec<(usize, usize)> {
        let clips = match clips {
            Some(c) if !c.is_empty() => c,
            _ => return vec![(0, total_frames)],
        };

        let mut ranges = Vec::new();
        for clip in clips {
            let start = ((clip.start * fps).max(0.0)) as usize;
            let end = ((clip.end * fps) as usize).min(total_frames);

            if start >= end {
                warn!("Invalid clip range: {}-{}, skipping", start, end);
                continue;
            }

            info!(
                "Added clip: frames {}-{} ({:.1}s)",
                start,
                end,
                (end - start) as f64 / fps
            );
            ranges.push((start, end));
        }

        if ranges.is_empty() {
            vec![(0, total_frames)]
        } else {
            ranges
        }
    }

    /// Frame loop: decode → detect → track → label → project. Returns the
    /// collected tracks and whether the loop was cancelled mid-way.
    fn track_objects(
        &mut self,
        source: &mut dyn VideoSource,
        ranges: &[(usize, usize)],
        metadata: &VideoMetadata,
    ) -> Result<(BTreeMap<u32, Vec<TrackPoint>>, bool), AnalysisError> {
        let mut tracker_config = HybridTrackerConfig::for_frame_rate(metadata.fps);
        tracker_config.confidence_threshold = self.config.confidence_threshold;

        let mut tracker = HybridTracker::new(tracker_config);
        if let Some(model) = &self.embedder {
            tracker = tracker.with_embedder(EmbeddingExtractor::new(Arc::clone(model)));
        }

        let mut team_classifier = TeamClassifier::new(self.config.team_method);
        let mut tracks: BTreeMap<u32, Vec<TrackPoint>> = BTreeMap::new();

        // Cluster-based team assignment: bootstrapped once from the first
        // frame with enough confirmed players, then looked up by track id.
        let cluster_extractor = match (self.config.team_method, &self.embedder) {
            (TeamMethod::Cluster, Some(model)) => {
                Some(EmbeddingExtractor::new(Arc::clone(model)))
            }
            _ => None,
        };
        let mut cluster_labels: Option<std::collections::HashMap<u32, TeamLabel>> = None;

        let total_to_process: usize = ranges.iter().map(|(s, e)| e - s).sum();
        let mut processed = 0usize;
        let mut cancelled = false;

        'ranges: for (range_idx, &(start_frame, end_frame)) in ranges.iter().enumerate() {
            info!(
                "Processing range {}/{}: frames {}-{}",
                range_idx + 1,
                ranges.len(),
                start_frame,
                end_frame
            );

            source.seek(start_frame)?;
            let mut frame_idx = start_frame;

            while frame_idx < end_frame {
                if self.stop_flag.load(Ordering::Relaxed) {
                    info!("Cancellation requested, returning partial results");
                    cancelled = true;
                    break 'ranges;
                }

                let frame = match source.read_frame() {
                    Ok(Some(f)) => f,
                    Ok(None) => {
                        warn!("Failed to read frame {}", frame_idx);
                        break;
                    }
                    Err(e) => {
                        warn!("Frame {} read error: {}, skipping", frame_idx, e);
                        frame_idx += 1;
                        continue;
                    }
                };

                if (frame_idx - start_frame) % self.config.frame_skip != 0 {
                    frame_idx += 1;
                    continue;
                }

                let timestamp = frame_idx as f64 / metadata.fps;

                let detections = match self.detector.detect(&frame) {
                    Ok(d) => d,
                    Err(e) => {
                        error!("Detection failed at frame {}: {}", frame_idx, e);
                        frame_idx += 1;
                        continue;
                    }
                };

                // Players and referees run through the tracker; the ball is
                // too small and erratic for the motion model, so its best
                // detection per frame is recorded directly.
                let (ball_dets, person_dets): (Vec<Detection>, Vec<Detection>) = detections
                    .into_iter()
                    .partition(|d| d.class == ObjectClass::Ball);

                let observations = tracker.update(&frame, person_dets);

                let needs_bootstrap = cluster_labels.is_none();
                if let Some(extractor) = cluster_extractor.as_ref().filter(|_| needs_bootstrap) {
                    let players: Vec<&TrackObservation> = observations
                        .iter()
                        .filter(|o| o.class == ObjectClass::Player)
                        .collect();
                    // Two full-ish sides make a much better 2-means seed
                    // than the first couple of confirmations
                    if players.len() >= 4 {
                        let boxes: Vec<[f32; 4]> = players
                            .iter()
                            .map(|o| {
                                [
                                    o.bbox[0] as f32,
                                    o.bbox[1] as f32,
                                    o.bbox[2] as f32,
                                    o.bbox[3] as f32,
                                ]
                            })
                            .collect();
                        let features = extractor.extract(&frame, &boxes);
                        let labels = cluster_teams(&features);
                        cluster_labels = Some(
                            players
                                .iter()
                                .zip(labels)
                                .map(|(o, label)| {
                                    let team = if label == 0 {
                                        TeamLabel::TeamA
                                    } else {
                                        TeamLabel::TeamB
                                    };
                                    (o.id, team)
                                })
                                .collect(),
                        );
                        info!(
                            "Team clustering bootstrapped from {} players at frame {}",
                            players.len(),
                            frame_idx
                        );
                    }
                }

                for observation in observations {
                    let bbox = [
                        observation.bbox[0] as f32,
                        observation.bbox[1] as f32,
                        observation.bbox[2] as f32,
                        observation.bbox[3] as f32,
                    ];
                    let cx = (observation.bbox[0] + observation.bbox[2]) / 2.0;
                    let cy = (observation.bbox[1] + observation.bbox[3]) / 2.0;
                    let foot = (cx, observation.bbox[3]);

                    let team = match observation.class {
                        ObjectClass::Player => cluster_labels
                            .as_ref()
                            .and_then(|labels| labels.get(&observation.id).copied())
                            .unwrap_or_else(|| team_classifier.classify(&frame, cx, &bbox)),
                        _ => TeamLabel::Unknown,
                    };

                    let mut point = TrackPoint::new(
                        frame_idx,
                        timestamp,
                        cx,
                        cy,
                        team,
                        observation.confidence,
                        bbox,
                    );
                    if self.homography.enabled() {
                        let (xm, ym) = self.homography.transform(foot.0, foot.1);
                        point.xm = Some(xm);
                        point.ym = Some(ym);
                    }

                    tracks.entry(observation.id).or_default().push(point);
                }

                let best_ball = ball_dets
                    .iter()
                    .filter(|d| d.confidence >= self.config.confidence_threshold)
                    .max_by(|a, b| {
                        a.confidence
                            .partial_cmp(&b.confidence)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                if let Some(ball) = best_ball {
                    let (cx, cy) = ball.center();
                    let foot = ball.foot_position();

                    let mut point = TrackPoint::new(
                        frame_idx,
                        timestamp,
                        cx as f64,
                        cy as f64,
                        TeamLabel::Ball,
                        ball.confidence,
                        ball.bbox,
                    );
                    if self.homography.enabled() {
                        let (xm, ym) = self.homography.transform(foot.0 as f64, foot.1 as f64);
                        point.xm = Some(xm);
                        point.ym = Some(ym);
                    }

                    tracks.entry(BALL_TRACK_ID).or_default().push(point);
                }

                frame_idx += 1;
                processed += 1;

                if processed % PROGRESS_INTERVAL == 0 {
                    self.report_progress(
                        processed,
                        total_to_process,
                        &format!("Tracking frame {}/{}", frame_idx, end_frame),
                    );
                }
            }
        }

        info!("Tracking complete. Found {} tracks", tracks.len());
        Ok((tracks, cancelled))
    }

    /// Per frame with a visible ball, flag the nearest player (by foot-to-
    /// ball pixel distance, within the configured radius) as in possession.
    fn assign_ball_possession(&self, tracks: &mut BTreeMap<u32, Vec<TrackPoint>>) {
        let ball_by_frame: BTreeMap<usize, (f64, f64)> = match tracks.get(&BALL_TRACK_ID) {
            Some(ball_track) => ball_track.iter().map(|p| (p.frame, (p.x, p.y))).collect(),
            None => return,
        };

        // (track id, point index) of the closest player per ball frame
        let mut owners: BTreeMap<usize, (u32, usize, f64)> = BTreeMap::new();

        for (&id, track) in tracks.iter() {
            if id == BALL_TRACK_ID {
                continue;
            }
            for (idx, point) in track.iter().enumerate() {
                if !point.team.is_team() {
                    continue;
                }
                let (bx, by) = match ball_by_frame.get(&point.frame) {
                    Some(pos) => *pos,
                    None => continue,
                };

                let foot_x = (point.bbox[0] + point.bbox[2]) as f64 / 2.0;
                let foot_y = point.bbox[3] as f64;
                let dist = ((foot_x - bx).powi(2) + (foot_y - by).powi(2)).sqrt();

                if dist > self.config.ball_possession_radius_px {
                    continue;
                }

                let closer = owners
                    .get(&point.frame)
                    .map_or(true, |&(_, _, best)| dist < best);
                if closer {
                    owners.insert(point.frame, (id, idx, dist));
                }
            }
        }

        for (_, (id, idx, _)) in owners {
            if let Some(track) = tracks.get_mut(&id) {
                track[idx].has_ball = true;
            }
        }
    }
}
