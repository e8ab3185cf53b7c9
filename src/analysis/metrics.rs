// src/analysis/metrics.rs
//
// Turns raw per-track meter coordinates into physically plausible
// trajectories and derived per-point metrics: Savitzky-Golay smoothing,
// velocity with teleportation rejection, clamped acceleration, sprint flags,
// and xThreat lookups. Runs once per job after tracking completes; track
// points are immutable afterwards.

use super::xthreat::XThreatGrid;
use crate::types::{AnalysisConfig, PlayerStats, TrackPoint};
use nalgebra::{Matrix3, Matrix3x1};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Fallback dt for a zero timestamp difference in the acceleration pass
/// (~30fps frame interval).
const ACCEL_FALLBACK_DT: f64 = 0.033;

const MAX_ACCELERATION: f64 = 10.0;

pub struct MetricsEngine {
    config: AnalysisConfig,
    xthreat: XThreatGrid,
}

impl MetricsEngine {
    pub fn new(config: AnalysisConfig) -> Self {
        let xthreat = XThreatGrid::new(config.field_length_m, config.field_width_m);
        Self { config, xthreat }
    }

    /// Smooth, derive, and flag every surviving track in place. Tracks
    /// shorter than the configured minimum are dropped; tracks without
    /// meter coordinates keep their raw values and are skipped.
    pub fn compute(&self, tracks: &mut BTreeMap<u32, Vec<TrackPoint>>, fps: f64) {
        let min_track_length = (self.config.min_track_length_seconds * fps) as usize;

        tracks.retain(|id, track| {
            if track.len() < min_track_length {
                debug!("Removing short track {}: {} points", id, track.len());
                false
            } else {
                true
            }
        });

        for (id, track) in tracks.iter_mut() {
            if track.first().and_then(|p| p.xm).is_none() {
                warn!("Track {}: no meter coordinates, skipping metrics", id);
                continue;
            }

            let coords: Vec<(f64, f64)> = track
                .iter()
                .map(|p| (p.xm.unwrap_or(p.x), p.ym.unwrap_or(p.y)))
                .collect();
            let timestamps: Vec<f64> = track.iter().map(|p| p.timestamp).collect();

            let smoothed = self.smooth_trajectory(&coords);
            let velocity = self.compute_velocity(&smoothed, &timestamps, fps);
            let acceleration = self.compute_acceleration(&velocity, &timestamps);

            for (i, point) in track.iter_mut().enumerate() {
                point.xm_smooth = Some(smoothed[i].0);
                point.ym_smooth = Some(smoothed[i].1);
                point.velocity = velocity[i];
                point.acceleration = acceleration[i];
                point.is_sprinting = velocity[i] > self.config.sprint_threshold_ms;
                point.xthreat = self.xthreat.value_at(smoothed[i].0, smoothed[i].1);
            }
        }

        info!("Metrics computed for {} tracks", tracks.len());
    }

    /// Savitzky-Golay smoothing: a quadratic fit over a sliding window,
    /// evaluated at each point. The window shifts inward at the edges so
    /// endpoints are fit, not extrapolated. Tracks too short to fit pass
    /// through unchanged.
    fn smooth_trajectory(&self, coords: &[(f64, f64)]) -> Vec<(f64, f64)> {
        let n = coords.len();
        let mut window = self.config.smoothing_window.min(n);
        if window % 2 == 0 {
            window -= 1;
        }
        if window < 3 {
            return coords.to_vec();
        }

        let half = window / 2;
        let mut smoothed = Vec::with_capacity(n);

        for i in 0..n {
            let start = i.saturating_sub(half).min(n - window);
            let xs: Vec<f64> = (0..window).map(|k| (start + k) as f64 - i as f64).collect();

            let fit_x = polyfit_quadratic_at_zero(&xs, &coords[start..start + window], |c| c.0);
            let fit_y = polyfit_quadratic_at_zero(&xs, &coords[start..start + window], |c| c.1);

            match (fit_x, fit_y) {
                (Some(x), Some(y)) => smoothed.push((x, y)),
                _ => smoothed.push(coords[i]),
            }
        }

        smoothed
    }

    /// Per-step speed with outlier rejection: implausible jumps and stale
    /// gaps zero the step instead of producing teleportation speeds.
    fn compute_velocity(&self, coords: &[(f64, f64)], timestamps: &[f64], fps: f64) -> Vec<f64> {
        let n = coords.len();
        let mut velocity = vec![0.0; n];

        for i in 1..n {
            let mut dt = timestamps[i] - timestamps[i - 1];
            if dt == 0.0 {
                dt = 1.0 / fps;
            }

            let dx = coords[i].0 - coords[i - 1].0;
            let dy = coords[i].1 - coords[i - 1].1;
            let dist = (dx * dx + dy * dy).sqrt();

            let v = if dist < self.config.max_distance_jump_m
                && dt < self.config.max_frame_gap_seconds
            {
                dist / dt
            } else {
                0.0
            };

            velocity[i] = v.clamp(0.0, self.config.max_speed_ms);
        }

        velocity
    }

    fn compute_acceleration(&self, velocity: &[f64], timestamps: &[f64]) -> Vec<f64> {
        let n = velocity.len();
        let mut accel = vec![0.0; n];

        for i in 1..n {
            let mut dt = timestamps[i] - timestamps[i - 1];
            if dt == 0.0 {
                dt = ACCEL_FALLBACK_DT;
            }
            accel[i] =
                ((velocity[i] - velocity[i - 1]) / dt).clamp(-MAX_ACCELERATION, MAX_ACCELERATION);
        }

        accel
    }

    /// Aggregate per-player statistics over completed tracks.
    pub fn player_stats(&self, tracks: &BTreeMap<u32, Vec<TrackPoint>>) -> Vec<PlayerStats> {
        let mut stats = Vec::new();

        for (&id, track) in tracks {
            let first = match track.first() {
                Some(p) if p.xm.is_some() => p,
                _ => continue,
            };

            let coords: Vec<(f64, f64)> = track
                .iter()
                .map(|p| {
                    (
                        p.xm_smooth.or(p.xm).unwrap_or(p.x),
                        p.ym_smooth.or(p.ym).unwrap_or(p.y),
                    )
                })
                .collect();

            let mut total_distance = 0.0;
            for pair in coords.windows(2) {
                let dx = pair[1].0 - pair[0].0;
                let dy = pair[1].1 - pair[0].1;
                let d = (dx * dx + dy * dy).sqrt();
                if d < self.config.max_distance_jump_m {
                    total_distance += d;
                }
            }

            let max_speed = track.iter().map(|p| p.velocity).fold(0.0, f64::max);
            let moving: Vec<f64> = track
                .iter()
                .map(|p| p.velocity)
                .filter(|&v| v > 0.0)
                .collect();
            let avg_speed = if moving.is_empty() {
                0.0
            } else {
                moving.iter().sum::<f64>() / moving.len() as f64
            };

            // Sprint events are rising edges, not sprinting frames
            let mut sprints = 0;
            let mut in_sprint = false;
            for p in track {
                if p.is_sprinting && !in_sprint {
                    sprints += 1;
                    in_sprint = true;
                } else if !p.is_sprinting {
                    in_sprint = false;
                }
            }

            let duration = track.last().map(|p| p.timestamp).unwrap_or(0.0) - first.timestamp;

            stats.push(PlayerStats {
                player_id: id,
                total_distance,
                max_speed,
                avg_speed,
                sprints,
                team: first.team,
                track_duration: duration,
                frames_tracked: track.len(),
            });
        }

        info!("Stats computed for {} players", stats.len());
        stats
    }
}

/// Quadratic least-squares over (xs, value) pairs, evaluated at x = 0.
/// `None` when the normal equations are singular (all-equal xs).
fn polyfit_quadratic_at_zero<T, F: Fn(&T) -> f64>(xs: &[f64], points: &[T], value: F) -> Option<f64> {
    let n = xs.len() as f64;

    let mut s_x1 = 0.0;
    let mut s_x2 = 0.0;
    let mut s_x3 = 0.0;
    let mut s_x4 = 0.0;
    let mut s_y = 0.0;
    let mut s_xy = 0.0;
    let mut s_x2y = 0.0;

    for (x, p) in xs.iter().zip(points.iter()) {
        let y = value(p);
        let x2 = x * x;
        s_x1 += x;
        s_x2 += x2;
        s_x3 += x2 * x;
        s_x4 += x2 * x2;
        s_y += y;
        s_xy += x * y;
        s_x2y += x2 * y;
    }

    let a = Matrix3::new(s_x4, s_x3, s_x2, s_x3, s_x2, s_x1, s_x2, s_x1, n);
    let b = Matrix3x1::new(s_x2y, s_xy, s_y);

    let qr = a.qr();
    let qty = qr.q().transpose() * b;
    let beta = qr.r().solve_upper_triangular(&qty)?;

    // Evaluating a*x^2 + b*x + c at x = 0 leaves the constant term
    Some(beta[2])
}
