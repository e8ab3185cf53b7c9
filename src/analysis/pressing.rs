// src/analysis/pressing.rs
//
// Pressing detection: a defender closing on a cross-team attacker at speed.
// Raw events fire per frame and are deduplicated afterwards — consecutive
// events for the same (defender, attacker) pair inside a one-second window
// collapse into one.

use super::passes::index_by_frame;
use crate::types::{AnalysisConfig, PressingEvent, TeamLabel, TrackPoint};
use std::collections::BTreeMap;
use tracing::info;

const DEDUP_WINDOW_SECONDS: f64 = 1.0;

pub struct PressingDetector {
    config: AnalysisConfig,
}

impl PressingDetector {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, tracks: &BTreeMap<u32, Vec<TrackPoint>>) -> Vec<PressingEvent> {
        let frames = index_by_frame(tracks);
        let mut events = Vec::new();

        for (&frame, players) in &frames {
            let team_a: Vec<&(u32, &TrackPoint)> = players
                .iter()
                .filter(|(_, p)| p.team == TeamLabel::TeamA)
                .collect();
            let team_b: Vec<&(u32, &TrackPoint)> = players
                .iter()
                .filter(|(_, p)| p.team == TeamLabel::TeamB)
                .collect();

            self.scan_pairs(frame, &team_a, &team_b, &mut events);
            self.scan_pairs(frame, &team_b, &team_a, &mut events);
        }

        let events = dedup_events(events);
        info!("Detected {} pressing events", events.len());
        events
    }

    fn scan_pairs(
        &self,
        frame: usize,
        defenders: &[&(u32, &TrackPoint)],
        attackers: &[&(u32, &TrackPoint)],
        events: &mut Vec<PressingEvent>,
    ) {
        for &(def_id, def_p) in defenders {
            if def_p.velocity <= self.config.pressing_speed_threshold_ms {
                continue;
            }

            for &(att_id, att_p) in attackers {
                let dx = def_p.xm_smooth.unwrap_or(0.0) - att_p.xm_smooth.unwrap_or(0.0);
                let dy = def_p.ym_smooth.unwrap_or(0.0) - att_p.ym_smooth.unwrap_or(0.0);
                let dist = (dx * dx + dy * dy).sqrt();

                if dist < self.config.pressing_distance_m {
                    events.push(PressingEvent {
                        frame,
                        timestamp: def_p.timestamp,
                        defender_id: *def_id,
                        attacker_id: *att_id,
                        distance: dist,
                        defender_speed: def_p.velocity,
                    });
                }
            }
        }
    }
}

/// Collapse repeats: after sorting by timestamp, an event matching the last
/// kept event's pair within the window is a continuation, not a new press.
fn dedup_events(mut events: Vec<PressingEvent>) -> Vec<PressingEvent> {
    if events.is_empty() {
        return events;
    }

    events.sort_by(|a, b| {
        a.timestamp
            .partial_cmp(&b.timestamp)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut unique: Vec<PressingEvent> = vec![events[0].clone()];
    for event in events.into_iter().skip(1) {
        let last = unique.last().expect("unique starts non-empty");
        let same_pair =
            event.defender_id == last.defender_id && event.attacker_id == last.attacker_id;
        if same_pair && event.timestamp - last.timestamp < DEDUP_WINDOW_SECONDS {
            continue;
        }
        unique.push(event);
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(frame: usize, t: f64, xm: f64, ym: f64, team: TeamLabel, velocity: f64) -> TrackPoint {
        let mut p = TrackPoint::new(frame, t, xm * 10.0, ym * 10.0, team, 0.9, [0.0; 4]);
        p.xm = Some(xm);
        p.ym = Some(ym);
        p.xm_smooth = Some(xm);
        p.ym_smooth = Some(ym);
        p.velocity = velocity;
        p
    }

    fn raw(defender: u32, attacker: u32, t: f64) -> PressingEvent {
        PressingEvent {
            frame: (t * 30.0) as usize,
            timestamp: t,
            defender_id: defender,
            attacker_id: attacker,
            distance: 2.0,
            defender_speed: 3.0,
        }
    }

    #[test]
    fn test_fast_close_defender_triggers_event() {
        let config = AnalysisConfig::default();
        let mut tracks = BTreeMap::new();
        tracks.insert(1, vec![point(0, 0.0, 10.0, 10.0, TeamLabel::TeamA, 4.0)]);
        tracks.insert(2, vec![point(0, 0.0, 12.0, 10.0, TeamLabel::TeamB, 0.5)]);

        let events = PressingDetector::new(config).detect(&tracks);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].defender_id, 1);
        assert_eq!(events[0].attacker_id, 2);
        assert!((events[0].distance - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_slow_defender_is_not_pressing() {
        let config = AnalysisConfig::default();
        let mut tracks = BTreeMap::new();
        // Close, but neither player moves fast enough
        tracks.insert(1, vec![point(0, 0.0, 10.0, 10.0, TeamLabel::TeamA, 1.0)]);
        tracks.insert(2, vec![point(0, 0.0, 12.0, 10.0, TeamLabel::TeamB, 1.0)]);

        let events = PressingDetector::new(config).detect(&tracks);
        assert!(events.is_empty());
    }

    #[test]
    fn test_distant_players_not_pressing() {
        let config = AnalysisConfig::default();
        let mut tracks = BTreeMap::new();
        tracks.insert(1, vec![point(0, 0.0, 10.0, 10.0, TeamLabel::TeamA, 4.0)]);
        tracks.insert(2, vec![point(0, 0.0, 20.0, 10.0, TeamLabel::TeamB, 0.5)]);

        let events = PressingDetector::new(config).detect(&tracks);
        assert!(events.is_empty());
    }

    #[test]
    fn test_same_team_proximity_ignored() {
        let config = AnalysisConfig::default();
        let mut tracks = BTreeMap::new();
        tracks.insert(1, vec![point(0, 0.0, 10.0, 10.0, TeamLabel::TeamA, 4.0)]);
        tracks.insert(2, vec![point(0, 0.0, 11.0, 10.0, TeamLabel::TeamA, 4.0)]);

        let events = PressingDetector::new(config).detect(&tracks);
        assert!(events.is_empty());
    }

    #[test]
    fn test_dedup_collapses_within_window() {
        let events = dedup_events(vec![raw(1, 2, 10.0), raw(1, 2, 10.5)]);
        assert_eq!(events.len(), 1, "0.5s apart, same pair: one event");
    }

    #[test]
    fn test_dedup_keeps_events_beyond_window() {
        let events = dedup_events(vec![raw(1, 2, 10.0), raw(1, 2, 11.5)]);
        assert_eq!(events.len(), 2, "1.5s apart: two distinct presses");
    }

    #[test]
    fn test_dedup_distinguishes_pairs() {
        let events = dedup_events(vec![raw(1, 2, 10.0), raw(3, 2, 10.2)]);
        assert_eq!(events.len(), 2, "different defenders are different events");
    }

    #[test]
    fn test_both_directions_scanned() {
        let config = AnalysisConfig::default();
        let mut tracks = BTreeMap::new();
        // Both players fast and close: A presses B and B presses A
        tracks.insert(1, vec![point(0, 0.0, 10.0, 10.0, TeamLabel::TeamA, 4.0)]);
        tracks.insert(2, vec![point(0, 0.0, 12.0, 10.0, TeamLabel::TeamB, 4.0)]);

        let events = PressingDetector::new(config).detect(&tracks);
        assert_eq!(events.len(), 2);
    }
}
