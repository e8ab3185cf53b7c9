// src/analysis/tactical.rs
//
// Secondary heuristics over finished tracks: per-frame pass-option
// predictions around the ball carrier, and coarse tactical alerts
// (counter-attacks, high presses) with per-team debouncing.

use super::passes::index_by_frame;
use crate::types::{
    AlertSeverity, AnalysisConfig, PassingPrediction, TacticalAlert, TacticalEventType, TeamLabel,
    TrackPoint,
};
use std::collections::{BTreeMap, HashMap};

/// Player must be within this of the ball to count as the carrier (m).
const CARRIER_RADIUS_M: f64 = 2.0;

/// Predictions below this probability are noise, not options.
const MIN_PREDICTION_PROBABILITY: f64 = 0.3;

/// Opponents inside this radius of a receiver apply pressure (m).
const PRESSURE_RADIUS_M: f64 = 5.0;

const COUNTER_ATTACK_DEBOUNCE_S: f64 = 3.0;
const HIGH_PRESS_DEBOUNCE_S: f64 = 5.0;

fn dist(a: &TrackPoint, b: &TrackPoint) -> f64 {
    let dx = a.xm_smooth.unwrap_or(0.0) - b.xm_smooth.unwrap_or(0.0);
    let dy = a.ym_smooth.unwrap_or(0.0) - b.ym_smooth.unwrap_or(0.0);
    (dx * dx + dy * dy).sqrt()
}

// ============================================================================
// PASSING PREDICTIONS
// ============================================================================

pub struct PassingEngine {
    config: AnalysisConfig,
}

impl PassingEngine {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// For each frame with a visible ball: find the carrier, score every
    /// teammate as a pass option, keep the likely ones.
    pub fn predict(&self, tracks: &BTreeMap<u32, Vec<TrackPoint>>) -> Vec<PassingPrediction> {
        let frames = index_by_frame(tracks);
        let mut predictions = Vec::new();

        for (&frame, points) in &frames {
            let ball = match points.iter().find(|(_, p)| p.team == TeamLabel::Ball) {
                Some((_, b)) => *b,
                None => continue,
            };
            let players: Vec<(u32, &TrackPoint)> = points
                .iter()
                .filter(|(_, p)| p.team.is_team())
                .map(|&(id, p)| (id, p))
                .collect();

            let (carrier_id, carrier) = match find_ball_carrier(&players, ball) {
                Some(c) => c,
                None => continue,
            };

            for &(receiver_id, receiver) in &players {
                if receiver_id == carrier_id || receiver.team != carrier.team {
                    continue;
                }

                let probability = self.pass_probability(carrier, receiver, &players, ball);
                if probability > MIN_PREDICTION_PROBABILITY {
                    predictions.push(PassingPrediction {
                        frame,
                        timestamp: ball.timestamp,
                        ball_carrier_id: carrier_id,
                        receiver_id,
                        probability,
                        distance: dist(receiver, ball),
                        receiver_position: (
                            receiver.xm_smooth.unwrap_or(0.0),
                            receiver.ym_smooth.unwrap_or(0.0),
                        ),
                    });
                }
            }
        }

        predictions
    }

    /// Weighted blend of distance band, forward direction, receiver
    /// movement, and defensive pressure.
    fn pass_probability(
        &self,
        carrier: &TrackPoint,
        receiver: &TrackPoint,
        players: &[(u32, &TrackPoint)],
        ball: &TrackPoint,
    ) -> f64 {
        let distance = dist(receiver, ball);
        if distance < self.config.pass_proximity_threshold_m
            || distance > self.config.pass_max_distance_m
        {
            return 0.0;
        }

        // Optimal passing range sits around 12m
        let distance_score = 1.0 - ((distance - 12.0).abs() / 30.0).min(1.0);

        let forward_score =
            if receiver.xm_smooth.unwrap_or(0.0) > carrier.xm_smooth.unwrap_or(0.0) {
                1.3
            } else {
                1.0
            };

        let movement_score = if receiver.velocity > 0.0 {
            (receiver.velocity / 5.0).min(1.0)
        } else {
            0.5
        };

        let pressure_count = players
            .iter()
            .filter(|&&(_, p)| p.team != carrier.team && dist(p, receiver) < PRESSURE_RADIUS_M)
            .count();
        let pressure_score = (1.0 - pressure_count as f64 * 0.2).max(0.3);

        let probability = distance_score * 0.4
            + forward_score * 0.2
            + movement_score * 0.2
            + pressure_score * 0.2;

        probability.min(1.0)
    }
}

fn find_ball_carrier<'a>(
    players: &[(u32, &'a TrackPoint)],
    ball: &TrackPoint,
) -> Option<(u32, &'a TrackPoint)> {
    let mut carrier = None;
    let mut min_dist = CARRIER_RADIUS_M;

    for &(id, p) in players {
        let d = dist(p, ball);
        if d < min_dist {
            min_dist = d;
            carrier = Some((id, p));
        }
    }

    carrier
}

// ============================================================================
// TACTICAL ALERTS
// ============================================================================

pub struct TacticalEngine {
    config: AnalysisConfig,
    last_alerts: HashMap<(TacticalEventType, TeamLabel), f64>,
}

impl TacticalEngine {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            last_alerts: HashMap::new(),
        }
    }

    pub fn detect(&mut self, tracks: &BTreeMap<u32, Vec<TrackPoint>>) -> Vec<TacticalAlert> {
        let frames = index_by_frame(tracks);
        let mut alerts = Vec::new();

        for (&frame, points) in &frames {
            let team_a: Vec<(u32, &TrackPoint)> = points
                .iter()
                .filter(|(_, p)| p.team == TeamLabel::TeamA)
                .map(|&(id, p)| (id, p))
                .collect();
            let team_b: Vec<(u32, &TrackPoint)> = points
                .iter()
                .filter(|(_, p)| p.team == TeamLabel::TeamB)
                .map(|&(id, p)| (id, p))
                .collect();

            if team_a.is_empty() || team_b.is_empty() {
                continue;
            }

            let timestamp = points[0].1.timestamp;

            self.detect_counter_attack(frame, timestamp, &team_a, &team_b, &mut alerts);
            self.detect_counter_attack(frame, timestamp, &team_b, &team_a, &mut alerts);
            self.detect_high_press(frame, timestamp, &team_a, &mut alerts);
            self.detect_high_press(frame, timestamp, &team_b, &mut alerts);
        }

        alerts
    }

    /// Several attackers sprinting in the attacking half with a numerical
    /// advantage over the defenders in their vicinity.
    fn detect_counter_attack(
        &mut self,
        frame: usize,
        timestamp: f64,
        attacking: &[(u32, &TrackPoint)],
        defending: &[(u32, &TrackPoint)],
        alerts: &mut Vec<TacticalAlert>,
    ) {
        let sprinting: Vec<&(u32, &TrackPoint)> =
            attacking.iter().filter(|(_, p)| p.is_sprinting).collect();
        if sprinting.len() < 2 {
            return;
        }

        let avg_x = sprinting
            .iter()
            .map(|(_, p)| p.xm_smooth.unwrap_or(0.0))
            .sum::<f64>()
            / sprinting.len() as f64;
        if avg_x < self.config.field_length_m / 2.0 {
            return;
        }

        let defenders_back = defending
            .iter()
            .filter(|(_, p)| p.xm_smooth.unwrap_or(0.0) > avg_x - 20.0)
            .count();
        if sprinting.len() <= defenders_back {
            return;
        }

        let team = attacking[0].1.team;
        if !self.debounced(TacticalEventType::CounterAttack, team, timestamp, COUNTER_ATTACK_DEBOUNCE_S) {
            return;
        }

        alerts.push(TacticalAlert {
            frame,
            timestamp,
            event_type: TacticalEventType::CounterAttack,
            team,
            severity: AlertSeverity::High,
            description: format!("Counter attack: {} vs {}", sprinting.len(), defenders_back),
            players_involved: sprinting.iter().map(|(id, _)| *id).collect(),
        });
    }

    /// Three or more players pressing at speed inside the opponent's
    /// defensive third.
    fn detect_high_press(
        &mut self,
        frame: usize,
        timestamp: f64,
        pressing: &[(u32, &TrackPoint)],
        alerts: &mut Vec<TacticalAlert>,
    ) {
        let pressers: Vec<&(u32, &TrackPoint)> = pressing
            .iter()
            .filter(|(_, p)| {
                p.xm_smooth.unwrap_or(0.0) < self.config.field_length_m / 3.0 && p.velocity > 2.0
            })
            .collect();
        if pressers.len() < 3 {
            return;
        }

        let team = pressing[0].1.team;
        if !self.debounced(TacticalEventType::HighPress, team, timestamp, HIGH_PRESS_DEBOUNCE_S) {
            return;
        }

        alerts.push(TacticalAlert {
            frame,
            timestamp,
            event_type: TacticalEventType::HighPress,
            team,
            severity: AlertSeverity::Medium,
            description: format!("High press with {} players", pressers.len()),
            players_involved: pressers.iter().map(|(id, _)| *id).collect(),
        });
    }

    /// True when enough time has passed since the last alert of this kind
    /// for this team; records the new timestamp when it has.
    fn debounced(
        &mut self,
        event: TacticalEventType,
        team: TeamLabel,
        timestamp: f64,
        window: f64,
    ) -> bool {
        let key = (event, team);
        let last = self.last_alerts.get(&key).copied();
        match last {
            Some(t) if timestamp - t <= window => false,
            _ => {
                self.last_alerts.insert(key, timestamp);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(
        frame: usize,
        t: f64,
        xm: f64,
        ym: f64,
        team: TeamLabel,
        velocity: f64,
        sprinting: bool,
    ) -> TrackPoint {
        let mut p = TrackPoint::new(frame, t, xm * 10.0, ym * 10.0, team, 0.9, [0.0; 4]);
        p.xm = Some(xm);
        p.ym = Some(ym);
        p.xm_smooth = Some(xm);
        p.ym_smooth = Some(ym);
        p.velocity = velocity;
        p.is_sprinting = sprinting;
        p
    }

    fn insert(tracks: &mut BTreeMap<u32, Vec<TrackPoint>>, id: u32, p: TrackPoint) {
        tracks.entry(id).or_default().push(p);
    }

    #[test]
    fn test_prediction_requires_carrier_near_ball() {
        let config = AnalysisConfig::default();
        let mut tracks = BTreeMap::new();
        // Ball far from everyone: no carrier, no predictions
        insert(&mut tracks, 90, point(0, 0.0, 50.0, 60.0, TeamLabel::Ball, 0.0, false));
        insert(&mut tracks, 1, point(0, 0.0, 20.0, 30.0, TeamLabel::TeamA, 2.0, false));
        insert(&mut tracks, 2, point(0, 0.0, 32.0, 30.0, TeamLabel::TeamA, 2.0, false));

        let predictions = PassingEngine::new(config).predict(&tracks);
        assert!(predictions.is_empty());
    }

    #[test]
    fn test_prediction_scores_open_teammate() {
        let config = AnalysisConfig::default();
        let mut tracks = BTreeMap::new();
        insert(&mut tracks, 90, point(0, 0.0, 20.5, 30.0, TeamLabel::Ball, 0.0, false));
        // Carrier next to the ball
        insert(&mut tracks, 1, point(0, 0.0, 20.0, 30.0, TeamLabel::TeamA, 2.0, false));
        // Open receiver 12m downfield, moving
        insert(&mut tracks, 2, point(0, 0.0, 32.5, 30.0, TeamLabel::TeamA, 4.0, false));

        let predictions = PassingEngine::new(config).predict(&tracks);
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].ball_carrier_id, 1);
        assert_eq!(predictions[0].receiver_id, 2);
        assert!(predictions[0].probability > 0.5);
    }

    #[test]
    fn test_prediction_pressure_lowers_probability() {
        let config = AnalysisConfig::default();

        let build = |with_defenders: bool| {
            let mut tracks = BTreeMap::new();
            insert(&mut tracks, 90, point(0, 0.0, 20.5, 30.0, TeamLabel::Ball, 0.0, false));
            insert(&mut tracks, 1, point(0, 0.0, 20.0, 30.0, TeamLabel::TeamA, 2.0, false));
            insert(&mut tracks, 2, point(0, 0.0, 32.5, 30.0, TeamLabel::TeamA, 4.0, false));
            if with_defenders {
                insert(&mut tracks, 10, point(0, 0.0, 33.0, 31.0, TeamLabel::TeamB, 1.0, false));
                insert(&mut tracks, 11, point(0, 0.0, 31.5, 29.0, TeamLabel::TeamB, 1.0, false));
            }
            tracks
        };

        let open = PassingEngine::new(config.clone()).predict(&build(false));
        let pressured = PassingEngine::new(config).predict(&build(true));
        assert!(
            pressured[0].probability < open[0].probability,
            "defenders around the receiver must reduce the pass probability"
        );
    }

    #[test]
    fn test_counter_attack_fires_with_numbers_advantage() {
        let config = AnalysisConfig::default();
        let mut tracks = BTreeMap::new();
        // Two sprinters past halfway, lone defender far behind the play
        insert(&mut tracks, 1, point(0, 0.0, 70.0, 30.0, TeamLabel::TeamA, 8.0, true));
        insert(&mut tracks, 2, point(0, 0.0, 75.0, 40.0, TeamLabel::TeamA, 8.0, true));
        insert(&mut tracks, 10, point(0, 0.0, 30.0, 34.0, TeamLabel::TeamB, 1.0, false));

        let alerts = TacticalEngine::new(config).detect(&tracks);
        let counters: Vec<_> = alerts
            .iter()
            .filter(|a| a.event_type == TacticalEventType::CounterAttack)
            .collect();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].team, TeamLabel::TeamA);
        assert_eq!(counters[0].severity, AlertSeverity::High);
        assert_eq!(counters[0].players_involved, vec![1, 2]);
    }

    #[test]
    fn test_counter_attack_debounced_across_frames() {
        let config = AnalysisConfig::default();
        let mut tracks = BTreeMap::new();
        // The same situation persists over 2 seconds of frames
        for i in 0..60usize {
            let t = i as f64 / 30.0;
            insert(&mut tracks, 1, point(i, t, 70.0, 30.0, TeamLabel::TeamA, 8.0, true));
            insert(&mut tracks, 2, point(i, t, 75.0, 40.0, TeamLabel::TeamA, 8.0, true));
            insert(&mut tracks, 10, point(i, t, 30.0, 34.0, TeamLabel::TeamB, 1.0, false));
        }

        let alerts = TacticalEngine::new(config).detect(&tracks);
        let counters = alerts
            .iter()
            .filter(|a| a.event_type == TacticalEventType::CounterAttack)
            .count();
        assert_eq!(counters, 1, "a sustained break inside the window is one alert");
    }

    #[test]
    fn test_counter_attack_needs_attacking_half() {
        let config = AnalysisConfig::default();
        let mut tracks = BTreeMap::new();
        // Sprinting, but in their own half
        insert(&mut tracks, 1, point(0, 0.0, 30.0, 30.0, TeamLabel::TeamA, 8.0, true));
        insert(&mut tracks, 2, point(0, 0.0, 35.0, 40.0, TeamLabel::TeamA, 8.0, true));
        insert(&mut tracks, 10, point(0, 0.0, 80.0, 34.0, TeamLabel::TeamB, 1.0, false));

        let alerts = TacticalEngine::new(config).detect(&tracks);
        assert!(alerts
            .iter()
            .all(|a| a.event_type != TacticalEventType::CounterAttack));
    }

    #[test]
    fn test_high_press_fires_with_three_pressers() {
        let config = AnalysisConfig::default();
        let mut tracks = BTreeMap::new();
        // Three team-B players pressing fast inside the defensive third
        insert(&mut tracks, 10, point(0, 0.0, 20.0, 20.0, TeamLabel::TeamB, 3.0, false));
        insert(&mut tracks, 11, point(0, 0.0, 25.0, 34.0, TeamLabel::TeamB, 3.5, false));
        insert(&mut tracks, 12, point(0, 0.0, 30.0, 48.0, TeamLabel::TeamB, 2.5, false));
        insert(&mut tracks, 1, point(0, 0.0, 15.0, 34.0, TeamLabel::TeamA, 1.0, false));

        let alerts = TacticalEngine::new(config).detect(&tracks);
        let presses: Vec<_> = alerts
            .iter()
            .filter(|a| a.event_type == TacticalEventType::HighPress)
            .collect();
        assert_eq!(presses.len(), 1);
        assert_eq!(presses[0].team, TeamLabel::TeamB);
        assert_eq!(presses[0].players_involved.len(), 3);
    }

    #[test]
    fn test_high_press_needs_three() {
        let config = AnalysisConfig::default();
        let mut tracks = BTreeMap::new();
        insert(&mut tracks, 10, point(0, 0.0, 20.0, 20.0, TeamLabel::TeamB, 3.0, false));
        insert(&mut tracks, 11, point(0, 0.0, 25.0, 34.0, TeamLabel::TeamB, 3.5, false));
        insert(&mut tracks, 1, point(0, 0.0, 15.0, 34.0, TeamLabel::TeamA, 1.0, false));

        let alerts = TacticalEngine::new(config).detect(&tracks);
        assert!(alerts
            .iter()
            .all(|a| a.event_type != TacticalEventType::HighPress));
    }
}
