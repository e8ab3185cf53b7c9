// src/analysis/passes.rs
//
// Proximity-based pass inference over completed tracks, plus passing-network
// metrics. A candidate pass opens when two teammates come within the
// proximity threshold and completes when they separate; only completions
// that survive validation (displacement bounds, duration bounds, receiver
// movement) become PassEvents. Invalid candidates are dropped silently.

use crate::types::{
    AnalysisConfig, PassEvent, PassType, PassingNetworkMetrics, TeamLabel, TrackPoint,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Receiver must at least be moving for a completion to count as a pass.
const MIN_RECEIVER_VELOCITY: f64 = 0.5;

const MAX_TRIANGLES: usize = 10;
const TOP_PLAYERS: usize = 5;

/// Index smoothed track points by frame for per-frame pair scans. Points
/// without smoothed coordinates (tracks the metrics pass skipped) are
/// excluded.
pub(crate) fn index_by_frame(
    tracks: &BTreeMap<u32, Vec<TrackPoint>>,
) -> BTreeMap<usize, Vec<(u32, &TrackPoint)>> {
    let mut frames: BTreeMap<usize, Vec<(u32, &TrackPoint)>> = BTreeMap::new();
    for (&id, track) in tracks {
        for point in track {
            if point.xm_smooth.is_some() {
                frames.entry(point.frame).or_default().push((id, point));
            }
        }
    }
    frames
}

fn meter_distance(a: &TrackPoint, b: &TrackPoint) -> f64 {
    let dx = a.xm_smooth.unwrap_or(0.0) - b.xm_smooth.unwrap_or(0.0);
    let dy = a.ym_smooth.unwrap_or(0.0) - b.ym_smooth.unwrap_or(0.0);
    (dx * dx + dy * dy).sqrt()
}

#[derive(Debug, Clone)]
struct PotentialPass {
    passer: u32,
    receiver: u32,
    team: TeamLabel,
    start_time: f64,
    start_pos: (f64, f64),
    start_xthreat: f64,
    min_distance: f64,
    active: bool,
}

pub struct PassDetector {
    config: AnalysisConfig,
    potential: Vec<PotentialPass>,
}

impl PassDetector {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            potential: Vec::new(),
        }
    }

    /// Run the pair state machines over all frames and return validated
    /// passes in completion order.
    pub fn detect(&mut self, tracks: &BTreeMap<u32, Vec<TrackPoint>>) -> Vec<PassEvent> {
        if tracks.is_empty() {
            return vec![];
        }

        let frames = index_by_frame(tracks);
        let mut passes = Vec::new();

        for (&frame, players) in &frames {
            self.open_candidates(players);
            passes.extend(self.advance_candidates(players, frame));
            self.potential.retain(|p| p.active);
        }

        self.potential.clear();
        info!("Pass detection complete: {} passes found", passes.len());
        passes
    }

    /// Same-team players entering proximity open a candidate, one per
    /// ordered (passer, receiver) pair.
    fn open_candidates(&mut self, players: &[(u32, &TrackPoint)]) {
        for (i, &(pid1, p1)) in players.iter().enumerate() {
            for &(pid2, p2) in &players[i + 1..] {
                if p1.team != p2.team || !p1.team.is_team() {
                    continue;
                }

                let dist = meter_distance(p1, p2);
                if dist >= self.config.pass_proximity_threshold_m {
                    continue;
                }

                let exists = self
                    .potential
                    .iter()
                    .any(|pp| pp.passer == pid1 && pp.receiver == pid2 && pp.active);
                if !exists {
                    self.potential.push(PotentialPass {
                        passer: pid1,
                        receiver: pid2,
                        team: p1.team,
                        start_time: p1.timestamp,
                        start_pos: (p1.xm_smooth.unwrap_or(0.0), p1.ym_smooth.unwrap_or(0.0)),
                        start_xthreat: p1.xthreat,
                        min_distance: dist,
                        active: true,
                    });
                }
            }
        }
    }

    /// Advance active candidates: complete on separation, expire on
    /// timeout, break when either player leaves the frame.
    fn advance_candidates(
        &mut self,
        players: &[(u32, &TrackPoint)],
        frame: usize,
    ) -> Vec<PassEvent> {
        let by_id: HashMap<u32, &TrackPoint> = players.iter().map(|&(id, p)| (id, p)).collect();
        let mut completed = Vec::new();

        for potential in &mut self.potential {
            if !potential.active {
                continue;
            }

            let (passer, receiver) =
                match (by_id.get(&potential.passer), by_id.get(&potential.receiver)) {
                    (Some(p), Some(r)) => (*p, *r),
                    _ => {
                        potential.active = false;
                        continue;
                    }
                };

            let dist = meter_distance(passer, receiver);
            potential.min_distance = potential.min_distance.min(dist);

            if dist > self.config.pass_proximity_threshold_m {
                let duration = passer.timestamp - potential.start_time;

                if let Some(event) =
                    validate_completion(&self.config, potential, receiver, duration, frame)
                {
                    completed.push(event);
                } else {
                    debug!(
                        "Discarding pass candidate {} -> {}",
                        potential.passer, potential.receiver
                    );
                }
                potential.active = false;
            } else if passer.timestamp - potential.start_time > self.config.pass_max_duration_s {
                potential.active = false;
            }
        }

        completed
    }
}

/// Validation gates for a separated pair. The displacement lower bound is
/// inclusive: a pass at exactly the minimum distance counts.
fn validate_completion(
    config: &AnalysisConfig,
    potential: &PotentialPass,
    receiver: &TrackPoint,
    duration: f64,
    frame: usize,
) -> Option<PassEvent> {
    let end_pos = (
        receiver.xm_smooth.unwrap_or(0.0),
        receiver.ym_smooth.unwrap_or(0.0),
    );
    let dx = end_pos.0 - potential.start_pos.0;
    let dy = end_pos.1 - potential.start_pos.1;
    let pass_distance = (dx * dx + dy * dy).sqrt();

    if pass_distance < config.pass_min_distance_m {
        return None;
    }
    if pass_distance > config.pass_max_distance_m {
        return None;
    }
    if duration <= 0.0 || duration > config.pass_max_duration_s {
        return None;
    }
    if receiver.velocity < MIN_RECEIVER_VELOCITY {
        return None;
    }

    Some(PassEvent {
        frame,
        timestamp: receiver.timestamp,
        passer_id: potential.passer,
        receiver_id: potential.receiver,
        team: potential.team,
        distance: pass_distance,
        duration,
        pass_type: classify_pass(pass_distance),
        success: receiver.velocity > config.pass_velocity_threshold_ms,
        start_position: potential.start_pos,
        end_position: end_pos,
        xthreat_delta: receiver.xthreat - potential.start_xthreat,
    })
}

fn classify_pass(distance: f64) -> PassType {
    if distance < 10.0 {
        PassType::Short
    } else if distance < 25.0 {
        PassType::Medium
    } else {
        PassType::Long
    }
}

// ============================================================================
// PASSING NETWORK
// ============================================================================

pub struct PassingNetworkAnalyzer;

impl PassingNetworkAnalyzer {
    /// Build the directed pass graph for one team and derive its metrics.
    pub fn analyze(passes: &[PassEvent], team: TeamLabel) -> PassingNetworkMetrics {
        let team_passes: Vec<&PassEvent> = passes.iter().filter(|p| p.team == team).collect();

        if team_passes.is_empty() {
            return PassingNetworkMetrics {
                team,
                total_passes: 0,
                successful_passes: 0,
                pass_completion_rate: 0.0,
                avg_pass_distance: 0.0,
                key_passers: vec![],
                key_receivers: vec![],
                passing_triangles: vec![],
                network_centrality: vec![],
            };
        }

        let mut graph: BTreeMap<u32, BTreeMap<u32, usize>> = BTreeMap::new();
        for pass in &team_passes {
            *graph
                .entry(pass.passer_id)
                .or_default()
                .entry(pass.receiver_id)
                .or_default() += 1;
        }

        let total = team_passes.len();
        let successful = team_passes.iter().filter(|p| p.success).count();
        let avg_pass_distance =
            team_passes.iter().map(|p| p.distance).sum::<f64>() / total as f64;

        PassingNetworkMetrics {
            team,
            total_passes: total,
            successful_passes: successful,
            pass_completion_rate: successful as f64 / total as f64,
            avg_pass_distance,
            key_passers: top_players(team_passes.iter().map(|p| p.passer_id)),
            key_receivers: top_players(team_passes.iter().map(|p| p.receiver_id)),
            passing_triangles: find_triangles(&graph),
            network_centrality: degree_centrality(&graph),
        }
    }
}

fn top_players(ids: impl Iterator<Item = u32>) -> Vec<(u32, usize)> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for id in ids {
        *counts.entry(id).or_default() += 1;
    }

    let mut sorted: Vec<(u32, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    sorted.truncate(TOP_PLAYERS);
    sorted
}

/// Brute-force directed 3-cycle scan; pass graphs hold a couple dozen
/// players at most.
fn find_triangles(graph: &BTreeMap<u32, BTreeMap<u32, usize>>) -> Vec<(u32, u32, u32)> {
    let players: Vec<u32> = graph.keys().copied().collect();
    let mut triangles = Vec::new();

    let connected =
        |from: u32, to: u32| graph.get(&from).map_or(false, |edges| edges.contains_key(&to));

    'outer: for (i, &p1) in players.iter().enumerate() {
        for (j, &p2) in players.iter().enumerate().skip(i + 1) {
            for &p3 in players.iter().skip(j + 1) {
                if connected(p1, p2) && connected(p2, p3) && connected(p3, p1) {
                    triangles.push((p1, p2, p3));
                    if triangles.len() >= MAX_TRIANGLES {
                        break 'outer;
                    }
                }
            }
        }
    }

    triangles
}

/// Normalized degree centrality (in + out) per player. The denominator is
/// guarded so a single-player "network" cannot divide by zero.
fn degree_centrality(graph: &BTreeMap<u32, BTreeMap<u32, usize>>) -> Vec<(u32, f64)> {
    let mut all_players: std::collections::BTreeSet<u32> = graph.keys().copied().collect();
    for receivers in graph.values() {
        all_players.extend(receivers.keys().copied());
    }

    let max_degree = if all_players.len() > 1 {
        all_players.len() - 1
    } else {
        1
    };

    all_players
        .iter()
        .map(|&player| {
            let out_degree = graph.get(&player).map_or(0, |edges| edges.len());
            let in_degree = graph
                .values()
                .filter(|edges| edges.contains_key(&player))
                .count();
            (player, (out_degree + in_degree) as f64 / max_degree as f64)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalysisConfig;

    fn point(frame: usize, t: f64, xm: f64, ym: f64, team: TeamLabel, velocity: f64) -> TrackPoint {
        let mut p = TrackPoint::new(frame, t, xm * 10.0, ym * 10.0, team, 0.9, [0.0; 4]);
        p.xm = Some(xm);
        p.ym = Some(ym);
        p.xm_smooth = Some(xm);
        p.ym_smooth = Some(ym);
        p.velocity = velocity;
        p
    }

    /// Passer walks left from origin, receiver runs right; the pair starts
    /// in proximity and separates with the receiver displaced by
    /// `receiver_end_x` from the pass start position.
    fn pass_scenario(receiver_end_x: f64) -> BTreeMap<u32, Vec<TrackPoint>> {
        let mut tracks = BTreeMap::new();
        let steps = 6;
        let mut passer = Vec::new();
        let mut receiver = Vec::new();

        for i in 0..steps {
            let t = i as f64 * 0.1;
            let frac = i as f64 / (steps - 1) as f64;
            passer.push(point(i, t, -1.5 * frac, 0.0, TeamLabel::TeamA, 1.0));
            receiver.push(point(
                i,
                t,
                1.0 + (receiver_end_x - 1.0) * frac,
                0.0,
                TeamLabel::TeamA,
                2.0,
            ));
        }

        tracks.insert(1, passer);
        tracks.insert(2, receiver);
        tracks
    }

    #[test]
    fn test_pass_at_exact_minimum_distance_validates() {
        let config = AnalysisConfig::default();
        // Final separation: passer -1.5, receiver 2.0 → 3.5m > proximity
        let tracks = pass_scenario(2.0);

        let passes = PassDetector::new(config).detect(&tracks);
        assert_eq!(passes.len(), 1, "displacement == pass_min_distance_m must pass");
        assert_eq!(passes[0].passer_id, 1);
        assert_eq!(passes[0].receiver_id, 2);
        assert_eq!(passes[0].pass_type, PassType::Short);
        assert!(passes[0].success, "receiver at 2 m/s clears the success bar");
    }

    #[test]
    fn test_pass_just_under_minimum_distance_rejected() {
        let config = AnalysisConfig::default();
        let tracks = pass_scenario(1.999);

        let passes = PassDetector::new(config).detect(&tracks);
        assert!(
            passes.is_empty(),
            "displacement below pass_min_distance_m must be discarded"
        );
    }

    #[test]
    fn test_cross_team_proximity_never_opens_pass() {
        let config = AnalysisConfig::default();
        let mut tracks = pass_scenario(5.0);
        for p in tracks.get_mut(&2).unwrap() {
            p.team = TeamLabel::TeamB;
        }

        let passes = PassDetector::new(config).detect(&tracks);
        assert!(passes.is_empty());
    }

    #[test]
    fn test_stationary_receiver_rejected() {
        let config = AnalysisConfig::default();
        let mut tracks = pass_scenario(3.0);
        for p in tracks.get_mut(&2).unwrap() {
            p.velocity = 0.1;
        }

        let passes = PassDetector::new(config).detect(&tracks);
        assert!(passes.is_empty(), "a standing receiver is not being passed to");
    }

    #[test]
    fn test_separation_beyond_max_duration_rejected() {
        let config = AnalysisConfig::default();
        let mut tracks = BTreeMap::new();

        // Proximity at t=0, separation only observed at t=5 — far past
        // pass_max_duration_s.
        tracks.insert(
            1,
            vec![
                point(0, 0.0, 0.0, 0.0, TeamLabel::TeamA, 1.0),
                point(150, 5.0, 0.0, 0.0, TeamLabel::TeamA, 1.0),
            ],
        );
        tracks.insert(
            2,
            vec![
                point(0, 0.0, 1.0, 0.0, TeamLabel::TeamA, 2.0),
                point(150, 5.0, 6.0, 0.0, TeamLabel::TeamA, 2.0),
            ],
        );

        let passes = PassDetector::new(config).detect(&tracks);
        assert!(passes.is_empty(), "completion after max duration must not count");
    }

    #[test]
    fn test_player_leaving_frame_breaks_candidate() {
        let config = AnalysisConfig::default();
        let mut tracks = BTreeMap::new();

        // Receiver vanishes mid-candidate; when it reappears separated,
        // no completion may fire from the broken candidate.
        tracks.insert(
            1,
            vec![
                point(0, 0.0, 0.0, 0.0, TeamLabel::TeamA, 1.0),
                point(1, 0.1, 0.0, 0.0, TeamLabel::TeamA, 1.0),
                point(2, 0.2, 0.0, 0.0, TeamLabel::TeamA, 1.0),
            ],
        );
        tracks.insert(
            2,
            vec![
                point(0, 0.0, 1.0, 0.0, TeamLabel::TeamA, 2.0),
                point(2, 0.2, 6.0, 0.0, TeamLabel::TeamA, 2.0),
            ],
        );

        let passes = PassDetector::new(config).detect(&tracks);
        assert!(passes.is_empty(), "a candidate broken by dropout must not complete");
    }

    #[test]
    fn test_pass_classification_bands() {
        assert_eq!(classify_pass(5.0), PassType::Short);
        assert_eq!(classify_pass(9.99), PassType::Short);
        assert_eq!(classify_pass(10.0), PassType::Medium);
        assert_eq!(classify_pass(24.0), PassType::Medium);
        assert_eq!(classify_pass(25.0), PassType::Long);
    }

    fn pass(passer: u32, receiver: u32, success: bool) -> PassEvent {
        PassEvent {
            frame: 0,
            timestamp: 0.0,
            passer_id: passer,
            receiver_id: receiver,
            team: TeamLabel::TeamA,
            distance: 8.0,
            duration: 1.0,
            pass_type: PassType::Short,
            success,
            start_position: (0.0, 0.0),
            end_position: (8.0, 0.0),
            xthreat_delta: 0.01,
        }
    }

    #[test]
    fn test_network_metrics_counts_and_rate() {
        let passes = vec![pass(1, 2, true), pass(2, 3, true), pass(1, 3, false)];
        let metrics = PassingNetworkAnalyzer::analyze(&passes, TeamLabel::TeamA);

        assert_eq!(metrics.total_passes, 3);
        assert_eq!(metrics.successful_passes, 2);
        assert!((metrics.pass_completion_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.key_passers[0], (1, 2));
    }

    #[test]
    fn test_network_triangle_detection() {
        // 1 → 2 → 3 → 1 closes a directed cycle
        let passes = vec![pass(1, 2, true), pass(2, 3, true), pass(3, 1, true)];
        let metrics = PassingNetworkAnalyzer::analyze(&passes, TeamLabel::TeamA);
        assert_eq!(metrics.passing_triangles, vec![(1, 2, 3)]);
    }

    #[test]
    fn test_network_centrality_normalized() {
        let passes = vec![pass(1, 2, true), pass(1, 3, true)];
        let metrics = PassingNetworkAnalyzer::analyze(&passes, TeamLabel::TeamA);

        let centrality: BTreeMap<u32, f64> = metrics.network_centrality.into_iter().collect();
        // Player 1: out-degree 2, in-degree 0, normalized by (3 - 1)
        assert!((centrality[&1] - 1.0).abs() < 1e-9);
        assert!((centrality[&2] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_network_empty_team() {
        let metrics = PassingNetworkAnalyzer::analyze(&[], TeamLabel::TeamB);
        assert_eq!(metrics.total_passes, 0);
        assert_eq!(metrics.pass_completion_rate, 0.0);
        assert!(metrics.key_passers.is_empty());
    }
}
