// src/analysis/team.rs
//
// Team labeling for tracked players: a fixed left/right position split, or
// jersey-color matching with a lazy two-color bootstrap. Cluster-based
// assignment (2-means over appearance embeddings) is wired up by the
// orchestrator through `embedding::cluster_teams`.

use crate::types::{Frame, TeamLabel};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Euclidean RGB distance beyond which a jersey color founds the second team.
const NEW_TEAM_COLOR_DISTANCE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamMethod {
    /// Left half of the image is team A, right half team B
    Position,
    /// Median jersey color matched against bootstrapped team colors
    JerseyColor,
    /// 2-means over appearance embeddings, bootstrapped by the orchestrator
    /// on the first populated frame; needs an embedding model, falls back
    /// to Position otherwise
    Cluster,
}

#[derive(Debug)]
pub struct TeamClassifier {
    method: TeamMethod,
    team_colors: Vec<(TeamLabel, [f64; 3])>,
}

impl TeamClassifier {
    pub fn new(method: TeamMethod) -> Self {
        Self {
            method,
            team_colors: Vec::new(),
        }
    }

    pub fn classify(&mut self, frame: &Frame, x: f64, bbox: &[f32; 4]) -> TeamLabel {
        match self.method {
            // Cluster labels come from the orchestrator's id→team map; this
            // path only covers ids the clustering never saw
            TeamMethod::Position | TeamMethod::Cluster => {
                self.classify_by_position(x, frame.width)
            }
            TeamMethod::JerseyColor => self.classify_by_color(frame, bbox),
        }
    }

    pub fn classify_by_position(&self, x: f64, frame_width: usize) -> TeamLabel {
        if x < frame_width as f64 / 2.0 {
            TeamLabel::TeamA
        } else {
            TeamLabel::TeamB
        }
    }

    /// Match the jersey region's median color against the known team colors.
    /// The first player seen founds team A; a sufficiently different color
    /// while only one team is known founds team B.
    pub fn classify_by_color(&mut self, frame: &Frame, bbox: &[f32; 4]) -> TeamLabel {
        let dominant = match jersey_color(frame, bbox) {
            Some(c) => c,
            None => {
                warn!("Empty jersey region for bbox {:?}", bbox);
                return TeamLabel::Unknown;
            }
        };

        if self.team_colors.is_empty() {
            self.team_colors.push((TeamLabel::TeamA, dominant));
            return TeamLabel::TeamA;
        }

        let (mut closest_team, mut min_dist) = (TeamLabel::Unknown, f64::INFINITY);
        for &(team, color) in &self.team_colors {
            let dist = color_distance(&dominant, &color);
            if dist < min_dist {
                min_dist = dist;
                closest_team = team;
            }
        }

        if min_dist > NEW_TEAM_COLOR_DISTANCE && self.team_colors.len() == 1 {
            self.team_colors.push((TeamLabel::TeamB, dominant));
            return TeamLabel::TeamB;
        }

        closest_team
    }

    pub fn reset(&mut self) {
        self.team_colors.clear();
    }
}

/// Median RGB over the upper 40% of the box — shorts and grass stay out of
/// the sample. `None` when the jersey region clips down to nothing.
fn jersey_color(frame: &Frame, bbox: &[f32; 4]) -> Option<[f64; 3]> {
    let height = bbox[3] - bbox[1];
    let x1 = (bbox[0].floor().max(0.0) as usize).min(frame.width);
    let y1 = (bbox[1].floor().max(0.0) as usize).min(frame.height);
    let x2 = (bbox[2].ceil().max(0.0) as usize).min(frame.width);
    let y2 = ((bbox[1] + height * 0.4).ceil().max(0.0) as usize).min(frame.height);

    if x2 <= x1 || y2 <= y1 || frame.data.len() < frame.width * frame.height * 3 {
        return None;
    }

    let mut channels: [Vec<u8>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for row in y1..y2 {
        for col in x1..x2 {
            let base = (row * frame.width + col) * 3;
            for (ch, &v) in channels.iter_mut().zip(frame.data[base..base + 3].iter()) {
                ch.push(v);
            }
        }
    }

    let mut median = [0.0f64; 3];
    for (m, ch) in median.iter_mut().zip(channels.iter_mut()) {
        ch.sort_unstable();
        *m = ch[ch.len() / 2] as f64;
    }
    Some(median)
}

fn color_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
