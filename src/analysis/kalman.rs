// src/analysis/kalman.rs
//
// Constant-velocity Kalman filter over a bounding box, the SORT state-space
// formulation: state [cx, cy, s, r, vcx, vcy, vs] where s is box area and r
// the (velocity-free) aspect ratio. The structure is fixed, so the filter is
// written out with explicit small matrices instead of a general filtering
// library.

use nalgebra::{SMatrix, SVector};

type Vec4 = SVector<f64, 4>;
type Vec7 = SVector<f64, 7>;
type Mat4 = SMatrix<f64, 4, 4>;
type Mat7 = SMatrix<f64, 7, 7>;
type Mat4x7 = SMatrix<f64, 4, 7>;

/// Floor applied to area/ratio before converting back to corner form, so a
/// degenerate state can never yield NaN or negative box dimensions.
const MIN_SCALE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct BoxMotionModel {
    x: Vec7,
    p: Mat7,
    f: Mat7,
    h: Mat4x7,
    q: Mat7,
    r: Mat4,
}

impl BoxMotionModel {
    pub fn new(bbox: [f32; 4]) -> Self {
        // Transition: position and scale integrate their velocities,
        // aspect ratio is carried unchanged.
        let mut f = Mat7::identity();
        f[(0, 4)] = 1.0;
        f[(1, 5)] = 1.0;
        f[(2, 6)] = 1.0;

        let mut h = Mat4x7::zeros();
        for i in 0..4 {
            h[(i, i)] = 1.0;
        }

        let mut r = Mat4::identity();
        r[(2, 2)] = 10.0;
        r[(3, 3)] = 10.0;

        let mut p = Mat7::identity();
        for i in 4..7 {
            p[(i, i)] = 1000.0;
        }
        p *= 10.0;

        let mut q = Mat7::identity();
        q[(6, 6)] *= 0.01;
        for i in 4..7 {
            q[(i, i)] *= 0.01;
        }

        let mut x = Vec7::zeros();
        let z = Self::measurement(bbox);
        for i in 0..4 {
            x[i] = z[i];
        }

        Self { x, p, f, h, q, r }
    }

    fn measurement(bbox: [f32; 4]) -> Vec4 {
        let w = (bbox[2] - bbox[0]) as f64;
        let h = (bbox[3] - bbox[1]) as f64;
        let cx = bbox[0] as f64 + w / 2.0;
        let cy = bbox[1] as f64 + h / 2.0;
        let s = w * h;
        let r = w / h.max(MIN_SCALE);
        Vec4::new(cx, cy, s, r)
    }

    /// Advance one step under the constant-velocity assumption and return
    /// the predicted box.
    pub fn predict(&mut self) -> [f64; 4] {
        // A scale velocity that would drive the area non-positive is zeroed
        // before integration.
        if self.x[6] + self.x[2] <= 0.0 {
            self.x[6] = 0.0;
        }

        self.x = self.f * self.x;
        self.p = self.f * self.p * self.f.transpose() + self.q;

        self.state_box()
    }

    /// Kalman correction from an observed box.
    pub fn update(&mut self, bbox: [f32; 4]) {
        let z = Self::measurement(bbox);
        let y = z - self.h * self.x;
        let s = self.h * self.p * self.h.transpose() + self.r;

        // R is positive definite, so S is invertible; the guard covers
        // pathological float states without panicking.
        let s_inv = match s.try_inverse() {
            Some(inv) => inv,
            None => return,
        };

        let k = self.p * self.h.transpose() * s_inv;
        self.x += k * y;
        self.p = (Mat7::identity() - k * self.h) * self.p;
    }

    /// Current box estimate [x1, y1, x2, y2], derived from the filter state.
    pub fn state_box(&self) -> [f64; 4] {
        let cx = self.x[0];
        let cy = self.x[1];
        let s = self.x[2].max(MIN_SCALE);
        let r = self.x[3].max(MIN_SCALE);

        let w = (s * r).sqrt();
        let h = s / w;

        [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_initial_state_matches_measurement() {
        let kf = BoxMotionModel::new([100.0, 200.0, 140.0, 280.0]);
        let b = kf.state_box();
        assert_relative_eq!(b[0], 100.0, epsilon = 1e-6);
        assert_relative_eq!(b[1], 200.0, epsilon = 1e-6);
        assert_relative_eq!(b[2], 140.0, epsilon = 1e-6);
        assert_relative_eq!(b[3], 280.0, epsilon = 1e-6);
    }

    #[test]
    fn test_constant_velocity_extrapolates() {
        let mut kf = BoxMotionModel::new([0.0, 0.0, 40.0, 80.0]);

        // Feed boxes marching 10px right each frame
        for i in 1..=8 {
            kf.predict();
            let dx = 10.0 * i as f32;
            kf.update([dx, 0.0, 40.0 + dx, 80.0]);
        }

        // The next prediction should continue the motion
        let before = kf.state_box();
        let predicted = kf.predict();
        let shift = (predicted[0] + predicted[2]) / 2.0 - (before[0] + before[2]) / 2.0;
        assert!(
            (shift - 10.0).abs() < 2.0,
            "expected ~10px/frame learned velocity, got {:.2}",
            shift
        );
    }

    #[test]
    fn test_degenerate_scale_never_yields_nan() {
        let mut kf = BoxMotionModel::new([0.0, 0.0, 1.0, 1.0]);

        // Shrinking boxes drive the scale velocity negative
        for i in 0..30 {
            kf.predict();
            let side = (1.0 - i as f32 * 0.03).max(0.01);
            kf.update([0.0, 0.0, side, side]);
        }
        for _ in 0..30 {
            let b = kf.predict();
            assert!(b.iter().all(|v| v.is_finite()), "box degenerated: {:?}", b);
            assert!(b[2] >= b[0] && b[3] >= b[1], "negative dimensions: {:?}", b);
        }
    }
}
