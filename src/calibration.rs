// src/calibration.rs
//
// Pixel → pitch-plane projection. A `HomographyTransform` either carries a
// validated 3x3 matrix or is disabled, in which case it passes pixel
// coordinates through unchanged so the rest of the pipeline keeps working
// in pixel space.

use crate::error::AnalysisError;
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use tracing::{error, warn};

const NEAR_ZERO_W: f64 = 1e-10;
const DEGENERATE_DET: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct HomographyTransform {
    matrix: Option<Matrix3<f64>>,
}

impl HomographyTransform {
    /// Build from a validated matrix. Rejects the all-zero and singular
    /// cases up front so `transform` never has to.
    pub fn new(matrix: Matrix3<f64>) -> Result<Self, AnalysisError> {
        if matrix.iter().all(|v| v.abs() < f64::EPSILON) {
            return Err(AnalysisError::Calibration(
                "homography matrix is all zeros".to_string(),
            ));
        }
        if matrix.determinant().abs() < DEGENERATE_DET {
            return Err(AnalysisError::Calibration(
                "homography matrix is degenerate".to_string(),
            ));
        }
        Ok(Self {
            matrix: Some(matrix),
        })
    }

    /// Identity passthrough — positions stay in pixel space.
    pub fn disabled() -> Self {
        Self { matrix: None }
    }

    pub fn enabled(&self) -> bool {
        self.matrix.is_some()
    }

    /// Parse a row-major 3x3 matrix from 9 comma-separated floats.
    /// Any parse or validation failure yields a *disabled* transform, not an
    /// error — calibration is optional input.
    pub fn from_string(matrix_str: &str) -> Self {
        let values: Result<Vec<f64>, _> = matrix_str
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect();

        let values = match values {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to parse homography matrix: {}", e);
                return Self::disabled();
            }
        };

        if values.len() != 9 {
            error!(
                "Failed to parse homography matrix: expected 9 values, got {}",
                values.len()
            );
            return Self::disabled();
        }

        let matrix = Matrix3::from_row_slice(&values);
        match Self::new(matrix) {
            Ok(t) => t,
            Err(e) => {
                error!("Failed to parse homography matrix: {}", e);
                Self::disabled()
            }
        }
    }

    /// Standard 4-point perspective solve: the supplied pixel corners
    /// (TL, TR, BR, BL order) map onto the metric pitch rectangle.
    pub fn from_corners(
        image_points: &[(f64, f64); 4],
        field_length_m: f64,
        field_width_m: f64,
    ) -> Result<Self, AnalysisError> {
        let field_points = [
            (0.0, 0.0),
            (field_length_m, 0.0),
            (field_length_m, field_width_m),
            (0.0, field_width_m),
        ];

        // With h33 fixed to 1, each correspondence contributes two rows of
        // the 8x8 linear system in the remaining entries.
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for (i, (&(x, y), &(fx, fy))) in image_points.iter().zip(field_points.iter()).enumerate() {
            let r = i * 2;
            a[(r, 0)] = x;
            a[(r, 1)] = y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -fx * x;
            a[(r, 7)] = -fx * y;
            b[r] = fx;

            a[(r + 1, 3)] = x;
            a[(r + 1, 4)] = y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -fy * x;
            a[(r + 1, 7)] = -fy * y;
            b[r + 1] = fy;
        }

        let h = a.lu().solve(&b).ok_or_else(|| {
            AnalysisError::Calibration(
                "corner points are collinear or repeated, cannot solve homography".to_string(),
            )
        })?;

        let matrix = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        Self::new(matrix)
    }

    /// Project a pixel point onto the pitch plane (meters). Disabled
    /// transforms and near-singular divisions return the input unchanged.
    pub fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        let matrix = match &self.matrix {
            Some(m) => m,
            None => return (x, y),
        };

        let v = matrix * Vector3::new(x, y, 1.0);
        if v[2].abs() < NEAR_ZERO_W {
            warn!(
                "Near-zero denominator in homography transform at ({:.1}, {:.1})",
                x, y
            );
            return (x, y);
        }

        (v[0] / v[2], v[1] / v[2])
    }

    /// Inverse transform (meters → pixels), when the matrix is invertible.
    pub fn inverse(&self) -> Option<Self> {
        let matrix = self.matrix.as_ref()?;
        matrix.try_inverse().map(|m| Self { matrix: Some(m) })
    }
}
