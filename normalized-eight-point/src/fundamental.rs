use serde::{Deserialize, Serialize};
use stereo_core::{
    nalgebra::{Matrix3, Vector3},
    sample_consensus::Model,
    PixelMatch,
};

/// The distance used to score a correspondence against a fundamental matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMetric {
    /// First-order approximation of the geometric reprojection error, in pixels.
    Sampson,
    /// Root mean square of the two point-to-epipolar-line distances, in pixels.
    SymmetricEpipolar,
}

impl Default for ErrorMetric {
    fn default() -> Self {
        Self::Sampson
    }
}

/// How [`FundamentalMatrix`] computes the residual it reports to consensus algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Residual {
    pub metric: ErrorMetric,
    /// Also require both one-sided epipolar distances to be within the threshold.
    ///
    /// When set, the residual is the largest of the metric and the two one-sided distances.
    pub symmetric_check: bool,
}

impl Default for Residual {
    fn default() -> Self {
        Self {
            metric: ErrorMetric::Sampson,
            symmetric_check: true,
        }
    }
}

/// A fundamental matrix relating pixel coordinates of two cameras.
///
/// It satisfies the epipolar constraint
///
/// ```text
/// transpose(x1) * F * x0 = 0
/// ```
///
/// where `x0` and `x1` are homogeneous pixel coordinates on camera 0 and camera 1.
/// `F * x0` is the epipolar line of `x0` on camera 1 and `transpose(F) * x1` is
/// the epipolar line of `x1` on camera 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FundamentalMatrix {
    matrix: Matrix3<f64>,
    residual: Residual,
}

impl FundamentalMatrix {
    pub fn new(matrix: Matrix3<f64>) -> Self {
        Self {
            matrix,
            residual: Residual::default(),
        }
    }

    pub fn with_residual(self, residual: Residual) -> Self {
        Self { residual, ..self }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn residual_kind(&self) -> Residual {
        self.residual
    }

    /// The value of `transpose(x1) * F * x0`.
    pub fn algebraic_error(&self, m: &PixelMatch) -> f64 {
        let (a, b) = m.homogeneous();
        b.dot(&(self.matrix * a))
    }

    fn lines(&self, m: &PixelMatch) -> (f64, Vector3<f64>, Vector3<f64>) {
        let (a, b) = m.homogeneous();
        let line1 = self.matrix * a;
        let line0 = self.matrix.transpose() * b;
        (b.dot(&line1), line0, line1)
    }

    /// The Sampson distance in pixels.
    pub fn sampson_distance(&self, m: &PixelMatch) -> f64 {
        let (error, line0, line1) = self.lines(m);
        let denominator =
            line1.x * line1.x + line1.y * line1.y + line0.x * line0.x + line0.y * line0.y;
        if denominator <= f64::EPSILON {
            return f64::INFINITY;
        }
        error.abs() / denominator.sqrt()
    }

    /// The distances of the camera 0 point to its epipolar line on camera 0
    /// and of the camera 1 point to its epipolar line on camera 1.
    pub fn epipolar_distances(&self, m: &PixelMatch) -> (f64, f64) {
        let (error, line0, line1) = self.lines(m);
        let distance = |line: Vector3<f64>| {
            let norm = line.xy().norm();
            if norm <= f64::EPSILON {
                f64::INFINITY
            } else {
                error.abs() / norm
            }
        };
        (distance(line0), distance(line1))
    }

    /// Scales the matrix to unit Frobenius norm with a non-negative last element.
    ///
    /// Fundamental matrices are only defined up to scale, so this makes two estimates comparable.
    pub fn normalized(self) -> Self {
        let norm = self.matrix.norm();
        if norm <= f64::EPSILON {
            return self;
        }
        let sign = if self.matrix[(2, 2)] < 0.0 { -1.0 } else { 1.0 };
        Self {
            matrix: self.matrix * (sign / norm),
            ..self
        }
    }
}

impl Model<PixelMatch> for FundamentalMatrix {
    fn residual(&self, data: &PixelMatch) -> f64 {
        let base = match self.residual.metric {
            ErrorMetric::Sampson => self.sampson_distance(data),
            ErrorMetric::SymmetricEpipolar => {
                let (d0, d1) = self.epipolar_distances(data);
                ((d0 * d0 + d1 * d1) / 2.0).sqrt()
            }
        };
        if self.residual.symmetric_check {
            let (d0, d1) = self.epipolar_distances(data);
            base.max(d0).max(d1)
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use stereo_core::nalgebra::Point2;

    /// A pure horizontal translation: epipolar lines are image rows.
    fn rectified() -> FundamentalMatrix {
        FundamentalMatrix::new(Matrix3::new(0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0))
    }

    #[test]
    fn rectified_distances_are_row_offsets() {
        let f = rectified();
        let on_line = PixelMatch(Point2::new(10.0, 20.0), Point2::new(300.0, 20.0));
        assert_relative_eq!(f.algebraic_error(&on_line), 0.0);
        assert_relative_eq!(f.residual(&on_line), 0.0);

        let off_line = PixelMatch(Point2::new(10.0, 20.0), Point2::new(300.0, 24.0));
        let (d0, d1) = f.epipolar_distances(&off_line);
        assert_relative_eq!(d0, 4.0);
        assert_relative_eq!(d1, 4.0);
        assert_relative_eq!(f.sampson_distance(&off_line), 4.0 / 2f64.sqrt());
    }

    #[test]
    fn symmetric_check_takes_the_worst_distance() {
        let off_line = PixelMatch(Point2::new(10.0, 20.0), Point2::new(300.0, 24.0));
        let lenient = rectified().with_residual(Residual {
            metric: ErrorMetric::Sampson,
            symmetric_check: false,
        });
        let strict = rectified();
        assert_relative_eq!(lenient.residual(&off_line), 4.0 / 2f64.sqrt());
        assert_relative_eq!(strict.residual(&off_line), 4.0);
        let rms = rectified().with_residual(Residual {
            metric: ErrorMetric::SymmetricEpipolar,
            symmetric_check: false,
        });
        assert_relative_eq!(rms.residual(&off_line), 4.0);
    }

    #[test]
    fn normalization_fixes_scale_and_sign() {
        let f = FundamentalMatrix::new(Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, -9.0));
        let g = FundamentalMatrix::new(f.matrix() * -3.5);
        assert_relative_eq!(f.normalized().matrix(), g.normalized().matrix(), epsilon = 1e-12);
        assert_relative_eq!(f.normalized().matrix().norm(), 1.0, epsilon = 1e-12);
    }
}
