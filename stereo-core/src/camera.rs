use nalgebra::{Matrix3, Point2, Vector2, Vector5};
use serde::{Deserialize, Serialize};

/// The calibration of one camera of the rig.
///
/// The intrinsic matrix `K` follows the usual convention:
///
/// ```text
/// | fx  s   cx |
/// | 0   fy  cy |
/// | 0   0   1  |
/// ```
///
/// The distortion vector uses the five coefficient Brown-Conrady ordering
/// `[k1, k2, p1, p2, k3]`. A camera is created once when the run starts and is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    id: String,
    intrinsics: Matrix3<f64>,
    distortion: Vector5<f64>,
}

impl Camera {
    pub fn new(id: impl Into<String>, intrinsics: Matrix3<f64>, distortion: Vector5<f64>) -> Self {
        Self {
            id: id.into(),
            intrinsics,
            distortion,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The 3x3 intrinsic matrix `K`.
    pub fn intrinsics(&self) -> &Matrix3<f64> {
        &self.intrinsics
    }

    /// The distortion coefficients `[k1, k2, p1, p2, k3]`.
    pub fn distortion(&self) -> &Vector5<f64> {
        &self.distortion
    }

    pub fn focals(&self) -> Vector2<f64> {
        Vector2::new(self.intrinsics[(0, 0)], self.intrinsics[(1, 1)])
    }

    pub fn principal_point(&self) -> Point2<f64> {
        Point2::new(self.intrinsics[(0, 2)], self.intrinsics[(1, 2)])
    }

    pub fn skew(&self) -> f64 {
        self.intrinsics[(0, 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intrinsic_accessors_read_k() {
        #[rustfmt::skip]
        let k = Matrix3::new(
            6000.0, 0.5,    3000.0,
            0.0,    6010.0, 2000.0,
            0.0,    0.0,    1.0,
        );
        let camera = Camera::new("p2", k, Vector5::zeros());
        assert_eq!(camera.id(), "p2");
        assert_eq!(camera.focals(), Vector2::new(6000.0, 6010.0));
        assert_eq!(camera.principal_point(), Point2::new(3000.0, 2000.0));
        assert_eq!(camera.skew(), 0.5);
    }
}
