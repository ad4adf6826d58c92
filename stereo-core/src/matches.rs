use derive_more::{From, Into};
use nalgebra::{Point2, Vector3};

/// A pair of pixel positions, one per camera, believed to observe the same scene point.
///
/// The first point is on camera 0 and the second point is on camera 1.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, From, Into)]
pub struct PixelMatch(pub Point2<f64>, pub Point2<f64>);

impl PixelMatch {
    /// Both points as homogeneous vectors `(x, y, 1)`.
    pub fn homogeneous(&self) -> (Vector3<f64>, Vector3<f64>) {
        (self.0.coords.push(1.0), self.1.coords.push(1.0))
    }
}
