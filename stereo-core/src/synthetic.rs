//! Synthetic stereo scenes with a known fundamental matrix.
//!
//! The world frame is the frame of camera 0. Camera 1 observes a world point `p` at
//! `rotation * p + translation`. Both cameras share the same sensor size.

use crate::PixelMatch;
use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector2, Vector3};
use rand::Rng;

/// A calibrated stereo pair with known relative pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticRig {
    pub intrinsics: [Matrix3<f64>; 2],
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    pub width: u32,
    pub height: u32,
    /// Scene depth range in front of camera 0.
    pub depth: (f64, f64),
}

impl Default for SyntheticRig {
    #[rustfmt::skip]
    fn default() -> Self {
        let k0 = Matrix3::new(
            1500.0, 0.0,    960.0,
            0.0,    1500.0, 540.0,
            0.0,    0.0,    1.0,
        );
        let k1 = Matrix3::new(
            1480.0, 0.0,    950.0,
            0.0,    1490.0, 545.0,
            0.0,    0.0,    1.0,
        );
        Self {
            intrinsics: [k0, k1],
            rotation: Rotation3::from_euler_angles(0.01, -0.12, 0.02),
            translation: Vector3::new(-1.2, 0.05, 0.1),
            width: 1920,
            height: 1080,
            depth: (8.0, 14.0),
        }
    }
}

impl SyntheticRig {
    /// The ground truth fundamental matrix, satisfying `x1^T F x0 = 0`.
    pub fn fundamental(&self) -> Matrix3<f64> {
        let essential = self.translation.cross_matrix() * self.rotation.matrix();
        let [k0, k1] = self.intrinsics;
        let k0_inv = k0.try_inverse().unwrap_or_else(Matrix3::identity);
        let k1_inv = k1.try_inverse().unwrap_or_else(Matrix3::identity);
        k1_inv.transpose() * essential * k0_inv
    }

    fn pixel(k: &Matrix3<f64>, point: Point3<f64>) -> Option<Point2<f64>> {
        if point.z <= 0.0 {
            return None;
        }
        let projected = k * (point.coords / point.z);
        Some(Point2::new(projected.x, projected.y))
    }

    fn in_frame(&self, point: Point2<f64>) -> bool {
        point.x >= 0.0
            && point.y >= 0.0
            && point.x < self.width as f64
            && point.y < self.height as f64
    }

    /// Projects a world point into both cameras, if it is visible in both.
    pub fn project(&self, world: Point3<f64>) -> Option<PixelMatch> {
        let a = Self::pixel(&self.intrinsics[0], world)?;
        let b = Self::pixel(&self.intrinsics[1], self.rotation * world + self.translation)?;
        if self.in_frame(a) && self.in_frame(b) {
            Some(PixelMatch(a, b))
        } else {
            None
        }
    }

    /// Draws `count` world points that are visible in both cameras.
    pub fn scene(&self, rng: &mut impl Rng, count: usize) -> Vec<Point3<f64>> {
        let k0_inv = self.intrinsics[0]
            .try_inverse()
            .unwrap_or_else(Matrix3::identity);
        let mut points = Vec::with_capacity(count);
        while points.len() < count {
            let pixel = Vector3::new(
                rng.gen_range(0.0..self.width as f64),
                rng.gen_range(0.0..self.height as f64),
                1.0,
            );
            let depth = rng.gen_range(self.depth.0..self.depth.1);
            let world = Point3::from(k0_inv * pixel * depth);
            if self.project(world).is_some() {
                points.push(world);
            }
        }
        points
    }

    /// Draws `count` exact correspondences.
    pub fn matches(&self, rng: &mut impl Rng, count: usize) -> Vec<PixelMatch> {
        self.scene(rng, count)
            .into_iter()
            .filter_map(|world| self.project(world))
            .collect()
    }

    /// The Sampson distance of a match to the ground truth epipolar geometry.
    pub fn sampson_distance(&self, m: &PixelMatch) -> f64 {
        let f = self.fundamental();
        let (a, b) = m.homogeneous();
        let fa = f * a;
        let ftb = f.transpose() * b;
        let error = b.dot(&fa);
        error.abs() / (fa.x * fa.x + fa.y * fa.y + ftb.x * ftb.x + ftb.y * ftb.y).sqrt()
    }

    /// Moves the camera 1 point of `m` so that it is at least `min_distance`
    /// pixels (Sampson distance) away from satisfying the epipolar constraint.
    pub fn corrupt(&self, rng: &mut impl Rng, m: PixelMatch, min_distance: f64) -> PixelMatch {
        loop {
            let angle = rng.gen_range(0.0..core::f64::consts::TAU);
            let length = rng.gen_range(4.0 * min_distance..20.0 * min_distance);
            let moved = m.1 + Vector2::new(angle.cos(), angle.sin()) * length;
            let candidate = PixelMatch(m.0, moved);
            if self.in_frame(moved) && self.sampson_distance(&candidate) > min_distance {
                return candidate;
            }
        }
    }
}
