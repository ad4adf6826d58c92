//! Fundamental matrix estimation from pixel correspondences.
//!
//! This implements the normalized
//! [eight-point algorithm](https://en.wikipedia.org/wiki/Eight-point_algorithm)
//! by Richard Hartley. Each image's points are translated so that their centroid is at the
//! origin and scaled so that their mean distance from it is `sqrt(2)`. The epipolar constraint
//! is solved in that frame, the result is forced to rank 2, and it is finally mapped back into
//! pixel coordinates. Without the normalization the linear system is badly conditioned for
//! pixel coordinates in the thousands.
//!
//! [`NormalizedEightPoint`] implements [`Estimator`] so it can be plugged into any
//! `sample_consensus` algorithm, and it accepts more than eight matches for least squares refits.

mod fundamental;

pub use fundamental::*;

use float_ord::FloatOrd;
use stereo_core::{
    nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector2},
    sample_consensus::Estimator,
    PixelMatch,
};

/// The transform taking the points to their Hartley-normalized frame.
fn hartley_normalization<I>(points: I) -> Option<Matrix3<f64>>
where
    I: Iterator<Item = Point2<f64>> + Clone,
{
    let (count, sum) = points
        .clone()
        .fold((0usize, Vector2::zeros()), |(count, sum), p| {
            (count + 1, sum + p.coords)
        });
    if count == 0 {
        return None;
    }
    let centroid = sum / count as f64;
    let mean_distance = points.map(|p| (p.coords - centroid).norm()).sum::<f64>() / count as f64;
    if mean_distance <= f64::EPSILON {
        return None;
    }
    let scale = core::f64::consts::SQRT_2 / mean_distance;
    #[rustfmt::skip]
    let transform = Matrix3::new(
        scale, 0.0,   -scale * centroid.x,
        0.0,   scale, -scale * centroid.y,
        0.0,   0.0,   1.0,
    );
    Some(transform)
}

/// Performs the normalized eight-point algorithm on pixel matches.
#[derive(Copy, Clone, Debug)]
pub struct NormalizedEightPoint {
    pub epsilon: f64,
    pub iterations: usize,
    /// Reject samples whose epipolar constraint has more than a one dimensional null space.
    ///
    /// This happens when points are duplicated, collinear, or all lie on one scene plane.
    /// Such samples admit a whole family of fundamental matrices, so any one of them is arbitrary.
    pub degeneracy_check: bool,
    /// The second smallest eigenvalue of the normal equations, relative to the largest,
    /// below which a sample is considered degenerate.
    pub degeneracy_tolerance: f64,
    /// The residual carried by the estimated models.
    pub residual: Residual,
}

impl NormalizedEightPoint {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn residual(self, residual: Residual) -> Self {
        Self { residual, ..self }
    }

    pub fn degeneracy_check(self, degeneracy_check: bool) -> Self {
        Self {
            degeneracy_check,
            ..self
        }
    }

    pub fn from_matches<I>(&self, data: I) -> Option<FundamentalMatrix>
    where
        I: Iterator<Item = PixelMatch> + Clone,
    {
        let t0 = hartley_normalization(data.clone().map(|PixelMatch(a, _)| a))?;
        let t1 = hartley_normalization(data.clone().map(|PixelMatch(_, b)| b))?;

        // Accumulate the normal equations of the epipolar constraint so any number of
        // matches fits in a 9x9 matrix.
        let mut normal = SMatrix::<f64, 9, 9>::zeros();
        let mut count = 0;
        for PixelMatch(a, b) in data {
            let a = t0 * a.coords.push(1.0);
            let b = t1 * b.coords.push(1.0);
            let mut row = SVector::<f64, 9>::zeros();
            for j in 0..3 {
                row.fixed_rows_mut::<3>(3 * j).copy_from(&(a[j] * b));
            }
            normal += row * row.transpose();
            count += 1;
        }
        if count < <Self as Estimator<PixelMatch>>::MIN_SAMPLES {
            return None;
        }

        let eigens = normal.try_symmetric_eigen(self.epsilon, self.iterations)?;
        let mut order = [0, 1, 2, 3, 4, 5, 6, 7, 8];
        order.sort_unstable_by_key(|&ix| FloatOrd(eigens.eigenvalues[ix]));
        if self.degeneracy_check {
            let largest = eigens.eigenvalues[order[8]];
            if eigens.eigenvalues[order[1]] <= self.degeneracy_tolerance * largest {
                return None;
            }
        }
        let normalized = Matrix3::from_iterator(eigens.eigenvectors.column(order[0]).iter().copied());

        // Enforce rank 2 by zeroing the smallest singular value.
        let mut svd = normalized.try_svd(true, true, self.epsilon, self.iterations)?;
        svd.singular_values[2] = 0.0;
        let normalized = svd.recompose().ok()?;

        let matrix = t1.transpose() * normalized * t0;
        Some(
            FundamentalMatrix::new(matrix)
                .with_residual(self.residual)
                .normalized(),
        )
    }
}

impl Default for NormalizedEightPoint {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            iterations: 1000,
            degeneracy_check: true,
            degeneracy_tolerance: 1e-8,
            residual: Residual::default(),
        }
    }
}

impl Estimator<PixelMatch> for NormalizedEightPoint {
    type Model = FundamentalMatrix;
    type ModelIter = Option<FundamentalMatrix>;
    const MIN_SAMPLES: usize = 8;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = PixelMatch> + Clone,
    {
        self.from_matches(data)
    }
}
