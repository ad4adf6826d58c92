use crate::{CameraIndex, PixelMatch};
use nalgebra::{DMatrix, DVectorSlice, Point2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a set of parallel arrays does not describe a consistent set of features.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("{what} has {found} entries but there are {expected} keypoints")]
    Length {
        what: &'static str,
        found: usize,
        expected: usize,
    },
    #[error("camera 0 has {0} correspondences but camera 1 has {1}")]
    CorrespondenceCount(usize, usize),
    #[error("descriptor dimension {0} does not match descriptor dimension {1}")]
    DescriptorDimension(usize, usize),
    #[error("index {index} is out of range for {len} features")]
    Index { index: usize, len: usize },
}

/// The keypoints, descriptors, and scores observed on one camera.
///
/// Entry `i` of `points`, column `i` of `descriptors`, and entry `i` of `scores`
/// describe the same keypoint. Descriptors are stored with one column per keypoint,
/// so a set of `N` keypoints with `D` dimensional descriptors has a `D x N` descriptor matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraFeatures {
    points: Vec<Point2<f64>>,
    descriptors: DMatrix<f32>,
    scores: Vec<f32>,
}

impl CameraFeatures {
    pub fn new(
        points: Vec<Point2<f64>>,
        descriptors: DMatrix<f32>,
        scores: Vec<f32>,
    ) -> Result<Self, ShapeError> {
        let features = Self {
            points,
            descriptors,
            scores,
        };
        features.validate()?;
        Ok(features)
    }

    /// An empty set of features with `dimension` dimensional descriptors.
    pub fn empty(dimension: usize) -> Self {
        Self {
            points: vec![],
            descriptors: DMatrix::zeros(dimension, 0),
            scores: vec![],
        }
    }

    /// Checks that all of the parallel arrays have the same length.
    ///
    /// This is already enforced by [`CameraFeatures::new`], but deserialized data bypasses it.
    pub fn validate(&self) -> Result<(), ShapeError> {
        let expected = self.points.len();
        if self.descriptors.ncols() != expected {
            return Err(ShapeError::Length {
                what: "descriptor matrix",
                found: self.descriptors.ncols(),
                expected,
            });
        }
        if self.scores.len() != expected {
            return Err(ShapeError::Length {
                what: "scores",
                found: self.scores.len(),
                expected,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    /// The `D x N` descriptor matrix.
    pub fn descriptors(&self) -> &DMatrix<f32> {
        &self.descriptors
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn descriptor_dimension(&self) -> usize {
        self.descriptors.nrows()
    }

    pub fn descriptor(&self, ix: usize) -> DVectorSlice<'_, f32> {
        self.descriptors.column(ix)
    }

    /// Keeps only the keypoints at `indices`, in the order given.
    pub fn select(&self, indices: &[usize]) -> Result<Self, ShapeError> {
        if let Some(&index) = indices.iter().find(|&&ix| ix >= self.len()) {
            return Err(ShapeError::Index {
                index,
                len: self.len(),
            });
        }
        Ok(Self {
            points: indices.iter().map(|&ix| self.points[ix]).collect(),
            descriptors: self.descriptors.select_columns(indices),
            scores: indices.iter().map(|&ix| self.scores[ix]).collect(),
        })
    }

    pub fn into_parts(self) -> (Vec<Point2<f64>>, DMatrix<f32>, Vec<f32>) {
        (self.points, self.descriptors, self.scores)
    }
}

/// The matched points of both cameras at one epoch.
///
/// Index `i` on camera 0 corresponds to index `i` on camera 1. Both cameras always have the same
/// number of correspondences and the same descriptor dimension. A set is immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceSet {
    cameras: [CameraFeatures; 2],
}

impl CorrespondenceSet {
    pub fn new(camera0: CameraFeatures, camera1: CameraFeatures) -> Result<Self, ShapeError> {
        let set = Self {
            cameras: [camera0, camera1],
        };
        set.validate()?;
        Ok(set)
    }

    /// Builds a set from the six parallel arrays `points0`, `points1`, `descr0`, `descr1`,
    /// `scores0`, and `scores1`.
    pub fn from_parts(
        points: [Vec<Point2<f64>>; 2],
        descriptors: [DMatrix<f32>; 2],
        scores: [Vec<f32>; 2],
    ) -> Result<Self, ShapeError> {
        let [points0, points1] = points;
        let [descr0, descr1] = descriptors;
        let [scores0, scores1] = scores;
        Self::new(
            CameraFeatures::new(points0, descr0, scores0)?,
            CameraFeatures::new(points1, descr1, scores1)?,
        )
    }

    pub fn validate(&self) -> Result<(), ShapeError> {
        let [camera0, camera1] = &self.cameras;
        camera0.validate()?;
        camera1.validate()?;
        if camera0.len() != camera1.len() {
            return Err(ShapeError::CorrespondenceCount(
                camera0.len(),
                camera1.len(),
            ));
        }
        if camera0.descriptor_dimension() != camera1.descriptor_dimension() {
            return Err(ShapeError::DescriptorDimension(
                camera0.descriptor_dimension(),
                camera1.descriptor_dimension(),
            ));
        }
        Ok(())
    }

    /// The number of correspondences `N`.
    pub fn len(&self) -> usize {
        self.cameras[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn descriptor_dimension(&self) -> usize {
        self.cameras[0].descriptor_dimension()
    }

    /// The features observed by `camera` (`0` or `1`).
    ///
    /// # Panics
    ///
    /// Panics if `camera` is not `0` or `1`.
    pub fn camera(&self, camera: CameraIndex) -> &CameraFeatures {
        &self.cameras[camera]
    }

    pub fn cameras(&self) -> &[CameraFeatures; 2] {
        &self.cameras
    }

    pub fn points(&self, camera: CameraIndex) -> &[Point2<f64>] {
        self.cameras[camera].points()
    }

    pub fn descriptors(&self, camera: CameraIndex) -> &DMatrix<f32> {
        self.cameras[camera].descriptors()
    }

    pub fn scores(&self, camera: CameraIndex) -> &[f32] {
        self.cameras[camera].scores()
    }

    /// Iterates over the pixel positions of each correspondence.
    pub fn matches(&self) -> impl Iterator<Item = PixelMatch> + Clone + '_ {
        self.cameras[0]
            .points()
            .iter()
            .zip(self.cameras[1].points())
            .map(|(&a, &b)| PixelMatch(a, b))
    }

    /// Keeps only the correspondences whose entry in `mask` is `true`.
    pub fn retain_mask(&self, mask: &[bool]) -> Result<Self, ShapeError> {
        if mask.len() != self.len() {
            return Err(ShapeError::Length {
                what: "mask",
                found: mask.len(),
                expected: self.len(),
            });
        }
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(ix, &keep)| if keep { Some(ix) } else { None })
            .collect();
        Self::new(
            self.cameras[0].select(&indices)?,
            self.cameras[1].select(&indices)?,
        )
    }

    pub fn into_cameras(self) -> [CameraFeatures; 2] {
        self.cameras
    }
}

/// The result of tracking the features of one camera from the previous epoch into the current one.
///
/// `source[i]` is the index in the previous epoch's [`CorrespondenceSet`] that
/// feature `i` was tracked from. Tracking only loses points, so `source` is strictly
/// increasing and never longer than the previous set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSet {
    features: CameraFeatures,
    source: Vec<usize>,
}

impl TrackedSet {
    pub fn new(features: CameraFeatures, source: Vec<usize>) -> Result<Self, ShapeError> {
        let set = Self { features, source };
        set.validate()?;
        Ok(set)
    }

    /// Checks the features and that there is one source index per feature.
    ///
    /// Deserialized sets bypass [`TrackedSet::new`], so they must be checked with this.
    pub fn validate(&self) -> Result<(), ShapeError> {
        self.features.validate()?;
        if self.source.len() != self.features.len() {
            return Err(ShapeError::Length {
                what: "source indices",
                found: self.source.len(),
                expected: self.features.len(),
            });
        }
        Ok(())
    }

    pub fn empty(dimension: usize) -> Self {
        Self {
            features: CameraFeatures::empty(dimension),
            source: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &CameraFeatures {
        &self.features
    }

    pub fn source(&self) -> &[usize] {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(xs: &[f64]) -> CameraFeatures {
        let points = xs.iter().map(|&x| Point2::new(x, x + 0.5)).collect();
        let descriptors = DMatrix::from_fn(4, xs.len(), |r, c| (r * 10 + c) as f32);
        let scores = xs.iter().map(|&x| x as f32 / 10.0).collect();
        CameraFeatures::new(points, descriptors, scores).unwrap()
    }

    #[test]
    fn rejects_inconsistent_lengths() {
        let err = CameraFeatures::new(
            vec![Point2::origin(); 3],
            DMatrix::zeros(8, 2),
            vec![0.5; 3],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ShapeError::Length {
                what: "descriptor matrix",
                found: 2,
                expected: 3
            }
        );
        assert!(CameraFeatures::new(vec![Point2::origin(); 2], DMatrix::zeros(8, 2), vec![]).is_err());
    }

    #[test]
    fn rejects_unpaired_cameras() {
        assert_eq!(
            CorrespondenceSet::new(features(&[1.0, 2.0]), features(&[1.0])).unwrap_err(),
            ShapeError::CorrespondenceCount(2, 1)
        );
        let wide = CameraFeatures::new(vec![Point2::origin()], DMatrix::zeros(6, 1), vec![1.0])
            .unwrap();
        assert_eq!(
            CorrespondenceSet::new(features(&[1.0]), wide).unwrap_err(),
            ShapeError::DescriptorDimension(4, 6)
        );
    }

    #[test]
    fn mask_keeps_parallel_entries_together() {
        let set = CorrespondenceSet::new(features(&[1.0, 2.0, 3.0]), features(&[4.0, 5.0, 6.0]))
            .unwrap();
        let kept = set.retain_mask(&[true, false, true]).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.points(1), &[Point2::new(4.0, 4.5), Point2::new(6.0, 6.5)]);
        assert_eq!(kept.scores(0), &[0.1, 0.3]);
        assert_eq!(kept.descriptors(0).column(1), set.descriptors(0).column(2));
        assert!(set.retain_mask(&[true]).is_err());
    }

    #[test]
    fn tracked_set_requires_one_source_per_feature() {
        assert!(TrackedSet::new(features(&[1.0, 2.0]), vec![0]).is_err());
        let tracked = TrackedSet::new(features(&[1.0, 2.0]), vec![0, 3]).unwrap();
        assert_eq!(tracked.source(), &[0, 3]);
    }
}
