use crate::MergeError;
use core::ops::Range;
use stereo_core::{
    nalgebra::DMatrix, CameraFeatures, CorrespondenceSet, ShapeError, TrackedSet,
};

/// Which index ranges of a merged set came from matching and which from tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedProvenance {
    pub fresh: Range<usize>,
    pub tracked: Range<usize>,
}

/// Combines an epoch's fresh matches with the points tracked from the previous epoch.
///
/// Fresh correspondences come first and tracked correspondences are appended after them,
/// in the same order for points, descriptor columns, and scores of both cameras.
/// The tracked sets of the two cameras must pair up one to one: they need the same length
/// and the same source indices, otherwise the merge is rejected instead of silently pairing
/// unrelated points.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureMerger;

impl FeatureMerger {
    pub fn new() -> Self {
        Self
    }

    pub fn merge(
        &self,
        fresh: &CorrespondenceSet,
        tracked0: &TrackedSet,
        tracked1: &TrackedSet,
    ) -> Result<(CorrespondenceSet, MergedProvenance), MergeError> {
        if tracked0.len() != tracked1.len() {
            return Err(MergeError::TrackedCountMismatch(
                tracked0.len(),
                tracked1.len(),
            ));
        }
        if let Some((position, (&camera0, &camera1))) = tracked0
            .source()
            .iter()
            .zip(tracked1.source())
            .enumerate()
            .find(|(_, (a, b))| a != b)
        {
            return Err(MergeError::TrackedSourceMismatch {
                position,
                camera0,
                camera1,
            });
        }

        let dimension = Self::dimension(fresh, tracked0, tracked1)?;
        let [fresh0, fresh1] = fresh.cameras();
        let merged = CorrespondenceSet::new(
            Self::concatenate(fresh0, tracked0.features(), dimension)?,
            Self::concatenate(fresh1, tracked1.features(), dimension)?,
        )?;
        let provenance = MergedProvenance {
            fresh: 0..fresh.len(),
            tracked: fresh.len()..merged.len(),
        };
        Ok((merged, provenance))
    }

    /// The common descriptor dimension. Sides without any features do not constrain it.
    fn dimension(
        fresh: &CorrespondenceSet,
        tracked0: &TrackedSet,
        tracked1: &TrackedSet,
    ) -> Result<usize, MergeError> {
        let mut dimension = None;
        let sides = [
            (fresh.len(), fresh.descriptor_dimension()),
            (tracked0.len(), tracked0.features().descriptor_dimension()),
            (tracked1.len(), tracked1.features().descriptor_dimension()),
        ];
        for (len, found) in sides {
            if len == 0 {
                continue;
            }
            match dimension {
                None => dimension = Some(found),
                Some(expected) if expected != found => {
                    return Err(MergeError::DescriptorDimensionMismatch { found, expected })
                }
                Some(_) => {}
            }
        }
        Ok(dimension.unwrap_or_else(|| fresh.descriptor_dimension()))
    }

    fn concatenate(
        fresh: &CameraFeatures,
        tracked: &CameraFeatures,
        dimension: usize,
    ) -> Result<CameraFeatures, ShapeError> {
        let split = fresh.len();
        let points = fresh
            .points()
            .iter()
            .chain(tracked.points())
            .copied()
            .collect();
        let descriptors = DMatrix::from_fn(dimension, split + tracked.len(), |row, col| {
            if col < split {
                fresh.descriptors()[(row, col)]
            } else {
                tracked.descriptors()[(row, col - split)]
            }
        });
        let scores = fresh
            .scores()
            .iter()
            .chain(tracked.scores())
            .copied()
            .collect();
        CameraFeatures::new(points, descriptors, scores)
    }
}
