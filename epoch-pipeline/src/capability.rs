//! The external matching and tracking capabilities the pipeline depends on.
//!
//! Both are treated as opaque, blocking, and potentially slow. The pipeline only relies on the
//! contracts documented on each trait and checks them on every call.

use crate::{FeatureSettings, MatchError, TrackError};
use std::path::Path;
use stereo_core::{CorrespondenceSet, Epoch, RegionOfInterest, TrackedSet};

/// Everything a [`Matcher`] needs to match one epoch's image pair.
#[derive(Debug, Clone, Copy)]
pub struct MatchRequest<'a> {
    pub epoch: Epoch,
    /// The images of camera 0 and camera 1.
    pub images: [&'a Path; 2],
    pub rois: [RegionOfInterest; 2],
    pub settings: &'a FeatureSettings,
    /// Where diagnostic artifacts of this epoch may be written.
    pub output_dir: &'a Path,
}

/// Finds fresh correspondences between the two cameras' images of one epoch.
///
/// Only keypoints inside each camera's region of interest are considered. The returned points are
/// in full image pixel coordinates, even if the implementation internally crops, resizes, or tiles
/// the images. Returning an empty set is treated the same as [`MatchError::NoCorrespondences`].
pub trait Matcher {
    fn match_pair(&mut self, request: MatchRequest<'_>) -> Result<CorrespondenceSet, MatchError>;
}

/// Everything a [`Tracker`] needs to follow the previous epoch's points into the current epoch.
#[derive(Debug, Clone, Copy)]
pub struct TrackRequest<'a> {
    /// The current epoch. Points are tracked from `epoch - 1`.
    pub epoch: Epoch,
    /// For each camera, its previous and its current image.
    pub frames: [[&'a Path; 2]; 2],
    pub rois: [RegionOfInterest; 2],
    /// The record of the previous epoch. `previous.camera(i)` holds the keypoints, descriptors,
    /// and scores to track on camera `i`.
    pub previous: &'a CorrespondenceSet,
    pub settings: &'a FeatureSettings,
    pub output_dir: &'a Path,
}

/// Follows the previous epoch's points of each camera into that camera's current image.
///
/// For each camera the result contains the subset of previous points that could be located
/// again, with their new positions and their carried or re-scored descriptors and scores.
/// Tracking only ever loses points:
///
/// * a camera never has more tracked points than the previous record has correspondences,
/// * `source` indices are in range and strictly increasing,
/// * points that were not in the previous record are never returned.
///
/// To keep the merged record paired, both cameras should return the same `source` sequence,
/// which means dropping any point that was lost on the other camera.
pub trait Tracker {
    fn track(&mut self, request: TrackRequest<'_>) -> Result<[TrackedSet; 2], TrackError>;
}

impl<T: Matcher + ?Sized> Matcher for &mut T {
    fn match_pair(&mut self, request: MatchRequest<'_>) -> Result<CorrespondenceSet, MatchError> {
        (**self).match_pair(request)
    }
}

impl<T: Tracker + ?Sized> Tracker for &mut T {
    fn track(&mut self, request: TrackRequest<'_>) -> Result<[TrackedSet; 2], TrackError> {
        (**self).track(request)
    }
}

impl<T: Matcher + ?Sized> Matcher for Box<T> {
    fn match_pair(&mut self, request: MatchRequest<'_>) -> Result<CorrespondenceSet, MatchError> {
        (**self).match_pair(request)
    }
}

impl<T: Tracker + ?Sized> Tracker for Box<T> {
    fn track(&mut self, request: TrackRequest<'_>) -> Result<[TrackedSet; 2], TrackError> {
        (**self).track(request)
    }
}

/// Checks the output of a tracker against the [`Tracker`] contract.
pub(crate) fn check_tracked(
    previous: &CorrespondenceSet,
    tracked: &[TrackedSet; 2],
    minimum: usize,
) -> Result<(), TrackError> {
    for (camera, set) in tracked.iter().enumerate() {
        set.validate()?;
        if set.len() > previous.len() {
            return Err(TrackError::InventedPoints {
                camera,
                found: set.len(),
                previous: previous.len(),
            });
        }
        let mut last = None;
        for (position, &index) in set.source().iter().enumerate() {
            if index >= previous.len() {
                return Err(TrackError::SourceOutOfRange {
                    camera,
                    position,
                    index,
                    previous: previous.len(),
                });
            }
            if last.map(|last| index <= last).unwrap_or(false) {
                return Err(TrackError::SourceOrder { camera, position });
            }
            last = Some(index);
        }
    }
    let survivors = tracked[0].len().min(tracked[1].len());
    if !previous.is_empty() && survivors < minimum.min(previous.len()) {
        return Err(TrackError::TooFewSurvivors {
            survivors,
            previous: previous.len(),
            minimum,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_core::{nalgebra::{DMatrix, Point2}, CameraFeatures, ShapeError};

    fn previous(n: usize) -> CorrespondenceSet {
        let camera = || {
            CameraFeatures::new(
                (0..n).map(|i| Point2::new(i as f64, 0.0)).collect(),
                DMatrix::zeros(2, n),
                vec![1.0; n],
            )
            .unwrap()
        };
        CorrespondenceSet::new(camera(), camera()).unwrap()
    }

    fn tracked(source: &[usize]) -> TrackedSet {
        let features = CameraFeatures::new(
            source.iter().map(|&i| Point2::new(i as f64, 1.0)).collect(),
            DMatrix::zeros(2, source.len()),
            vec![1.0; source.len()],
        )
        .unwrap();
        TrackedSet::new(features, source.to_vec()).unwrap()
    }

    #[test]
    fn accepts_subsets() {
        let previous = previous(5);
        check_tracked(&previous, &[tracked(&[0, 2, 4]), tracked(&[0, 2, 4])], 1).unwrap();
    }

    #[test]
    fn rejects_contract_violations() {
        let previous = previous(3);
        assert!(matches!(
            check_tracked(&previous, &[tracked(&[0, 1, 2, 2]), tracked(&[0])], 1),
            Err(TrackError::InventedPoints { camera: 0, .. })
        ));
        assert!(matches!(
            check_tracked(&previous, &[tracked(&[0]), tracked(&[3])], 1),
            Err(TrackError::SourceOutOfRange { camera: 1, index: 3, .. })
        ));
        assert!(matches!(
            check_tracked(&previous, &[tracked(&[1, 1]), tracked(&[1, 2])], 1),
            Err(TrackError::SourceOrder { camera: 0, position: 1 })
        ));
        assert!(matches!(
            check_tracked(&previous, &[tracked(&[]), tracked(&[])], 1),
            Err(TrackError::TooFewSurvivors { survivors: 0, .. })
        ));
    }

    #[test]
    fn rejects_inconsistent_shapes() {
        let previous = previous(4);
        // A deserialized set is not checked on construction.
        let mut value = serde_json::to_value(tracked(&[0, 1, 3])).unwrap();
        value["features"]["scores"].as_array_mut().unwrap().pop();
        let broken: TrackedSet = serde_json::from_value(value).unwrap();
        assert!(matches!(
            check_tracked(&previous, &[tracked(&[0, 1, 3]), broken], 1),
            Err(TrackError::Shape(ShapeError::Length { what: "scores", .. }))
        ));

        let mut value = serde_json::to_value(tracked(&[0, 1, 3])).unwrap();
        value["source"].as_array_mut().unwrap().pop();
        let broken: TrackedSet = serde_json::from_value(value).unwrap();
        assert!(matches!(
            check_tracked(&previous, &[broken, tracked(&[0, 1, 3])], 1),
            Err(TrackError::Shape(ShapeError::Length { what: "source indices", .. }))
        ));
    }

    #[test]
    fn nothing_to_lose() {
        check_tracked(&previous(0), &[tracked(&[]), tracked(&[])], 1).unwrap();
    }
}
