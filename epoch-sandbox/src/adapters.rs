//! [`Matcher`] and [`Tracker`] implementations based on AKAZE binary features.

use crate::{
    features::{descriptor_bits, detect, Features, DESCRIPTOR_BITS},
    matching::symmetric_matching,
};
use bitarray::BitArray;
use epoch_pipeline::{
    stereo_core::{CameraFeatures, CorrespondenceSet, TrackedSet},
    FeatureSettings, MatchError, MatchRequest, Matcher, TrackError, TrackRequest, Tracker,
};
use log::*;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    path::Path,
};
use thiserror::Error;

const MATCHES_CACHE: &str = "matches.bin";
const TRACKED_CACHE: &str = "tracked.bin";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("descriptors have {found} dimensions but AKAZE descriptors have {expected} bits")]
    DescriptorDimension { found: usize, expected: usize },
    #[error("failed to read image: {0}")]
    Image(#[from] image::ImageError),
    #[error("cache i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("cache is not readable: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Reads a value cached in an earlier run, if there is one.
fn load_cached<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, AdapterError> {
    if !path.is_file() {
        return Ok(None);
    }
    let value = bincode::deserialize_from(BufReader::new(File::open(path)?))?;
    info!("reusing cached results from {}", path.display());
    Ok(Some(value))
}

fn store_cached<T: Serialize>(path: &Path, value: &T) -> Result<(), AdapterError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    bincode::serialize_into(BufWriter::new(File::create(path)?), value)?;
    Ok(())
}

/// Settings that only apply to learned matchers.
fn note_unused(settings: &FeatureSettings) {
    debug!(
        "AKAZE ignores weights {:?}, {} solver iterations, and force_cpu={}",
        settings.weights, settings.solver_iterations, settings.force_cpu
    );
}

/// Matches AKAZE features between the two cameras of one epoch.
#[derive(Debug, Default)]
pub struct AkazeMatcher;

impl AkazeMatcher {
    pub fn new() -> Self {
        Self
    }

    fn match_images(&self, request: &MatchRequest<'_>) -> Result<CorrespondenceSet, MatchError> {
        note_unused(request.settings);
        let features = |camera: usize| {
            detect(request.images[camera], request.rois[camera], request.settings)
                .map_err(|e| MatchError::backend(AdapterError::from(e)))
        };
        let a = features(0)?;
        let b = features(1)?;
        let matches =
            symmetric_matching(&a.descriptors, &b.descriptors, request.settings.match_threshold);
        info!(
            "epoch {}: matched {} of {} and {} features",
            request.epoch,
            matches.len(),
            a.len(),
            b.len()
        );
        if matches.is_empty() {
            return Err(MatchError::NoCorrespondences);
        }
        let indices0: Vec<usize> = matches.iter().map(|m| m[0]).collect();
        let indices1: Vec<usize> = matches.iter().map(|m| m[1]).collect();
        Ok(CorrespondenceSet::new(
            a.camera_features(&indices0)?,
            b.camera_features(&indices1)?,
        )?)
    }
}

impl Matcher for AkazeMatcher {
    fn match_pair(&mut self, request: MatchRequest<'_>) -> Result<CorrespondenceSet, MatchError> {
        let cache = request.output_dir.join(MATCHES_CACHE);
        if request.settings.cache {
            if let Some(set) =
                load_cached::<CorrespondenceSet>(&cache).map_err(MatchError::backend)?
            {
                set.validate()?;
                return Ok(set);
            }
        }
        let set = self.match_images(&request)?;
        if request.settings.cache {
            store_cached(&cache, &set).map_err(MatchError::backend)?;
        }
        Ok(set)
    }
}

/// Recovers the binary descriptors of the previous epoch from their floating point columns.
fn previous_descriptors(features: &CameraFeatures) -> Result<Vec<BitArray<64>>, AdapterError> {
    (0..features.len())
        .map(|ix| {
            descriptor_bits(features.descriptor(ix))
                .ok_or(AdapterError::DescriptorDimension {
                    found: features.descriptor_dimension(),
                    expected: DESCRIPTOR_BITS,
                })
        })
        .collect()
}

/// Follows the previous epoch's correspondences into the current images by descriptor matching.
///
/// Each camera is tracked independently. A correspondence survives only if it is found again on
/// both cameras, so the two returned sets always have the same sources.
#[derive(Debug, Default)]
pub struct AkazeTracker;

impl AkazeTracker {
    pub fn new() -> Self {
        Self
    }

    fn track_images(&self, request: &TrackRequest<'_>) -> Result<[TrackedSet; 2], TrackError> {
        note_unused(request.settings);
        let mut current: Vec<Features> = Vec::with_capacity(2);
        let mut found: Vec<BTreeMap<usize, usize>> = Vec::with_capacity(2);
        for camera in 0..2 {
            let previous = previous_descriptors(request.previous.camera(camera))
                .map_err(TrackError::backend)?;
            let features = detect(
                request.frames[camera][1],
                request.rois[camera],
                request.settings,
            )
            .map_err(|e| TrackError::backend(AdapterError::from(e)))?;
            let matches = symmetric_matching(
                &previous,
                &features.descriptors,
                request.settings.match_threshold,
            );
            debug!(
                "epoch {}: camera {} found {} of {} previous points",
                request.epoch,
                camera,
                matches.len(),
                previous.len()
            );
            found.push(matches.into_iter().map(|[from, to]| (from, to)).collect());
            current.push(features);
        }

        let source: Vec<usize> = found[0]
            .keys()
            .filter(|ix| found[1].contains_key(ix))
            .copied()
            .collect();
        info!(
            "epoch {}: tracked {} of {} points on both cameras",
            request.epoch,
            source.len(),
            request.previous.len()
        );
        let tracked = |camera: usize| -> Result<TrackedSet, TrackError> {
            let indices: Vec<usize> = source.iter().map(|ix| found[camera][ix]).collect();
            Ok(TrackedSet::new(
                current[camera].camera_features(&indices)?,
                source.clone(),
            )?)
        };
        Ok([tracked(0)?, tracked(1)?])
    }
}

impl Tracker for AkazeTracker {
    fn track(&mut self, request: TrackRequest<'_>) -> Result<[TrackedSet; 2], TrackError> {
        let cache = request.output_dir.join(TRACKED_CACHE);
        if request.settings.cache {
            if let Some(tracked) =
                load_cached::<[TrackedSet; 2]>(&cache).map_err(TrackError::backend)?
            {
                for set in &tracked {
                    set.validate()?;
                }
                return Ok(tracked);
            }
        }
        let tracked = self.track_images(&request)?;
        if request.settings.cache {
            store_cached(&cache, &tracked).map_err(TrackError::backend)?;
        }
        Ok(tracked)
    }
}
