use std::{error::Error as StdError, fmt, io, path::PathBuf};
use stereo_core::{CameraIndex, Epoch, ShapeError};
use thiserror::Error;

/// Errors in the inputs or settings of a run, detected before any epoch is processed.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("camera {camera} has {found} images but camera {reference} has {expected}")]
    SequenceLengthMismatch {
        camera: String,
        found: usize,
        reference: String,
        expected: usize,
    },
    #[error("unable to list the images of camera {camera} in {path}: {source}")]
    CameraDirectory {
        camera: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("camera {camera} has no images with extension {extension:?} in {path}")]
    EmptySequence {
        camera: String,
        path: PathBuf,
        extension: String,
    },
    #[error("expected {expected} cameras but {found} were configured")]
    CameraCount { found: usize, expected: usize },
    #[error("requested {requested} epochs but only {available} image pairs exist")]
    EpochCount { requested: usize, available: usize },
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

impl ConfigurationError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            name,
            reason: reason.into(),
        }
    }
}

/// A malformed calibration resource.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unable to read calibration {resource}: {source}")]
    Io {
        resource: String,
        #[source]
        source: io::Error,
    },
    #[error("calibration {resource} has {found} values but 16 are required")]
    Count { resource: String, found: usize },
    #[error("calibration {resource} value {index} ({token:?}) is not a number")]
    Number {
        resource: String,
        index: usize,
        token: String,
    },
}

/// Boxed error of an external matching or tracking backend.
pub type BackendError = Box<dyn StdError + Send + Sync + 'static>;

/// The matcher could not produce usable correspondences.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("no correspondences were found")]
    NoCorrespondences,
    #[error("the matcher returned inconsistent correspondences: {0}")]
    Shape(#[from] ShapeError),
    #[error("matcher backend failed: {0}")]
    Backend(#[source] BackendError),
}

impl MatchError {
    pub fn backend(error: impl Into<BackendError>) -> Self {
        Self::Backend(error.into())
    }
}

/// The tracker lost every point or broke its output contract.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("only {survivors} of {previous} points survived tracking but {minimum} are required")]
    TooFewSurvivors {
        survivors: usize,
        previous: usize,
        minimum: usize,
    },
    #[error("camera {camera} tracked {found} points out of only {previous}")]
    InventedPoints {
        camera: CameraIndex,
        found: usize,
        previous: usize,
    },
    #[error("camera {camera} tracked point {position} from index {index}, but the previous epoch has {previous} points")]
    SourceOutOfRange {
        camera: CameraIndex,
        position: usize,
        index: usize,
        previous: usize,
    },
    #[error("camera {camera} source indices are not strictly increasing at tracked point {position}")]
    SourceOrder {
        camera: CameraIndex,
        position: usize,
    },
    #[error("the tracker returned inconsistent features: {0}")]
    Shape(#[from] ShapeError),
    #[error("tracker backend failed: {0}")]
    Backend(#[source] BackendError),
}

impl TrackError {
    pub fn backend(error: impl Into<BackendError>) -> Self {
        Self::Backend(error.into())
    }
}

/// Fresh and tracked features that cannot be combined into one correspondence set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("camera 0 tracked {0} points but camera 1 tracked {1}")]
    TrackedCountMismatch(usize, usize),
    #[error("tracked point {position} comes from index {camera0} on camera 0 but from index {camera1} on camera 1")]
    TrackedSourceMismatch {
        position: usize,
        camera0: usize,
        camera1: usize,
    },
    #[error("descriptor dimension {found} does not match descriptor dimension {expected}")]
    DescriptorDimensionMismatch { found: usize, expected: usize },
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Robust estimation could not find an acceptable fundamental matrix.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VerificationFailure {
    #[error("{found} correspondences are too few to estimate a fundamental matrix from {required}")]
    TooFewCorrespondences { found: usize, required: usize },
    #[error("no fundamental matrix has at least {minimum} inliers")]
    NoModel { minimum: usize },
    #[error("only {ratio:.3} of the correspondences are inliers but {minimum:.3} are required")]
    LowInlierRatio { ratio: f64, minimum: f64 },
    #[error("the verified set is inconsistent: {0}")]
    Shape(#[from] ShapeError),
}

/// The feature store was accessed out of sequence.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OrderingError {
    #[error("cannot append epoch {epoch} because the next epoch is {expected}")]
    OutOfOrder { epoch: Epoch, expected: Epoch },
    #[error("epoch {epoch} has not been recorded yet, only {recorded} epochs are stored")]
    NotRecorded { epoch: Epoch, recorded: usize },
}

/// Failures reading or writing a persisted feature store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("feature store I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("feature store encoding failed: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("report encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stored epoch {epoch} is inconsistent: {source}")]
    Corrupt {
        epoch: Epoch,
        #[source]
        source: ShapeError,
    },
}

/// The part of an epoch during which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Matching,
    Tracking,
    Merging,
    Verifying,
    Recording,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Matching => "matching",
            Phase::Tracking => "tracking",
            Phase::Merging => "merging",
            Phase::Verifying => "verifying",
            Phase::Recording => "recording",
        };
        f.write_str(name)
    }
}

/// The error of a single phase of an epoch.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Track(#[from] TrackError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Verification(#[from] VerificationFailure),
    #[error(transparent)]
    Ordering(#[from] OrderingError),
    #[error("camera {camera} has no image for epoch {epoch}")]
    MissingImage { camera: CameraIndex, epoch: Epoch },
}

/// Anything that stops a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Calibration(#[from] ParseError),
    #[error("epoch {epoch} failed while {phase}: {source}")]
    Epoch {
        epoch: Epoch,
        phase: Phase,
        #[source]
        source: PhaseError,
    },
    #[error("the pipeline already stopped at epoch {epoch} and cannot continue")]
    Halted { epoch: Epoch },
}

impl PipelineError {
    /// The epoch and phase of a failed epoch, if that is what stopped the run.
    pub fn failed_phase(&self) -> Option<(Epoch, Phase)> {
        match self {
            Self::Epoch { epoch, phase, .. } => Some((*epoch, *phase)),
            _ => None,
        }
    }

    pub fn phase_error(&self) -> Option<&PhaseError> {
        match self {
            Self::Epoch { source, .. } => Some(source),
            _ => None,
        }
    }
}
