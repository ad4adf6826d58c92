use crate::{
    capability::check_tracked, CalibrationStore, ConfigurationError, FeatureMerger, FeatureStore,
    GeometricVerifier, ImageStore, MatchError, MatchRequest, Matcher, Phase, PhaseError,
    PipelineError, PipelineSettings, TrackRequest, Tracker, VerificationFailure,
    VerificationResult,
};
use log::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stereo_core::{Camera, CorrespondenceSet, Epoch, RegionOfInterest, TrackedSet};

/// The read-only inputs of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    cameras: [Camera; 2],
    images: ImageStore,
    rois: [RegionOfInterest; 2],
    output_dir: PathBuf,
}

impl RunContext {
    pub fn new(
        cameras: [Camera; 2],
        images: ImageStore,
        rois: [RegionOfInterest; 2],
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigurationError> {
        if images.cameras() != 2 {
            return Err(ConfigurationError::CameraCount {
                found: images.cameras(),
                expected: 2,
            });
        }
        Ok(Self {
            cameras,
            images,
            rois,
            output_dir: output_dir.into(),
        })
    }

    /// Loads the calibrations and image sequences of both cameras.
    pub fn load(
        calibration: &CalibrationStore,
        camera_ids: [&str; 2],
        image_folder: impl AsRef<Path>,
        extension: &str,
        rois: [RegionOfInterest; 2],
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, PipelineError> {
        let cameras = [
            calibration.load(camera_ids[0])?,
            calibration.load(camera_ids[1])?,
        ];
        let images = ImageStore::load(&camera_ids[..], image_folder, extension)?;
        Ok(Self::new(cameras, images, rois, output_dir)?)
    }

    pub fn cameras(&self) -> &[Camera; 2] {
        &self.cameras
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn rois(&self) -> [RegionOfInterest; 2] {
        self.rois
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<output>/epoch_<epoch>`, where the matcher of `epoch` writes its artifacts.
    pub fn epoch_dir(&self, epoch: Epoch) -> PathBuf {
        self.output_dir.join(format!("epoch_{}", epoch))
    }

    /// `<output>/epoch_<epoch>/from_t<epoch - 1>`, where the tracker into `epoch` writes its artifacts.
    pub fn track_dir(&self, epoch: Epoch) -> PathBuf {
        self.epoch_dir(epoch)
            .join(format!("from_t{}", epoch.saturating_sub(1)))
    }
}

/// Where the pipeline is within its run.
///
/// Every epoch moves through `MatchingFresh`, then `Seeding` at epoch 0 or `Tracking` and
/// `Merging` afterwards, then `Verifying` and `Recorded`. No state is entered twice for an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    MatchingFresh { epoch: Epoch },
    Seeding { epoch: Epoch },
    Tracking { epoch: Epoch },
    Merging { epoch: Epoch },
    Verifying { epoch: Epoch },
    Recorded { epoch: Epoch },
    Done,
    Failed { epoch: Epoch, phase: Phase },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed { .. })
    }
}

/// What happened at one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub epoch: Epoch,
    /// Correspondences found by the matcher.
    pub fresh: usize,
    /// Correspondences tracked from the previous epoch.
    pub tracked: usize,
    /// Correspondences in the stored record.
    pub recorded: usize,
    pub verification: VerificationResult,
}

/// The reports of every epoch of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub reports: Vec<EpochReport>,
}

impl RunSummary {
    pub fn epochs(&self) -> usize {
        self.reports.len()
    }
}

/// Runs matching, tracking, merging, and verification over the epochs of a run.
///
/// Epochs are processed strictly in order. Epoch 0 records the matcher output as is. Every later
/// epoch tracks the previous record into the current images and appends the tracked points after
/// the fresh matches. Every record is verified before it is stored. The first failure stops the
/// run; everything recorded up to that point stays available through [`EpochPipeline::store`].
pub struct EpochPipeline<M, T> {
    context: RunContext,
    settings: PipelineSettings,
    matcher: M,
    tracker: T,
    merger: FeatureMerger,
    verifier: GeometricVerifier,
    store: FeatureStore,
    reports: Vec<EpochReport>,
    epoch_count: usize,
    state: PipelineState,
}

impl<M, T> EpochPipeline<M, T>
where
    M: Matcher,
    T: Tracker,
{
    pub fn new(
        context: RunContext,
        settings: PipelineSettings,
        matcher: M,
        tracker: T,
    ) -> Result<Self, ConfigurationError> {
        settings.validate()?;
        let available = context.images.epochs();
        let epoch_count = settings.epoch_count.unwrap_or(available);
        if epoch_count > available {
            return Err(ConfigurationError::EpochCount {
                requested: epoch_count,
                available,
            });
        }
        Ok(Self {
            context,
            settings,
            matcher,
            tracker,
            merger: FeatureMerger::new(),
            verifier: GeometricVerifier::new(settings.verifier),
            store: FeatureStore::new(),
            reports: vec![],
            epoch_count,
            state: PipelineState::Idle,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// The number of epochs this run processes.
    pub fn epoch_count(&self) -> usize {
        self.epoch_count
    }

    pub fn store(&self) -> &FeatureStore {
        &self.store
    }

    pub fn into_store(self) -> FeatureStore {
        self.store
    }

    pub fn reports(&self) -> &[EpochReport] {
        &self.reports
    }

    /// Processes every remaining epoch.
    pub fn run(&mut self) -> Result<RunSummary, PipelineError> {
        while self.step()?.is_some() {}
        Ok(RunSummary {
            reports: self.reports.clone(),
        })
    }

    /// Processes the next epoch and returns its report, or `None` once every epoch is done.
    pub fn step(&mut self) -> Result<Option<&EpochReport>, PipelineError> {
        match self.state {
            PipelineState::Failed { epoch, .. } => return Err(PipelineError::Halted { epoch }),
            PipelineState::Done => return Ok(None),
            _ => {}
        }
        let epoch = self.store.len();
        if epoch >= self.epoch_count {
            self.finish();
            return Ok(None);
        }
        let report = self.process(epoch)?;
        self.reports.push(report);
        if self.store.len() >= self.epoch_count {
            self.finish();
        }
        Ok(self.reports.last())
    }

    fn finish(&mut self) {
        info!("processed {} epochs", self.store.len());
        self.state = PipelineState::Done;
    }

    fn fail(&mut self, epoch: Epoch, phase: Phase, source: impl Into<PhaseError>) -> PipelineError {
        let source = source.into();
        error!("epoch {} failed while {}: {}", epoch, phase, source);
        self.state = PipelineState::Failed { epoch, phase };
        PipelineError::Epoch {
            epoch,
            phase,
            source,
        }
    }

    fn process(&mut self, epoch: Epoch) -> Result<EpochReport, PipelineError> {
        info!("processing epoch {}", epoch);

        self.state = PipelineState::MatchingFresh { epoch };
        let fresh = self
            .match_fresh(epoch)
            .map_err(|e| self.fail(epoch, Phase::Matching, e))?;
        let fresh_count = fresh.len();

        let (record, tracked_count) = if epoch == 0 {
            self.state = PipelineState::Seeding { epoch };
            (fresh, 0)
        } else {
            self.state = PipelineState::Tracking { epoch };
            let [tracked0, tracked1] = self
                .track(epoch)
                .map_err(|e| self.fail(epoch, Phase::Tracking, e))?;
            self.state = PipelineState::Merging { epoch };
            let (merged, provenance) = self
                .merger
                .merge(&fresh, &tracked0, &tracked1)
                .map_err(|e| self.fail(epoch, Phase::Merging, e))?;
            (merged, provenance.tracked.len())
        };

        self.state = PipelineState::Verifying { epoch };
        let verification = self
            .verifier
            .verify(&record)
            .map_err(|e| self.fail(epoch, Phase::Verifying, e))?;
        info!(
            "matches at epoch {}: found {} inliers ({:.2}%)",
            epoch,
            verification.inlier_count(),
            verification.inlier_ratio() * 100.0
        );
        let record = if self.settings.prune_outliers {
            record
                .retain_mask(&verification.inliers)
                .map_err(|e| self.fail(epoch, Phase::Verifying, VerificationFailure::from(e)))?
        } else {
            record
        };

        let recorded = record.len();
        self.store
            .append(epoch, record)
            .map_err(|e| self.fail(epoch, Phase::Recording, e))?;
        self.state = PipelineState::Recorded { epoch };
        Ok(EpochReport {
            epoch,
            fresh: fresh_count,
            tracked: tracked_count,
            recorded,
            verification,
        })
    }

    fn match_fresh(&mut self, epoch: Epoch) -> Result<CorrespondenceSet, PhaseError> {
        info!("finding fresh matches at epoch {}", epoch);
        let images = [
            self.context
                .images
                .path(0, epoch)
                .ok_or(PhaseError::MissingImage { camera: 0, epoch })?,
            self.context
                .images
                .path(1, epoch)
                .ok_or(PhaseError::MissingImage { camera: 1, epoch })?,
        ];
        let output_dir = self.context.epoch_dir(epoch);
        let fresh = self.matcher.match_pair(MatchRequest {
            epoch,
            images,
            rois: self.context.rois,
            settings: &self.settings.matching,
            output_dir: &output_dir,
        })?;
        if fresh.is_empty() {
            return Err(MatchError::NoCorrespondences.into());
        }
        info!("found {} fresh matches at epoch {}", fresh.len(), epoch);
        Ok(fresh)
    }

    fn track(&mut self, epoch: Epoch) -> Result<[TrackedSet; 2], PhaseError> {
        info!("tracking points from epoch {} to epoch {}", epoch - 1, epoch);
        let previous = self.store.get(epoch - 1)?;
        let frames = [
            self.context
                .images
                .consecutive(0, epoch)
                .ok_or(PhaseError::MissingImage { camera: 0, epoch })?,
            self.context
                .images
                .consecutive(1, epoch)
                .ok_or(PhaseError::MissingImage { camera: 1, epoch })?,
        ];
        let output_dir = self.context.track_dir(epoch);
        let tracked = self.tracker.track(TrackRequest {
            epoch,
            frames,
            rois: self.context.rois,
            previous,
            settings: &self.settings.tracking,
            output_dir: &output_dir,
        })?;
        check_tracked(previous, &tracked, self.settings.minimum_tracked)?;
        info!(
            "tracked {} and {} of {} points from epoch {}",
            tracked[0].len(),
            tracked[1].len(),
            previous.len(),
            epoch - 1
        );
        Ok(tracked)
    }
}
