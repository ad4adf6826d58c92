//! # Epoch Pipeline
//!
//! Builds a time series of correspondences between the two cameras of a fixed stereo rig.
//!
//! At every epoch both cameras take one image. For each epoch the [`EpochPipeline`]:
//!
//! 1. asks a [`Matcher`] for fresh correspondences between the two current images,
//! 2. asks a [`Tracker`] to follow the previous epoch's correspondences into the current images
//!    of each camera (from epoch 1 onwards),
//! 3. appends the tracked correspondences after the fresh ones with the [`FeatureMerger`],
//! 4. fits a fundamental matrix to the result with the [`GeometricVerifier`] and reports the
//!    inliers,
//! 5. appends the record to the [`FeatureStore`].
//!
//! ```text
//!  epoch 0:  match ─────────────────────────────► verify ─► record 0
//!  epoch 1:  match ─┐
//!  record 0 ► track ┴► merge (fresh ++ tracked) ─► verify ─► record 1
//!  epoch 2:  match ─┐
//!  record 1 ► track ┴► merge (fresh ++ tracked) ─► verify ─► record 2
//! ```
//!
//! Matching and tracking are capabilities supplied by the caller, so the orchestration can be
//! driven by deterministic fakes as easily as by a feature extractor.
//!
//! Inputs are read with the [`CalibrationStore`] and [`ImageStore`] and bundled in a read-only
//! [`RunContext`]. Settings are plain serde structs whose missing fields take their defaults.

mod calibration;
mod capability;
mod error;
mod export;
mod images;
mod merge;
mod pipeline;
mod settings;
mod store;
mod verify;

pub use calibration::*;
pub use capability::*;
pub use error::*;
pub use export::*;
pub use images::*;
pub use merge::*;
pub use pipeline::*;
pub use settings::*;
pub use store::*;
pub use verify::*;

pub use normalized_eight_point::ErrorMetric;
pub use stereo_core;
