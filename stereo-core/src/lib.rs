//! # Stereo Core
//!
//! Common types shared by the crates that build a time series of stereo correspondences.
//! A fixed pair of cameras photographs a scene at discrete epochs. At every epoch each camera
//! contributes one image, and the crates in this workspace find, track, merge, and verify
//! the point correspondences between the two cameras.
//!
//! The types here are intentionally small:
//!
//! * [`Camera`] holds the immutable calibration of one camera.
//! * [`RegionOfInterest`] restricts processing to the part of an image that contains the scene.
//! * [`CameraFeatures`] holds the keypoints, descriptors, and scores observed on one camera.
//! * [`CorrespondenceSet`] pairs two [`CameraFeatures`] so that index `i` on camera 0
//!   corresponds to index `i` on camera 1.
//! * [`TrackedSet`] is the output of tracking one camera from one epoch to the next.
//! * [`PixelMatch`] is the datum consumed by geometric estimators.
//!
//! ```text
//!        camera 0                      camera 1
//!   +---------------+             +---------------+
//!   |   a0          |             |        a1     |
//!   |      b0       |   <----->   |   b1          |
//!   |          c0   |             |          c1   |
//!   +---------------+             +---------------+
//!   points0[i] <-> points1[i], descr0[:, i] <-> descr1[:, i]
//! ```
//!
//! `nalgebra` and `sample_consensus` are re-exported so that downstream crates agree on versions.

mod camera;
mod correspondence;
mod matches;
mod region;

pub use camera::*;
pub use correspondence::*;
pub use matches::*;
pub use nalgebra;
pub use region::*;
pub use sample_consensus;

/// The index of one of the two cameras of the stereo rig.
pub type CameraIndex = usize;

/// A discrete time step at which both cameras provide an image.
pub type Epoch = usize;

#[cfg(feature = "synthetic")]
pub mod synthetic;
