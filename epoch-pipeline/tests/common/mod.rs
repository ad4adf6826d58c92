//! Deterministic matcher and tracker fakes backed by a synthetic stereo scene.
#![allow(dead_code)]

use epoch_pipeline::{
    stereo_core::{
        nalgebra::{DMatrix, Point2, Point3, Vector3, Vector5},
        synthetic::SyntheticRig,
        Camera, CameraFeatures, CorrespondenceSet, Epoch, PixelMatch, RegionOfInterest,
        TrackedSet,
    },
    ImageStore, MatchError, MatchRequest, Matcher, RunContext, TrackError, TrackRequest, Tracker,
};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use std::{cell::RefCell, path::PathBuf, rc::Rc};

pub const DESCRIPTOR_DIMENSION: usize = 4;
pub const CAMERA_IDS: [&str; 2] = ["p2", "p3"];

/// The world point behind every correspondence of every record, shared by the fakes.
#[derive(Debug, Default)]
pub struct Scene {
    pub rig: SyntheticRig,
    /// `history[e][i]` is the world point of correspondence `i` of record `e`.
    pub history: Vec<Vec<Point3<f64>>>,
    /// Fresh world points of the epoch currently being processed.
    pending: Vec<Point3<f64>>,
    pub match_requests: Vec<(Epoch, [PathBuf; 2], PathBuf)>,
    pub track_requests: Vec<(Epoch, [[PathBuf; 2]; 2], PathBuf, usize)>,
    pub matched: Vec<CorrespondenceSet>,
    /// The source indices tracked into each epoch after the first.
    pub tracked_sources: Vec<Vec<usize>>,
}

pub type SharedScene = Rc<RefCell<Scene>>;

pub fn scene() -> SharedScene {
    Rc::new(RefCell::new(Scene::default()))
}

/// How the scene changes between two epochs.
pub fn motion(world: Point3<f64>) -> Point3<f64> {
    world + Vector3::new(0.04, -0.02, 0.05)
}

fn features(points: Vec<Point2<f64>>, descriptors: DMatrix<f32>, scores: Vec<f32>) -> CameraFeatures {
    CameraFeatures::new(points, descriptors, scores).expect("consistent features")
}

fn set_from(epoch: Epoch, matches: &[PixelMatch]) -> CorrespondenceSet {
    let n = matches.len();
    let descriptors = |camera: usize| {
        DMatrix::from_fn(DESCRIPTOR_DIMENSION, n, |r, c| match r {
            0 => epoch as f32,
            1 => c as f32,
            2 => camera as f32,
            _ => 1.0,
        })
    };
    CorrespondenceSet::new(
        features(matches.iter().map(|m| m.0).collect(), descriptors(0), vec![0.5; n]),
        features(matches.iter().map(|m| m.1).collect(), descriptors(1), vec![0.6; n]),
    )
    .expect("paired correspondences")
}

/// Matches `fresh` new scene points at every epoch.
pub struct FakeMatcher {
    pub scene: SharedScene,
    pub fresh: usize,
    /// Every `n`th fresh match is moved off its epipolar line.
    pub outlier_every: Option<usize>,
    /// Return nothing at this epoch.
    pub empty_at: Option<Epoch>,
    pub seed: u64,
}

impl FakeMatcher {
    pub fn new(scene: SharedScene, fresh: usize) -> Self {
        Self {
            scene,
            fresh,
            outlier_every: None,
            empty_at: None,
            seed: 11,
        }
    }
}

impl Matcher for FakeMatcher {
    fn match_pair(&mut self, request: MatchRequest<'_>) -> Result<CorrespondenceSet, MatchError> {
        let mut scene = self.scene.borrow_mut();
        scene.match_requests.push((
            request.epoch,
            [request.images[0].to_owned(), request.images[1].to_owned()],
            request.output_dir.to_owned(),
        ));
        if self.empty_at == Some(request.epoch) {
            return Ok(CorrespondenceSet::new(
                CameraFeatures::empty(DESCRIPTOR_DIMENSION),
                CameraFeatures::empty(DESCRIPTOR_DIMENSION),
            )?);
        }

        let mut rng = Pcg64::seed_from_u64(self.seed + request.epoch as u64);
        let rig = scene.rig;
        let world = rig.scene(&mut rng, self.fresh);
        let matches: Vec<PixelMatch> = world
            .iter()
            .enumerate()
            .map(|(ix, &p)| {
                let m = rig.project(p).expect("scene points are visible");
                match self.outlier_every {
                    Some(n) if ix % n == 0 => rig.corrupt(&mut rng, m, 20.0),
                    _ => m,
                }
            })
            .collect();
        let set = set_from(request.epoch, &matches);
        if request.epoch == 0 {
            scene.history.push(world);
        } else {
            scene.pending = world;
        }
        scene.matched.push(set.clone());
        Ok(set)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Lose every point.
    LoseEverything,
    /// Drop the last point on camera 1 only.
    Unpaired,
    /// Return one point more than the previous record has.
    Invent,
}

/// Moves the scene and reprojects the previous record's points, losing every `drop_every`th one.
pub struct FakeTracker {
    pub scene: SharedScene,
    pub drop_every: usize,
    pub fault: Option<(Epoch, Fault)>,
}

impl FakeTracker {
    pub fn new(scene: SharedScene) -> Self {
        Self {
            scene,
            drop_every: 5,
            fault: None,
        }
    }
}

impl Tracker for FakeTracker {
    fn track(&mut self, request: TrackRequest<'_>) -> Result<[TrackedSet; 2], TrackError> {
        let mut scene = self.scene.borrow_mut();
        scene.track_requests.push((
            request.epoch,
            [
                [request.frames[0][0].to_owned(), request.frames[0][1].to_owned()],
                [request.frames[1][0].to_owned(), request.frames[1][1].to_owned()],
            ],
            request.output_dir.to_owned(),
            request.previous.len(),
        ));
        let previous_world = scene.history[request.epoch - 1].clone();
        assert_eq!(previous_world.len(), request.previous.len());

        let rig = scene.rig;
        let mut source = vec![];
        let mut moved = vec![];
        let mut matches = vec![];
        for (ix, &world) in previous_world.iter().enumerate() {
            if ix % self.drop_every == self.drop_every - 1 {
                continue;
            }
            let world = motion(world);
            if let Some(m) = rig.project(world) {
                source.push(ix);
                moved.push(world);
                matches.push(m);
            }
        }

        let fault = self
            .fault
            .filter(|&(epoch, _)| epoch == request.epoch)
            .map(|(_, fault)| fault);
        if fault == Some(Fault::LoseEverything) {
            source.clear();
            moved.clear();
            matches.clear();
        }

        let mut tracked = vec![];
        for camera in 0..2 {
            let previous = request.previous.camera(camera);
            let mut source = source.clone();
            let mut points: Vec<_> = matches
                .iter()
                .map(|m| if camera == 0 { m.0 } else { m.1 })
                .collect();
            match fault {
                Some(Fault::Unpaired) if camera == 1 => {
                    source.pop();
                    points.pop();
                }
                Some(Fault::Invent) if camera == 0 => {
                    source = (0..=previous.len()).collect();
                    points = vec![points[0]; source.len()];
                }
                _ => {}
            }
            let carried: Vec<usize> = source.iter().map(|&ix| ix.min(previous.len() - 1)).collect();
            let kept = previous.select(&carried)?;
            let (_, descriptors, scores) = kept.into_parts();
            let scores = scores.into_iter().map(|s| s * 0.9).collect();
            tracked.push(TrackedSet::new(
                CameraFeatures::new(points, descriptors, scores)?,
                source,
            )?);
        }

        scene.tracked_sources.push(source);
        let mut world = std::mem::take(&mut scene.pending);
        world.extend(moved);
        scene.history.push(world);

        let tracked1 = tracked.pop().expect("two cameras");
        let tracked0 = tracked.pop().expect("two cameras");
        Ok([tracked0, tracked1])
    }
}

pub fn image_paths(epochs: usize) -> Vec<Vec<PathBuf>> {
    CAMERA_IDS
        .iter()
        .map(|camera| {
            (0..epochs)
                .map(|e| PathBuf::from(format!("{}/IMG_{:04}.tif", camera, e)))
                .collect()
        })
        .collect()
}

pub fn context(epochs: usize, output_dir: &str) -> RunContext {
    let rig = SyntheticRig::default();
    let cameras = [
        Camera::new(CAMERA_IDS[0], rig.intrinsics[0], Vector5::zeros()),
        Camera::new(CAMERA_IDS[1], rig.intrinsics[1], Vector5::zeros()),
    ];
    let roi = RegionOfInterest::full(rig.width, rig.height).expect("non-empty frame");
    let images = ImageStore::from_sequences(&CAMERA_IDS, image_paths(epochs)).expect("equal sequences");
    RunContext::new(cameras, images, [roi, roi], output_dir).expect("two cameras")
}
