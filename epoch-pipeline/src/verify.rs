use crate::{VerificationFailure, VerifierSettings};
use adaptive_ransac::Ransac;
use log::*;
use normalized_eight_point::{NormalizedEightPoint, Residual};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use stereo_core::{
    nalgebra::Matrix3,
    sample_consensus::{Consensus, Estimator},
    CorrespondenceSet, PixelMatch,
};

/// The fundamental matrix that best explains a correspondence set and which correspondences agree with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Satisfies `transpose(x1) * F * x0 = 0` for inliers, scaled to unit norm.
    pub fundamental: Matrix3<f64>,
    /// One entry per correspondence, `true` for inliers.
    pub inliers: Vec<bool>,
    /// The number of consensus iterations that were run.
    pub iterations: usize,
}

impl VerificationResult {
    pub fn len(&self) -> usize {
        self.inliers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inliers.is_empty()
    }

    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&inlier| inlier).count()
    }

    pub fn inlier_ratio(&self) -> f64 {
        if self.inliers.is_empty() {
            0.0
        } else {
            self.inlier_count() as f64 / self.inliers.len() as f64
        }
    }
}

/// Robustly fits a fundamental matrix to a correspondence set.
///
/// Minimal samples of eight correspondences are fit with the normalized eight-point algorithm
/// inside an adaptive RANSAC loop. Every run is seeded from the settings, so verifying the same
/// set twice gives the same result.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometricVerifier {
    settings: VerifierSettings,
}

impl GeometricVerifier {
    pub fn new(settings: VerifierSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &VerifierSettings {
        &self.settings
    }

    /// The fewest correspondences a set must have to be verified.
    pub fn minimum_correspondences(&self) -> usize {
        <NormalizedEightPoint as Estimator<PixelMatch>>::MIN_SAMPLES
    }

    pub fn verify(&self, set: &CorrespondenceSet) -> Result<VerificationResult, VerificationFailure> {
        set.validate()?;
        let required = self.minimum_correspondences();
        if set.len() < required {
            return Err(VerificationFailure::TooFewCorrespondences {
                found: set.len(),
                required,
            });
        }

        let estimator = NormalizedEightPoint::new()
            .degeneracy_check(self.settings.degeneracy_check)
            .residual(Residual {
                metric: self.settings.error_metric,
                symmetric_check: self.settings.symmetric_check,
            });
        let minimum = self.settings.minimum_inliers.max(required);
        let mut ransac = Ransac::new(
            self.settings.pixel_threshold,
            Pcg64::seed_from_u64(self.settings.seed),
        )
        .confidence(self.settings.confidence)
        .max_iterations(self.settings.max_iterations)
        .local_optimization(self.settings.local_optimization)
        .minimum_inliers(minimum);

        let (model, inliers) = ransac
            .model_inliers(&estimator, set.matches())
            .ok_or(VerificationFailure::NoModel { minimum })?;
        let mut mask = vec![false; set.len()];
        for ix in inliers {
            mask[ix] = true;
        }
        let result = VerificationResult {
            fundamental: *model.matrix(),
            inliers: mask,
            iterations: ransac.iterations(),
        };
        debug!(
            "verification kept {} of {} correspondences after {} iterations",
            result.inlier_count(),
            result.len(),
            result.iterations
        );

        if result.inlier_ratio() < self.settings.minimum_inlier_ratio {
            return Err(VerificationFailure::LowInlierRatio {
                ratio: result.inlier_ratio(),
                minimum: self.settings.minimum_inlier_ratio,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use stereo_core::{
        nalgebra::{DMatrix, Point2},
        synthetic::SyntheticRig,
        CameraFeatures,
    };

    fn set_from(matches: &[PixelMatch]) -> CorrespondenceSet {
        let n = matches.len();
        CorrespondenceSet::from_parts(
            [
                matches.iter().map(|m| m.0).collect(),
                matches.iter().map(|m| m.1).collect(),
            ],
            [DMatrix::zeros(4, n), DMatrix::zeros(4, n)],
            [vec![1.0; n], vec![1.0; n]],
        )
        .unwrap()
    }

    /// 10% of the correspondences are moved far off their epipolar lines.
    fn contaminated(seed: u64, n: usize) -> (CorrespondenceSet, Vec<bool>) {
        let rig = SyntheticRig::default();
        let mut rng = Pcg64::seed_from_u64(seed);
        let mut data: Vec<(PixelMatch, bool)> = rig
            .matches(&mut rng, n)
            .into_iter()
            .enumerate()
            .map(|(ix, m)| {
                if ix % 10 == 0 {
                    (rig.corrupt(&mut rng, m, 20.0), false)
                } else {
                    (m, true)
                }
            })
            .collect();
        data.shuffle(&mut rng);
        let (matches, truth): (Vec<_>, Vec<_>) = data.into_iter().unzip();
        (set_from(&matches), truth)
    }

    #[test]
    fn recovers_the_outlier_mask() {
        let (set, truth) = contaminated(21, 300);
        let result = GeometricVerifier::default().verify(&set).unwrap();
        assert_eq!(result.inliers, truth);
        assert!(result.inlier_ratio() > 0.8);
        assert_eq!(result.inlier_count(), 270);
    }

    #[test]
    fn symmetric_epipolar_metric() {
        let (set, truth) = contaminated(22, 200);
        let verifier = GeometricVerifier::new(VerifierSettings {
            error_metric: normalized_eight_point::ErrorMetric::SymmetricEpipolar,
            symmetric_check: false,
            pixel_threshold: 1.0,
            ..VerifierSettings::default()
        });
        assert_eq!(verifier.verify(&set).unwrap().inliers, truth);
    }

    #[test]
    fn deterministic() {
        let (set, _) = contaminated(23, 120);
        let verifier = GeometricVerifier::default();
        assert_eq!(verifier.verify(&set).unwrap(), verifier.verify(&set).unwrap());
    }

    #[test]
    fn too_few_correspondences() {
        let (set, _) = contaminated(24, 7);
        assert_eq!(
            GeometricVerifier::default().verify(&set).unwrap_err(),
            VerificationFailure::TooFewCorrespondences {
                found: 7,
                required: 8
            }
        );
    }

    #[test]
    fn no_model_for_degenerate_sets() {
        // Every point lies on one line, so every sample is degenerate.
        let points: Vec<Point2<f64>> = (0..40).map(|i| Point2::new(i as f64 * 10.0, 5.0)).collect();
        let camera = || CameraFeatures::new(points.clone(), DMatrix::zeros(1, 40), vec![1.0; 40]).unwrap();
        let set = CorrespondenceSet::new(camera(), camera()).unwrap();
        let verifier = GeometricVerifier::new(VerifierSettings {
            max_iterations: 50,
            ..VerifierSettings::default()
        });
        assert_eq!(
            verifier.verify(&set).unwrap_err(),
            VerificationFailure::NoModel { minimum: 8 }
        );

        // A minimal sample is always needed, whatever the setting says.
        let verifier = GeometricVerifier::new(VerifierSettings {
            max_iterations: 50,
            minimum_inliers: 0,
            ..VerifierSettings::default()
        });
        assert_eq!(
            verifier.verify(&set).unwrap_err(),
            VerificationFailure::NoModel { minimum: 8 }
        );
    }

    #[test]
    fn minimum_inlier_ratio() {
        let (set, _) = contaminated(25, 100);
        let verifier = GeometricVerifier::new(VerifierSettings {
            minimum_inlier_ratio: 0.95,
            ..VerifierSettings::default()
        });
        assert!(matches!(
            verifier.verify(&set),
            Err(VerificationFailure::LowInlierRatio { .. })
        ));
    }
}
