use crate::ConfigurationError;
use normalized_eight_point::ErrorMetric;
use serde::{Deserialize, Deserializer, Serialize};

/// How images are resized before features are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resize {
    /// Keep the original resolution.
    Original,
    /// Scale so that the longer side has at most this many pixels.
    MaxDimension(u32),
    Exact { width: u32, height: u32 },
}

/// The pretrained variant of the matching network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherWeights {
    Indoor,
    Outdoor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Png,
    Pdf,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Pdf => "pdf",
        }
    }
}

/// Diagnostic imagery written by a matcher or tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visualization {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_image_format")]
    pub extension: ImageFormat,
    /// Draw with a fast renderer instead of a publication quality one.
    #[serde(default = "default_true")]
    pub fast: bool,
    #[serde(default)]
    pub show_keypoints: bool,
    /// Show the images in a window as they are produced.
    #[serde(default)]
    pub opencv_display: bool,
}

impl Default for Visualization {
    fn default() -> Self {
        Self {
            enabled: true,
            extension: ImageFormat::Png,
            fast: true,
            show_keypoints: false,
            opencv_display: false,
        }
    }
}

/// Splits large images into a grid of overlapping tiles that are processed separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tiling {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// The number of tile rows.
    #[serde(default = "default_row_divisor")]
    pub row_divisor: u32,
    /// The number of tile columns.
    #[serde(default = "default_col_divisor")]
    pub col_divisor: u32,
    /// How many pixels each tile extends into its neighbours.
    #[serde(default = "default_overlap")]
    pub overlap: u32,
}

impl Default for Tiling {
    fn default() -> Self {
        Self {
            enabled: true,
            row_divisor: default_row_divisor(),
            col_divisor: default_col_divisor(),
            overlap: default_overlap(),
        }
    }
}

/// The settings of a matcher or a tracker.
///
/// Every field only affects the behavior of the capability that receives it.
/// Fields missing from a serialized section take the defaults of [`FeatureSettings::matching`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSettings {
    #[serde(default = "default_resize")]
    pub resize: Resize,
    /// Resize in floating point rather than on 8-bit pixels.
    #[serde(default = "default_true")]
    pub resize_float: bool,
    #[serde(default)]
    pub equalize_histogram: bool,
    /// The radius, in pixels, of the non-maximum suppression applied to keypoints.
    #[serde(default = "default_nms_radius")]
    pub nms_radius: u32,
    /// The minimum detector response of a keypoint, in `(0, 1]`.
    #[serde(default = "default_keypoint_threshold")]
    pub keypoint_threshold: f32,
    /// The maximum number of keypoints per image, or `None` to keep all of them.
    #[serde(default = "default_max_keypoints")]
    pub max_keypoints: Option<usize>,
    #[serde(default = "default_weights")]
    pub weights: MatcherWeights,
    /// The number of Sinkhorn iterations of the matching solver.
    #[serde(default = "default_solver_iterations")]
    pub solver_iterations: usize,
    /// The minimum confidence of a match, in `[0, 1]`.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
    #[serde(default)]
    pub visualization: Visualization,
    #[serde(default)]
    pub tiling: Tiling,
    /// Reuse results already present in the output directory.
    #[serde(default)]
    pub cache: bool,
    #[serde(default)]
    pub force_cpu: bool,
}

impl FeatureSettings {
    /// The settings used to find fresh matches between the two cameras.
    pub fn matching() -> Self {
        Self {
            resize: default_resize(),
            resize_float: true,
            equalize_histogram: false,
            nms_radius: default_nms_radius(),
            keypoint_threshold: default_keypoint_threshold(),
            max_keypoints: default_max_keypoints(),
            weights: default_weights(),
            solver_iterations: default_solver_iterations(),
            match_threshold: default_match_threshold(),
            visualization: Visualization::default(),
            tiling: Tiling::default(),
            cache: false,
            force_cpu: false,
        }
    }

    /// The settings used to track points from one epoch to the next.
    ///
    /// Tracking detects more keypoints with a stricter response and requires more confident matches.
    pub fn tracking() -> Self {
        Self {
            keypoint_threshold: 0.0005,
            max_keypoints: Some(8192),
            match_threshold: 0.4,
            tiling: Tiling {
                col_divisor: 4,
                ..Tiling::default()
            },
            ..Self::matching()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self.resize {
            Resize::MaxDimension(0) => {
                return Err(ConfigurationError::invalid(
                    "resize",
                    "the maximum dimension must be positive",
                ))
            }
            Resize::Exact { width, height } if width == 0 || height == 0 => {
                return Err(ConfigurationError::invalid(
                    "resize",
                    format!("{}x{} is empty", width, height),
                ))
            }
            _ => {}
        }
        if !(self.keypoint_threshold > 0.0 && self.keypoint_threshold <= 1.0) {
            return Err(ConfigurationError::invalid(
                "keypoint_threshold",
                format!("{} is not in (0, 1]", self.keypoint_threshold),
            ));
        }
        if self.max_keypoints == Some(0) {
            return Err(ConfigurationError::invalid(
                "max_keypoints",
                "use null to keep every keypoint",
            ));
        }
        if self.solver_iterations == 0 {
            return Err(ConfigurationError::invalid(
                "solver_iterations",
                "at least one iteration is required",
            ));
        }
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ConfigurationError::invalid(
                "match_threshold",
                format!("{} is not in [0, 1]", self.match_threshold),
            ));
        }
        if self.tiling.enabled && (self.tiling.row_divisor == 0 || self.tiling.col_divisor == 0) {
            return Err(ConfigurationError::invalid(
                "tiling",
                "row and column divisors must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self::matching()
    }
}

/// The settings of the robust fundamental matrix estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerifierSettings {
    /// The largest error, in pixels, of an inlier.
    #[serde(default = "default_pixel_threshold")]
    pub pixel_threshold: f64,
    /// The probability of having drawn an outlier free sample required to stop early.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default)]
    pub error_metric: ErrorMetric,
    /// Also require both point-to-epipolar-line distances to be within the threshold.
    #[serde(default = "default_true")]
    pub symmetric_check: bool,
    /// Reject samples that do not determine a unique fundamental matrix.
    #[serde(default = "default_true")]
    pub degeneracy_check: bool,
    /// Refit each new best model on all of its inliers.
    #[serde(default = "default_true")]
    pub local_optimization: bool,
    /// Models with fewer inliers are rejected.
    #[serde(default = "default_minimum_inliers")]
    pub minimum_inliers: usize,
    /// Verification fails if a smaller fraction of the correspondences are inliers.
    #[serde(default)]
    pub minimum_inlier_ratio: f64,
    /// Seed of the sampling, so that verification is reproducible.
    #[serde(default)]
    pub seed: u64,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            pixel_threshold: default_pixel_threshold(),
            confidence: default_confidence(),
            max_iterations: default_max_iterations(),
            error_metric: ErrorMetric::default(),
            symmetric_check: true,
            degeneracy_check: true,
            local_optimization: true,
            minimum_inliers: default_minimum_inliers(),
            minimum_inlier_ratio: 0.0,
            seed: 0,
        }
    }
}

impl VerifierSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.pixel_threshold > 0.0 && self.pixel_threshold.is_finite()) {
            return Err(ConfigurationError::invalid(
                "pixel_threshold",
                format!("{} is not a positive distance", self.pixel_threshold),
            ));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(ConfigurationError::invalid(
                "confidence",
                format!("{} is not in (0, 1)", self.confidence),
            ));
        }
        if self.max_iterations == 0 {
            return Err(ConfigurationError::invalid(
                "max_iterations",
                "at least one iteration is required",
            ));
        }
        if !(0.0..=1.0).contains(&self.minimum_inlier_ratio) {
            return Err(ConfigurationError::invalid(
                "minimum_inlier_ratio",
                format!("{} is not in [0, 1]", self.minimum_inlier_ratio),
            ));
        }
        Ok(())
    }
}

/// The settings of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Passed to the matcher at every epoch.
    #[serde(
        default = "FeatureSettings::matching",
        deserialize_with = "matching_section"
    )]
    pub matching: FeatureSettings,
    /// Passed to the tracker at every epoch after the first.
    #[serde(
        default = "FeatureSettings::tracking",
        deserialize_with = "tracking_section"
    )]
    pub tracking: FeatureSettings,
    #[serde(default)]
    pub verifier: VerifierSettings,
    /// The number of epochs to process, or `None` for every image pair.
    #[serde(default)]
    pub epoch_count: Option<usize>,
    /// The fewest points that must survive tracking when the previous epoch has any.
    #[serde(default = "default_minimum_tracked")]
    pub minimum_tracked: usize,
    /// Store only the inliers of the verification instead of the whole merged set.
    #[serde(default)]
    pub prune_outliers: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            matching: FeatureSettings::matching(),
            tracking: FeatureSettings::tracking(),
            verifier: VerifierSettings::default(),
            epoch_count: None,
            minimum_tracked: default_minimum_tracked(),
            prune_outliers: false,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.matching.validate()?;
        self.tracking.validate()?;
        self.verifier.validate()?;
        if self.epoch_count == Some(0) {
            return Err(ConfigurationError::invalid(
                "epoch_count",
                "at least one epoch must be processed",
            ));
        }
        Ok(())
    }
}

/// A serialized [`Tiling`] whose missing fields are taken from a preset.
#[derive(Deserialize)]
struct TilingSection {
    enabled: Option<bool>,
    row_divisor: Option<u32>,
    col_divisor: Option<u32>,
    overlap: Option<u32>,
}

impl TilingSection {
    fn over(self, preset: Tiling) -> Tiling {
        Tiling {
            enabled: self.enabled.unwrap_or(preset.enabled),
            row_divisor: self.row_divisor.unwrap_or(preset.row_divisor),
            col_divisor: self.col_divisor.unwrap_or(preset.col_divisor),
            overlap: self.overlap.unwrap_or(preset.overlap),
        }
    }
}

/// A serialized [`FeatureSettings`] whose missing fields are taken from a preset.
#[derive(Deserialize)]
struct FeatureSection {
    resize: Option<Resize>,
    resize_float: Option<bool>,
    equalize_histogram: Option<bool>,
    nms_radius: Option<u32>,
    keypoint_threshold: Option<f32>,
    /// `null` is kept apart from a missing field since it means "keep every keypoint".
    #[serde(default, deserialize_with = "present")]
    max_keypoints: Option<Option<usize>>,
    weights: Option<MatcherWeights>,
    solver_iterations: Option<usize>,
    match_threshold: Option<f32>,
    visualization: Option<Visualization>,
    tiling: Option<TilingSection>,
    cache: Option<bool>,
    force_cpu: Option<bool>,
}

impl FeatureSection {
    fn over(self, preset: FeatureSettings) -> FeatureSettings {
        FeatureSettings {
            resize: self.resize.unwrap_or(preset.resize),
            resize_float: self.resize_float.unwrap_or(preset.resize_float),
            equalize_histogram: self.equalize_histogram.unwrap_or(preset.equalize_histogram),
            nms_radius: self.nms_radius.unwrap_or(preset.nms_radius),
            keypoint_threshold: self.keypoint_threshold.unwrap_or(preset.keypoint_threshold),
            max_keypoints: self.max_keypoints.unwrap_or(preset.max_keypoints),
            weights: self.weights.unwrap_or(preset.weights),
            solver_iterations: self.solver_iterations.unwrap_or(preset.solver_iterations),
            match_threshold: self.match_threshold.unwrap_or(preset.match_threshold),
            visualization: self.visualization.unwrap_or(preset.visualization),
            tiling: self
                .tiling
                .map_or(preset.tiling, |tiling| tiling.over(preset.tiling)),
            cache: self.cache.unwrap_or(preset.cache),
            force_cpu: self.force_cpu.unwrap_or(preset.force_cpu),
        }
    }
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn matching_section<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FeatureSettings, D::Error> {
    Ok(FeatureSection::deserialize(deserializer)?.over(FeatureSettings::matching()))
}

fn tracking_section<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FeatureSettings, D::Error> {
    Ok(FeatureSection::deserialize(deserializer)?.over(FeatureSettings::tracking()))
}

fn default_true() -> bool {
    true
}

fn default_image_format() -> ImageFormat {
    ImageFormat::Png
}

fn default_row_divisor() -> u32 {
    2
}

fn default_col_divisor() -> u32 {
    3
}

fn default_overlap() -> u32 {
    300
}

fn default_resize() -> Resize {
    Resize::Original
}

fn default_nms_radius() -> u32 {
    3
}

fn default_keypoint_threshold() -> f32 {
    0.0001
}

fn default_max_keypoints() -> Option<usize> {
    Some(4096)
}

fn default_weights() -> MatcherWeights {
    MatcherWeights::Outdoor
}

fn default_solver_iterations() -> usize {
    100
}

fn default_match_threshold() -> f32 {
    0.2
}

fn default_pixel_threshold() -> f64 {
    3.0
}

fn default_confidence() -> f64 {
    0.9
}

fn default_max_iterations() -> usize {
    100_000
}

fn default_minimum_inliers() -> usize {
    8
}

fn default_minimum_tracked() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let settings: PipelineSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, PipelineSettings::default());
        assert_eq!(settings.tracking.tiling.col_divisor, 4);
        assert_eq!(settings.tracking.max_keypoints, Some(8192));
        assert_eq!(settings.verifier.error_metric, ErrorMetric::Sampson);
        settings.validate().unwrap();
    }

    #[test]
    fn partial_sections() {
        let settings: PipelineSettings = serde_json::from_str(
            r#"{
                "matching": { "resize": { "max_dimension": 2000 }, "max_keypoints": null },
                "verifier": { "pixel_threshold": 1.5, "error_metric": "symmetric_epipolar" },
                "prune_outliers": true
            }"#,
        )
        .unwrap();
        assert_eq!(settings.matching.resize, Resize::MaxDimension(2000));
        assert_eq!(settings.matching.max_keypoints, None);
        assert_eq!(settings.matching.nms_radius, 3);
        assert_eq!(settings.verifier.pixel_threshold, 1.5);
        assert_eq!(settings.verifier.error_metric, ErrorMetric::SymmetricEpipolar);
        assert_eq!(settings.verifier.max_iterations, 100_000);
        assert!(settings.prune_outliers);
    }

    #[test]
    fn partial_tracking_section_keeps_the_tracking_preset() {
        let settings: PipelineSettings =
            serde_json::from_str(r#"{ "tracking": { "cache": true } }"#).unwrap();
        assert_eq!(
            settings.tracking,
            FeatureSettings {
                cache: true,
                ..FeatureSettings::tracking()
            }
        );
        assert_eq!(settings.tracking.keypoint_threshold, 0.0005);
        assert_eq!(settings.tracking.max_keypoints, Some(8192));
        assert_eq!(settings.tracking.match_threshold, 0.4);
        assert_eq!(settings.tracking.tiling.col_divisor, 4);

        let settings: PipelineSettings = serde_json::from_str(
            r#"{ "tracking": { "tiling": { "overlap": 100 }, "max_keypoints": null } }"#,
        )
        .unwrap();
        assert_eq!(settings.tracking.tiling.overlap, 100);
        assert_eq!(settings.tracking.tiling.col_divisor, 4);
        assert_eq!(settings.tracking.tiling.row_divisor, 2);
        assert_eq!(settings.tracking.max_keypoints, None);
        assert_eq!(settings.tracking.match_threshold, 0.4);
        assert_eq!(settings.matching, FeatureSettings::matching());
    }

    #[test]
    fn out_of_range_values() {
        let mut settings = PipelineSettings::default();
        settings.matching.match_threshold = 1.5;
        assert!(matches!(
            settings.validate(),
            Err(ConfigurationError::InvalidSetting {
                name: "match_threshold",
                ..
            })
        ));

        let mut settings = PipelineSettings::default();
        settings.tracking.tiling.row_divisor = 0;
        assert!(settings.validate().is_err());

        let mut settings = PipelineSettings::default();
        settings.verifier.confidence = 1.0;
        assert!(settings.validate().is_err());

        let mut settings = PipelineSettings::default();
        settings.matching.keypoint_threshold = 0.0;
        assert!(settings.validate().is_err());
    }
}
