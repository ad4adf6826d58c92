use crate::tiling::tiles;
use akaze::Akaze;
use bitarray::BitArray;
use epoch_pipeline::{
    stereo_core::{
        nalgebra::{DMatrix, DVectorSlice, Point2, Vector2},
        CameraFeatures, RegionOfInterest, ShapeError,
    },
    FeatureSettings, Resize,
};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use log::*;
use std::{collections::HashMap, path::Path};

/// The number of bits of an AKAZE descriptor.
pub const DESCRIPTOR_BITS: usize = 512;

/// Keypoints detected on one image, in original image coordinates.
#[derive(Debug, Clone, Default)]
pub struct Features {
    pub points: Vec<Point2<f64>>,
    pub descriptors: Vec<BitArray<64>>,
    pub responses: Vec<f32>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// The features at `indices`, with each descriptor spread out to one `0.0` or `1.0` per bit.
    pub fn camera_features(&self, indices: &[usize]) -> Result<CameraFeatures, ShapeError> {
        let selected: Vec<BitArray<64>> = indices.iter().map(|&ix| self.descriptors[ix]).collect();
        CameraFeatures::new(
            indices.iter().map(|&ix| self.points[ix]).collect(),
            descriptor_matrix(&selected),
            indices.iter().map(|&ix| self.responses[ix]).collect(),
        )
    }
}

/// One column per descriptor, one row per bit.
pub fn descriptor_matrix(descriptors: &[BitArray<64>]) -> DMatrix<f32> {
    DMatrix::from_fn(DESCRIPTOR_BITS, descriptors.len(), |bit, ix| {
        if descriptors[ix].bytes()[bit / 8] >> (bit % 8) & 1 == 1 {
            1.0
        } else {
            0.0
        }
    })
}

/// The inverse of [`descriptor_matrix`] for a single column.
///
/// Returns `None` if the column does not have one entry per bit.
pub fn descriptor_bits(column: DVectorSlice<'_, f32>) -> Option<BitArray<64>> {
    if column.len() != DESCRIPTOR_BITS {
        return None;
    }
    let mut bits = BitArray::zeros();
    for (bit, &value) in column.iter().enumerate() {
        if value > 0.5 {
            bits.bytes_mut()[bit / 8] |= 1 << (bit % 8);
        }
    }
    Some(bits)
}

/// Loads the image at `path` and detects features inside `roi`.
pub fn detect(
    path: &Path,
    roi: RegionOfInterest,
    settings: &FeatureSettings,
) -> Result<Features, image::ImageError> {
    let image = image::open(path)?;
    let features = detect_image(&image, roi, settings);
    debug!("detected {} features in {}", features.len(), path.display());
    Ok(features)
}

/// Detects features inside `roi` of `image`.
///
/// The image is resized and equalized first if the settings ask for it. Features are detected tile
/// by tile, thinned out with non-maximum suppression, and capped at the strongest `max_keypoints`.
pub fn detect_image(
    image: &DynamicImage,
    roi: RegionOfInterest,
    settings: &FeatureSettings,
) -> Features {
    let (prepared, scale) = prepare(image, settings);
    let (width, height) = prepared.dimensions();
    let scaled = RegionOfInterest {
        left: (roi.left as f64 * scale.x).floor() as u32,
        top: (roi.top as f64 * scale.y).floor() as u32,
        right: (roi.right as f64 * scale.x).ceil() as u32,
        bottom: (roi.bottom as f64 * scale.y).ceil() as u32,
    };
    let scaled = match scaled.clamp_to(width, height) {
        Some(scaled) => scaled,
        None => {
            warn!(
                "region of interest {:?} lies outside of the {}x{} image",
                roi, width, height
            );
            return Features::default();
        }
    };

    let akaze = Akaze::new(settings.keypoint_threshold as f64);
    let mut features = Features::default();
    for tile in tiles(scaled, &settings.tiling) {
        let bounds = tile.bounds;
        let crop = prepared.crop_imm(bounds.left, bounds.top, bounds.width(), bounds.height());
        let (keypoints, descriptors) = akaze.extract(&crop);
        for (keypoint, descriptor) in keypoints.into_iter().zip(descriptors) {
            let point = Point2::new(keypoint.point.0 as f64, keypoint.point.1 as f64) + bounds.origin();
            if !tile.core.contains(point) {
                continue;
            }
            let original = Point2::new(point.x / scale.x, point.y / scale.y);
            if !roi.contains(original) {
                continue;
            }
            features.points.push(original);
            features.descriptors.push(descriptor);
            features.responses.push(keypoint.response);
        }
    }
    suppress(
        features,
        settings.nms_radius as f64 / scale.x.min(scale.y),
        settings.max_keypoints,
    )
}

/// Applies the resize and histogram equalization of `settings`.
///
/// Returns the prepared image and the factor from original to prepared pixel coordinates.
fn prepare(image: &DynamicImage, settings: &FeatureSettings) -> (DynamicImage, Vector2<f64>) {
    let (width, height) = image.dimensions();
    let (new_width, new_height) = match settings.resize {
        Resize::Original => (width, height),
        Resize::MaxDimension(max) => {
            let longest = width.max(height);
            if longest <= max {
                (width, height)
            } else {
                let ratio = max as f64 / longest as f64;
                (
                    ((width as f64 * ratio).round() as u32).max(1),
                    ((height as f64 * ratio).round() as u32).max(1),
                )
            }
        }
        Resize::Exact { width, height } => (width, height),
    };
    let filter = if settings.resize_float {
        FilterType::Triangle
    } else {
        FilterType::Nearest
    };
    let mut prepared = if (new_width, new_height) == (width, height) {
        image.clone()
    } else {
        image.resize_exact(new_width, new_height, filter)
    };
    if settings.equalize_histogram {
        prepared = DynamicImage::ImageLuma8(imageproc::contrast::equalize_histogram(
            &prepared.to_luma8(),
        ));
    }
    let scale = Vector2::new(
        new_width as f64 / width as f64,
        new_height as f64 / height as f64,
    );
    (prepared, scale)
}

/// Keeps the strongest features so that no two kept features are closer than `radius`.
///
/// At most `max` features are kept.
pub fn suppress(features: Features, radius: f64, max: Option<usize>) -> Features {
    let mut order: Vec<usize> = (0..features.len()).collect();
    order.sort_by(|&a, &b| features.responses[b].total_cmp(&features.responses[a]));

    let max = max.unwrap_or(usize::MAX);
    let cell = radius.max(1.0);
    let key = |p: Point2<f64>| ((p.x / cell).floor() as i64, (p.y / cell).floor() as i64);
    let mut grid: HashMap<(i64, i64), Vec<Point2<f64>>> = HashMap::new();
    let mut kept = Features::default();
    for ix in order {
        if kept.len() == max {
            break;
        }
        let point = features.points[ix];
        let (cx, cy) = key(point);
        let crowded = radius > 0.0
            && (cx - 1..=cx + 1).any(|x| {
                (cy - 1..=cy + 1).any(|y| {
                    grid.get(&(x, y)).map_or(false, |neighbours| {
                        neighbours.iter().any(|&n| (n - point).norm() < radius)
                    })
                })
            });
        if crowded {
            continue;
        }
        grid.entry((cx, cy)).or_default().push(point);
        kept.points.push(point);
        kept.descriptors.push(features.descriptors[ix]);
        kept.responses.push(features.responses[ix]);
    }
    kept
}
