use crate::ParseError;
use log::*;
use std::path::{Path, PathBuf};
use stereo_core::{
    nalgebra::{Matrix3, Vector5},
    Camera,
};

/// The number of values in a calibration resource.
const CALIBRATION_VALUES: usize = 16;
/// The value between the intrinsics and the distortion coefficients, which is ignored.
const SKIPPED_VALUE: usize = 9;

/// Loads camera calibrations from `<folder>/<camera_id>.txt`.
///
/// A calibration resource holds 16 whitespace separated numbers. Values 0 to 8 are the
/// intrinsic matrix in row-major order, value 9 is ignored, and values 10 to 14 are the
/// distortion coefficients. The last value is also ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationStore {
    folder: PathBuf,
}

impl CalibrationStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn path(&self, camera_id: &str) -> PathBuf {
        self.folder.join(format!("{}.txt", camera_id))
    }

    pub fn load(&self, camera_id: &str) -> Result<Camera, ParseError> {
        let path = self.path(camera_id);
        let text = std::fs::read_to_string(&path).map_err(|source| ParseError::Io {
            resource: path.display().to_string(),
            source,
        })?;
        let camera = Self::parse_resource(camera_id, &path.display().to_string(), &text)?;
        info!("loaded calibration of camera {} from {}", camera_id, path.display());
        Ok(camera)
    }

    /// Parses the text of an in-memory calibration resource for `camera_id`.
    pub fn parse(camera_id: &str, text: &str) -> Result<Camera, ParseError> {
        Self::parse_resource(camera_id, camera_id, text)
    }

    fn parse_resource(camera_id: &str, resource: &str, text: &str) -> Result<Camera, ParseError> {
        let values = text
            .split_whitespace()
            .enumerate()
            .map(|(index, token)| {
                token.parse::<f64>().map_err(|_| ParseError::Number {
                    resource: resource.to_owned(),
                    index,
                    token: token.to_owned(),
                })
            })
            .collect::<Result<Vec<f64>, ParseError>>()?;
        if values.len() != CALIBRATION_VALUES {
            return Err(ParseError::Count {
                resource: resource.to_owned(),
                found: values.len(),
            });
        }
        let intrinsics = Matrix3::from_row_slice(&values[..SKIPPED_VALUE]);
        let distortion = Vector5::from_column_slice(&values[SKIPPED_VALUE + 1..SKIPPED_VALUE + 6]);
        Ok(Camera::new(camera_id, intrinsics, distortion))
    }
}
