use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("region of interest [{left}, {top}, {right}, {bottom}] is empty")]
pub struct EmptyRegion {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// A pixel bounding box that restricts matching and tracking to the relevant part of an image.
///
/// The box is half-open: `left <= x < right` and `top <= y < bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl RegionOfInterest {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Result<Self, EmptyRegion> {
        if left < right && top < bottom {
            Ok(Self {
                left,
                top,
                right,
                bottom,
            })
        } else {
            Err(EmptyRegion {
                left,
                top,
                right,
                bottom,
            })
        }
    }

    /// A region covering a whole `width` x `height` image.
    pub fn full(width: u32, height: u32) -> Result<Self, EmptyRegion> {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn contains(&self, point: Point2<f64>) -> bool {
        point.x >= self.left as f64
            && point.x < self.right as f64
            && point.y >= self.top as f64
            && point.y < self.bottom as f64
    }

    /// The top left corner, which is the offset from region coordinates to image coordinates.
    pub fn origin(&self) -> Vector2<f64> {
        Vector2::new(self.left as f64, self.top as f64)
    }

    /// Shrinks the region so that it fits inside a `width` x `height` image.
    ///
    /// Returns `None` if nothing of the region remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        Self::new(
            self.left.min(width),
            self.top.min(height),
            self.right.min(width),
            self.bottom.min(height),
        )
        .ok()
    }
}

impl TryFrom<[u32; 4]> for RegionOfInterest {
    type Error = EmptyRegion;

    fn try_from([left, top, right, bottom]: [u32; 4]) -> Result<Self, Self::Error> {
        Self::new(left, top, right, bottom)
    }
}
