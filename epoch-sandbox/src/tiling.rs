use epoch_pipeline::{stereo_core::RegionOfInterest, Tiling};

/// A part of a region of interest that is processed on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// The pixels features are detected on, which includes the overlap with neighbouring tiles.
    pub bounds: RegionOfInterest,
    /// The pixels this tile owns. The cores of all tiles partition the region of interest.
    pub core: RegionOfInterest,
}

/// Splits `roi` into a grid of overlapping tiles.
///
/// A feature detected in a tile is only kept if it lies in the tile's core, so features found
/// twice in the overlap of two tiles are kept once. The overlap gives the detector context
/// around the core so that features close to a core boundary are still found.
pub fn tiles(roi: RegionOfInterest, tiling: &Tiling) -> Vec<Tile> {
    if !tiling.enabled {
        return vec![Tile {
            bounds: roi,
            core: roi,
        }];
    }
    let rows = tiling.row_divisor.clamp(1, roi.height());
    let cols = tiling.col_divisor.clamp(1, roi.width());
    let split = |start: u32, length: u32, parts: u32, part: u32| {
        start + (length as u64 * part as u64 / parts as u64) as u32
    };
    let mut tiles = Vec::with_capacity((rows * cols) as usize);
    for row in 0..rows {
        for col in 0..cols {
            let core = RegionOfInterest {
                left: split(roi.left, roi.width(), cols, col),
                top: split(roi.top, roi.height(), rows, row),
                right: split(roi.left, roi.width(), cols, col + 1),
                bottom: split(roi.top, roi.height(), rows, row + 1),
            };
            let bounds = RegionOfInterest {
                left: core.left.saturating_sub(tiling.overlap).max(roi.left),
                top: core.top.saturating_sub(tiling.overlap).max(roi.top),
                right: core.right.saturating_add(tiling.overlap).min(roi.right),
                bottom: core.bottom.saturating_add(tiling.overlap).min(roi.bottom),
            };
            tiles.push(Tile { bounds, core });
        }
    }
    tiles
}
