// src/raster/grid.rs
use std::fmt;

use geo::{coord, Rect};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Map-unit slack when comparing transforms read from different files.
const TRANSFORM_TOLERANCE: f64 = 1e-6;

/// North-up affine transform: pixel (col, row) to map coordinates.
///
/// Rotation terms are not supported; `pixel_height` is normally negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub origin_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            origin_y,
            pixel_height,
        }
    }

    /// Build from a GDAL-style six element transform, ignoring rotation.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self::new(gt[0], gt[3], gt[1], gt[5])
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }

    /// Map coordinate of the centre of pixel (col, row).
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional pixel position of a map coordinate.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Same origin and pixel size, up to float noise.
    pub fn aligned_with(&self, other: &GeoTransform) -> bool {
        [
            (self.origin_x, other.origin_x),
            (self.origin_y, other.origin_y),
            (self.pixel_width, other.pixel_width),
            (self.pixel_height, other.pixel_height),
        ]
        .iter()
        .all(|(a, b)| (a - b).abs() <= TRANSFORM_TOLERANCE)
    }
}

/// Shape and georeferencing shared by every band of an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
}

impl Grid {
    pub fn new(width: usize, height: usize, transform: GeoTransform) -> Self {
        Self {
            width,
            height,
            transform,
        }
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Footprint of the grid in map coordinates.
    pub fn bounds(&self) -> Rect<f64> {
        let t = &self.transform;
        let x1 = t.origin_x + self.width as f64 * t.pixel_width;
        let y1 = t.origin_y + self.height as f64 * t.pixel_height;
        Rect::new(
            coord! { x: t.origin_x, y: t.origin_y },
            coord! { x: x1, y: y1 },
        )
    }

    /// Linear index of the pixel containing a map coordinate, if inside.
    pub fn index_at(&self, x: f64, y: f64) -> Option<usize> {
        let (px, py) = self.transform.to_pixel(x, y);
        if px < 0.0 || py < 0.0 {
            return None;
        }
        let (col, row) = (px.floor() as usize, py.floor() as usize);
        if col >= self.width || row >= self.height {
            return None;
        }
        Some(row * self.width + col)
    }

    /// Pixel-for-pixel combination needs equal shape and georeferencing.
    pub fn ensure_same(&self, other: &Grid) -> Result<()> {
        if self.shape() != other.shape() || !self.transform.aligned_with(&other.transform) {
            return Err(EngineError::GridMismatch {
                expected: *self,
                found: *other,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.transform;
        write!(
            f,
            "{}x{} at ({}, {}) step ({}, {})",
            self.width, self.height, t.origin_x, t.origin_y, t.pixel_width, t.pixel_height
        )
    }
}

/// A concrete 2-D band of values, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    grid: Grid,
    data: Vec<f64>,
}

impl Raster {
    pub fn new(grid: Grid, data: Vec<f64>) -> Result<Self> {
        if data.len() != grid.len() {
            return Err(EngineError::GridMismatch {
                expected: grid,
                found: Grid::new(data.len(), 1, grid.transform),
            });
        }
        Ok(Self { grid, data })
    }

    pub fn filled(grid: Grid, value: f64) -> Self {
        Self {
            data: vec![value; grid.len()],
            grid,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Value at a linear index; out of range reads as NaN.
    #[inline]
    pub fn value(&self, idx: usize) -> f64 {
        self.data.get(idx).copied().unwrap_or(f64::NAN)
    }

    pub fn get(&self, col: usize, row: usize) -> Option<f64> {
        if col >= self.grid.width || row >= self.grid.height {
            return None;
        }
        Some(self.data[row * self.grid.width + col])
    }
}
