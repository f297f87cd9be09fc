// src/io/manifest.rs
//! Scene archive manifests
//!
//! ```json
//! { "scenes": [ {
//!     "id": "S2A_20240614",
//!     "acquired": "2024-06-14T09:40:31Z",
//!     "cloud_percent": 3.2,
//!     "width": 2, "height": 2,
//!     "transform": { "origin_x": 0, "origin_y": 20, "pixel_width": 10, "pixel_height": -10 },
//!     "bands": [
//!         { "name": "B8", "values": [5000, 5000, 5000, 5000] },
//!         { "name": "B4", "fill": 1000 },
//!         { "name": "B11", "path": "T34TFR_B11.tif" }
//!     ]
//! } ] }
//! ```
//!
//! GeoTIFF bands need the `gdal` feature; they are resampled to the scene
//! grid, which is taken from the first GeoTIFF band when not given.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collection::SceneArchive;
use crate::error::{EngineError, Result};
use crate::raster::{GeoTransform, Grid, Image, Raster};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneManifest {
    pub scenes: Vec<SceneEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEntry {
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub cloud_percent: f64,
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub height: Option<usize>,
    #[serde(default)]
    pub transform: Option<GeoTransform>,
    pub bands: Vec<BandEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandEntry {
    pub name: String,
    #[serde(flatten)]
    pub source: BandSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BandSource {
    /// Row-major pixel values.
    Values { values: Vec<f64> },
    /// Every pixel set to one value.
    Fill { fill: f64 },
    /// Single-band raster file, relative to the manifest.
    Path { path: PathBuf },
}

impl SceneManifest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a manifest; relative band paths resolve against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<SceneArchive> {
        let path = path.as_ref();
        let manifest = Self::from_json(&fs::read_to_string(path)?)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.into_archive(base)
    }

    pub fn into_archive(self, base: &Path) -> Result<SceneArchive> {
        let scenes = self
            .scenes
            .into_iter()
            .map(|entry| entry.into_image(base))
            .collect::<Result<Vec<_>>>()?;
        debug!(scenes = scenes.len(), "loaded scene archive");
        Ok(SceneArchive::new(scenes))
    }
}

impl SceneEntry {
    fn grid(&self, base: &Path) -> Result<Grid> {
        if let (Some(width), Some(height), Some(transform)) = (self.width, self.height, self.transform) {
            return Ok(Grid::new(width, height, transform));
        }
        let first_path = self.bands.iter().find_map(|b| match &b.source {
            BandSource::Path { path } => Some(base.join(path)),
            _ => None,
        });
        match first_path {
            Some(path) => read_grid(&path),
            None => Err(EngineError::InvalidConfig {
                field: format!("scenes[{}]", self.id),
                reason: "width, height and transform are required without a raster file band".into(),
            }),
        }
    }

    pub fn into_image(self, base: &Path) -> Result<Image> {
        let grid = self.grid(base)?;
        let mut image = Image::new(self.id, grid)
            .with_acquired(self.acquired)
            .with_cloud_percent(self.cloud_percent);

        for band in self.bands {
            let raster = match band.source {
                BandSource::Values { values } => Raster::new(grid, values)?,
                BandSource::Fill { fill } => Raster::filled(grid, fill),
                BandSource::Path { path } => read_band(&base.join(path), &grid)?,
            };
            image = image.with_raster(band.name, raster)?;
        }
        Ok(image)
    }
}

#[cfg(feature = "gdal")]
fn read_grid(path: &Path) -> Result<Grid> {
    super::reader::read_grid(path)
}

#[cfg(feature = "gdal")]
fn read_band(path: &Path, grid: &Grid) -> Result<Raster> {
    super::reader::read_band(path, grid)
}

#[cfg(not(feature = "gdal"))]
fn read_grid(path: &Path) -> Result<Grid> {
    Err(gdal_disabled(path))
}

#[cfg(not(feature = "gdal"))]
fn read_band(path: &Path, _grid: &Grid) -> Result<Raster> {
    Err(gdal_disabled(path))
}

#[cfg(not(feature = "gdal"))]
fn gdal_disabled(path: &Path) -> EngineError {
    EngineError::Raster(format!(
        "cannot read {}: built without the gdal feature",
        path.display()
    ))
}
