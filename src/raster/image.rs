// src/raster/image.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use geo::Rect;

use super::expr::BandExpr;
use super::grid::{Grid, Raster};
use crate::error::{EngineError, Result};

/// One named band of an image. The pixels are either held in memory or
/// described by a deferred expression over other rasters.
#[derive(Debug, Clone)]
pub struct Band {
    name: String,
    expr: BandExpr,
}

impl Band {
    pub fn from_raster(name: impl Into<String>, raster: Raster) -> Self {
        let name = name.into();
        let expr = BandExpr::source(name.clone(), Arc::new(raster));
        Self { name, expr }
    }

    pub fn from_expr(name: impl Into<String>, expr: BandExpr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expr(&self) -> &BandExpr {
        &self.expr
    }

    /// Same pixels under a new name.
    pub fn rename(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: self.expr,
        }
    }

    pub fn is_deferred(&self) -> bool {
        self.expr.as_source().is_none()
    }
}

/// An ordered set of uniquely named bands on one grid, plus scene metadata.
///
/// Images are append-only: bands are added, never removed. Adding a band
/// whose name already exists replaces the earlier one in place.
#[derive(Debug, Clone)]
pub struct Image {
    id: String,
    grid: Grid,
    acquired: Option<DateTime<Utc>>,
    cloud_percent: Option<f64>,
    bands: Vec<Band>,
}

impl Image {
    pub fn new(id: impl Into<String>, grid: Grid) -> Self {
        Self {
            id: id.into(),
            grid,
            acquired: None,
            cloud_percent: None,
            bands: Vec::new(),
        }
    }

    pub fn with_acquired(mut self, acquired: DateTime<Utc>) -> Self {
        self.acquired = Some(acquired);
        self
    }

    pub fn with_cloud_percent(mut self, cloud_percent: f64) -> Self {
        self.cloud_percent = Some(cloud_percent);
        self
    }

    /// Builder form of [`Image::add_band`] for in-memory rasters.
    pub fn with_raster(mut self, name: impl Into<String>, raster: Raster) -> Result<Self> {
        self.add_band(Band::from_raster(name, raster))?;
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn footprint(&self) -> Rect<f64> {
        self.grid.bounds()
    }

    pub fn acquired(&self) -> Option<DateTime<Utc>> {
        self.acquired
    }

    pub fn acquired_date(&self) -> Option<NaiveDate> {
        self.acquired.map(|t| t.date_naive())
    }

    pub fn cloud_percent(&self) -> Option<f64> {
        self.cloud_percent
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(Band::name).collect()
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.iter().find(|b| b.name == name)
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.band(name).is_some()
    }

    /// Band lookup that fails with a session-level error.
    pub fn require_band(&self, name: &str) -> Result<&Band> {
        self.band(name).ok_or_else(|| EngineError::UnknownBand {
            band: name.to_string(),
        })
    }

    /// Add one band; a name collision overwrites the earlier band.
    pub fn add_band(&mut self, band: Band) -> Result<()> {
        band.expr.check_grid(&self.grid)?;
        self.insert(band);
        Ok(())
    }

    fn insert(&mut self, band: Band) {
        match self.bands.iter_mut().find(|b| b.name == band.name) {
            Some(slot) => *slot = band,
            None => self.bands.push(band),
        }
    }

    /// Return a new image with `bands` appended in order; later entries win
    /// on name collisions. The receiver is left untouched.
    pub fn add_bands(&self, bands: impl IntoIterator<Item = Band>) -> Result<Image> {
        let mut out = self.clone();
        for band in bands {
            out.add_band(band)?;
        }
        Ok(out)
    }

    /// [`Image::add_bands`] for bands derived from this image's own bands,
    /// which share its grid by construction.
    pub(crate) fn with_derived(&self, bands: impl IntoIterator<Item = Band>) -> Image {
        let mut out = self.clone();
        for band in bands {
            debug_assert!(band.expr.check_grid(&self.grid).is_ok());
            out.insert(band);
        }
        out
    }
}
