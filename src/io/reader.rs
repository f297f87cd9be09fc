// src/io/reader.rs
use std::path::Path;

use gdal::raster::ResampleAlg;
use gdal::Dataset;

use crate::error::Result;
use crate::raster::{GeoTransform, Grid, Raster};

pub struct GeoInfo {
    pub projection: String,
    pub grid: Grid,
}

pub fn read_geo_info(path: &Path) -> Result<GeoInfo> {
    let dataset = Dataset::open(path)?;
    let (width, height) = dataset.raster_size();
    Ok(GeoInfo {
        projection: dataset.projection(),
        grid: Grid::new(width, height, GeoTransform::from_gdal(dataset.geo_transform()?)),
    })
}

pub fn read_grid(path: &Path) -> Result<Grid> {
    Ok(read_geo_info(path)?.grid)
}

/// Read band 1 of `path`, resampled to `grid`'s shape. Nodata becomes NaN.
///
/// Coarser bands (20 m SWIR next to 10 m NIR) are brought onto the scene
/// grid with bilinear resampling; the raster must cover the same footprint.
pub fn read_band(path: &Path, grid: &Grid) -> Result<Raster> {
    let dataset = Dataset::open(path)?;
    let band = dataset.rasterband(1)?;
    let size = band.size();
    let resample = if size == grid.shape() {
        None
    } else {
        Some(ResampleAlg::Bilinear)
    };

    let buffer = band.read_as::<f64>((0, 0), size, grid.shape(), resample)?;
    let nodata = band.no_data_value();
    let data = buffer
        .data()
        .iter()
        .map(|&v| match nodata {
            Some(nd) if v == nd => f64::NAN,
            _ => v,
        })
        .collect();
    Raster::new(*grid, data)
}
