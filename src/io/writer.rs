// src/io/writer.rs
use std::path::Path;

use gdal::raster::{Buffer, RasterCreationOptions};
use gdal::spatial_ref::SpatialRef;
use gdal::{DriverManager, Metadata};
use tracing::debug;

use crate::error::Result;
use crate::raster::Raster;
use crate::utils::fixed_point::{to_fixed_point, to_float32, NODATA_FLOAT32, NODATA_INT16};

#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Write int16 scaled by `scale_factor` instead of float32.
    pub fixed_point: bool,
    pub scale_factor: i32,
    pub compress: String,
    pub compress_level: u8,
    pub tiled: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            fixed_point: true,
            scale_factor: 10000,
            compress: "DEFLATE".to_string(),
            compress_level: 6,
            tiled: true,
        }
    }
}

impl WriteOptions {
    fn creation_options(&self) -> Vec<String> {
        let mut options = Vec::new();
        let compress = self.compress.to_uppercase();

        // Add compression if not NONE
        if compress != "NONE" {
            options.push(format!("COMPRESS={compress}"));
            match compress.as_str() {
                "DEFLATE" => options.push(format!("ZLEVEL={}", self.compress_level.min(9))),
                "ZSTD" => options.push(format!("ZSTD_LEVEL={}", self.compress_level.min(22))),
                _ => {}
            }
        }
        if self.tiled {
            options.push("TILED=YES".to_string());
        }
        options.push("NUM_THREADS=ALL_CPUS".to_string());
        options
    }
}

/// WKT of a CRS given as `EPSG:<code>` or any other definition GDAL accepts.
pub fn projection_wkt(crs: &str) -> Result<String> {
    Ok(SpatialRef::from_definition(crs)?.to_wkt()?)
}

/// Write one band as a single-band GeoTIFF. NaN pixels are written as nodata.
pub fn write_raster(
    raster: &Raster,
    name: &str,
    projection: Option<&str>,
    output_path: &Path,
    options: &WriteOptions,
) -> Result<()> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let creation_options = RasterCreationOptions::from_iter(options.creation_options());
    let grid = raster.grid();
    let (width, height) = grid.shape();

    if options.fixed_point {
        let mut out_ds = driver.create_with_band_type_with_options::<i16, _>(
            output_path,
            width,
            height,
            1,
            &creation_options,
        )?;
        if let Some(projection) = projection {
            out_ds.set_projection(projection)?;
        }
        out_ds.set_geo_transform(&grid.transform.to_gdal())?;

        let mut band = out_ds.rasterband(1)?;
        band.set_no_data_value(Some(NODATA_INT16 as f64))?;
        band.set_metadata_item("SCALE", &format!("{}", 1.0 / options.scale_factor as f64), "")?;
        band.set_metadata_item("OFFSET", "0", "")?;
        band.set_description(&format!("{name} (scaled by {})", options.scale_factor))?;

        let data = to_fixed_point(raster.data(), options.scale_factor, NODATA_INT16);
        let mut buffer = Buffer::new((width, height), data);
        band.write((0, 0), (width, height), &mut buffer)?;
        out_ds.flush_cache()?;
    } else {
        let mut out_ds = driver.create_with_band_type_with_options::<f32, _>(
            output_path,
            width,
            height,
            1,
            &creation_options,
        )?;
        if let Some(projection) = projection {
            out_ds.set_projection(projection)?;
        }
        out_ds.set_geo_transform(&grid.transform.to_gdal())?;

        let mut band = out_ds.rasterband(1)?;
        band.set_no_data_value(Some(NODATA_FLOAT32 as f64))?;
        band.set_description(name)?;

        let data = to_float32(raster.data(), NODATA_FLOAT32);
        let mut buffer = Buffer::new((width, height), data);
        band.write((0, 0), (width, height), &mut buffer)?;
        out_ds.flush_cache()?;
    }

    debug!(band = name, path = %output_path.display(), "wrote raster");
    Ok(())
}
