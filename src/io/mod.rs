// src/io/mod.rs
pub mod manifest;
#[cfg(feature = "gdal")]
pub mod reader;
#[cfg(feature = "gdal")]
pub mod writer;

pub use manifest::{BandEntry, BandSource, SceneEntry, SceneManifest};
#[cfg(feature = "gdal")]
pub use reader::{read_band, read_geo_info};
#[cfg(feature = "gdal")]
pub use writer::{projection_wkt, write_raster, WriteOptions};
