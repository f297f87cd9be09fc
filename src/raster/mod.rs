// src/raster/mod.rs
pub mod expr;
pub mod grid;
pub mod image;

pub use expr::{BandExpr, BinaryOp, MaskRule};
pub use grid::{GeoTransform, Grid, Raster};
pub use image::{Band, Image};
