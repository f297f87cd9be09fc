// src/backend/mod.rs
//! Imagery backends
//!
//! A backend is where deferred band expressions are finally computed. The
//! engine only ever talks to the [`ImageryBackend`] trait, so the same
//! compose/reduce code runs in-process or against a worker pool.

pub mod deferred;
pub mod memory;

pub use deferred::{DeferredBackend, PendingReduction};
pub use memory::InMemoryBackend;

use crate::error::Result;
use crate::geometry::Geometry;
use crate::processing::reducer::RegionStats;
use crate::raster::{Image, Raster};

pub trait ImageryBackend: Send + Sync {
    /// Compute every pixel of one band of `image`.
    fn materialize(&self, image: &Image, band: &str) -> Result<Raster>;

    /// Aggregate one band over `geometry`, sampling every `scale` map units.
    /// Blocks until the result is available.
    fn reduce_region(
        &self,
        image: &Image,
        band: &str,
        geometry: &Geometry,
        scale: f64,
    ) -> Result<RegionStats>;
}

impl<T: ImageryBackend + ?Sized> ImageryBackend for std::sync::Arc<T> {
    fn materialize(&self, image: &Image, band: &str) -> Result<Raster> {
        (**self).materialize(image, band)
    }

    fn reduce_region(
        &self,
        image: &Image,
        band: &str,
        geometry: &Geometry,
        scale: f64,
    ) -> Result<RegionStats> {
        (**self).reduce_region(image, band, geometry, scale)
    }
}
