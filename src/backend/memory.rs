// src/backend/memory.rs
use std::sync::Arc;

use tracing::trace;

use super::ImageryBackend;
use crate::error::Result;
use crate::geometry::Geometry;
use crate::processing::reducer::{reduce_samples, sample_indices, RegionStats};
use crate::raster::{Image, Raster};

/// Computes on the calling thread, fanning pixel work out over rayon.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryBackend;

impl InMemoryBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ImageryBackend for InMemoryBackend {
    fn materialize(&self, image: &Image, band: &str) -> Result<Raster> {
        let expr = image.require_band(band)?.expr();
        // already concrete
        if let Some(raster) = expr.as_source() {
            return Ok(Raster::clone(Arc::as_ref(raster)));
        }
        expr.evaluate(image.grid())
    }

    fn reduce_region(
        &self,
        image: &Image,
        band: &str,
        geometry: &Geometry,
        scale: f64,
    ) -> Result<RegionStats> {
        let expr = image.require_band(band)?.expr();
        let indices = sample_indices(image.grid(), geometry, scale);
        trace!(image = image.id(), band, samples = indices.len(), "reducing region");
        Ok(reduce_samples(expr, &indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::raster::{GeoTransform, Grid};

    #[test]
    fn test_unknown_band_propagates() {
        let grid = Grid::new(1, 1, GeoTransform::new(0.0, 10.0, 10.0, -10.0));
        let image = Image::new("x", grid);
        let g = Geometry::circle(5.0, 5.0, 5.0).unwrap();
        let err = InMemoryBackend.reduce_region(&image, "B8", &g, 10.0).unwrap_err();
        assert!(matches!(err, EngineError::UnknownBand { .. }));
        assert!(InMemoryBackend.materialize(&image, "B8").is_err());
    }
}
