// src/collection.rs
//! Scene archive queries and median compositing

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::debug;

use crate::backend::ImageryBackend;
use crate::error::{EngineError, Result};
use crate::geometry::Geometry;
use crate::raster::{Band, Image, Raster};

/// Every scene known to the engine, in no particular order.
#[derive(Debug, Clone, Default)]
pub struct SceneArchive {
    scenes: Vec<Image>,
}

impl SceneArchive {
    pub fn new(scenes: Vec<Image>) -> Self {
        Self { scenes }
    }

    pub fn push(&mut self, scene: Image) {
        self.scenes.push(scene);
    }

    pub fn scenes(&self) -> &[Image] {
        &self.scenes
    }

    pub fn scene(&self, id: &str) -> Option<&Image> {
        self.scenes.iter().find(|s| s.id() == id)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Scenes overlapping `geometry`, acquired within `[start, end]` and with
    /// cloud cover strictly below `max_cloud_percent`, oldest first.
    ///
    /// Scenes without an acquisition time or cloud cover never match. An
    /// empty result is a normal outcome.
    pub fn query(
        &self,
        geometry: &Geometry,
        start: NaiveDate,
        end: NaiveDate,
        max_cloud_percent: f64,
    ) -> ImageCollection {
        let mut images: Vec<Image> = self
            .scenes
            .iter()
            .filter(|s| geometry.intersects_rect(&s.footprint()))
            .filter(|s| s.acquired_date().is_some_and(|d| start <= d && d <= end))
            .filter(|s| s.cloud_percent().is_some_and(|c| c < max_cloud_percent))
            .cloned()
            .collect();
        images.sort_by_key(|s| s.acquired());

        debug!(
            %start,
            %end,
            max_cloud_percent,
            matched = images.len(),
            archived = self.scenes.len(),
            "collection query"
        );
        ImageCollection { images }
    }
}

/// Query result, ordered by acquisition time ascending.
#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    images: Vec<Image>,
}

impl ImageCollection {
    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn first(&self) -> Option<&Image> {
        self.images.first()
    }

    pub fn last(&self) -> Option<&Image> {
        self.images.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Image> {
        self.images.iter()
    }

    /// At most `n` scenes spread evenly over the collection, first and last
    /// included, order kept.
    pub fn sample_evenly(&self, n: usize) -> Vec<&Image> {
        even_positions(self.images.len(), n)
            .into_iter()
            .map(|i| &self.images[i])
            .collect()
    }

    pub fn compose_median<B: ImageryBackend + ?Sized>(&self, backend: &B) -> Result<Image> {
        compose_median(backend, &self.images)
    }
}

impl<'a> IntoIterator for &'a ImageCollection {
    type Item = &'a Image;
    type IntoIter = std::slice::Iter<'a, Image>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.iter()
    }
}

/// At most `n` ascending positions spread evenly over `0..len`, first and
/// last included.
pub fn even_positions(len: usize, n: usize) -> Vec<usize> {
    match n {
        0 => Vec::new(),
        _ if len <= n => (0..len).collect(),
        1 => vec![0],
        _ => (0..n).map(|i| i * (len - 1) / (n - 1)).collect(),
    }
}

/// Per-pixel, per-band median across `images`.
///
/// Only bands present in every scene are kept, in the first scene's order.
/// Undefined values are ignored; a pixel undefined in every scene stays NaN.
/// Calling this on an empty sequence is a caller error.
pub fn compose_median<B: ImageryBackend + ?Sized>(backend: &B, images: &[Image]) -> Result<Image> {
    let (first, rest) = images.split_first().ok_or(EngineError::EmptyCollection)?;
    let grid = *first.grid();
    for image in rest {
        grid.ensure_same(image.grid())?;
    }

    let common: Vec<&str> = first
        .band_names()
        .into_iter()
        .filter(|name| rest.iter().all(|img| img.has_band(name)))
        .collect();

    let id = match images.last() {
        Some(last) if images.len() > 1 => format!("median_{}_{}", first.id(), last.id()),
        _ => format!("median_{}", first.id()),
    };
    let mut out = Image::new(id, grid);

    for name in common {
        let layers = images
            .iter()
            .map(|img| backend.materialize(img, name))
            .collect::<Result<Vec<Raster>>>()?;

        let data: Vec<f64> = (0..grid.len())
            .into_par_iter()
            .map(|idx| {
                let mut values: Vec<f64> = layers
                    .iter()
                    .map(|r| r.value(idx))
                    .filter(|v| v.is_finite())
                    .collect();
                median(&mut values)
            })
            .collect();

        out.add_band(Band::from_raster(name, Raster::new(grid, data)?))?;
    }

    debug!(scenes = images.len(), bands = out.bands().len(), "median composite");
    Ok(out)
}

/// Median of `values`, averaging the middle pair for even counts. NaN if empty.
fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median(&mut []).is_nan());
    }

    #[test]
    fn test_even_positions() {
        assert_eq!(even_positions(10, 3), vec![0, 4, 9]);
        assert_eq!(even_positions(3, 5), vec![0, 1, 2]);
        assert_eq!(even_positions(4, 1), vec![0]);
        assert!(even_positions(4, 0).is_empty());
        assert!(even_positions(0, 1).is_empty());
    }
}
