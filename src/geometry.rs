// src/geometry.rs
//! Regions of interest
//!
//! A geometry is either a circular buffer around a point or a polygon, in
//! the planar map coordinates of the imagery (metres). Sites configured in
//! geographic coordinates are projected to Web Mercator first.

use geo::{coord, BoundingRect, Contains, Coord, Intersects, LineString, Point, Polygon, Rect};
use proj::Proj;

use crate::error::{EngineError, Result};

pub const GEOGRAPHIC_CRS: &str = "EPSG:4326";
/// CRS of scene grids and region geometries.
pub const MAP_CRS: &str = "EPSG:3857";
/// Latitude limit of the Web Mercator square.
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

fn projection_error(reason: String) -> EngineError {
    EngineError::InvalidConfig {
        field: "crs".into(),
        reason,
    }
}

/// Reprojects coordinate pairs between two known CRS.
pub struct Reprojector {
    proj: Proj,
    from: &'static str,
    to: &'static str,
}

impl Reprojector {
    pub fn new(from: &'static str, to: &'static str) -> Result<Self> {
        let proj = Proj::new_known_crs(from, to, None).map_err(|e| {
            projection_error(format!("cannot build projection from {from} to {to}: {e}"))
        })?;
        Ok(Self { proj, from, to })
    }

    /// Longitude/latitude degrees to Web Mercator metres.
    pub fn to_map() -> Result<Self> {
        Self::new(GEOGRAPHIC_CRS, MAP_CRS)
    }

    /// Web Mercator metres to longitude/latitude degrees.
    pub fn to_geographic() -> Result<Self> {
        Self::new(MAP_CRS, GEOGRAPHIC_CRS)
    }

    pub fn convert(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        self.proj.convert((x, y)).map_err(|e| {
            projection_error(format!(
                "cannot project ({x}, {y}) from {} to {}: {e}",
                self.from, self.to
            ))
        })
    }
}

/// Project a longitude/latitude pair (degrees) to Web Mercator metres.
///
/// Latitudes are clamped to the Mercator square first.
pub fn lonlat_to_mercator(lon: f64, lat: f64) -> Result<(f64, f64)> {
    Reprojector::to_map()?.convert(lon, lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT))
}

/// Inverse of [`lonlat_to_mercator`].
pub fn mercator_to_lonlat(x: f64, y: f64) -> Result<(f64, f64)> {
    Reprojector::to_geographic()?.convert(x, y)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// All points within `radius` map units of `center`.
    Circle { center: Coord<f64>, radius: f64 },
    Polygon(Polygon<f64>),
}

impl Geometry {
    pub fn circle(x: f64, y: f64, radius: f64) -> Result<Self> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(EngineError::InvalidConfig {
                field: "radius".into(),
                reason: format!("must be a positive distance, got {radius}"),
            });
        }
        Ok(Geometry::Circle {
            center: coord! { x: x, y: y },
            radius,
        })
    }

    /// Polygon from an exterior ring; the ring is closed if needed.
    pub fn polygon(ring: Vec<(f64, f64)>) -> Result<Self> {
        if ring.len() < 3 {
            return Err(EngineError::InvalidConfig {
                field: "polygon".into(),
                reason: format!("needs at least 3 vertices, got {}", ring.len()),
            });
        }
        Ok(Geometry::Polygon(Polygon::new(LineString::from(ring), vec![])))
    }

    /// Circular buffer of `radius_m` ground metres around a geographic point.
    ///
    /// Mercator stretches distances by `1 / cos(lat)`, so the radius is scaled
    /// to keep the buffer's ground size.
    pub fn buffered_site(lon: f64, lat: f64, radius_m: f64) -> Result<Self> {
        let (x, y) = lonlat_to_mercator(lon, lat)?;
        let scale = 1.0 / lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians().cos();
        Self::circle(x, y, radius_m * scale)
    }

    /// Polygon from a geographic ring of `(lon, lat)` vertices.
    pub fn geographic_polygon(ring: &[(f64, f64)]) -> Result<Self> {
        let reprojector = Reprojector::to_map()?;
        let projected = ring
            .iter()
            .map(|&(lon, lat)| {
                reprojector.convert(lon, lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::polygon(projected)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        match self {
            Geometry::Circle { center, radius } => {
                let (dx, dy) = (x - center.x, y - center.y);
                dx * dx + dy * dy <= radius * radius
            }
            Geometry::Polygon(poly) => poly.contains(&Point::new(x, y)),
        }
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            Geometry::Circle { center, radius } => Some(Rect::new(
                coord! { x: center.x - radius, y: center.y - radius },
                coord! { x: center.x + radius, y: center.y + radius },
            )),
            Geometry::Polygon(poly) => poly.bounding_rect(),
        }
    }

    /// Whether the geometry overlaps an axis-aligned footprint.
    pub fn intersects_rect(&self, rect: &Rect<f64>) -> bool {
        match self {
            Geometry::Circle { center, radius } => {
                let nx = center.x.clamp(rect.min().x, rect.max().x);
                let ny = center.y.clamp(rect.min().y, rect.max().y);
                let (dx, dy) = (center.x - nx, center.y - ny);
                dx * dx + dy * dy <= radius * radius
            }
            Geometry::Polygon(poly) => poly.intersects(rect),
        }
    }

    /// Representative centre: the circle centre or the bounding box centre.
    pub fn center(&self) -> Option<(f64, f64)> {
        match self {
            Geometry::Circle { center, .. } => Some((center.x, center.y)),
            Geometry::Polygon(_) => self.bounding_rect().map(|r| {
                let c = r.center();
                (c.x, c.y)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circle_contains() {
        let g = Geometry::circle(0.0, 0.0, 10.0).unwrap();
        assert!(g.contains(3.0, 4.0));
        assert!(g.contains(10.0, 0.0));
        assert!(!g.contains(8.0, 8.0));
    }

    #[test]
    fn test_circle_rejects_bad_radius() {
        assert!(Geometry::circle(0.0, 0.0, 0.0).is_err());
        assert!(Geometry::circle(0.0, 0.0, f64::NAN).is_err());
    }

    #[test]
    fn test_polygon_contains_and_bounds() {
        let g = Geometry::polygon(vec![(0.0, 0.0), (20.0, 0.0), (20.0, 20.0), (0.0, 20.0)]).unwrap();
        assert!(g.contains(5.0, 5.0));
        assert!(!g.contains(25.0, 5.0));
        let b = g.bounding_rect().unwrap();
        assert_eq!((b.min().x, b.max().y), (0.0, 20.0));
    }

    #[test]
    fn test_circle_rect_intersection() {
        let rect = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 });
        assert!(Geometry::circle(15.0, 5.0, 6.0).unwrap().intersects_rect(&rect));
        assert!(!Geometry::circle(15.0, 5.0, 4.0).unwrap().intersects_rect(&rect));
        assert!(!Geometry::circle(14.0, 14.0, 5.0).unwrap().intersects_rect(&rect));
    }

    #[test]
    fn test_mercator_roundtrip() {
        let (x, y) = lonlat_to_mercator(23.5714, 46.0686).unwrap();
        let (lon, lat) = mercator_to_lonlat(x, y).unwrap();
        assert!((lon - 23.5714).abs() < 1e-9);
        assert!((lat - 46.0686).abs() < 1e-9);
    }

    #[test]
    fn test_mercator_known_points() {
        let (x, y) = lonlat_to_mercator(0.0, 0.0).unwrap();
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6);

        // 180 degrees of longitude is half the equator
        let (x, _) = lonlat_to_mercator(180.0, 0.0).unwrap();
        assert!((x - 20_037_508.342_789).abs() < 1e-3, "{x}");

        let (_, y) = lonlat_to_mercator(0.0, 45.0).unwrap();
        assert!((y - 5_621_521.486_192).abs() < 1e-3, "{y}");

        let (_, pole) = lonlat_to_mercator(0.0, 90.0).unwrap();
        assert!(pole.is_finite());
    }

    #[test]
    fn test_geographic_polygon_is_projected() {
        let g = Geometry::geographic_polygon(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)])
            .unwrap();
        let b = g.bounding_rect().unwrap();
        assert!((b.max().x - 111_319.490_793).abs() < 1e-3, "{}", b.max().x);
        assert!(b.min().x.abs() < 1e-6);
    }

    #[test]
    fn test_buffered_site_scales_radius() {
        match Geometry::buffered_site(0.0, 60.0, 1000.0).unwrap() {
            Geometry::Circle { radius, .. } => assert!((radius - 2000.0).abs() < 1e-6),
            other => panic!("expected circle, got {other:?}"),
        }
    }
}
