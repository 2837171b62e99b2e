//! Polygon validation, centroid and point-in-polygon helpers.
//!
//! Coordinates are planar longitude/latitude degrees; polygons submitted for
//! forage plots are small enough that a planar centroid is an adequate
//! representative point for point-climate queries.

use geo::{Area, Centroid, Contains, Coord, LineString, Point};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

// ---

/// A `[longitude, latitude]` point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    // ---
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl From<LonLat> for Coord<f64> {
    fn from(p: LonLat) -> Self {
        Coord { x: p.lon, y: p.lat }
    }
}

/// A validated single-ring polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    inner: geo::Polygon<f64>,
}

impl Polygon {
    // ---
    /// Validate a ring of `[lon, lat]` pairs.
    ///
    /// A trailing vertex equal to the first one is treated as an explicit
    /// closure and dropped. Fails with [`ServiceError::InvalidGeometry`] on
    /// malformed pairs, out-of-range values, fewer than three distinct
    /// vertices or zero enclosed area.
    pub fn from_ring(ring: &[Vec<f64>]) -> ServiceResult<Self> {
        // ---
        let mut vertices = Vec::with_capacity(ring.len());
        for (i, pair) in ring.iter().enumerate() {
            let [lon, lat] = pair.as_slice() else {
                return Err(ServiceError::InvalidGeometry(format!(
                    "vertex {i} has {} values, expected [longitude, latitude]",
                    pair.len()
                )));
            };
            let (lon, lat) = (*lon, *lat);
            if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
                return Err(ServiceError::InvalidGeometry(format!(
                    "vertex {i} longitude {lon} outside [-180, 180]"
                )));
            }
            if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
                return Err(ServiceError::InvalidGeometry(format!(
                    "vertex {i} latitude {lat} outside [-90, 90]"
                )));
            }
            vertices.push(LonLat::new(lon, lat));
        }

        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }

        let mut distinct: Vec<LonLat> = Vec::with_capacity(vertices.len());
        for v in &vertices {
            if !distinct.contains(v) {
                distinct.push(*v);
            }
        }
        if distinct.len() < 3 {
            return Err(ServiceError::InvalidGeometry(format!(
                "ring has {} distinct vertices, at least 3 are required",
                distinct.len()
            )));
        }

        // geo closes the exterior ring itself
        let exterior: LineString<f64> = vertices.into_iter().map(Coord::from).collect();
        let polygon = Self {
            inner: geo::Polygon::new(exterior, vec![]),
        };
        if polygon.signed_area() == 0.0 {
            return Err(ServiceError::InvalidGeometry(
                "ring encloses zero area".to_string(),
            ));
        }
        Ok(polygon)
    }

    /// Number of vertices, not counting the closing one.
    pub fn vertex_count(&self) -> usize {
        self.inner.exterior().0.len().saturating_sub(1)
    }

    /// Vertices as `[lon, lat]` pairs with the closing vertex repeated, the
    /// way GeoJSON writes a linear ring.
    pub fn closed_ring(&self) -> Vec<[f64; 2]> {
        self.inner.exterior().coords().map(|c| [c.x, c.y]).collect()
    }

    /// Signed area in square degrees (positive for counter-clockwise rings).
    pub fn signed_area(&self) -> f64 {
        self.inner.signed_area()
    }

    /// Whether `p` lies strictly inside the ring. Used to clip pixel centres.
    pub fn contains(&self, p: LonLat) -> bool {
        self.inner.contains(&Point::from(Coord::from(p)))
    }
}

/// Area-weighted centroid of the ring.
pub fn centroid(polygon: &Polygon) -> ServiceResult<LonLat> {
    // ---
    let area = polygon.signed_area();
    if area == 0.0 || !area.is_finite() {
        return Err(ServiceError::InvalidGeometry(
            "cannot take the centroid of a zero-area ring".to_string(),
        ));
    }

    polygon
        .inner
        .centroid()
        .map(|c| LonLat::new(c.x(), c.y()))
        .ok_or_else(|| ServiceError::InvalidGeometry("ring has no centroid".to_string()))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use approx::assert_relative_eq;

    fn ring(points: &[(f64, f64)]) -> Vec<Vec<f64>> {
        points.iter().map(|(x, y)| vec![*x, *y]).collect()
    }

    #[test]
    fn test_square_centroid() {
        // ---
        let poly = Polygon::from_ring(&ring(&[
            (-60.0, -35.0),
            (-59.0, -35.0),
            (-59.0, -34.0),
            (-60.0, -34.0),
        ]))
        .unwrap();
        let c = centroid(&poly).unwrap();
        assert_relative_eq!(c.lon, -59.5, epsilon = 1e-12);
        assert_relative_eq!(c.lat, -34.5, epsilon = 1e-12);
    }

    #[test]
    fn test_centroid_is_area_weighted_not_vertex_mean() {
        // ---
        // L-shape: vertex mean differs from the area centroid
        let poly = Polygon::from_ring(&ring(&[
            (0.0, 0.0),
            (2.0, 0.0),
            (2.0, 1.0),
            (1.0, 1.0),
            (1.0, 2.0),
            (0.0, 2.0),
        ]))
        .unwrap();
        let c = centroid(&poly).unwrap();
        assert_relative_eq!(c.lon, 5.0 / 6.0, epsilon = 1e-12);
        assert_relative_eq!(c.lat, 5.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_clockwise_ring_has_same_centroid() {
        // ---
        let poly = Polygon::from_ring(&ring(&[(0.0, 0.0), (0.0, 2.0), (4.0, 2.0), (4.0, 0.0)]))
            .unwrap();
        assert!(poly.signed_area() < 0.0);
        let c = centroid(&poly).unwrap();
        assert_relative_eq!(c.lon, 2.0, epsilon = 1e-12);
        assert_relative_eq!(c.lat, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_explicit_closing_vertex_is_dropped() {
        // ---
        let poly =
            Polygon::from_ring(&ring(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)])).unwrap();
        assert_eq!(poly.vertex_count(), 3);
        let ring = poly.closed_ring();
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn test_degenerate_rings_rejected() {
        // ---
        // Too few vertices
        let err = Polygon::from_ring(&ring(&[(0.0, 0.0), (1.0, 1.0)])).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidGeometry(_)));

        // Repeated vertices do not count as distinct
        let err = Polygon::from_ring(&ring(&[(0.0, 0.0), (1.0, 1.0), (1.0, 1.0), (0.0, 0.0)]))
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidGeometry(_)));

        // Collinear ring encloses nothing
        let err = Polygon::from_ring(&ring(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)])).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidGeometry(_)));
    }

    #[test]
    fn test_out_of_range_and_malformed_vertices_rejected() {
        // ---
        assert!(Polygon::from_ring(&ring(&[(0.0, 0.0), (181.0, 0.0), (1.0, 1.0)])).is_err());
        assert!(Polygon::from_ring(&ring(&[(0.0, 0.0), (1.0, -91.0), (1.0, 1.0)])).is_err());
        assert!(Polygon::from_ring(&ring(&[(0.0, f64::NAN), (1.0, 0.0), (1.0, 1.0)])).is_err());

        let malformed = vec![vec![0.0, 0.0], vec![1.0], vec![1.0, 1.0]];
        assert!(Polygon::from_ring(&malformed).is_err());
    }

    #[test]
    fn test_area_of_square_in_square_degrees() {
        // ---
        let poly = Polygon::from_ring(&ring(&[(0.0, 0.0), (2.0, 0.0), (2.0, 3.0), (0.0, 3.0)]))
            .unwrap();
        assert_relative_eq!(poly.signed_area(), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_contains_clips_to_ring() {
        // ---
        let poly = Polygon::from_ring(&ring(&[(0.0, 0.0), (2.0, 0.0), (0.0, 2.0)])).unwrap();
        assert!(poly.contains(LonLat::new(0.5, 0.5)));
        assert!(!poly.contains(LonLat::new(1.5, 1.5)));
        assert!(!poly.contains(LonLat::new(-0.1, 0.5)));

        // Boundary points are not inside
        assert!(!poly.contains(LonLat::new(0.0, 0.5)));
        assert!(!poly.contains(LonLat::new(1.0, 1.0)));
    }
}
