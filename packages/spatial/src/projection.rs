//! Reprojection between geographic WGS84 and NAD83 / UTM zone 12N.
//!
//! Parcel layers in this region are published in UTM 12N while boundary
//! and address layers are often distributed in longitude/latitude. These
//! are the only two systems the pipeline converts between; anything else is
//! reported as [`ProjectionError::Unsupported`].
//!
//! Uses the transverse Mercator series expansions from Snyder,
//! *Map Projections: A Working Manual* (USGS PP 1395), on the GRS80
//! ellipsoid. NAD83 and WGS84 are treated as coincident.

use geo::{Coord, MapCoords, MultiPolygon, Point};
use housing_inventory_models::Crs;
use thiserror::Error;

const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
const FLATTENING: f64 = 1.0 / 298.257_222_101;
const SCALE_FACTOR: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const ZONE_12_CENTRAL_MERIDIAN: f64 = -111.0;
const MAX_LATITUDE: f64 = 84.0;

/// Errors that can occur while reprojecting geometries.
#[derive(Debug, Error, PartialEq)]
pub enum ProjectionError {
    /// No transformation is implemented between the two systems.
    #[error("Unsupported reprojection from {from} to {to}")]
    Unsupported {
        /// Source system.
        from: Crs,
        /// Target system.
        to: Crs,
    },

    /// A coordinate is outside the valid domain of the projection.
    #[error("Coordinate ({x}, {y}) is outside the {crs} domain")]
    OutOfDomain {
        /// Offending x / longitude.
        x: f64,
        /// Offending y / latitude.
        y: f64,
        /// System the coordinate was interpreted in.
        crs: Crs,
    },
}

/// Reprojects a single point.
///
/// # Errors
///
/// Returns [`ProjectionError`] if the systems are unsupported or the point
/// is outside the projection's domain.
pub fn reproject_point(
    point: Point<f64>,
    from: Crs,
    to: Crs,
) -> Result<Point<f64>, ProjectionError> {
    transform(point.0, from, to).map(Point::from)
}

/// Reprojects every vertex of a polygon.
///
/// # Errors
///
/// Returns [`ProjectionError`] if the systems are unsupported or any
/// vertex is outside the projection's domain.
pub fn reproject_polygon(
    polygon: &MultiPolygon<f64>,
    from: Crs,
    to: Crs,
) -> Result<MultiPolygon<f64>, ProjectionError> {
    if from == to {
        return Ok(polygon.clone());
    }
    polygon.try_map_coords(|coord| transform(coord, from, to))
}

fn transform(coord: Coord<f64>, from: Crs, to: Crs) -> Result<Coord<f64>, ProjectionError> {
    match (from, to) {
        (a, b) if a == b => Ok(coord),
        (Crs::Wgs84, Crs::Utm12N) => geographic_to_utm(coord),
        (Crs::Utm12N, Crs::Wgs84) => utm_to_geographic(coord),
        (from, to) => Err(ProjectionError::Unsupported { from, to }),
    }
}

struct Ellipsoid {
    e2: f64,
    ep2: f64,
}

impl Ellipsoid {
    const fn grs80() -> Self {
        let e2 = FLATTENING * (2.0 - FLATTENING);
        Self {
            e2,
            ep2: e2 / (1.0 - e2),
        }
    }

    /// Meridional arc length from the equator to latitude `phi`.
    fn meridian_arc(&self, phi: f64) -> f64 {
        let e2 = self.e2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;

        SEMI_MAJOR_AXIS
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
    }
}

fn geographic_to_utm(coord: Coord<f64>) -> Result<Coord<f64>, ProjectionError> {
    let (lon, lat) = (coord.x, coord.y);
    if !lon.is_finite() || !lat.is_finite() || lat.abs() > MAX_LATITUDE || lon.abs() > 180.0 {
        return Err(ProjectionError::OutOfDomain {
            x: lon,
            y: lat,
            crs: Crs::Wgs84,
        });
    }

    let ellipsoid = Ellipsoid::grs80();
    let phi = lat.to_radians();
    let (sin_phi, cos_phi) = phi.sin_cos();
    let tan_phi = phi.tan();

    let n = SEMI_MAJOR_AXIS / (1.0 - ellipsoid.e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ellipsoid.ep2 * cos_phi * cos_phi;
    let a = cos_phi * (lon - ZONE_12_CENTRAL_MERIDIAN).to_radians();
    let m = ellipsoid.meridian_arc(phi);

    let x = SCALE_FACTOR
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ellipsoid.ep2) * a.powi(5) / 120.0)
        + FALSE_EASTING;
    let y = SCALE_FACTOR
        * (m + n
            * tan_phi
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ellipsoid.ep2) * a.powi(6)
                    / 720.0));

    Ok(Coord { x, y })
}

fn utm_to_geographic(coord: Coord<f64>) -> Result<Coord<f64>, ProjectionError> {
    if !coord.x.is_finite() || !coord.y.is_finite() {
        return Err(ProjectionError::OutOfDomain {
            x: coord.x,
            y: coord.y,
            crs: Crs::Utm12N,
        });
    }

    let ellipsoid = Ellipsoid::grs80();
    let e2 = ellipsoid.e2;
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    let m = coord.y / SCALE_FACTOR;
    let mu = m / (SEMI_MAJOR_AXIS * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let (sin_phi1, cos_phi1) = phi1.sin_cos();
    let tan_phi1 = phi1.tan();
    let denom = 1.0 - e2 * sin_phi1 * sin_phi1;

    let n1 = SEMI_MAJOR_AXIS / denom.sqrt();
    let t1 = tan_phi1 * tan_phi1;
    let c1 = ellipsoid.ep2 * cos_phi1 * cos_phi1;
    let r1 = SEMI_MAJOR_AXIS * (1.0 - e2) / denom.powf(1.5);
    let d = (coord.x - FALSE_EASTING) / (n1 * SCALE_FACTOR);

    let phi = phi1
        - (n1 * tan_phi1 / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ellipsoid.ep2) * d.powi(4)
                    / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * ellipsoid.ep2
                    - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lambda = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ellipsoid.ep2 + 24.0 * t1 * t1)
            * d.powi(5)
            / 120.0)
        / cos_phi1;

    let lat = phi.to_degrees();
    let lon = ZONE_12_CENTRAL_MERIDIAN + lambda.to_degrees();
    if !lat.is_finite() || !lon.is_finite() || lat.abs() > MAX_LATITUDE {
        return Err(ProjectionError::OutOfDomain {
            x: coord.x,
            y: coord.y,
            crs: Crs::Utm12N,
        });
    }

    Ok(Coord { x: lon, y: lat })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Rect, coord};
    use proptest::prelude::*;

    #[test]
    fn central_meridian_maps_to_false_easting() {
        let point = reproject_point(Point::new(-111.0, 40.0), Crs::Wgs84, Crs::Utm12N).unwrap();
        assert!((point.x() - 500_000.0).abs() < 1e-6);
        assert!(point.y() > 4_400_000.0 && point.y() < 4_450_000.0);
    }

    #[test]
    fn equator_maps_to_zero_northing() {
        let point = reproject_point(Point::new(-111.0, 0.0), Crs::Wgs84, Crs::Utm12N).unwrap();
        assert!(point.y().abs() < 1e-6);
    }

    #[test]
    fn west_of_meridian_has_smaller_easting() {
        let point = reproject_point(Point::new(-111.9, 41.0), Crs::Wgs84, Crs::Utm12N).unwrap();
        assert!(point.x() < 500_000.0);
    }

    #[test]
    fn same_system_is_identity() {
        let point = Point::new(421_000.0, 4_540_000.0);
        assert_eq!(
            reproject_point(point, Crs::Utm12N, Crs::Utm12N).unwrap(),
            point
        );
    }

    #[test]
    fn unsupported_systems_are_rejected() {
        let err = reproject_point(Point::new(0.0, 0.0), Crs::Other(3857), Crs::Utm12N).unwrap_err();
        assert_eq!(
            err,
            ProjectionError::Unsupported {
                from: Crs::Other(3857),
                to: Crs::Utm12N
            }
        );
    }

    #[test]
    fn polar_latitudes_are_out_of_domain() {
        let err = reproject_point(Point::new(-111.0, 89.0), Crs::Wgs84, Crs::Utm12N).unwrap_err();
        assert!(matches!(err, ProjectionError::OutOfDomain { .. }));
    }

    #[test]
    fn polygon_vertices_are_all_projected() {
        let rect = Rect::new(coord! { x: -112.0, y: 40.9 }, coord! { x: -111.9, y: 41.0 });
        let polygon = MultiPolygon::new(vec![rect.to_polygon()]);

        let projected = reproject_polygon(&polygon, Crs::Wgs84, Crs::Utm12N).unwrap();
        let area = crate::area(&projected);
        // Roughly 8.4 km by 11.1 km.
        assert!(area > 80_000_000.0 && area < 100_000_000.0);
    }

    proptest! {
        #[test]
        fn round_trip_recovers_coordinates(lon in -114.0_f64..-108.0, lat in 36.0_f64..42.5) {
            let projected = reproject_point(Point::new(lon, lat), Crs::Wgs84, Crs::Utm12N).unwrap();
            let back = reproject_point(projected, Crs::Utm12N, Crs::Wgs84).unwrap();
            prop_assert!((back.x() - lon).abs() < 1e-6);
            prop_assert!((back.y() - lat).abs() < 1e-6);
        }
    }
}
