#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry primitives and in-memory spatial indexes for parcel
//! classification.
//!
//! Wraps the handful of `geo` operations the inventory pipeline relies on
//! (interior points, pairwise polygon union, planar area) and provides two
//! R-tree indexes: [`AreaIndex`] answers "which polygons contain this
//! point" for centroid-within joins, and [`PointIndex`] answers "which
//! points fall inside this polygon" for address point counts.

pub mod projection;

pub use projection::{ProjectionError, reproject_point, reproject_polygon};

use geo::{Area, BooleanOps, BoundingRect, Contains, InteriorPoint, MultiPolygon, Point};
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree, RTreeObject};

/// A point guaranteed to lie inside the polygon, or `None` when the
/// geometry is empty.
#[must_use]
pub fn centroid(polygon: &MultiPolygon<f64>) -> Option<Point<f64>> {
    polygon.interior_point()
}

#[must_use]
pub fn union(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    a.union(b)
}

/// Unions every polygon by recursive pairwise union.
///
/// Returns an empty [`MultiPolygon`] for empty input.
#[must_use]
pub fn union_all(polygons: &[MultiPolygon<f64>]) -> MultiPolygon<f64> {
    match polygons {
        [] => MultiPolygon::new(vec![]),
        [single] => single.clone(),
        [first, second] => union(first, second),
        [first, rest @ ..] => union(first, &union_all(rest)),
    }
}

/// Planar area in the geometry's native units.
#[must_use]
pub fn area(polygon: &MultiPolygon<f64>) -> f64 {
    polygon.unsigned_area()
}

#[must_use]
pub fn contains(polygon: &MultiPolygon<f64>, point: &Point<f64>) -> bool {
    polygon.contains(point)
}

/// A polygon stored in the R-tree with its position in the source layer.
struct AreaEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for AreaEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over a polygon layer for point-in-polygon lookups.
pub struct AreaIndex {
    tree: RTree<AreaEntry>,
}

impl AreaIndex {
    /// Indexes `polygons` by their position in the iterator. Empty
    /// geometries are skipped since they can never contain a point.
    #[must_use]
    pub fn new<'a>(polygons: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Self {
        let entries = polygons
            .into_iter()
            .enumerate()
            .filter_map(|(index, polygon)| {
                compute_envelope(polygon).map(|envelope| AreaEntry {
                    index,
                    envelope,
                    polygon: polygon.clone(),
                })
            })
            .collect::<Vec<_>>();
        log::debug!("Indexed {} polygons", entries.len());

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Positions of every polygon containing `point`, ascending.
    ///
    /// More than one result means the source polygons overlap.
    #[must_use]
    pub fn containing(&self, point: &Point<f64>) -> Vec<usize> {
        let query_env = AABB::from_point([point.x(), point.y()]);

        let mut matches: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.contains(point))
            .map(|entry| entry.index)
            .collect();
        matches.sort_unstable();
        matches
    }
}

/// R-tree over a point layer for polygon-contains-point counts.
pub struct PointIndex {
    tree: RTree<GeomWithData<[f64; 2], usize>>,
}

impl PointIndex {
    /// Indexes `points` by their position in the iterator.
    #[must_use]
    pub fn new<'a>(points: impl IntoIterator<Item = &'a Point<f64>>) -> Self {
        let entries = points
            .into_iter()
            .enumerate()
            .map(|(index, point)| GeomWithData::new([point.x(), point.y()], index))
            .collect::<Vec<_>>();
        log::debug!("Indexed {} points", entries.len());

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Positions of every point strictly inside `polygon`, ascending.
    #[must_use]
    pub fn within(&self, polygon: &MultiPolygon<f64>) -> Vec<usize> {
        let Some(envelope) = compute_envelope(polygon) else {
            return vec![];
        };

        let mut matches: Vec<usize> = self
            .tree
            .locate_in_envelope(&envelope)
            .filter(|entry| {
                let [x, y] = *entry.geom();
                polygon.contains(&Point::new(x, y))
            })
            .map(|entry| entry.data)
            .collect();
        matches.sort_unstable();
        matches
    }

    #[must_use]
    pub fn count_within(&self, polygon: &MultiPolygon<f64>) -> usize {
        self.within(polygon).len()
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Rect, coord};

    fn square(min_x: f64, min_y: f64, size: f64) -> MultiPolygon<f64> {
        let rect = Rect::new(
            coord! { x: min_x, y: min_y },
            coord! { x: min_x + size, y: min_y + size },
        );
        MultiPolygon::new(vec![rect.to_polygon()])
    }

    #[test]
    fn area_of_square() {
        assert!((area(&square(0.0, 0.0, 10.0)) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn centroid_lies_inside_polygon() {
        let polygon = square(5.0, 5.0, 2.0);
        let point = centroid(&polygon).unwrap();
        assert!(contains(&polygon, &point));
    }

    #[test]
    fn centroid_of_empty_geometry_is_none() {
        assert!(centroid(&MultiPolygon::new(vec![])).is_none());
    }

    #[test]
    fn union_all_merges_adjacent_squares() {
        let merged = union_all(&[
            square(0.0, 0.0, 1.0),
            square(1.0, 0.0, 1.0),
            square(2.0, 0.0, 1.0),
        ]);
        assert!((area(&merged) - 3.0).abs() < 1e-9);
        assert_eq!(merged.0.len(), 1);
    }

    #[test]
    fn union_all_keeps_disjoint_parts() {
        let merged = union_all(&[square(0.0, 0.0, 1.0), square(5.0, 5.0, 1.0)]);
        assert_eq!(merged.0.len(), 2);
        assert!((area(&merged) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn union_all_of_nothing_is_empty() {
        assert!(union_all(&[]).0.is_empty());
    }

    #[test]
    fn area_index_reports_overlaps() {
        let polygons = [
            square(0.0, 0.0, 10.0),
            square(5.0, 5.0, 10.0),
            square(100.0, 100.0, 1.0),
        ];
        let index = AreaIndex::new(&polygons);

        assert_eq!(index.containing(&Point::new(1.0, 1.0)), vec![0]);
        assert_eq!(index.containing(&Point::new(7.0, 7.0)), vec![0, 1]);
        assert!(index.containing(&Point::new(50.0, 50.0)).is_empty());
    }

    #[test]
    fn area_index_skips_empty_geometries() {
        let polygons = [MultiPolygon::new(vec![]), square(0.0, 0.0, 1.0)];
        let index = AreaIndex::new(&polygons);
        assert_eq!(index.len(), 1);
        assert_eq!(index.containing(&Point::new(0.5, 0.5)), vec![1]);
    }

    #[test]
    fn point_index_counts_contained_points() {
        let points = [
            Point::new(0.5, 0.5),
            Point::new(0.7, 0.2),
            Point::new(3.0, 3.0),
        ];
        let index = PointIndex::new(&points);

        assert_eq!(index.within(&square(0.0, 0.0, 1.0)), vec![0, 1]);
        assert_eq!(index.count_within(&square(2.0, 2.0, 2.0)), 1);
        assert_eq!(index.count_within(&square(10.0, 10.0, 1.0)), 0);
    }
}
