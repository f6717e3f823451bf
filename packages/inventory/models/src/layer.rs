//! Feature collections with a coordinate reference system.

use std::fmt;

use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};

use crate::field::{FieldValue, Properties};

static NULL: FieldValue = FieldValue::Null;

/// Coordinate reference system of a layer, identified by EPSG code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crs {
    /// EPSG:4326, longitude/latitude degrees.
    #[default]
    Wgs84,
    /// EPSG:26912, NAD83 / UTM zone 12N in meters.
    Utm12N,
    Other(u32),
}

impl Crs {
    #[must_use]
    pub const fn from_epsg(code: u32) -> Self {
        match code {
            4326 => Self::Wgs84,
            26912 => Self::Utm12N,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn epsg(self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::Utm12N => 26912,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// A geometry plus its attribute map.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature<G> {
    pub geometry: G,
    pub properties: Properties,
}

impl<G> Feature<G> {
    #[must_use]
    pub const fn new(geometry: G, properties: Properties) -> Self {
        Self {
            geometry,
            properties,
        }
    }

    /// Returns the value for `field`, or [`FieldValue::Null`] when absent.
    #[must_use]
    pub fn get(&self, field: &str) -> &FieldValue {
        self.properties.get(field).unwrap_or(&NULL)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.properties.insert(field.into(), value.into());
    }

    #[must_use]
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).as_text()
    }

    #[must_use]
    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).as_f64()
    }

    /// Key string of `field`, see [`FieldValue::key_string`].
    #[must_use]
    pub fn key(&self, field: &str) -> Option<String> {
        self.get(field).key_string()
    }

    /// Replaces the geometry, keeping attributes.
    #[must_use]
    pub fn with_geometry<H>(self, geometry: H) -> Feature<H> {
        Feature {
            geometry,
            properties: self.properties,
        }
    }
}

/// An ordered feature collection in a single CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer<G> {
    pub crs: Crs,
    pub features: Vec<Feature<G>>,
}

pub type PolygonLayer = Layer<MultiPolygon<f64>>;
pub type PointLayer = Layer<Point<f64>>;

impl<G> Layer<G> {
    #[must_use]
    pub const fn new(crs: Crs, features: Vec<Feature<G>>) -> Self {
        Self { crs, features }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Whether any feature carries `field`.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.features
            .iter()
            .any(|feature| feature.properties.contains_key(field))
    }

    /// Keeps features matching `predicate`.
    #[must_use]
    pub fn filter(self, predicate: impl Fn(&Feature<G>) -> bool) -> Self {
        Self {
            crs: self.crs,
            features: self
                .features
                .into_iter()
                .filter(|feature| predicate(feature))
                .collect(),
        }
    }
}
