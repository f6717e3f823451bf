#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Record types for the housing unit inventory.
//!
//! Parcels, common areas, and address points are loaded as loosely typed
//! [`Layer`]s whose attributes live in a [`Properties`] map, because every
//! county publishes its own column set. Once parcels are classified they
//! are lifted into the typed [`unit::EvaluatedUnit`] and finally flattened
//! into [`unit::InventoryRow`] for output.

pub mod config;
pub mod field;
pub mod layer;
pub mod unit;

pub use field::{FieldValue, Properties};
pub use layer::{Crs, Feature, Layer, PointLayer, PolygonLayer};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Canonical field names shared by every county once standardized.
pub mod fields {
    pub const PARCEL_ID: &str = "PARCEL_ID";
    pub const PARCEL_TYPE: &str = "parcel_type";
    pub const TYPE: &str = "TYPE";
    pub const SUBTYPE: &str = "SUBTYPE";
    pub const NOTE: &str = "NOTE";
    pub const IS_OUG: &str = "IS_OUG";
    pub const HOUSE_CNT: &str = "HOUSE_CNT";
    pub const UNIT_COUNT: &str = "UNIT_COUNT";
    pub const PARCEL_COUNT: &str = "PARCEL_COUNT";
    pub const TOTAL_MKT_VALUE: &str = "TOTAL_MKT_VALUE";
    pub const LAND_MKT_VALUE: &str = "LAND_MKT_VALUE";
    pub const BLDG_SQFT: &str = "BLDG_SQFT";
    pub const FLOORS_CNT: &str = "FLOORS_CNT";
    pub const BUILT_YR: &str = "BUILT_YR";
    pub const COMMON_AREA_KEY: &str = "common_area_key";
    pub const MOBILE_HOME_KEY: &str = "mobile_home_key";
}

/// Assessor-derived parcel category used to route a parcel to exactly one
/// evaluator.
///
/// Source data is free text; values outside this vocabulary are left
/// unevaluated.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParcelType {
    SingleFamily,
    MultiFamily,
    Duplex,
    Apartment,
    Townhome,
    #[serde(rename = "triplex-quadplex")]
    #[strum(serialize = "triplex-quadplex")]
    TriplexQuadplex,
    MobileHomePark,
    OwnedUnitGrouping,
}

impl ParcelType {
    /// Parcel types evaluated as multi-family units on a single parcel.
    pub const MULTI_FAMILY_SINGLE_PARCEL: &[Self] = &[
        Self::MultiFamily,
        Self::Duplex,
        Self::Apartment,
        Self::Townhome,
        Self::TriplexQuadplex,
    ];

    /// Returns every parcel type.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::SingleFamily,
            Self::MultiFamily,
            Self::Duplex,
            Self::Apartment,
            Self::Townhome,
            Self::TriplexQuadplex,
            Self::MobileHomePark,
            Self::OwnedUnitGrouping,
        ]
    }

    /// Subtype written for multi-family single parcels.
    ///
    /// Triplex/quadplex parcels are reported as apartments.
    #[must_use]
    pub const fn multi_family_subtype(self) -> Self {
        match self {
            Self::TriplexQuadplex => Self::Apartment,
            other => other,
        }
    }
}

/// Top-level housing type of an evaluated unit.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnitType {
    SingleFamily,
    MultiFamily,
}

/// Per-field aggregation applied to duplicate-key groups during dissolve.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AggregationOp {
    /// Number of rows in the group.
    Count,
    /// First non-null value in input order.
    First,
    /// Largest numeric value.
    Max,
    /// Sum, unless every row is identical across the test fields.
    Sum,
}
