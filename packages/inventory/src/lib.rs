#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Housing unit inventory pipeline.
//!
//! Turns a county's assessor parcels into one row per housing unit:
//! duplicate parcel rows are dissolved, parcels are classified by the
//! common areas and mobile home communities their centroids fall in, each
//! category is evaluated into units with address-point unit counts, and
//! the merged result is corrected, tagged with reporting geographies, and
//! written out.
//!
//! Every stage is a function from an owned collection to a new one; the
//! [`pipeline`] module chains them for a [`CountyConfig`] from the
//! [`registry`].
//!
//! [`CountyConfig`]: housing_inventory_models::config::CountyConfig

pub mod address_points;
pub mod built_year;
pub mod calculate;
pub mod classify;
pub mod dissolve;
pub mod evaluations;
pub mod extended_info;
pub mod io;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod standardize;

use housing_inventory_spatial::ProjectionError;
use thiserror::Error;

/// Errors that abort a county run.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Reading or writing a file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(Box<geojson::Error>),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A layer could not be brought into the target reference system.
    #[error("Reprojection failed: {0}")]
    Reprojection(#[from] ProjectionError),

    /// A configured source field is absent from a dataset.
    #[error("Field {field} not found in {dataset} dataset.")]
    MissingField {
        /// Field that was expected.
        field: String,
        /// Dataset that was searched.
        dataset: String,
    },

    /// A column required to uniquely identify rows has repeats.
    #[error("Unique key column {column} does not contain unique values.")]
    NonUniqueKey {
        /// Offending column.
        column: String,
    },

    /// A CSV join column has repeats.
    #[error("Values in csv join field {column} are not unique.")]
    NonUniqueJoin {
        /// Offending column.
        column: String,
    },

    /// Partitioning into duplicates and uniques lost or gained rows.
    #[error(
        "Duplicates plus uniques don't equal original: {duplicates} + {uniques} != {original}"
    )]
    RowCountMismatch {
        /// Rows whose key repeats.
        duplicates: usize,
        /// Rows whose key is unique.
        uniques: usize,
        /// Rows before partitioning.
        original: usize,
    },

    /// Dissolved geometries and attributes did not pair up one to one.
    #[error("Dissolved geometries and attributes do not merge 1:1 on {key}: {message}")]
    NonOneToOneMerge {
        /// Dissolve key field.
        key: String,
        /// Description of the mismatch.
        message: String,
    },

    /// The same `PARCEL_ID` came out of more than one evaluator.
    #[error("Index has duplicate keys: {}", keys.join(", "))]
    DuplicateUnitIds {
        /// Repeated ids.
        keys: Vec<String>,
    },

    /// No county with this id is registered.
    #[error("Unknown county: {0}")]
    UnknownCounty(String),

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

impl From<geojson::Error> for InventoryError {
    fn from(value: geojson::Error) -> Self {
        Self::GeoJson(Box::new(value))
    }
}
