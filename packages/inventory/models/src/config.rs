//! Per-county pipeline configuration, deserialized from TOML.
//!
//! Every county runs the same stages; what differs is where the inputs
//! live, what the source columns are called, and how duplicate parcel rows
//! are dissolved. All of that is captured here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::AggregationOp;

/// A county inventory run definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountyConfig {
    /// Unique identifier used on the command line (e.g. `"davis"`).
    pub id: String,
    /// Human-readable name (e.g. "Davis County").
    pub name: String,
    /// Value written to the `COUNTY` column of every output row.
    pub county: String,
    /// Input file names, relative to the run's input directory.
    pub inputs: InputPaths,
    /// Duplicate parcel dissolve rules.
    pub dissolve: DissolveConfig,
    /// Optional CSV with descriptions and assessor class per account.
    pub extended_info: Option<ExtendedInfoConfig>,
    /// `{source_field: canonical_field}` renames applied after the CSV join.
    #[serde(default)]
    pub standardize: BTreeMap<String, String>,
    /// Parcel column holding a free-text description used to fill `NOTE`.
    pub description_field: Option<String>,
    #[serde(default)]
    pub address_points: AddressPointConfig,
    pub common_areas: CommonAreaConfig,
    pub mobile_home_communities: MobileHomeConfig,
    pub geographies: GeographyConfig,
}

impl CountyConfig {
    /// Returns the county identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the human-readable county name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Input file names for a county run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputPaths {
    pub parcels: String,
    pub address_points: String,
    pub common_areas: String,
    pub mobile_home_communities: String,
    pub extended_info: Option<String>,
    pub cities: String,
    pub subcounties: String,
    pub blocks: Option<String>,
    pub tracts: Option<String>,
}

/// How duplicate parcel rows are merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DissolveConfig {
    /// Field identifying a parcel (normally `PARCEL_ID`).
    pub key: String,
    /// Fields compared to decide whether a duplicate group is one record
    /// listed several times.
    #[serde(default)]
    pub test_fields: Vec<String>,
    /// Aggregation applied to each retained field of a duplicate group.
    pub fields: BTreeMap<String, AggregationOp>,
}

/// Left join of an assessor CSV onto parcels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedInfoConfig {
    /// CSV column matched against the parcel key.
    pub join_field: String,
    /// Width the join field is zero-padded to before matching.
    pub pad_width: usize,
    /// CSV columns copied onto matching parcels.
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressPointConfig {
    pub type_field: String,
    pub base_address_value: String,
}

impl Default for AddressPointConfig {
    fn default() -> Self {
        Self {
            type_field: "PtType".to_string(),
            base_address_value: "BASE ADDRESS".to_string(),
        }
    }
}

/// Reviewed common-area polygons used to find owned unit groupings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonAreaConfig {
    /// Row-unique column copied to `common_area_key`.
    pub unique_key: String,
    pub type_field: String,
    pub subtype_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobileHomeConfig {
    /// Row-unique column copied to `mobile_home_key`.
    pub unique_key: String,
}

/// Source columns of the reporting-geography layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeographyConfig {
    pub city_field: String,
    pub subcounty_field: String,
    pub block_field: Option<String>,
    pub tract_field: Option<String>,
}
