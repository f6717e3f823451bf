//! Compile-time registry of county pipeline configurations.
//!
//! Each entry is a `(id, toml_content)` pair embedded via `include_str!`.
//! Adding a county requires creating a TOML file in `counties/` and adding
//! a corresponding entry here.

use housing_inventory_models::config::CountyConfig;

use crate::InventoryError;

/// Number of registered counties. Updated when new counties are added.
/// Enforced by a test.
#[cfg(test)]
const EXPECTED_COUNTY_COUNT: usize = 1;

/// Embedded TOML county definitions.
const COUNTY_TOMLS: &[(&str, &str)] = &[("davis", include_str!("../counties/davis.toml"))];

/// Returns all registered counties.
///
/// # Panics
///
/// Panics if any embedded TOML file fails to parse. Since these are
/// compile-time constants, parse failures indicate a development error
/// and are caught during CI.
#[must_use]
pub fn all_counties() -> Vec<CountyConfig> {
    COUNTY_TOMLS
        .iter()
        .map(|(id, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse county config '{id}': {e}"))
        })
        .collect()
}

/// Looks up a registered county by id.
///
/// # Errors
///
/// Returns [`InventoryError::UnknownCounty`] if no county has this id.
pub fn county(id: &str) -> Result<CountyConfig, InventoryError> {
    all_counties()
        .into_iter()
        .find(|county| county.id() == id)
        .ok_or_else(|| InventoryError::UnknownCounty(id.to_string()))
}
