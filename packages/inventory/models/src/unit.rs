//! Evaluated housing units and the flattened output row.

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

use crate::UnitType;

/// Reporting geographies attached to a unit after evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geography {
    pub city: Option<String>,
    pub county: Option<String>,
    pub subcounty: Option<String>,
    pub block_fips: Option<String>,
    pub tract_fips: Option<String>,
}

/// One inventory unit: a single parcel, or an owned unit grouping whose
/// member parcels have been rolled up onto the common-area polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedUnit {
    pub geometry: MultiPolygon<f64>,
    pub parcel_id: String,
    pub unit_type: UnitType,
    pub subtype: String,
    /// Original category when it was rewritten (e.g. `triplex-quadplex`),
    /// otherwise the parcel description.
    pub note: Option<String>,
    pub description: Option<String>,
    pub is_oug: bool,
    /// Dwelling units, from address points or a categorical rule.
    pub unit_count: Option<u64>,
    /// Assessor house count of the source parcel.
    pub house_count: Option<u64>,
    /// Parcels rolled into an owned unit grouping.
    pub parcel_count: Option<u64>,
    pub floors: Option<f64>,
    pub building_sqft: f64,
    pub total_value: f64,
    pub land_value: f64,
    pub built_year: Option<i64>,
    pub built_decade: Option<i64>,
    pub acres: Option<f64>,
    /// Dwelling units per acre.
    pub dua: Option<f64>,
    pub geography: Geography,
    pub unit_id: Option<u64>,
}

impl EvaluatedUnit {
    /// A unit with no statistics attached yet.
    #[must_use]
    pub const fn new(
        geometry: MultiPolygon<f64>,
        parcel_id: String,
        unit_type: UnitType,
        subtype: String,
    ) -> Self {
        Self {
            geometry,
            parcel_id,
            unit_type,
            subtype,
            note: None,
            description: None,
            is_oug: false,
            unit_count: None,
            house_count: None,
            parcel_count: None,
            floors: None,
            building_sqft: 0.0,
            total_value: 0.0,
            land_value: 0.0,
            built_year: None,
            built_decade: None,
            acres: None,
            dua: None,
            geography: Geography {
                city: None,
                county: None,
                subcounty: None,
                block_fips: None,
                tract_fips: None,
            },
            unit_id: None,
        }
    }
}

/// Output schema, one row per unit. Geometry is written separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRow {
    #[serde(rename = "UNIT_ID")]
    pub unit_id: Option<u64>,
    #[serde(rename = "TYPE")]
    pub unit_type: UnitType,
    #[serde(rename = "SUBTYPE")]
    pub subtype: String,
    #[serde(rename = "IS_OUG")]
    pub is_oug: u8,
    #[serde(rename = "UNIT_COUNT")]
    pub unit_count: u64,
    #[serde(rename = "DUA")]
    pub dua: Option<f64>,
    #[serde(rename = "ACRES")]
    pub acres: Option<f64>,
    #[serde(rename = "TOT_BD_FT2")]
    pub building_sqft: f64,
    #[serde(rename = "TOT_VALUE")]
    pub total_value: f64,
    #[serde(rename = "APX_BLT_YR")]
    pub built_year: Option<i64>,
    #[serde(rename = "BLT_DECADE")]
    pub built_decade: Option<i64>,
    #[serde(rename = "CITY")]
    pub city: Option<String>,
    #[serde(rename = "COUNTY")]
    pub county: Option<String>,
    #[serde(rename = "SUBCOUNTY")]
    pub subcounty: Option<String>,
    #[serde(rename = "PARCEL_ID")]
    pub parcel_id: String,
    #[serde(rename = "BLOCK_FIPS")]
    pub block_fips: Option<String>,
    #[serde(rename = "TRACT_FIPS")]
    pub tract_fips: Option<String>,
    #[serde(rename = "NOTE")]
    pub note: Option<String>,
    #[serde(rename = "PARCEL_COUNT")]
    pub parcel_count: Option<u64>,
    /// Floor count rounded to the nearest whole floor.
    #[serde(rename = "APX_HGHT")]
    pub approximate_floors: Option<f64>,
    #[serde(rename = "TOT_LND_VAL")]
    pub land_value: f64,
}

impl From<&EvaluatedUnit> for InventoryRow {
    fn from(unit: &EvaluatedUnit) -> Self {
        Self {
            unit_id: unit.unit_id,
            unit_type: unit.unit_type,
            subtype: unit.subtype.clone(),
            is_oug: u8::from(unit.is_oug),
            unit_count: unit.unit_count.unwrap_or(0),
            dua: unit.dua,
            acres: unit.acres,
            building_sqft: unit.building_sqft,
            total_value: unit.total_value,
            built_year: unit.built_year,
            built_decade: unit.built_decade,
            city: unit.geography.city.clone(),
            county: unit.geography.county.clone(),
            subcounty: unit.geography.subcounty.clone(),
            parcel_id: unit.parcel_id.clone(),
            block_fips: unit.geography.block_fips.clone(),
            tract_fips: unit.geography.tract_fips.clone(),
            note: unit.note.clone(),
            parcel_count: unit.parcel_count,
            approximate_floors: unit.floors.map(f64::round),
            land_value: unit.land_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_carries_note_parcel_count_and_rounded_floors() {
        let mut unit = EvaluatedUnit::new(
            MultiPolygon::new(vec![]),
            "990005".to_string(),
            UnitType::SingleFamily,
            "pud".to_string(),
        );
        unit.note = Some("RES CONDO".to_string());
        unit.parcel_count = Some(3);
        unit.floors = Some(1.5);
        unit.land_value = 42_000.0;

        let row = InventoryRow::from(&unit);

        assert_eq!(row.note.as_deref(), Some("RES CONDO"));
        assert_eq!(row.parcel_count, Some(3));
        assert_eq!(row.approximate_floors, Some(2.0));
        assert!((row.land_value - 42_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_floors_stay_missing() {
        let unit = EvaluatedUnit::new(
            MultiPolygon::new(vec![]),
            "1".to_string(),
            UnitType::MultiFamily,
            "apartment".to_string(),
        );

        let row = InventoryRow::from(&unit);

        assert_eq!(row.approximate_floors, None);
        assert_eq!(row.parcel_count, None);
    }
}
