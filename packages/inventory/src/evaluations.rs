//! Type evaluators: turn classified parcels into inventory units.
//!
//! Each evaluator selects the parcels of its categories by `parcel_type`
//! and emits one [`EvaluatedUnit`] per unit of record. Single parcels are
//! their own unit; owned unit groupings roll every member parcel up onto
//! the common-area polygon.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use geo::MultiPolygon;
use housing_inventory_models::config::CommonAreaConfig;
use housing_inventory_models::unit::EvaluatedUnit;
use housing_inventory_models::{Feature, ParcelType, PolygonLayer, UnitType, fields};

use crate::InventoryError;
use crate::address_points::AddressPoints;
use crate::built_year::resolve_built_years;
use crate::classify::reproject_layer;

/// Synthesized `PARCEL_ID` offset for owned unit groupings with integer
/// keys.
pub const OUG_PARCEL_ID_OFFSET: i64 = 990_000;

/// Start of the dense id range for owned unit groupings whose key is not
/// an integer or overflows the offset. Ids already taken by integer keys
/// are skipped.
pub const OUG_FALLBACK_PARCEL_ID_OFFSET: i64 = 1_990_000;

fn parcel_type(parcel: &Feature<MultiPolygon<f64>>) -> Option<ParcelType> {
    parcel
        .text(fields::PARCEL_TYPE)
        .and_then(|value| ParcelType::from_str(value).ok())
}

fn parcels_of<'a>(
    parcels: &'a PolygonLayer,
    types: &'a [ParcelType],
) -> impl Iterator<Item = &'a Feature<MultiPolygon<f64>>> + 'a {
    parcels
        .features
        .iter()
        .filter(move |parcel| parcel_type(parcel).is_some_and(|t| types.contains(&t)))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn count_field(parcel: &Feature<MultiPolygon<f64>>, field: &str) -> Option<u64> {
    parcel
        .number(field)
        .filter(|value| *value >= 0.0)
        .map(|value| value.round() as u64)
}

/// Unit for a single parcel with its assessor statistics copied over.
/// Missing numeric values become 0.
fn parcel_unit(
    parcel: &Feature<MultiPolygon<f64>>,
    unit_type: UnitType,
    subtype: String,
    description_field: Option<&str>,
) -> Option<EvaluatedUnit> {
    let parcel_id = parcel.key(fields::PARCEL_ID)?;

    let mut unit = EvaluatedUnit::new(parcel.geometry.clone(), parcel_id, unit_type, subtype);
    unit.total_value = parcel.number(fields::TOTAL_MKT_VALUE).unwrap_or(0.0);
    unit.land_value = parcel.number(fields::LAND_MKT_VALUE).unwrap_or(0.0);
    unit.building_sqft = parcel.number(fields::BLDG_SQFT).unwrap_or(0.0);
    unit.floors = parcel.number(fields::FLOORS_CNT);
    unit.built_year = parcel.get(fields::BUILT_YR).as_i64();
    unit.house_count = count_field(parcel, fields::HOUSE_CNT);
    unit.description = description_field
        .and_then(|field| parcel.text(field))
        .map(ToString::to_string);
    Some(unit)
}

/// Single-family parcels, one dwelling each.
#[must_use]
pub fn single_family(
    parcels: &PolygonLayer,
    description_field: Option<&str>,
) -> Vec<EvaluatedUnit> {
    let units: Vec<_> = parcels_of(parcels, &[ParcelType::SingleFamily])
        .filter_map(|parcel| {
            let mut unit = parcel_unit(
                parcel,
                UnitType::SingleFamily,
                ParcelType::SingleFamily.to_string(),
                description_field,
            )?;
            unit.unit_count = Some(1);
            Some(unit)
        })
        .collect();

    log::info!("Evaluated {} single family parcels", units.len());
    units
}

/// Multi-family buildings on their own parcel, counted by address points.
///
/// The subtype is the parcel type, except triplex/quadplex parcels become
/// apartments with the original category kept in the note.
#[must_use]
pub fn multi_family_single_parcel(
    parcels: &PolygonLayer,
    address_points: &AddressPoints,
    description_field: Option<&str>,
) -> Vec<EvaluatedUnit> {
    let units: Vec<_> = parcels_of(parcels, ParcelType::MULTI_FAMILY_SINGLE_PARCEL)
        .filter_map(|parcel| {
            let original = parcel_type(parcel)?;
            let subtype = original.multi_family_subtype();

            let mut unit = parcel_unit(
                parcel,
                UnitType::MultiFamily,
                subtype.to_string(),
                description_field,
            )?;
            if subtype != original {
                unit.note = Some(original.to_string());
            }
            unit.unit_count = Some(address_points.count_in(&parcel.geometry));
            Some(unit)
        })
        .collect();

    log::info!("Evaluated {} multi family single parcels", units.len());
    units
}

/// Mobile home parks, counted by address points in the parcel.
#[must_use]
pub fn mobile_home_communities(
    parcels: &PolygonLayer,
    address_points: &AddressPoints,
    description_field: Option<&str>,
) -> Vec<EvaluatedUnit> {
    let units: Vec<_> = parcels_of(parcels, &[ParcelType::MobileHomePark])
        .filter_map(|parcel| {
            let mut unit = parcel_unit(
                parcel,
                UnitType::MultiFamily,
                ParcelType::MobileHomePark.to_string(),
                description_field,
            )?;
            unit.unit_count = Some(address_points.count_in(&parcel.geometry));
            Some(unit)
        })
        .collect();

    log::info!("Evaluated {} mobile home communities", units.len());
    units
}

#[derive(Default)]
struct GroupTotals {
    total_value: f64,
    land_value: f64,
    building_sqft: f64,
    floors_sum: f64,
    floors_count: u32,
    parcels: u64,
}

/// Rolls owned-unit-grouping parcels up onto their common areas.
///
/// Values and square footage are summed, floors averaged, and the built
/// year resolved per area; the unit count is the number of address points
/// in the whole common area. Areas that no parcel was classified into are
/// not emitted.
///
/// # Errors
///
/// Returns an error if the common areas cannot be reprojected into the
/// parcel reference system.
pub fn owned_unit_groupings(
    parcels: &PolygonLayer,
    common_areas: &PolygonLayer,
    address_points: &AddressPoints,
    config: &CommonAreaConfig,
) -> Result<Vec<EvaluatedUnit>, InventoryError> {
    let areas = if common_areas.crs == parcels.crs {
        Cow::Borrowed(common_areas)
    } else {
        Cow::Owned(reproject_layer(common_areas.clone(), parcels.crs)?)
    };

    let members: Vec<_> = parcels_of(parcels, &[ParcelType::OwnedUnitGrouping])
        .filter_map(|parcel| parcel.key(fields::COMMON_AREA_KEY).map(|key| (key, parcel)))
        .collect();
    log::debug!(
        "{} parcels being evaluated as owned unit groupings",
        members.len()
    );

    let mut totals = BTreeMap::<String, GroupTotals>::new();
    for (key, parcel) in &members {
        let group = totals.entry(key.clone()).or_default();
        group.total_value += parcel.number(fields::TOTAL_MKT_VALUE).unwrap_or(0.0);
        group.land_value += parcel.number(fields::LAND_MKT_VALUE).unwrap_or(0.0);
        group.building_sqft += parcel.number(fields::BLDG_SQFT).unwrap_or(0.0);
        if let Some(floors) = parcel.number(fields::FLOORS_CNT) {
            group.floors_sum += floors;
            group.floors_count += 1;
        }
        group.parcels += 1;
    }

    let built_years = resolve_built_years(
        members
            .iter()
            .map(|(key, parcel)| (key.clone(), parcel.get(fields::BUILT_YR).as_i64())),
    );

    let address_counts = address_points.count_by_key(&areas.features, fields::COMMON_AREA_KEY);

    let grouped: Vec<_> = areas
        .features
        .iter()
        .filter_map(|area| {
            let key = area.key(fields::COMMON_AREA_KEY)?;
            let group = totals.get(&key)?;
            Some((area, key, group))
        })
        .collect();

    let mut overflowed = 0_usize;
    let integer_ids: Vec<Option<i64>> = grouped
        .iter()
        .map(|(area, _, _)| {
            let int_key = area.get(fields::COMMON_AREA_KEY).as_i64()?;
            let id = OUG_PARCEL_ID_OFFSET.checked_add(int_key);
            if id.is_none() {
                overflowed += 1;
            }
            id
        })
        .collect();
    if overflowed > 0 {
        log::warn!(
            "{overflowed} common area keys are too large to offset by {OUG_PARCEL_ID_OFFSET}"
        );
    }

    let used: BTreeSet<i64> = integer_ids.iter().flatten().copied().collect();
    let mut fallback_ids = (OUG_FALLBACK_PARCEL_ID_OFFSET..).filter(|id| !used.contains(id));
    let mut fallback_count = 0_usize;
    let mut units = Vec::with_capacity(grouped.len());

    for ((area, key, group), integer_id) in grouped.into_iter().zip(integer_ids) {
        let subtype = area
            .text(&config.subtype_field)
            .unwrap_or_default()
            .to_string();
        let unit_type = if subtype == "pud" {
            UnitType::SingleFamily
        } else {
            area.text(&config.type_field)
                .and_then(|value| UnitType::from_str(value).ok())
                .unwrap_or(UnitType::MultiFamily)
        };

        let parcel_id = match integer_id {
            Some(id) => id,
            None => {
                fallback_count += 1;
                fallback_ids.next().unwrap_or(OUG_FALLBACK_PARCEL_ID_OFFSET)
            }
        };

        let mut unit = EvaluatedUnit::new(
            area.geometry.clone(),
            parcel_id.to_string(),
            unit_type,
            subtype,
        );
        unit.is_oug = true;
        unit.total_value = group.total_value;
        unit.land_value = group.land_value;
        unit.building_sqft = group.building_sqft;
        unit.floors = (group.floors_count > 0)
            .then(|| group.floors_sum / f64::from(group.floors_count));
        unit.built_year = built_years.get(&key).copied();
        unit.parcel_count = Some(group.parcels);
        unit.unit_count = Some(address_counts.get(&key).copied().unwrap_or(0));
        units.push(unit);
    }

    if fallback_count > 0 {
        log::warn!(
            "{fallback_count} common area keys have no integer id; \
             assigned PARCEL_IDs from {OUG_FALLBACK_PARCEL_ID_OFFSET}"
        );
    }
    log::info!("Evaluated {} owned unit groupings", units.len());

    Ok(units)
}
