//! Merge and post-processing of evaluated units.

use std::collections::BTreeSet;

use chrono::Datelike;
use housing_inventory_models::unit::EvaluatedUnit;
use housing_inventory_models::{Crs, ParcelType};

use crate::InventoryError;

/// Square meters per acre.
pub const SQUARE_METERS_PER_ACRE: f64 = 4046.8564;

/// Earliest built year considered plausible.
pub const EARLIEST_BUILT_YEAR: i64 = 1846;

/// Concatenates evaluator outputs, keeping evaluator order.
///
/// # Errors
///
/// Returns [`InventoryError::DuplicateUnitIds`] if a `PARCEL_ID` was
/// produced more than once.
pub fn concat_evaluated(
    groups: impl IntoIterator<Item = Vec<EvaluatedUnit>>,
) -> Result<Vec<EvaluatedUnit>, InventoryError> {
    let units: Vec<EvaluatedUnit> = groups.into_iter().flatten().collect();

    let mut seen = BTreeSet::new();
    let duplicates: BTreeSet<&str> = units
        .iter()
        .map(|unit| unit.parcel_id.as_str())
        .filter(|id| !seen.insert(*id))
        .collect();

    if !duplicates.is_empty() {
        return Err(InventoryError::DuplicateUnitIds {
            keys: duplicates.into_iter().map(ToString::to_string).collect(),
        });
    }

    Ok(units)
}

/// Uses the parcel description as the note where no note was set.
#[must_use]
pub fn fill_notes(mut units: Vec<EvaluatedUnit>) -> Vec<EvaluatedUnit> {
    for unit in &mut units {
        if unit.note.is_none() {
            unit.note.clone_from(&unit.description);
        }
    }
    units
}

/// Corrects unit counts by category, in order:
///
/// 1. single family with no units gets 1
/// 2. duplexes always have 2
/// 3. former triplex/quadplex parcels take the house count when it is
///    larger than the address-point count
///
/// A missing unit count is treated as 0.
#[must_use]
pub fn update_unit_count(mut units: Vec<EvaluatedUnit>) -> Vec<EvaluatedUnit> {
    let single_family = ParcelType::SingleFamily.as_ref();
    let duplex = ParcelType::Duplex.as_ref();
    let triplex_quadplex = ParcelType::TriplexQuadplex.as_ref();

    for unit in &mut units {
        let count = unit.unit_count.unwrap_or(0);

        if unit.subtype == single_family && count == 0 {
            unit.unit_count = Some(1);
        }

        if unit.subtype == duplex {
            unit.unit_count = Some(2);
        }

        if unit.note.as_deref() == Some(triplex_quadplex)
            && let Some(house_count) = unit.house_count
            && unit.unit_count.unwrap_or(0) < house_count
        {
            unit.unit_count = Some(house_count);
        }
    }
    units
}

/// Fills missing unit and house counts with 0 and drops units where both
/// are 0.
#[must_use]
pub fn remove_zero_unit_house_counts(units: Vec<EvaluatedUnit>) -> Vec<EvaluatedUnit> {
    let before = units.len();
    let kept: Vec<_> = units
        .into_iter()
        .map(|mut unit| {
            unit.unit_count.get_or_insert(0);
            unit.house_count.get_or_insert(0);
            unit
        })
        .filter(|unit| unit.unit_count != Some(0) || unit.house_count != Some(0))
        .collect();

    log::info!(
        "Removed {} units without a unit or house count",
        before - kept.len()
    );
    kept
}

/// Sets the built decade from the built year, relative to this year.
#[must_use]
pub fn built_decade(units: Vec<EvaluatedUnit>) -> Vec<EvaluatedUnit> {
    built_decade_as_of(units, i64::from(chrono::Utc::now().year()))
}

/// Sets the built decade, warning about years before 1846 or more than
/// two years after `current_year`.
#[must_use]
pub fn built_decade_as_of(
    mut units: Vec<EvaluatedUnit>,
    current_year: i64,
) -> Vec<EvaluatedUnit> {
    let latest = current_year + 2;
    let mut invalid = 0_usize;

    for unit in &mut units {
        unit.built_decade = unit.built_year.map(|year| {
            if !(EARLIEST_BUILT_YEAR..=latest).contains(&year) {
                invalid += 1;
            }
            year.div_euclid(10) * 10
        });
    }

    if invalid > 0 {
        log::warn!("{}", built_year_range_warning(invalid, latest));
    }
    units
}

fn built_year_range_warning(invalid: usize, latest: i64) -> String {
    format!(
        "{invalid} parcels have an invalid built year \
         (before {EARLIEST_BUILT_YEAR} or after {latest})"
    )
}

/// Computes acreage from polygon area, assuming meters.
#[must_use]
pub fn acreages(mut units: Vec<EvaluatedUnit>, crs: Crs) -> Vec<EvaluatedUnit> {
    if crs != Crs::Utm12N {
        log::warn!("Input data not in UTM 12N (input sr: {crs}). Acreages may be inaccurate.");
    }

    for unit in &mut units {
        unit.acres = Some(housing_inventory_spatial::area(&unit.geometry) / SQUARE_METERS_PER_ACRE);
    }
    units
}

/// Dwelling units per acre. Units without a positive acreage get none.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn dwelling_units_per_acre(mut units: Vec<EvaluatedUnit>) -> Vec<EvaluatedUnit> {
    for unit in &mut units {
        unit.dua = match (unit.unit_count, unit.acres) {
            (Some(count), Some(acres)) if acres > 0.0 => Some(count as f64 / acres),
            _ => None,
        };
    }
    units
}

/// Numbers units from 1 in their current order.
#[must_use]
pub fn assign_unit_ids(mut units: Vec<EvaluatedUnit>) -> Vec<EvaluatedUnit> {
    for (id, unit) in (1_u64..).zip(units.iter_mut()) {
        unit.unit_id = Some(id);
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{MultiPolygon, Rect, coord};
    use housing_inventory_models::UnitType;
    use proptest::prelude::*;

    #[test]
    fn built_year_warning_names_the_accepted_range() {
        assert_eq!(
            built_year_range_warning(3, 2028),
            "3 parcels have an invalid built year (before 1846 or after 2028)"
        );
    }

    fn square(size: f64) -> MultiPolygon<f64> {
        let rect = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: size, y: size });
        MultiPolygon::new(vec![rect.to_polygon()])
    }

    fn unit(id: &str, subtype: &str) -> EvaluatedUnit {
        EvaluatedUnit::new(
            square(1.0),
            id.to_string(),
            UnitType::MultiFamily,
            subtype.to_string(),
        )
    }

    fn counted(unit_count: Option<u64>, house_count: Option<u64>) -> EvaluatedUnit {
        let mut u = unit("1", "apartment");
        u.unit_count = unit_count;
        u.house_count = house_count;
        u
    }

    #[test]
    fn concat_keeps_evaluator_order() {
        let merged = concat_evaluated(vec![
            vec![unit("990001", "pud")],
            vec![unit("1", "single_family"), unit("2", "single_family")],
            vec![],
        ])
        .unwrap();

        let ids: Vec<_> = merged.iter().map(|u| u.parcel_id.as_str()).collect();
        assert_eq!(ids, ["990001", "1", "2"]);
    }

    #[test]
    fn concat_rejects_repeated_parcel_ids() {
        let err = concat_evaluated(vec![
            vec![unit("1", "single_family"), unit("2", "duplex")],
            vec![unit("2", "apartment"), unit("1", "mobile_home_park")],
        ])
        .unwrap_err();

        assert_eq!(err.to_string(), "Index has duplicate keys: 1, 2");
    }

    #[test]
    fn notes_fall_back_to_description() {
        let mut described = unit("1", "duplex");
        described.description = Some("DUPLEX".to_string());
        let mut noted = unit("2", "apartment");
        noted.note = Some("triplex-quadplex".to_string());
        noted.description = Some("4-PLEX".to_string());

        let units = fill_notes(vec![described, noted, unit("3", "apartment")]);

        assert_eq!(units[0].note.as_deref(), Some("DUPLEX"));
        assert_eq!(units[1].note.as_deref(), Some("triplex-quadplex"));
        assert_eq!(units[2].note, None);
    }

    #[test]
    fn unit_counts_are_corrected_by_category() {
        let mut single = unit("1", "single_family");
        single.unit_count = Some(0);
        let mut duplex = unit("2", "duplex");
        duplex.unit_count = Some(1);
        let mut apartment = unit("3", "apartment");
        apartment.note = Some("triplex-quadplex".to_string());
        apartment.unit_count = Some(1);
        apartment.house_count = Some(4);

        let counts: Vec<_> = update_unit_count(vec![single, duplex, apartment])
            .iter()
            .map(|u| u.unit_count)
            .collect();

        assert_eq!(counts, [Some(1), Some(2), Some(4)]);
    }

    #[test]
    fn address_counts_above_house_count_are_kept() {
        let mut apartment = unit("3", "apartment");
        apartment.note = Some("triplex-quadplex".to_string());
        apartment.unit_count = Some(5);
        apartment.house_count = Some(4);

        let units = update_unit_count(vec![apartment]);
        assert_eq!(units[0].unit_count, Some(5));
    }

    #[test]
    fn only_rows_with_both_counts_zero_are_removed() {
        let units = remove_zero_unit_house_counts(vec![
            counted(Some(0), Some(0)),
            counted(Some(0), Some(1)),
            counted(Some(1), Some(0)),
            counted(Some(1), Some(1)),
        ]);

        let counts: Vec<_> = units.iter().map(|u| (u.unit_count, u.house_count)).collect();
        assert_eq!(
            counts,
            [(Some(0), Some(1)), (Some(1), Some(0)), (Some(1), Some(1))]
        );
    }

    #[test]
    fn missing_counts_are_filled_before_filtering() {
        let units =
            remove_zero_unit_house_counts(vec![counted(None, None), counted(None, Some(3))]);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].unit_count, Some(0));
    }

    #[test]
    fn decades_floor_the_built_year() {
        let years = [Some(1987), Some(2000), Some(1845), None, Some(2031)];
        let units = years
            .iter()
            .map(|&year| {
                let mut u = unit("1", "single_family");
                u.built_year = year;
                u
            })
            .collect();

        let decades: Vec<_> = built_decade_as_of(units, 2026)
            .iter()
            .map(|u| u.built_decade)
            .collect();

        assert_eq!(decades, [Some(1980), Some(2000), Some(1840), None, Some(2030)]);
    }

    #[test]
    fn acres_and_density_from_area() {
        let mut u = unit("1", "apartment");
        u.geometry = square(SQUARE_METERS_PER_ACRE.sqrt() * 2.0);
        u.unit_count = Some(8);

        let units = dwelling_units_per_acre(acreages(vec![u], Crs::Utm12N));

        let acres = units[0].acres.unwrap();
        assert!((acres - 4.0).abs() < 1e-9);
        assert!((units[0].dua.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn zero_acreage_has_no_density() {
        let mut u = unit("1", "apartment");
        u.geometry = MultiPolygon::new(vec![]);
        u.unit_count = Some(3);

        let units = dwelling_units_per_acre(acreages(vec![u], Crs::Utm12N));

        assert_eq!(units[0].acres, Some(0.0));
        assert_eq!(units[0].dua, None);
    }

    #[test]
    fn unit_ids_are_sequential_from_one() {
        let units = assign_unit_ids(vec![unit("a", "x"), unit("b", "x"), unit("c", "x")]);
        let ids: Vec<_> = units.iter().map(|u| u.unit_id).collect();
        assert_eq!(ids, [Some(1), Some(2), Some(3)]);
    }

    fn arbitrary_unit() -> impl Strategy<Value = EvaluatedUnit> {
        (
            prop::sample::select(vec!["single_family", "duplex", "apartment", "townhome", "pud"]),
            prop::option::of(prop::sample::select(vec!["triplex-quadplex", "RES"])),
            prop::option::of(0_u64..20),
            prop::option::of(0_u64..20),
        )
            .prop_map(|(subtype, note, unit_count, house_count)| {
                let mut u = unit("1", subtype);
                u.note = note.map(ToString::to_string);
                u.unit_count = unit_count;
                u.house_count = house_count;
                u
            })
    }

    proptest! {
        #[test]
        fn unit_count_correction_is_idempotent(
            units in prop::collection::vec(arbitrary_unit(), 0..20),
        ) {
            let once = update_unit_count(units);
            let twice = update_unit_count(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn no_row_survives_with_both_counts_zero(
            units in prop::collection::vec(arbitrary_unit(), 0..20),
        ) {
            let kept = remove_zero_unit_house_counts(units);
            prop_assert!(kept
                .iter()
                .all(|u| u.unit_count != Some(0) || u.house_count != Some(0)));
        }
    }
}
