//! Merges parcel rows that share a key into a single row.
//!
//! Counties publish one row per improvement, so a parcel with a house and
//! a detached unit shows up twice under the same `PARCEL_ID`. Rows are
//! split into keys that appear once (passed through untouched) and keys
//! that repeat; repeated groups get their geometries unioned and their
//! attributes folded with the configured [`AggregationOp`] per field.

use std::collections::BTreeMap;

use geo::MultiPolygon;
use housing_inventory_models::config::DissolveConfig;
use housing_inventory_models::{AggregationOp, Feature, FieldValue, Layer, PolygonLayer, Properties};

use crate::InventoryError;

/// Rows split by whether their key repeats.
#[derive(Debug, Clone)]
pub struct Partition<G> {
    /// Rows whose key appears more than once, in input order.
    pub duplicates: Vec<Feature<G>>,
    /// Rows whose key appears exactly once, in input order.
    pub uniques: Vec<Feature<G>>,
}

/// Drops rows with no key or an empty geometry.
#[must_use]
pub fn drop_unkeyed(layer: PolygonLayer, key: &str) -> PolygonLayer {
    let before = layer.len();
    let layer =
        layer.filter(|feature| feature.key(key).is_some() && !feature.geometry.0.is_empty());

    let dropped = before - layer.len();
    if dropped > 0 {
        log::warn!("{dropped} parcels had no {key} or an empty geometry and were dropped");
    }
    layer
}

/// Splits `features` into duplicate-key and unique-key rows.
///
/// Rows without a key are grouped together, matching how a missing key
/// would compare equal to another missing key.
///
/// # Errors
///
/// Returns [`InventoryError::RowCountMismatch`] if the two halves do not
/// add up to the input.
pub fn partition<G>(features: Vec<Feature<G>>, key: &str) -> Result<Partition<G>, InventoryError> {
    let original = features.len();

    let mut counts: BTreeMap<Option<String>, usize> = BTreeMap::new();
    for feature in &features {
        *counts.entry(feature.key(key)).or_default() += 1;
    }

    let (duplicates, uniques): (Vec<_>, Vec<_>) = features
        .into_iter()
        .partition(|feature| counts.get(&feature.key(key)).copied().unwrap_or(0) > 1);

    log::debug!(
        "{original} original rows, {} duplicates and {} uniques",
        duplicates.len(),
        uniques.len()
    );

    check_partition_counts(duplicates.len(), uniques.len(), original)?;

    Ok(Partition { duplicates, uniques })
}

fn check_partition_counts(
    duplicates: usize,
    uniques: usize,
    original: usize,
) -> Result<(), InventoryError> {
    if duplicates + uniques == original {
        Ok(())
    } else {
        Err(InventoryError::RowCountMismatch {
            duplicates,
            uniques,
            original,
        })
    }
}

/// Whether every row holds bit-identical values across `test_fields`.
///
/// An empty field list never counts as identical, so groups without any
/// evidence of being repeated records are summed.
#[must_use]
pub fn rows_identical(rows: &[&Properties], test_fields: &[String]) -> bool {
    let Some((first, rest)) = rows.split_first() else {
        return false;
    };
    if test_fields.is_empty() {
        return false;
    }

    rest.iter().all(|row| {
        test_fields.iter().all(|field| {
            field_value(first, field).is_identical(field_value(row, field))
        })
    })
}

/// Sums `field` across `rows`, unless the rows are identical across
/// `test_fields`, in which case they are the same record listed more than
/// once and the first value is returned.
#[must_use]
pub fn smart_sum(rows: &[&Properties], field: &str, test_fields: &[String]) -> FieldValue {
    if rows_identical(rows, test_fields) {
        return rows
            .first()
            .map_or(FieldValue::Null, |row| field_value(row, field).clone());
    }
    sum(rows.iter().map(|row| field_value(row, field)))
}

/// Folds a group's values for `field` with `op`.
#[must_use]
pub fn aggregate(
    rows: &[&Properties],
    field: &str,
    op: AggregationOp,
    test_fields: &[String],
) -> FieldValue {
    let mut values = rows.iter().map(|row| field_value(row, field));
    match op {
        #[allow(clippy::cast_possible_wrap)]
        AggregationOp::Count => FieldValue::Integer(rows.len() as i64),
        AggregationOp::First => values
            .find(|value| !value.is_null())
            .cloned()
            .unwrap_or_default(),
        AggregationOp::Max => max(values),
        AggregationOp::Sum => smart_sum(rows, field, test_fields),
    }
}

/// Dissolves rows sharing `config.key`.
///
/// Unique rows come first, unchanged and in input order, followed by one
/// row per duplicate key in key order. Dissolved rows carry only the key
/// and the fields named in `config.fields`.
///
/// # Errors
///
/// Returns an error if the partition invariant fails or the dissolved
/// geometries and attributes do not pair up one to one.
pub fn dissolve(
    layer: PolygonLayer,
    config: &DissolveConfig,
) -> Result<PolygonLayer, InventoryError> {
    let crs = layer.crs;
    let Partition { duplicates, uniques } = partition(layer.features, &config.key)?;

    let mut groups: BTreeMap<Option<String>, Vec<Feature<MultiPolygon<f64>>>> = BTreeMap::new();
    for feature in duplicates {
        groups.entry(feature.key(&config.key)).or_default().push(feature);
    }

    let geometries = dissolve_geometries(&groups);
    let attributes = dissolve_attributes(&groups, config);
    let dissolved = combine(geometries, attributes, &config.key)?;

    log::info!(
        "Dissolved {} duplicate keys; {} unique rows kept",
        dissolved.len(),
        uniques.len()
    );

    let mut features = uniques;
    features.extend(dissolved);
    Ok(Layer::new(crs, features))
}

type Groups = BTreeMap<Option<String>, Vec<Feature<MultiPolygon<f64>>>>;

fn dissolve_geometries(groups: &Groups) -> BTreeMap<Option<String>, MultiPolygon<f64>> {
    groups
        .iter()
        .map(|(key, rows)| {
            let shapes: Vec<MultiPolygon<f64>> =
                rows.iter().map(|row| row.geometry.clone()).collect();
            (key.clone(), housing_inventory_spatial::union_all(&shapes))
        })
        .collect()
}

fn dissolve_attributes(
    groups: &Groups,
    config: &DissolveConfig,
) -> BTreeMap<Option<String>, Properties> {
    groups
        .iter()
        .map(|(key, rows)| {
            let rows: Vec<&Properties> = rows.iter().map(|row| &row.properties).collect();

            let mut properties: Properties = config
                .fields
                .iter()
                .filter(|(field, _)| **field != config.key)
                .map(|(field, op)| {
                    (
                        field.clone(),
                        aggregate(&rows, field, *op, &config.test_fields),
                    )
                })
                .collect();
            properties.insert(
                config.key.clone(),
                key.clone().map_or(FieldValue::Null, FieldValue::Text),
            );

            (key.clone(), properties)
        })
        .collect()
}

fn combine(
    mut geometries: BTreeMap<Option<String>, MultiPolygon<f64>>,
    attributes: BTreeMap<Option<String>, Properties>,
    key: &str,
) -> Result<Vec<Feature<MultiPolygon<f64>>>, InventoryError> {
    if geometries.len() != attributes.len() {
        return Err(InventoryError::NonOneToOneMerge {
            key: key.to_string(),
            message: format!(
                "{} geometries for {} attribute rows",
                geometries.len(),
                attributes.len()
            ),
        });
    }

    attributes
        .into_iter()
        .map(|(group_key, properties)| {
            let geometry = geometries.remove(&group_key).ok_or_else(|| {
                InventoryError::NonOneToOneMerge {
                    key: key.to_string(),
                    message: format!(
                        "no geometry for {}",
                        group_key.as_deref().unwrap_or("<null>")
                    ),
                }
            })?;
            Ok(Feature::new(geometry, properties))
        })
        .collect()
}

fn field_value<'a>(row: &'a Properties, field: &str) -> &'a FieldValue {
    static NULL: FieldValue = FieldValue::Null;
    row.get(field).unwrap_or(&NULL)
}

/// Sums numeric values, skipping nulls. Stays integral when every value is.
fn sum<'a>(values: impl Iterator<Item = &'a FieldValue>) -> FieldValue {
    let mut int_total = 0_i64;
    let mut float_total = 0.0_f64;
    let mut all_integers = true;

    for value in values {
        match value {
            FieldValue::Integer(v) => {
                int_total = int_total.saturating_add(*v);
                #[allow(clippy::cast_precision_loss)]
                {
                    float_total += *v as f64;
                }
            }
            other => {
                if let Some(v) = other.as_f64() {
                    all_integers = false;
                    float_total += v;
                }
            }
        }
    }

    if all_integers {
        FieldValue::Integer(int_total)
    } else {
        FieldValue::Float(float_total)
    }
}

fn max<'a>(values: impl Iterator<Item = &'a FieldValue>) -> FieldValue {
    let mut best: Option<&FieldValue> = None;
    let mut best_value = f64::NEG_INFINITY;

    for value in values {
        let Some(v) = value.as_f64() else {
            continue;
        };
        if best.is_none() || v > best_value {
            best = Some(value);
            best_value = v;
        }
    }

    best.cloned().unwrap_or_default()
}
