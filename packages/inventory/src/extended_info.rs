//! Joins assessor CSV attributes onto parcels.
//!
//! The CSV is keyed by an account number that spreadsheet tools tend to
//! strip leading zeros from, so keys are zero-padded back to the parcel id
//! width before matching.

use std::collections::BTreeMap;

use housing_inventory_models::config::ExtendedInfoConfig;
use housing_inventory_models::{FieldValue, Layer, Properties};

use crate::InventoryError;

/// CSV rows indexed by padded join key.
pub type ExtendedInfo = BTreeMap<String, Properties>;

/// Left-pads `key` with zeros to `width` characters.
#[must_use]
pub fn pad_key(key: &str, width: usize) -> String {
    format!("{key:0>width$}")
}

/// Indexes CSV records by their padded join key, keeping only the
/// configured fields. Rows without a join key are dropped.
///
/// # Errors
///
/// Returns [`InventoryError::MissingField`] if a configured column is absent
/// and [`InventoryError::NonUniqueJoin`] if a padded key repeats.
pub fn index_records(
    records: Vec<Properties>,
    config: &ExtendedInfoConfig,
) -> Result<ExtendedInfo, InventoryError> {
    if let Some(first) = records.first() {
        if let Some(missing) = std::iter::once(&config.join_field)
            .chain(&config.fields)
            .find(|field| !first.contains_key(*field))
        {
            return Err(InventoryError::MissingField {
                field: missing.clone(),
                dataset: "csv".to_string(),
            });
        }
    }

    let mut unkeyed = 0_usize;
    let mut index = ExtendedInfo::new();

    for mut record in records {
        let Some(key) = record
            .get(&config.join_field)
            .and_then(FieldValue::key_string)
        else {
            unkeyed += 1;
            continue;
        };
        let key = pad_key(&key, config.pad_width);

        let kept: Properties = config
            .fields
            .iter()
            .map(|field| (field.clone(), record.remove(field).unwrap_or_default()))
            .collect();

        if index.insert(key, kept).is_some() {
            return Err(InventoryError::NonUniqueJoin {
                column: config.join_field.clone(),
            });
        }
    }

    if unkeyed > 0 {
        log::warn!(
            "{unkeyed} csv rows had no {} value and were dropped",
            config.join_field
        );
    }

    Ok(index)
}

/// Left-joins `info` onto `layer` by `parcel_key`. Parcels without a match
/// are kept as-is; existing parcel attributes are never overwritten.
#[must_use]
pub fn join_extended_info<G>(layer: Layer<G>, info: &ExtendedInfo, parcel_key: &str) -> Layer<G> {
    let Layer { crs, mut features } = layer;
    let mut matched = 0_usize;

    for feature in &mut features {
        let Some(extra) = feature.key(parcel_key).and_then(|key| info.get(&key)) else {
            continue;
        };
        matched += 1;
        for (field, value) in extra {
            feature
                .properties
                .entry(field.clone())
                .or_insert_with(|| value.clone());
        }
    }

    log::info!(
        "Matched extended info for {matched} of {} parcels",
        features.len()
    );

    Layer::new(crs, features)
}
