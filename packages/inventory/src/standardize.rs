//! Renames county-specific columns to canonical names.

use std::collections::BTreeMap;

use housing_inventory_models::{Layer, Properties};

use crate::InventoryError;

/// Renames `{source: canonical}` fields on every feature.
///
/// All renames apply at once, so a mapping may swap two columns. A renamed
/// field replaces an unmapped field of the same name. An empty layer is
/// returned unchanged.
///
/// # Errors
///
/// Returns [`InventoryError::MissingField`] if a source field is not
/// present on any feature of a non-empty layer.
pub fn standardize_fields<G>(
    layer: Layer<G>,
    mapping: &BTreeMap<String, String>,
    dataset: &str,
) -> Result<Layer<G>, InventoryError> {
    if layer.is_empty() {
        return Ok(layer);
    }

    if let Some(missing) = mapping.keys().find(|source| !layer.has_field(source)) {
        return Err(InventoryError::MissingField {
            field: missing.clone(),
            dataset: dataset.to_string(),
        });
    }

    let Layer { crs, mut features } = layer;
    for feature in &mut features {
        let (renamed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut feature.properties)
            .into_iter()
            .partition(|(name, _)| mapping.contains_key(name));

        let mut properties: Properties = kept.into_iter().collect();
        properties.extend(renamed.into_iter().filter_map(|(name, value)| {
            mapping.get(&name).map(|canonical| (canonical.clone(), value))
        }));
        feature.properties = properties;
    }

    Ok(Layer::new(crs, features))
}
