//! Address-point unit counts.
//!
//! Each non-base address point is taken to be one dwelling unit. A base
//! address is the building-level address of a multi-unit structure and
//! would double count the units addressed inside it.

use std::collections::BTreeMap;

use geo::MultiPolygon;
use housing_inventory_models::config::AddressPointConfig;
use housing_inventory_models::{Crs, Feature, PointLayer};
use housing_inventory_spatial::{PointIndex, reproject_point};

use crate::InventoryError;

/// Drops base addresses. Points without a type are kept.
#[must_use]
pub fn non_base_address_points(layer: PointLayer, config: &AddressPointConfig) -> PointLayer {
    let before = layer.len();
    let kept = layer.filter(|point| {
        point.text(&config.type_field) != Some(config.base_address_value.as_str())
    });
    log::info!(
        "{} of {before} address points are not base addresses",
        kept.len()
    );
    kept
}

/// Address points indexed for polygon counts in a fixed reference system.
pub struct AddressPoints {
    crs: Crs,
    index: PointIndex,
}

impl AddressPoints {
    /// Reprojects `layer` into `crs` and indexes it.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Reprojection`] if a point cannot be
    /// transformed.
    pub fn new(layer: &PointLayer, crs: Crs) -> Result<Self, InventoryError> {
        let points = layer
            .features
            .iter()
            .map(|point| reproject_point(point.geometry, layer.crs, crs))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            crs,
            index: PointIndex::new(&points),
        })
    }

    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Points inside `polygon`.
    #[must_use]
    pub fn count_in(&self, polygon: &MultiPolygon<f64>) -> u64 {
        self.index.count_within(polygon) as u64
    }

    /// Counts points per target key. Keys whose polygons contain no points
    /// are absent, as are targets without a key.
    #[must_use]
    pub fn count_by_key(
        &self,
        targets: &[Feature<MultiPolygon<f64>>],
        key: &str,
    ) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for target in targets {
            let Some(target_key) = target.key(key) else {
                continue;
            };
            let count = self.count_in(&target.geometry);
            if count > 0 {
                *counts.entry(target_key).or_default() += count;
            }
        }
        counts
    }
}
