//! Tags parcels and units with attributes of the polygons they fall in.
//!
//! Every join here uses the same predicate: a parcel's interior point is
//! within an area polygon. Using an interior point rather than the parcel
//! outline keeps a parcel that merely touches a neighboring area from
//! matching it.

use std::collections::{BTreeMap, BTreeSet};

use geo::{MultiPolygon, Point};
use housing_inventory_models::config::{CommonAreaConfig, GeographyConfig, MobileHomeConfig};
use housing_inventory_models::unit::EvaluatedUnit;
use housing_inventory_models::{Crs, Feature, Layer, PolygonLayer, fields};
use housing_inventory_spatial::{AreaIndex, reproject_polygon};

use crate::InventoryError;

/// Interior points keyed by parcel key.
pub type Centroids = BTreeMap<String, Point<f64>>;

/// Categorical tag applied to parcels that match any area.
///
/// Parcels whose joined `area_key` is non-null get
/// `target_field = value`.
#[derive(Debug, Clone)]
pub struct ClassifyInfo {
    pub area_key: String,
    pub target_field: String,
    pub value: String,
}

impl ClassifyInfo {
    #[must_use]
    pub fn new(
        area_key: impl Into<String>,
        target_field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            area_key: area_key.into(),
            target_field: target_field.into(),
            value: value.into(),
        }
    }
}

/// Computes one interior point per parcel key. The first parcel wins if a
/// key repeats.
#[must_use]
pub fn centroids(layer: &PolygonLayer, key: &str) -> Centroids {
    let mut points = Centroids::new();
    let mut blank = 0_usize;

    for feature in &layer.features {
        let Some(parcel_key) = feature.key(key) else {
            continue;
        };
        match housing_inventory_spatial::centroid(&feature.geometry) {
            Some(point) => {
                points.entry(parcel_key).or_insert(point);
            }
            None => blank += 1,
        }
    }

    if blank > 0 {
        log::warn!("{blank} blank centroids!");
    }
    points
}

/// Reprojects every polygon of `layer` into `to`.
///
/// # Errors
///
/// Returns [`InventoryError::Reprojection`] if any geometry cannot be
/// transformed.
pub fn reproject_layer(layer: PolygonLayer, to: Crs) -> Result<PolygonLayer, InventoryError> {
    if layer.crs == to {
        return Ok(layer);
    }
    log::info!("Reprojecting {} features from {} to {to}", layer.len(), layer.crs);

    let from = layer.crs;
    let features = layer
        .features
        .into_iter()
        .map(|feature| {
            let geometry = reproject_polygon(&feature.geometry, from, to)?;
            Ok(feature.with_geometry(geometry))
        })
        .collect::<Result<Vec<_>, InventoryError>>()?;

    Ok(Layer::new(to, features))
}

/// Joins the attributes of the area containing each parcel's centroid onto
/// the parcel, keeping the parcel polygon.
///
/// Parcels matching no area are kept unchanged. A parcel inside several
/// overlapping areas is emitted once per area, and a warning is logged,
/// since downstream evaluation will count it more than once. Parcel
/// attributes win over area attributes of the same name; the tag from
/// `classify_info` is always written.
///
/// # Errors
///
/// Returns an error if the areas cannot be reprojected into the parcel
/// reference system, or if the tag's key column is missing from the areas.
pub fn classify_from_area(
    parcels: PolygonLayer,
    centroids: &Centroids,
    areas: PolygonLayer,
    parcel_key: &str,
    classify_info: Option<&ClassifyInfo>,
) -> Result<PolygonLayer, InventoryError> {
    let areas = reproject_layer(areas, parcels.crs)?;

    if let Some(info) = classify_info
        && !areas.is_empty()
        && !areas.has_field(&info.area_key)
    {
        return Err(InventoryError::MissingField {
            field: info.area_key.clone(),
            dataset: "areas".to_string(),
        });
    }

    let index = AreaIndex::new(areas.features.iter().map(|area| &area.geometry));
    let original = parcels.len();
    let crs = parcels.crs;

    let mut joined = Vec::with_capacity(original);
    let mut classified = 0_usize;

    for parcel in parcels.features {
        let matches = parcel
            .key(parcel_key)
            .and_then(|key| centroids.get(&key))
            .map(|point| index.containing(point))
            .unwrap_or_default();

        if matches.is_empty() {
            joined.push(parcel);
            continue;
        }

        for area_index in matches {
            let area = &areas.features[area_index];
            let mut row = parcel.clone();
            for (field, value) in &area.properties {
                row.properties
                    .entry(field.clone())
                    .or_insert_with(|| value.clone());
            }
            if let Some(info) = classify_info
                && !area.get(&info.area_key).is_null()
            {
                row.set(info.target_field.clone(), info.value.as_str());
                classified += 1;
            }
            joined.push(row);
        }
    }

    for warning in join_warnings(&joined, original, parcel_key) {
        log::warn!("{warning}");
    }

    if let Some(info) = classify_info {
        log::info!("Classified {classified} parcels as {}", info.value);
    }

    Ok(Layer::new(crs, joined))
}

/// Selects owned unit groupings from the reviewed common areas.
///
/// Keeps areas whose subtype is `pud` or whose type is `multi_family`,
/// copies the unique key to `common_area_key`, and flags them `IS_OUG`.
///
/// # Errors
///
/// Returns [`InventoryError::NonUniqueKey`] if the unique key column
/// repeats, or [`InventoryError::MissingField`] if it is absent.
pub fn subset_owned_unit_groupings(
    areas: PolygonLayer,
    config: &CommonAreaConfig,
) -> Result<PolygonLayer, InventoryError> {
    check_unique_key(&areas, &config.unique_key, "common areas")?;

    let areas = drop_empty_geometries(areas);

    let mut subset = areas.filter(|area| {
        area.text(&config.subtype_field) == Some("pud")
            || area.text(&config.type_field) == Some("multi_family")
    });

    for area in &mut subset.features {
        let key = area.get(&config.unique_key).clone();
        area.set(fields::COMMON_AREA_KEY, key);
        area.set(fields::IS_OUG, 1_i64);
    }

    log::info!("{} common areas are owned unit groupings", subset.len());
    Ok(subset)
}

/// Copies the mobile home community unique key to `mobile_home_key`.
///
/// # Errors
///
/// Returns [`InventoryError::NonUniqueKey`] if the unique key column
/// repeats, or [`InventoryError::MissingField`] if it is absent.
pub fn key_mobile_home_communities(
    areas: PolygonLayer,
    config: &MobileHomeConfig,
) -> Result<PolygonLayer, InventoryError> {
    check_unique_key(&areas, &config.unique_key, "mobile home communities")?;

    let mut areas = areas;
    for area in &mut areas.features {
        let key = area.get(&config.unique_key).clone();
        area.set(fields::MOBILE_HOME_KEY, key);
    }
    Ok(areas)
}

/// Boundary layers used to tag evaluated units.
pub struct GeographyLayers {
    pub cities: PolygonLayer,
    pub subcounties: PolygonLayer,
    pub blocks: Option<PolygonLayer>,
    pub tracts: Option<PolygonLayer>,
}

/// Attaches city, subcounty, census block and tract, and county to each
/// unit by the position of its interior point.
///
/// Without a tract layer, the tract is the first 11 characters of a
/// 15-character block GEOID.
///
/// # Errors
///
/// Returns an error if a boundary layer cannot be reprojected or lacks its
/// configured field.
pub fn assign_geography(
    mut units: Vec<EvaluatedUnit>,
    units_crs: Crs,
    layers: GeographyLayers,
    config: &GeographyConfig,
    county: &str,
) -> Result<Vec<EvaluatedUnit>, InventoryError> {
    let points: Vec<Option<Point<f64>>> = units
        .iter()
        .map(|unit| housing_inventory_spatial::centroid(&unit.geometry))
        .collect();

    let cities = area_values(&points, layers.cities, units_crs, &config.city_field, "city")?;
    let subcounties = area_values(
        &points,
        layers.subcounties,
        units_crs,
        &config.subcounty_field,
        "subcounty",
    )?;
    let blocks = match (layers.blocks, &config.block_field) {
        (Some(layer), Some(field)) => Some(area_values(&points, layer, units_crs, field, "block")?),
        _ => None,
    };
    let tracts = match (layers.tracts, &config.tract_field) {
        (Some(layer), Some(field)) => Some(area_values(&points, layer, units_crs, field, "tract")?),
        _ => None,
    };

    for (i, unit) in units.iter_mut().enumerate() {
        let geography = &mut unit.geography;
        geography.city.clone_from(&cities[i]);
        geography.subcounty.clone_from(&subcounties[i]);
        geography.county = Some(county.to_string());
        geography.block_fips = blocks.as_ref().and_then(|values| values[i].clone());
        geography.tract_fips = tracts.as_ref().map_or_else(
            || geography.block_fips.as_deref().and_then(tract_from_block),
            |values| values[i].clone(),
        );
    }

    Ok(units)
}

/// Census tract GEOID (state, county, tract) from a block GEOID.
#[must_use]
pub fn tract_from_block(block: &str) -> Option<String> {
    (block.len() == 15 && block.is_ascii()).then(|| block[..11].to_string())
}

/// Value of `field` from the first area containing each point.
fn area_values(
    points: &[Option<Point<f64>>],
    areas: PolygonLayer,
    target_crs: Crs,
    field: &str,
    layer_name: &str,
) -> Result<Vec<Option<String>>, InventoryError> {
    let areas = reproject_layer(areas, target_crs)?;
    if !areas.is_empty() && !areas.has_field(field) {
        return Err(InventoryError::MissingField {
            field: field.to_string(),
            dataset: layer_name.to_string(),
        });
    }

    let index = AreaIndex::new(areas.features.iter().map(|area| &area.geometry));
    let mut overlaps = 0_usize;

    let values = points
        .iter()
        .map(|point| {
            let matches = point.map(|p| index.containing(&p)).unwrap_or_default();
            if matches.len() > 1 {
                overlaps += 1;
            }
            matches
                .first()
                .and_then(|&i| areas.features[i].key(field))
        })
        .collect();

    if overlaps > 0 {
        log::warn!("{overlaps} units fall in more than one {layer_name} polygon; using the first");
    }
    Ok(values)
}

fn check_unique_key(
    areas: &PolygonLayer,
    column: &str,
    dataset: &str,
) -> Result<(), InventoryError> {
    if areas.is_empty() {
        return Ok(());
    }
    if !areas.has_field(column) {
        return Err(InventoryError::MissingField {
            field: column.to_string(),
            dataset: dataset.to_string(),
        });
    }

    let mut seen = BTreeSet::new();
    let unique = areas
        .features
        .iter()
        .all(|area| seen.insert(area.key(column)));
    if unique {
        Ok(())
    } else {
        Err(InventoryError::NonUniqueKey {
            column: column.to_string(),
        })
    }
}

fn drop_empty_geometries(areas: PolygonLayer) -> PolygonLayer {
    let before = areas.len();
    let areas = areas.filter(|area| !area.geometry.0.is_empty());
    let dropped = before - areas.len();
    if dropped > 0 {
        log::warn!("{dropped} common area row[s] had empty geometries");
    }
    areas
}

/// Warnings for a join that changed the row count or repeated parcel keys.
fn join_warnings(
    joined: &[Feature<MultiPolygon<f64>>],
    original: usize,
    parcel_key: &str,
) -> Vec<String> {
    let mut warnings = Vec::new();
    if joined.len() != original {
        warnings.push(format!(
            "Different number of features in joined dataframe ({}) \
             than in original parcels ({original})",
            joined.len()
        ));
    }

    let duplicates = duplicate_key_count(joined, parcel_key);
    if duplicates > 0 {
        warnings.push(format!(
            "{duplicates} duplicate parcel IDs found in join; check areas features for overlaps"
        ));
    }
    warnings
}

fn duplicate_key_count(features: &[Feature<MultiPolygon<f64>>], key: &str) -> usize {
    let mut seen = BTreeSet::new();
    features
        .iter()
        .filter_map(|feature| feature.key(key))
        .filter(|parcel_key| !seen.insert(parcel_key.clone()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Rect, coord};
    use housing_inventory_models::config::GeographyConfig;
    use housing_inventory_models::{FieldValue, Properties, UnitType};

    fn square(min_x: f64, min_y: f64, size: f64) -> MultiPolygon<f64> {
        let rect = Rect::new(
            coord! { x: min_x, y: min_y },
            coord! { x: min_x + size, y: min_y + size },
        );
        MultiPolygon::new(vec![rect.to_polygon()])
    }

    fn feature(
        geometry: MultiPolygon<f64>,
        pairs: &[(&str, FieldValue)],
    ) -> Feature<MultiPolygon<f64>> {
        let properties: Properties = pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect();
        Feature::new(geometry, properties)
    }

    fn parcels() -> PolygonLayer {
        Layer::new(
            Crs::Utm12N,
            vec![
                feature(
                    square(1.0, 1.0, 1.0),
                    &[("PARCEL_ID", "1".into()), ("parcel_type", "single_family".into())],
                ),
                feature(
                    square(50.0, 50.0, 1.0),
                    &[("PARCEL_ID", "2".into()), ("parcel_type", "single_family".into())],
                ),
            ],
        )
    }

    fn common_area(key: i64, min: f64) -> Feature<MultiPolygon<f64>> {
        feature(
            square(min, min, 10.0),
            &[
                ("common_area_key", key.into()),
                ("TYPE_WFRC", "single_family".into()),
                ("SUBTYPE_WFRC", "pud".into()),
                ("parcel_type", "should_not_win".into()),
            ],
        )
    }

    fn oug_info() -> ClassifyInfo {
        ClassifyInfo::new("common_area_key", "parcel_type", "owned_unit_grouping")
    }

    #[test]
    fn classifies_parcels_inside_areas() {
        let parcels = parcels();
        let centroids = centroids(&parcels, "PARCEL_ID");
        let areas = Layer::new(Crs::Utm12N, vec![common_area(7, 0.0)]);

        let classified =
            classify_from_area(parcels, &centroids, areas, "PARCEL_ID", Some(&oug_info())).unwrap();

        assert_eq!(classified.len(), 2);
        let inside = &classified.features[0];
        assert_eq!(inside.text("parcel_type"), Some("owned_unit_grouping"));
        assert_eq!(inside.get("common_area_key"), &FieldValue::Integer(7));
        assert_eq!(inside.text("SUBTYPE_WFRC"), Some("pud"));
        // Parcel keeps its own polygon.
        assert_eq!(inside.geometry, square(1.0, 1.0, 1.0));

        let outside = &classified.features[1];
        assert_eq!(outside.text("parcel_type"), Some("single_family"));
        assert!(outside.get("common_area_key").is_null());
    }

    #[test]
    fn parcel_attributes_win_without_a_tag() {
        let parcels = parcels();
        let centroids = centroids(&parcels, "PARCEL_ID");
        let areas = Layer::new(Crs::Utm12N, vec![common_area(7, 0.0)]);

        let joined = classify_from_area(parcels, &centroids, areas, "PARCEL_ID", None).unwrap();
        assert_eq!(joined.features[0].text("parcel_type"), Some("single_family"));
        assert_eq!(joined.features[0].get("common_area_key"), &FieldValue::Integer(7));
    }

    #[test]
    fn overlapping_areas_duplicate_parcels() {
        let parcels = parcels();
        let centroids = centroids(&parcels, "PARCEL_ID");
        let areas = Layer::new(Crs::Utm12N, vec![common_area(7, 0.0), common_area(8, -1.0)]);

        let classified =
            classify_from_area(parcels, &centroids, areas, "PARCEL_ID", Some(&oug_info())).unwrap();

        assert_eq!(classified.len(), 3);
        assert_eq!(duplicate_key_count(&classified.features, "PARCEL_ID"), 1);
        assert_eq!(
            join_warnings(&classified.features, 2, "PARCEL_ID"),
            [
                "Different number of features in joined dataframe (3) \
                 than in original parcels (2)",
                "1 duplicate parcel IDs found in join; check areas features for overlaps",
            ]
        );
    }

    #[test]
    fn clean_join_has_no_warnings() {
        let parcels = parcels();
        let centroids = centroids(&parcels, "PARCEL_ID");
        let areas = Layer::new(Crs::Utm12N, vec![common_area(7, 0.0)]);

        let classified =
            classify_from_area(parcels, &centroids, areas, "PARCEL_ID", Some(&oug_info())).unwrap();

        assert!(join_warnings(&classified.features, 2, "PARCEL_ID").is_empty());
    }

    #[test]
    fn repeated_input_keys_warn_without_a_row_count_change() {
        let mut parcels = parcels();
        parcels.features[1].set("PARCEL_ID", "1");

        let warnings = join_warnings(&parcels.features, 2, "PARCEL_ID");

        assert_eq!(
            warnings,
            ["1 duplicate parcel IDs found in join; check areas features for overlaps"]
        );
    }

    #[test]
    fn missing_tag_key_is_an_error() {
        let parcels = parcels();
        let centroids = centroids(&parcels, "PARCEL_ID");
        let areas = Layer::new(
            Crs::Utm12N,
            vec![feature(square(0.0, 0.0, 10.0), &[("OBJECTID", 1_i64.into())])],
        );

        let err = classify_from_area(parcels, &centroids, areas, "PARCEL_ID", Some(&oug_info()))
            .unwrap_err();
        assert!(matches!(err, InventoryError::MissingField { .. }));
    }

    #[test]
    fn unsupported_area_crs_is_fatal() {
        let parcels = parcels();
        let centroids = centroids(&parcels, "PARCEL_ID");
        let areas = Layer::new(Crs::Other(3857), vec![common_area(7, 0.0)]);

        let err = classify_from_area(parcels, &centroids, areas, "PARCEL_ID", Some(&oug_info()))
            .unwrap_err();
        assert!(matches!(err, InventoryError::Reprojection(_)));
    }

    fn config() -> CommonAreaConfig {
        CommonAreaConfig {
            unique_key: "OBJECTID".to_string(),
            type_field: "TYPE_WFRC".to_string(),
            subtype_field: "SUBTYPE_WFRC".to_string(),
        }
    }

    fn raw_common_area(
        id: i64,
        kind: &str,
        subtype: &str,
        geometry: MultiPolygon<f64>,
    ) -> Feature<MultiPolygon<f64>> {
        feature(
            geometry,
            &[
                ("OBJECTID", id.into()),
                ("TYPE_WFRC", kind.into()),
                ("SUBTYPE_WFRC", subtype.into()),
            ],
        )
    }

    #[test]
    fn subsets_puds_and_multi_family() {
        let areas = Layer::new(
            Crs::Utm12N,
            vec![
                raw_common_area(1, "single_family", "bar", square(0.0, 0.0, 1.0)),
                raw_common_area(2, "bar", "pud", square(2.0, 0.0, 1.0)),
                raw_common_area(3, "multi_family", "foo", square(4.0, 0.0, 1.0)),
            ],
        );

        let subset = subset_owned_unit_groupings(areas, &config()).unwrap();

        let keys: Vec<_> = subset
            .features
            .iter()
            .map(|f| f.get("common_area_key").clone())
            .collect();
        assert_eq!(keys, [FieldValue::Integer(2), FieldValue::Integer(3)]);
        assert!(subset.features.iter().all(|f| f.get("IS_OUG") == &FieldValue::Integer(1)));
    }

    #[test]
    fn non_unique_common_area_keys_are_an_error() {
        let areas = Layer::new(
            Crs::Utm12N,
            vec![
                raw_common_area(1, "single_family", "bar", square(0.0, 0.0, 1.0)),
                raw_common_area(2, "bar", "pud", square(2.0, 0.0, 1.0)),
                raw_common_area(2, "multi_family", "foo", square(4.0, 0.0, 1.0)),
            ],
        );

        let err = subset_owned_unit_groupings(areas, &config()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unique key column OBJECTID does not contain unique values."
        );
    }

    #[test]
    fn empty_common_area_geometries_are_dropped() {
        let areas = Layer::new(
            Crs::Utm12N,
            vec![
                raw_common_area(1, "multi_family", "bar", MultiPolygon::new(vec![])),
                raw_common_area(2, "bar", "pud", square(2.0, 0.0, 1.0)),
                raw_common_area(3, "multi_family", "foo", square(4.0, 0.0, 1.0)),
            ],
        );

        let subset = subset_owned_unit_groupings(areas, &config()).unwrap();
        assert_eq!(subset.len(), 2);
    }

    #[test]
    fn mobile_home_keys_are_copied() {
        let areas = Layer::new(
            Crs::Utm12N,
            vec![feature(square(0.0, 0.0, 1.0), &[("OBJECTID", 9_i64.into())])],
        );
        let keyed = key_mobile_home_communities(
            areas,
            &MobileHomeConfig {
                unique_key: "OBJECTID".to_string(),
            },
        )
        .unwrap();
        assert_eq!(keyed.features[0].get("mobile_home_key"), &FieldValue::Integer(9));
    }

    #[test]
    fn tract_is_prefix_of_block() {
        assert_eq!(tract_from_block("490111254011000").as_deref(), Some("49011125401"));
        assert_eq!(tract_from_block("4901112540"), None);
    }

    #[test]
    fn geographies_are_assigned_by_interior_point() {
        let unit = EvaluatedUnit::new(
            square(1.0, 1.0, 1.0),
            "1".to_string(),
            UnitType::SingleFamily,
            "single_family".to_string(),
        );
        let cities = Layer::new(
            Crs::Utm12N,
            vec![feature(square(0.0, 0.0, 10.0), &[("NAME", "Kaysville".into())])],
        );
        let subcounties = Layer::new(
            Crs::Utm12N,
            vec![feature(square(0.0, 0.0, 10.0), &[("NewSA", "North".into())])],
        );
        let blocks = Layer::new(
            Crs::Utm12N,
            vec![feature(square(0.0, 0.0, 10.0), &[("GEOID20", "490111254011000".into())])],
        );
        let config = GeographyConfig {
            city_field: "NAME".to_string(),
            subcounty_field: "NewSA".to_string(),
            block_field: Some("GEOID20".to_string()),
            tract_field: None,
        };

        let units = assign_geography(
            vec![unit],
            Crs::Utm12N,
            GeographyLayers {
                cities,
                subcounties,
                blocks: Some(blocks),
                tracts: None,
            },
            &config,
            "DAVIS",
        )
        .unwrap();

        let geography = &units[0].geography;
        assert_eq!(geography.city.as_deref(), Some("Kaysville"));
        assert_eq!(geography.subcounty.as_deref(), Some("North"));
        assert_eq!(geography.county.as_deref(), Some("DAVIS"));
        assert_eq!(geography.block_fips.as_deref(), Some("490111254011000"));
        assert_eq!(geography.tract_fips.as_deref(), Some("49011125401"));
    }
}
