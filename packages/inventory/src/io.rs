//! `GeoJSON` and CSV adapters.
//!
//! Layers are read from `GeoJSON` feature collections. The coordinate
//! reference system comes from the legacy top-level `crs` member that GIS
//! exports still write (`urn:ogc:def:crs:EPSG::26912` or `EPSG:26912`);
//! files without one are assumed to be WGS84 per RFC 7946.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use geo::{Geometry, MultiPolygon, Point};
use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue};
use housing_inventory_models::unit::{EvaluatedUnit, InventoryRow};
use housing_inventory_models::{
    Crs, Feature, FieldValue, Layer, PointLayer, PolygonLayer, Properties,
};

use crate::InventoryError;

/// Reads a polygon layer. Features without a polygon geometry are kept
/// with an empty geometry so later stages can report them.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a `GeoJSON`
/// feature collection.
pub fn read_polygon_layer(path: &Path) -> Result<PolygonLayer, InventoryError> {
    let (crs, raw) = read_feature_collection(path)?;

    let mut non_polygon = 0_usize;
    let features = raw
        .into_iter()
        .map(|(geometry, properties)| {
            let polygon = match geometry {
                Some(Geometry::MultiPolygon(mp)) => mp,
                Some(Geometry::Polygon(p)) => MultiPolygon::new(vec![p]),
                Some(_) => {
                    non_polygon += 1;
                    MultiPolygon::new(vec![])
                }
                None => MultiPolygon::new(vec![]),
            };
            Feature::new(polygon, properties)
        })
        .collect::<Vec<_>>();

    if non_polygon > 0 {
        log::warn!(
            "{non_polygon} features in {} are not polygons",
            path.display()
        );
    }
    log::info!("Read {} polygons from {}", features.len(), path.display());

    Ok(Layer::new(crs, features))
}

/// Reads a point layer. Features without a point geometry are skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a `GeoJSON`
/// feature collection.
pub fn read_point_layer(path: &Path) -> Result<PointLayer, InventoryError> {
    let (crs, raw) = read_feature_collection(path)?;
    let total = raw.len();

    let features = raw
        .into_iter()
        .filter_map(|(geometry, properties)| {
            let point: Point<f64> = match geometry? {
                Geometry::Point(p) => p,
                Geometry::MultiPoint(mp) if mp.0.len() == 1 => mp.0[0],
                _ => return None,
            };
            Some(Feature::new(point, properties))
        })
        .collect::<Vec<_>>();

    if features.len() < total {
        log::warn!(
            "{} features in {} had no point geometry and were skipped",
            total - features.len(),
            path.display()
        );
    }
    log::info!("Read {} points from {}", features.len(), path.display());

    Ok(Layer::new(crs, features))
}

/// Reads every CSV row as text. Empty cells become [`FieldValue::Null`].
///
/// # Errors
///
/// Returns an error if the file cannot be opened or a row is malformed.
pub fn read_csv_records(path: &Path) -> Result<Vec<Properties>, InventoryError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let properties = headers
            .iter()
            .zip(row.iter())
            .map(|(header, value)| {
                let value = if value.trim().is_empty() {
                    FieldValue::Null
                } else {
                    FieldValue::from(value)
                };
                (header.to_string(), value)
            })
            .collect();
        records.push(properties);
    }

    log::info!("Read {} rows from {}", records.len(), path.display());
    Ok(records)
}

/// Writes units as a `GeoJSON` feature collection tagged with `crs`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_geojson(units: &[EvaluatedUnit], crs: Crs, path: &Path) -> Result<(), InventoryError> {
    let features = units
        .iter()
        .map(|unit| {
            let properties = row_properties(&InventoryRow::from(unit))?;
            Ok(geojson::Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&unit.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>, InventoryError>>()?;

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(crs_member(crs)),
    };

    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, &collection)?;

    log::info!("Wrote {} features to {}", units.len(), path.display());
    Ok(())
}

/// Writes units as CSV in output-schema column order, without geometry.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_csv(units: &[EvaluatedUnit], path: &Path) -> Result<(), InventoryError> {
    let mut writer = csv::Writer::from_path(path)?;
    for unit in units {
        writer.serialize(InventoryRow::from(unit))?;
    }
    writer.flush()?;

    log::info!("Wrote {} rows to {}", units.len(), path.display());
    Ok(())
}

type RawFeature = (Option<Geometry<f64>>, Properties);

fn read_feature_collection(path: &Path) -> Result<(Crs, Vec<RawFeature>), InventoryError> {
    let reader = BufReader::new(File::open(path)?);
    let geojson = GeoJson::from_reader(reader)?;
    parse_feature_collection(geojson, &path.display().to_string())
}

fn parse_feature_collection(
    geojson: GeoJson,
    source: &str,
) -> Result<(Crs, Vec<RawFeature>), InventoryError> {
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(InventoryError::Conversion {
            message: format!("{source} is not a GeoJSON FeatureCollection"),
        });
    };

    let crs = collection
        .foreign_members
        .as_ref()
        .and_then(crs_from_members)
        .unwrap_or_default();

    let features = collection
        .features
        .into_iter()
        .map(|feature| {
            let geometry = feature
                .geometry
                .map(Geometry::<f64>::try_from)
                .transpose()?;
            let properties = feature
                .properties
                .unwrap_or_default()
                .into_iter()
                .map(|(name, value)| (name, json_to_field(value)))
                .collect();
            Ok((geometry, properties))
        })
        .collect::<Result<Vec<_>, InventoryError>>()?;

    Ok((crs, features))
}

/// Parses the EPSG code out of a legacy `crs` member.
fn crs_from_members(members: &JsonObject) -> Option<Crs> {
    let name = members
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    let code = name.rsplit(':').next()?.parse::<u32>().ok()?;
    Some(Crs::from_epsg(code))
}

fn crs_member(crs: Crs) -> JsonObject {
    let mut members = JsonObject::new();
    members.insert(
        "crs".to_string(),
        serde_json::json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", crs.epsg()) }
        }),
    );
    members
}

fn json_to_field(value: JsonValue) -> FieldValue {
    match value {
        JsonValue::Null => FieldValue::Null,
        JsonValue::Bool(b) => FieldValue::Integer(i64::from(b)),
        JsonValue::Number(n) => n
            .as_i64()
            .map(FieldValue::Integer)
            .or_else(|| n.as_f64().map(FieldValue::Float))
            .unwrap_or(FieldValue::Null),
        JsonValue::String(s) => FieldValue::Text(s),
        other => FieldValue::Text(other.to_string()),
    }
}

fn row_properties(row: &InventoryRow) -> Result<JsonObject, InventoryError> {
    match serde_json::to_value(row)? {
        JsonValue::Object(map) => Ok(map),
        other => Err(InventoryError::Conversion {
            message: format!("inventory row serialized to non-object {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARCELS: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::26912" } },
        "features": [
            {
                "type": "Feature",
                "geometry": { "type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]] },
                "properties": { "PARCEL_ID": "000000001", "HOUSE_CNT": 1, "BLDG_SQFT": 1500.5 }
            },
            {
                "type": "Feature",
                "geometry": null,
                "properties": { "PARCEL_ID": "000000002", "PRIMARY_RES": true }
            }
        ]
    }"#;

    #[test]
    fn parses_crs_and_properties() {
        let geojson: GeoJson = PARCELS.parse().unwrap();
        let (crs, features) = parse_feature_collection(geojson, "parcels").unwrap();

        assert_eq!(crs, Crs::Utm12N);
        assert_eq!(features.len(), 2);

        let (geometry, properties) = &features[0];
        assert!(matches!(geometry, Some(Geometry::Polygon(_))));
        assert_eq!(properties["PARCEL_ID"], FieldValue::from("000000001"));
        assert_eq!(properties["HOUSE_CNT"], FieldValue::Integer(1));
        assert_eq!(properties["BLDG_SQFT"], FieldValue::Float(1500.5));

        let (geometry, properties) = &features[1];
        assert!(geometry.is_none());
        assert_eq!(properties["PRIMARY_RES"], FieldValue::Integer(1));
    }

    #[test]
    fn missing_crs_defaults_to_wgs84() {
        let geojson: GeoJson = r#"{"type":"FeatureCollection","features":[]}"#.parse().unwrap();
        let (crs, features) = parse_feature_collection(geojson, "empty").unwrap();
        assert_eq!(crs, Crs::Wgs84);
        assert!(features.is_empty());
    }

    #[test]
    fn short_crs_names_are_understood() {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            serde_json::json!({ "type": "name", "properties": { "name": "EPSG:26912" } }),
        );
        assert_eq!(crs_from_members(&members), Some(Crs::Utm12N));
    }

    #[test]
    fn crs_member_round_trips() {
        assert_eq!(crs_from_members(&crs_member(Crs::Utm12N)), Some(Crs::Utm12N));
    }

    #[test]
    fn bare_geometry_is_rejected() {
        let geojson: GeoJson = r#"{"type":"Point","coordinates":[1,2]}"#.parse().unwrap();
        assert!(matches!(
            parse_feature_collection(geojson, "point"),
            Err(InventoryError::Conversion { .. })
        ));
    }
}
