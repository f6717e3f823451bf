//! End-to-end inventory run for one county.
//!
//! Stages run strictly in sequence; each consumes the previous stage's
//! output. Any fatal error aborts the run before output is written.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use housing_inventory_models::config::CountyConfig;
use housing_inventory_models::unit::EvaluatedUnit;
use housing_inventory_models::{Crs, PolygonLayer, fields};

use crate::InventoryError;
use crate::address_points::{AddressPoints, non_base_address_points};
use crate::calculate;
use crate::classify::{self, ClassifyInfo, GeographyLayers};
use crate::dissolve::{dissolve, drop_unkeyed};
use crate::evaluations;
use crate::extended_info::{index_records, join_extended_info};
use crate::io;
use crate::progress::ProgressCallback;
use crate::standardize::standardize_fields;

/// Number of progress steps reported by [`run`].
pub const STAGE_COUNT: u64 = 7;

/// Outcome of a county run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub county: String,
    /// Parcels after dissolving duplicate rows.
    pub parcels: usize,
    /// Output rows.
    pub units: usize,
    /// Sum of `UNIT_COUNT` over all output rows.
    pub dwelling_units: u64,
    pub geojson_path: PathBuf,
    pub csv_path: PathBuf,
}

/// Output file stem for a county, e.g. `davis_housing_inventory`.
#[must_use]
pub fn output_stem(config: &CountyConfig) -> String {
    format!("{}_housing_inventory", config.id())
}

/// Runs the full inventory for `config`, reading inputs from `input_dir`
/// and writing `<id>_housing_inventory.geojson` and `.csv` to
/// `output_dir`.
///
/// # Errors
///
/// Returns the first fatal error from any stage.
pub fn run(
    config: &CountyConfig,
    input_dir: &Path,
    output_dir: &Path,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<RunSummary, InventoryError> {
    let inputs = &config.inputs;
    let input = |name: &str| input_dir.join(name);
    progress.set_total(STAGE_COUNT);

    step(progress, "Reading address points");
    let address_points = non_base_address_points(
        io::read_point_layer(&input(&inputs.address_points))?,
        &config.address_points,
    );

    step(progress, "Dissolving duplicate parcels");
    let parcels = prepare_parcels(config, input_dir)?;
    let parcel_count = parcels.len();
    let crs = parcels.crs;
    log::info!("Initial parcels in modeling area: {parcel_count}");

    step(progress, "Classifying owned unit groupings and mobile home parks");
    let centroids = classify::centroids(&parcels, fields::PARCEL_ID);

    let common_areas = classify::reproject_layer(
        classify::subset_owned_unit_groupings(
            io::read_polygon_layer(&input(&inputs.common_areas))?,
            &config.common_areas,
        )?,
        crs,
    )?;
    let parcels = classify::classify_from_area(
        parcels,
        &centroids,
        common_areas.clone(),
        fields::PARCEL_ID,
        Some(&ClassifyInfo::new(
            fields::COMMON_AREA_KEY,
            fields::PARCEL_TYPE,
            "owned_unit_grouping",
        )),
    )?;

    let mobile_homes = classify::key_mobile_home_communities(
        io::read_polygon_layer(&input(&inputs.mobile_home_communities))?,
        &config.mobile_home_communities,
    )?;
    let parcels = classify::classify_from_area(
        parcels,
        &centroids,
        mobile_homes,
        fields::PARCEL_ID,
        Some(&ClassifyInfo::new(
            fields::MOBILE_HOME_KEY,
            fields::PARCEL_TYPE,
            "mobile_home_park",
        )),
    )?;

    step(progress, "Evaluating parcels");
    let address_points = AddressPoints::new(&address_points, crs)?;
    let description_field = config.description_field.as_deref();
    let units = calculate::concat_evaluated([
        evaluations::owned_unit_groupings(
            &parcels,
            &common_areas,
            &address_points,
            &config.common_areas,
        )?,
        evaluations::single_family(&parcels, description_field),
        evaluations::multi_family_single_parcel(&parcels, &address_points, description_field),
        evaluations::mobile_home_communities(&parcels, &address_points, description_field),
    ])?;

    step(progress, "Adding city and subcounty info");
    let units = classify::assign_geography(
        units,
        crs,
        read_geographies(config, input_dir)?,
        &config.geographies,
        &config.county,
    )?;

    step(progress, "Cleaning up final data");
    let units = post_process(units, crs);

    step(progress, "Writing output");
    std::fs::create_dir_all(output_dir)?;
    let stem = output_stem(config);
    let geojson_path = output_dir.join(format!("{stem}.geojson"));
    let csv_path = output_dir.join(format!("{stem}.csv"));
    io::write_geojson(&units, crs, &geojson_path)?;
    io::write_csv(&units, &csv_path)?;

    let summary = RunSummary {
        county: config.name().to_string(),
        parcels: parcel_count,
        units: units.len(),
        dwelling_units: units.iter().filter_map(|unit| unit.unit_count).sum(),
        geojson_path,
        csv_path,
    };
    progress.finish(format!(
        "{}: {} units ({} dwellings)",
        summary.county, summary.units, summary.dwelling_units
    ));

    Ok(summary)
}

fn step(progress: &Arc<dyn ProgressCallback>, message: &str) {
    log::info!("{message}...");
    progress.set_message(message.to_string());
    progress.inc(1);
}

/// Reads, dissolves, enriches and standardizes the parcel layer.
fn prepare_parcels(
    config: &CountyConfig,
    input_dir: &Path,
) -> Result<PolygonLayer, InventoryError> {
    let parcels = io::read_polygon_layer(&input_dir.join(&config.inputs.parcels))?;
    let parcels = dissolve(drop_unkeyed(parcels, &config.dissolve.key), &config.dissolve)?;

    let parcels = match (&config.extended_info, &config.inputs.extended_info) {
        (Some(info_config), Some(path)) => {
            log::debug!("Merging csv data...");
            let info = index_records(io::read_csv_records(&input_dir.join(path))?, info_config)?;
            join_extended_info(parcels, &info, &config.dissolve.key)
        }
        (Some(_), None) => {
            log::warn!("{} configures extended info but no CSV input", config.id());
            parcels
        }
        _ => parcels,
    };

    standardize_fields(parcels, &config.standardize, "parcels")
}

fn read_geographies(
    config: &CountyConfig,
    input_dir: &Path,
) -> Result<GeographyLayers, InventoryError> {
    let inputs = &config.inputs;
    let optional = |path: Option<&String>| {
        path.map(|path| io::read_polygon_layer(&input_dir.join(path)))
            .transpose()
    };

    Ok(GeographyLayers {
        cities: io::read_polygon_layer(&input_dir.join(&inputs.cities))?,
        subcounties: io::read_polygon_layer(&input_dir.join(&inputs.subcounties))?,
        blocks: optional(inputs.blocks.as_ref())?,
        tracts: optional(inputs.tracts.as_ref())?,
    })
}

/// Unit-count corrections, zero filtering and derived statistics.
#[must_use]
pub fn post_process(units: Vec<EvaluatedUnit>, crs: Crs) -> Vec<EvaluatedUnit> {
    let units = calculate::fill_notes(units);
    let units = calculate::update_unit_count(units);
    let units = calculate::built_decade(units);
    let units = calculate::remove_zero_unit_house_counts(units);
    let units = calculate::acreages(units, crs);
    let units = calculate::dwelling_units_per_acre(units);
    calculate::assign_unit_ids(units)
}
