//! GeoJSON reading and writing for parcel layers and density grids.
//!
//! Input is a FeatureCollection. The legacy (2008) `crs` member is honoured
//! when present so projected layers exported from desktop GIS round-trip
//! without reprojection; RFC 7946 files without it load as `Crs::Unknown`.
//!
//! Output files carry the metric columns under the names used throughout the
//! study (`area_m2`, `compactness_idx`, `morpho_cluster`, ...), so a file
//! written after any stage can be read back by the next one.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value as GeoValue};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::crs::Crs;
use crate::density::Fishnet;
use crate::error::{MorphoError, Result};
use crate::parcel::{Parcel, ParcelMetrics, ParcelSet};

// ── Column names ──────────────────────────────────────────────────────────────

pub const PARCEL_ID: &str = "parcel_id";
pub const AREA: &str = "area_m2";
pub const LOG_AREA: &str = "log_area_m2";
pub const PERIMETER: &str = "perimeter_m";
pub const PERIMETER_AREA_RATIO: &str = "perimeter_area_ratio";
pub const COMPACTNESS: &str = "compactness_idx";
pub const RECTANGULARITY: &str = "rectangularity_idx";
pub const ORIENTATION: &str = "orientation_angle";
pub const CLUSTER: &str = "morpho_cluster";

/// Columns this crate owns; stripped from pass-through attributes on read.
const OWNED_COLUMNS: [&str; 9] = [
    PARCEL_ID,
    AREA,
    LOG_AREA,
    PERIMETER,
    PERIMETER_AREA_RATIO,
    COMPACTNESS,
    RECTANGULARITY,
    ORIENTATION,
    CLUSTER,
];

// ── Reading ───────────────────────────────────────────────────────────────────

/// Read a parcel layer from a GeoJSON FeatureCollection.
///
/// Features whose geometry is null or not (Multi)Polygon are kept with a
/// `None` geometry so the prepare stage can count them when it drops them.
/// Metric columns and `morpho_cluster` written by [`write_parcels`] are
/// restored onto the parcel.
pub fn read_parcels(path: &Path) -> Result<ParcelSet> {
    let text = fs::read_to_string(path).map_err(|e| MorphoError::io(path, e))?;
    let set = parse_parcels(&text)?;
    debug!(path = %path.display(), parcels = set.len(), crs = %set.crs, "read parcel layer");
    Ok(set)
}

/// Parse a GeoJSON document into a parcel layer.
pub fn parse_parcels(text: &str) -> Result<ParcelSet> {
    let geojson: GeoJson = text.parse()?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        GeoJson::Feature(_) => {
            return Err(MorphoError::UnsupportedInput("expected a FeatureCollection, found a single Feature".into()))
        }
        GeoJson::Geometry(_) => {
            return Err(MorphoError::UnsupportedInput("expected a FeatureCollection, found a bare Geometry".into()))
        }
    };

    let crs = match collection.foreign_members.as_ref().and_then(crs_name) {
        Some(name) => Crs::from_name(&name)?,
        None => Crs::Unknown,
    };

    let mut replaced: BTreeMap<&'static str, usize> = BTreeMap::new();
    let parcels = collection
        .features
        .into_iter()
        .enumerate()
        .map(|(idx, feature)| {
            let (parcel, discarded) = parcel_from_feature(idx, feature);
            for key in discarded {
                *replaced.entry(key).or_default() += 1;
            }
            parcel
        })
        .collect();

    for (column, features) in replaced {
        warn!(column, features, "input column holds a value this crate cannot use; it will be replaced on write");
    }

    Ok(ParcelSet::new(crs, parcels))
}

/// Extract `crs.properties.name` from a FeatureCollection's foreign members.
fn crs_name(members: &JsonObject) -> Option<String> {
    members
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

/// Build a parcel from one feature. Also returns the owned columns that were
/// present but could not be restored, since [`write_parcels`] overwrites them.
fn parcel_from_feature(idx: usize, feature: Feature) -> (Parcel, Vec<&'static str>) {
    let geometry = feature.geometry.and_then(|g| multipolygon_from_value(&g.value));
    let mut properties = feature.properties.unwrap_or_default();

    let stored_id = properties.get(PARCEL_ID).and_then(Value::as_u64).map(|v| v as usize);
    let metrics = metrics_from_properties(&properties);
    let cluster = properties.get(CLUSTER).and_then(|v| match v {
        Value::Number(n) => n.as_u64().map(|c| c as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });

    let mut discarded = Vec::new();
    for key in OWNED_COLUMNS {
        let restored = match key {
            PARCEL_ID => stored_id.is_some(),
            CLUSTER => cluster.is_some(),
            _ => metrics.is_some(),
        };
        if properties.remove(key).is_some_and(|v| !v.is_null()) && !restored {
            discarded.push(key);
        }
    }

    let parcel = Parcel { id: stored_id.unwrap_or(idx), geometry, properties, metrics, cluster };
    (parcel, discarded)
}

fn metrics_from_properties(props: &JsonObject) -> Option<ParcelMetrics> {
    let get = |key: &str| props.get(key).and_then(Value::as_f64);
    Some(ParcelMetrics {
        area_m2: get(AREA)?,
        log_area: get(LOG_AREA)?,
        perimeter_m: get(PERIMETER)?,
        perimeter_area_ratio: get(PERIMETER_AREA_RATIO)?,
        compactness_idx: get(COMPACTNESS)?,
        rectangularity_idx: get(RECTANGULARITY)?,
        orientation_deg: get(ORIENTATION)?,
    })
}

fn ring_from_positions(positions: &[Vec<f64>]) -> Option<LineString<f64>> {
    let coords: Option<Vec<Coord<f64>>> = positions
        .iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] => Some(Coord { x: *x, y: *y }),
            _ => None,
        })
        .collect();
    coords.map(LineString::new)
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = match rings.split_first() {
        Some((ext, ints)) => (ring_from_positions(ext)?, ints),
        None => (LineString::new(vec![]), &[][..]),
    };
    let interiors: Option<Vec<LineString<f64>>> = interiors.iter().map(|r| ring_from_positions(r)).collect();
    Some(Polygon::new(exterior, interiors?))
}

/// Convert a GeoJSON geometry value into a MultiPolygon, promoting single
/// polygons. Any other geometry type yields `None`.
fn multipolygon_from_value(value: &GeoValue) -> Option<MultiPolygon<f64>> {
    match value {
        GeoValue::Polygon(rings) => polygon_from_rings(rings).map(|p| MultiPolygon::new(vec![p])),
        GeoValue::MultiPolygon(polys) => {
            let polys: Option<Vec<Polygon<f64>>> = polys.iter().map(|r| polygon_from_rings(r)).collect();
            polys.map(MultiPolygon::new)
        }
        _ => None,
    }
}

// ── Writing ───────────────────────────────────────────────────────────────────

fn positions_from_ring(ring: &LineString<f64>) -> Vec<Vec<f64>> {
    ring.coords().map(|c| vec![c.x, c.y]).collect()
}

fn value_from_multipolygon(mp: &MultiPolygon<f64>) -> GeoValue {
    GeoValue::MultiPolygon(
        mp.iter()
            .map(|poly| {
                std::iter::once(positions_from_ring(poly.exterior()))
                    .chain(poly.interiors().iter().map(positions_from_ring))
                    .collect()
            })
            .collect(),
    )
}

fn crs_member(crs: Crs) -> Option<JsonObject> {
    let urn = crs.urn()?;
    let mut members = JsonObject::new();
    members.insert("crs".into(), json!({ "type": "name", "properties": { "name": urn } }));
    Some(members)
}

fn write_collection(path: &Path, collection: FeatureCollection) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| MorphoError::io(parent, e))?;
    }
    let text = GeoJson::FeatureCollection(collection).to_string();
    fs::write(path, text).map_err(|e| MorphoError::io(path, e))
}

/// Write a parcel layer, including any metrics and cluster labels.
pub fn write_parcels(path: &Path, set: &ParcelSet) -> Result<()> {
    let features = set
        .parcels
        .iter()
        .map(|parcel| {
            let mut props = parcel.properties.clone();
            props.insert(PARCEL_ID.into(), json!(parcel.id));
            if let Some(m) = &parcel.metrics {
                props.insert(AREA.into(), json!(m.area_m2));
                props.insert(LOG_AREA.into(), json!(m.log_area));
                props.insert(PERIMETER.into(), json!(m.perimeter_m));
                props.insert(PERIMETER_AREA_RATIO.into(), json!(m.perimeter_area_ratio));
                props.insert(COMPACTNESS.into(), json!(m.compactness_idx));
                props.insert(RECTANGULARITY.into(), json!(m.rectangularity_idx));
                props.insert(ORIENTATION.into(), json!(m.orientation_deg));
            }
            if let Some(c) = parcel.cluster {
                props.insert(CLUSTER.into(), json!(c));
            }
            Feature {
                bbox: None,
                geometry: parcel.geometry.as_ref().map(|g| Geometry::new(value_from_multipolygon(g))),
                id: None,
                properties: Some(props),
                foreign_members: None,
            }
        })
        .collect();

    if set.crs == Crs::Unknown {
        warn!(path = %path.display(), "writing parcel layer without a declared CRS");
    }

    write_collection(
        path,
        FeatureCollection { bbox: None, features, foreign_members: crs_member(set.crs) },
    )?;
    debug!(path = %path.display(), parcels = set.len(), "wrote parcel layer");
    Ok(())
}

/// Write the fishnet grid with per-cell parcel counts.
pub fn write_grid(path: &Path, grid: &Fishnet, crs: Crs) -> Result<()> {
    let features = grid
        .cells
        .iter()
        .map(|cell| {
            let mut props = JsonObject::new();
            props.insert("grid_id".into(), json!(cell.grid_id));
            props.insert("parcel_count".into(), json!(cell.parcel_count));
            let poly = cell.rect.to_polygon();
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(value_from_multipolygon(&MultiPolygon::new(vec![poly])))),
                id: None,
                properties: Some(props),
                foreign_members: None,
            }
        })
        .collect();

    write_collection(path, FeatureCollection { bbox: None, features, foreign_members: crs_member(crs) })?;
    debug!(path = %path.display(), cells = grid.cells.len(), "wrote density grid");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parcel::test_support::rect;

    const SAMPLE: &str = r#"{
      "type": "FeatureCollection",
      "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::32639" } },
      "features": [
        { "type": "Feature", "properties": { "AREA_TEST": 100.0, "owner": "a" },
          "geometry": { "type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]] } },
        { "type": "Feature", "properties": null,
          "geometry": { "type": "MultiPolygon", "coordinates": [[[[20,0],[30,0],[30,5],[20,5],[20,0]]]] } },
        { "type": "Feature", "properties": {},
          "geometry": { "type": "Point", "coordinates": [1, 2] } },
        { "type": "Feature", "properties": {}, "geometry": null }
      ]
    }"#;

    #[test]
    fn parses_polygons_and_keeps_unusable_features_as_none() {
        let set = parse_parcels(SAMPLE).unwrap();
        assert_eq!(set.crs, Crs::Utm { zone: 39, north: true });
        assert_eq!(set.len(), 4);
        assert!(set.parcels[0].geometry.is_some());
        assert!(set.parcels[1].geometry.is_some());
        assert!(set.parcels[2].geometry.is_none(), "points are not parcels");
        assert!(set.parcels[3].geometry.is_none());
        assert_eq!(set.parcels[0].numeric_property("AREA_TEST"), Some(100.0));
        assert_eq!(set.parcels[3].id, 3);
    }

    #[test]
    fn missing_crs_member_is_unknown() {
        let text = r#"{ "type": "FeatureCollection", "features": [] }"#;
        assert_eq!(parse_parcels(text).unwrap().crs, Crs::Unknown);
    }

    #[test]
    fn other_projected_crs_is_read_and_written_back() {
        let text = r#"{ "type": "FeatureCollection",
          "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::2058" } },
          "features": [] }"#;
        let set = parse_parcels(text).unwrap();
        assert_eq!(set.crs, Crs::Projected { epsg: 2058 });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.geojson");
        write_parcels(&path, &set).unwrap();
        assert_eq!(read_parcels(&path).unwrap().crs, Crs::Projected { epsg: 2058 });
    }

    #[test]
    fn single_feature_is_rejected() {
        let text = r#"{ "type": "Feature", "properties": {}, "geometry": null }"#;
        assert!(matches!(parse_parcels(text), Err(MorphoError::UnsupportedInput(_))));
    }

    #[test]
    fn metrics_and_labels_survive_a_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("clustered.geojson");

        let mut parcel = Parcel::new(7, rect(0.0, 0.0, 20.0, 10.0));
        parcel.properties.insert("owner".into(), json!("b"));
        parcel.metrics = Some(ParcelMetrics {
            area_m2: 200.0,
            log_area: 201f64.log10(),
            perimeter_m: 60.0,
            perimeter_area_ratio: 0.3,
            compactness_idx: 0.698,
            rectangularity_idx: 1.0,
            orientation_deg: 90.0,
        });
        parcel.cluster = Some(2);
        let set = ParcelSet::new(Crs::Utm { zone: 39, north: true }, vec![parcel]);

        write_parcels(&path, &set).unwrap();
        let back = read_parcels(&path).unwrap();

        assert_eq!(back.crs, set.crs);
        let p = &back.parcels[0];
        assert_eq!(p.id, 7);
        assert_eq!(p.cluster, Some(2));
        let (got, want) = (p.metrics.unwrap(), set.parcels[0].metrics.unwrap());
        assert!((got.log_area - want.log_area).abs() < 1e-12);
        assert!((got.compactness_idx - want.compactness_idx).abs() < 1e-12);
        assert_eq!(got.area_m2, want.area_m2);
        assert_eq!(got.orientation_deg, want.orientation_deg);
        assert_eq!(p.properties.get("owner"), Some(&json!("b")));
        assert!(p.properties.get(AREA).is_none(), "owned columns are not duplicated into attributes");
    }

    #[test]
    fn unusable_owned_columns_are_reported() {
        let feature: Feature = serde_json::from_value(json!({
            "type": "Feature",
            "properties": { "parcel_id": "A-17", "area_m2": 120.0, "morpho_cluster": 1, "owner": "c" },
            "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]] }
        }))
        .unwrap();
        let (parcel, discarded) = parcel_from_feature(5, feature);
        assert_eq!(parcel.id, 5, "non-numeric ids fall back to the feature index");
        assert_eq!(parcel.cluster, Some(1));
        assert_eq!(discarded, vec![PARCEL_ID, AREA]);
        assert_eq!(parcel.properties.get("owner"), Some(&json!("c")));
    }

    #[test]
    fn cluster_label_written_as_string_is_accepted() {
        let text = r#"{ "type": "FeatureCollection", "features": [
          { "type": "Feature", "properties": { "morpho_cluster": "3" },
            "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]] } } ] }"#;
        let set = parse_parcels(text).unwrap();
        assert_eq!(set.parcels[0].cluster, Some(3));
        assert!(set.parcels[0].metrics.is_none());
    }
}
