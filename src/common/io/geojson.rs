use anyhow::{Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{json, Map, Value};

use crate::{
    common::io::FormatError,
    fragment::{Attributes, FeatureRecord},
    merge::MergedFeature,
};

/// Read the features of a GeoJSON FeatureCollection tile.
///
/// The feature id is taken from `properties[id_property]`, falling back to the
/// Feature's own `id` member. Non-polygonal geometries yield a record without
/// geometry, which ingestion rejects.
pub(crate) fn read_geojson_features(value: &Value, id_property: &str) -> Result<Vec<FeatureRecord>, FormatError> {
    let features = match value["type"].as_str() {
        Some("FeatureCollection") => value["features"].as_array()
            .ok_or(FormatError::Missing("features"))?
            .as_slice(),
        Some("Feature") => std::slice::from_ref(value),
        Some(other) => return Err(FormatError::UnexpectedType(other.to_string())),
        None => return Err(FormatError::Missing("type")),
    };

    features.iter().map(|feature| -> Result<FeatureRecord, FormatError> {
        let attributes: Attributes = feature["properties"].as_object().cloned().unwrap_or_default();
        let id = attributes.get(id_property)
            .and_then(id_to_string)
            .or_else(|| id_to_string(&feature["id"]));
        let geometry = match feature.get("geometry") {
            Some(geometry) if !geometry.is_null() => parse_geometry(geometry)?,
            _ => None,
        };
        Ok(FeatureRecord { id, geometry, attributes })
    }).collect()
}

/// Stringify a GeoJSON id (string or number).
pub(crate) fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a Polygon or MultiPolygon geometry object. Other types yield `None`.
fn parse_geometry(geometry: &Value) -> Result<Option<MultiPolygon<f64>>, FormatError> {
    let coords = || geometry["coordinates"].as_array().ok_or(FormatError::Missing("coordinates"));
    match geometry["type"].as_str() {
        Some("Polygon") => Ok(Some(MultiPolygon(vec![parse_polygon(coords()?)?]))),
        Some("MultiPolygon") => Ok(Some(MultiPolygon(
            coords()?.iter()
                .map(|polygon| -> Result<Polygon<f64>, FormatError> { parse_polygon(polygon.as_array().ok_or(FormatError::Malformed("polygon must be an array"))?) })
                .collect::<Result<_, _>>()?
        ))),
        _ => Ok(None),
    }
}

/// Parse `[exterior, hole, hole, ...]`.
fn parse_polygon(rings: &[Value]) -> Result<Polygon<f64>, FormatError> {
    let mut rings = rings.iter().map(|ring| -> Result<LineString<f64>, FormatError> {
        parse_ring(ring.as_array().ok_or(FormatError::Malformed("ring must be an array"))?)
    });
    let exterior = rings.next().transpose()?.unwrap_or_else(|| LineString(vec![]));
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Parse `[[x, y], [x, y], ...]`; extra ordinates (z, m) are ignored.
fn parse_ring(positions: &[Value]) -> Result<LineString<f64>, FormatError> {
    positions.iter().map(|position| -> Result<Coord<f64>, FormatError> {
        let x = position[0].as_f64().ok_or(FormatError::Malformed("x must be a number"))?;
        let y = position[1].as_f64().ok_or(FormatError::Malformed("y must be a number"))?;
        Ok(Coord { x, y })
    }).collect::<Result<Vec<_>, _>>().map(LineString)
}

/// Helper to convert a MultiPolygon to a GeoJSON geometry object.
fn multipolygon_to_geojson(mp: &MultiPolygon<f64>) -> Value {
    let polygons: Vec<Vec<Vec<[f64; 2]>>> = mp.0.iter().map(|polygon| {
        std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
            .collect()
    }).collect();

    json!({
        "type": "MultiPolygon",
        "coordinates": polygons,
    })
}

/// Write merged features as a GeoJSON FeatureCollection.
/// Each feature keeps its attributes and gains a `_status` property.
pub fn merged_to_geojson(features: &[MergedFeature]) -> Value {
    let features: Vec<Value> = features.iter().map(|feature| {
        let mut properties: Map<String, Value> = feature.attributes.clone();
        properties.insert("_status".to_string(), json!(feature.status.as_str()));
        json!({
            "type": "Feature",
            "id": feature.feature_id.as_str(),
            "geometry": multipolygon_to_geojson(&feature.geometry),
            "properties": properties,
        })
    }).collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

/// Write merged features to GeoJSON bytes.
pub fn write_merged_geojson_bytes(features: &[MergedFeature]) -> Result<Vec<u8>> {
    serde_json::to_vec(&merged_to_geojson(features)).context("Failed to serialize GeoJSON to bytes")
}
