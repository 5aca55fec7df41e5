use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::Value;

use crate::{
    common::io::{geojson::id_to_string, FormatError},
    fragment::{Attributes, FeatureRecord},
};

/// Quantization transform of a topology: position = quantized * scale + translate.
#[derive(Debug, Clone, Copy)]
struct Transform {
    scale: [f64; 2],
    translate: [f64; 2],
}

impl Transform {
    fn parse(value: &Value) -> Result<Option<Self>, FormatError> {
        if value.is_null() { return Ok(None) }
        let pair = |v: &Value| -> Result<[f64; 2], FormatError> {
            match (v[0].as_f64(), v[1].as_f64()) {
                (Some(a), Some(b)) => Ok([a, b]),
                _ => Err(FormatError::Malformed("transform needs numeric scale and translate pairs")),
            }
        };
        Ok(Some(Self { scale: pair(&value["scale"])?, translate: pair(&value["translate"])? }))
    }
}

/// Decode all arcs, undoing delta encoding and quantization when a transform is present.
fn decode_arcs(arcs: &[Value], transform: Option<Transform>) -> Result<Vec<Vec<Coord<f64>>>, FormatError> {
    arcs.iter().map(|arc| -> Result<Vec<Coord<f64>>, FormatError> {
        let positions = arc.as_array().ok_or(FormatError::Malformed("arc must be an array"))?;
        let (mut x, mut y) = (0.0, 0.0);
        positions.iter().map(|position| -> Result<Coord<f64>, FormatError> {
            let (px, py) = match (position[0].as_f64(), position[1].as_f64()) {
                (Some(px), Some(py)) => (px, py),
                _ => return Err(FormatError::Malformed("arc position must be numeric")),
            };
            Ok(match transform {
                Some(t) => {
                    x += px;
                    y += py;
                    Coord { x: x * t.scale[0] + t.translate[0], y: y * t.scale[1] + t.translate[1] }
                }
                None => Coord { x: px, y: py },
            })
        }).collect()
    }).collect()
}

/// Stitch a ring from arc references; a negative index `!i` walks arc `i` backwards.
fn stitch_ring(refs: &Value, arcs: &[Vec<Coord<f64>>]) -> Result<LineString<f64>, FormatError> {
    let refs = refs.as_array().ok_or(FormatError::Malformed("ring must be an array of arc indices"))?;
    let mut coords: Vec<Coord<f64>> = Vec::new();

    for r in refs {
        let index = r.as_i64().ok_or(FormatError::Malformed("arc index must be an integer"))?;
        let (arc, reversed) = if index < 0 { (!index, true) } else { (index, false) };
        let arc = usize::try_from(arc).ok()
            .and_then(|i| arcs.get(i))
            .ok_or(FormatError::ArcOutOfRange(index))?;

        // Consecutive arcs share an endpoint.
        coords.pop();
        if reversed {
            coords.extend(arc.iter().rev());
        } else {
            coords.extend(arc.iter());
        }
    }
    Ok(LineString(coords))
}

fn stitch_polygon(rings: &Value, arcs: &[Vec<Coord<f64>>]) -> Result<Polygon<f64>, FormatError> {
    let rings = rings.as_array().ok_or(FormatError::Malformed("polygon must be an array of rings"))?;
    let mut rings = rings.iter().map(|ring| stitch_ring(ring, arcs));
    let exterior = rings.next().transpose()?.unwrap_or_else(|| LineString(vec![]));
    Ok(Polygon::new(exterior, rings.collect::<Result<_, _>>()?))
}

fn stitch_geometry(geometry: &Value, arcs: &[Vec<Coord<f64>>]) -> Result<Option<MultiPolygon<f64>>, FormatError> {
    match geometry["type"].as_str() {
        Some("Polygon") => Ok(Some(MultiPolygon(vec![stitch_polygon(&geometry["arcs"], arcs)?]))),
        Some("MultiPolygon") => {
            let polygons = geometry["arcs"].as_array()
                .ok_or(FormatError::Missing("arcs"))?
                .iter()
                .map(|polygon| stitch_polygon(polygon, arcs))
                .collect::<Result<_, _>>()?;
            Ok(Some(MultiPolygon(polygons)))
        }
        _ => Ok(None),
    }
}

/// Read every polygonal geometry of every object in a TopoJSON topology.
pub(crate) fn read_topojson_features(value: &Value, id_property: &str) -> Result<Vec<FeatureRecord>, FormatError> {
    match value["type"].as_str() {
        Some("Topology") => {}
        Some(other) => return Err(FormatError::UnexpectedType(other.to_string())),
        None => return Err(FormatError::Missing("type")),
    }

    let transform = Transform::parse(&value["transform"])?;
    let arcs = match value["arcs"].as_array() {
        Some(arcs) => decode_arcs(arcs, transform)?,
        None => Vec::new(),
    };
    let objects = value["objects"].as_object().ok_or(FormatError::Missing("objects"))?;

    let mut records = Vec::new();
    for object in objects.values() {
        let geometries = match object["type"].as_str() {
            Some("GeometryCollection") => object["geometries"].as_array()
                .ok_or(FormatError::Missing("geometries"))?
                .as_slice(),
            _ => std::slice::from_ref(object),
        };

        for geometry in geometries {
            let attributes: Attributes = geometry["properties"].as_object().cloned().unwrap_or_default();
            let id = attributes.get(id_property)
                .and_then(id_to_string)
                .or_else(|| id_to_string(&geometry["id"]));
            records.push(FeatureRecord { id, geometry: stitch_geometry(geometry, &arcs)?, attributes });
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use geo::Area;
    use serde_json::json;

    use super::*;

    /// Two unit squares sharing the edge x = 1, as a topology with a shared arc.
    fn two_squares() -> Value {
        json!({
            "type": "Topology",
            "objects": {
                "regions": {
                    "type": "GeometryCollection",
                    "geometries": [
                        { "type": "Polygon", "arcs": [[0, 1]], "properties": { "id": "west" } },
                        { "type": "Polygon", "arcs": [[2, -1]], "id": "east" },
                        { "type": "LineString", "arcs": [0] }
                    ]
                }
            },
            "arcs": [
                [[1, 0], [1, 1]],
                [[1, 1], [0, 1], [0, 0], [1, 0]],
                [[1, 0], [2, 0], [2, 1], [1, 1]]
            ]
        })
    }

    #[test]
    fn shared_arcs_are_stitched_in_both_directions() {
        let records = read_topojson_features(&two_squares(), "id").unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].id.as_deref(), Some("west"));
        let west = records[0].geometry.as_ref().unwrap();
        assert_eq!(west.0[0].exterior().0.len(), 5);
        assert!((west.unsigned_area() - 1.0).abs() < 1e-12);

        assert_eq!(records[1].id.as_deref(), Some("east"));
        let east = records[1].geometry.as_ref().unwrap();
        assert_eq!(east.0[0].exterior().0.first(), east.0[0].exterior().0.last());
        assert!((east.unsigned_area() - 1.0).abs() < 1e-12);

        assert!(records[2].geometry.is_none());
    }

    #[test]
    fn quantized_arcs_are_delta_decoded() {
        let topology = json!({
            "type": "Topology",
            "transform": { "scale": [0.5, 0.5], "translate": [10.0, 20.0] },
            "objects": { "a": { "type": "Polygon", "arcs": [[0]], "properties": { "id": "a" } } },
            "arcs": [[[0, 0], [4, 0], [0, 4], [-4, 0], [0, -4]]]
        });

        let records = read_topojson_features(&topology, "id").unwrap();
        let ring = &records[0].geometry.as_ref().unwrap().0[0];
        assert_eq!(ring.exterior().0[0], Coord { x: 10.0, y: 20.0 });
        assert_eq!(ring.exterior().0[2], Coord { x: 12.0, y: 22.0 });
        assert!((ring.unsigned_area() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn bad_arc_reference_is_an_error() {
        let topology = json!({
            "type": "Topology",
            "objects": { "a": { "type": "Polygon", "arcs": [[3]] } },
            "arcs": [[[0, 0], [1, 0]]]
        });
        assert!(matches!(read_topojson_features(&topology, "id"), Err(FormatError::ArcOutOfRange(3))));
        assert!(matches!(read_topojson_features(&json!({ "type": "FeatureCollection" }), "id"), Err(FormatError::UnexpectedType(_))));
    }
}
