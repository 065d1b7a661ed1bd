//! GeoJSON reading and writing
//!
//! Maps GeoJSON FeatureCollection documents onto [`Feature`] /
//! [`FeatureCollection`] via `serde_json`. Covers the geometry types the
//! delineator touches: Point, LineString, MultiLineString, Polygon and
//! MultiPolygon. Unknown geometry types are an error, not silently dropped.

use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection};
use geo_types::{Coord, Geometry, LineString, MultiLineString, MultiPolygon, Point, Polygon};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

/// Read a GeoJSON FeatureCollection from a file.
pub fn read_feature_collection<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_feature_collection(&text)
}

/// Parse a GeoJSON FeatureCollection from a string.
pub fn parse_feature_collection(text: &str) -> Result<FeatureCollection> {
    let doc: Value =
        serde_json::from_str(text).map_err(|e| Error::Other(format!("Invalid GeoJSON: {}", e)))?;

    if doc["type"] != "FeatureCollection" {
        return Err(Error::Other(format!(
            "Expected FeatureCollection, got {}",
            doc["type"]
        )));
    }

    let mut collection = FeatureCollection::new();
    let features = doc["features"]
        .as_array()
        .ok_or_else(|| Error::Other("FeatureCollection without features array".into()))?;

    for feat in features {
        collection.push(parse_feature(feat)?);
    }

    Ok(collection)
}

fn parse_feature(feat: &Value) -> Result<Feature> {
    let geometry = match &feat["geometry"] {
        Value::Null => None,
        geom => Some(parse_geometry(geom)?),
    };

    let mut properties = std::collections::BTreeMap::new();
    if let Some(props) = feat["properties"].as_object() {
        for (key, value) in props {
            properties.insert(key.clone(), parse_attribute(value));
        }
    }

    let id = match &feat["id"] {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    Ok(Feature {
        geometry,
        properties,
        id,
    })
}

fn parse_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                AttributeValue::Int(i)
            } else {
                AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => AttributeValue::String(s.clone()),
        other => AttributeValue::String(other.to_string()),
    }
}

fn parse_geometry(geom: &Value) -> Result<Geometry<f64>> {
    let kind = geom["type"]
        .as_str()
        .ok_or_else(|| Error::Other("Geometry without type".into()))?;
    let coords = &geom["coordinates"];

    match kind {
        "Point" => {
            let c = parse_coord(coords)?;
            Ok(Geometry::Point(Point::new(c.x, c.y)))
        }
        "LineString" => Ok(Geometry::LineString(parse_line(coords)?)),
        "MultiLineString" => {
            let lines = as_array(coords)?
                .iter()
                .map(parse_line)
                .collect::<Result<Vec<_>>>()?;
            Ok(Geometry::MultiLineString(MultiLineString::new(lines)))
        }
        "Polygon" => Ok(Geometry::Polygon(parse_polygon(coords)?)),
        "MultiPolygon" => {
            let polys = as_array(coords)?
                .iter()
                .map(parse_polygon)
                .collect::<Result<Vec<_>>>()?;
            Ok(Geometry::MultiPolygon(MultiPolygon::new(polys)))
        }
        other => Err(Error::UnsupportedDataType(format!(
            "GeoJSON geometry type '{}'",
            other
        ))),
    }
}

fn as_array(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| Error::Other("Malformed GeoJSON coordinates".into()))
}

fn parse_coord(value: &Value) -> Result<Coord<f64>> {
    let pair = as_array(value)?;
    if pair.len() < 2 {
        return Err(Error::Other("Coordinate with fewer than 2 values".into()));
    }
    let x = pair[0]
        .as_f64()
        .ok_or_else(|| Error::Other("Non-numeric coordinate".into()))?;
    let y = pair[1]
        .as_f64()
        .ok_or_else(|| Error::Other("Non-numeric coordinate".into()))?;
    Ok(Coord { x, y })
}

fn parse_line(value: &Value) -> Result<LineString<f64>> {
    let coords = as_array(value)?
        .iter()
        .map(parse_coord)
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::new(coords))
}

fn parse_polygon(value: &Value) -> Result<Polygon<f64>> {
    let rings = as_array(value)?
        .iter()
        .map(parse_line)
        .collect::<Result<Vec<_>>>()?;

    let mut iter = rings.into_iter();
    let exterior = iter
        .next()
        .ok_or_else(|| Error::Other("Polygon without exterior ring".into()))?;

    Ok(Polygon::new(exterior, iter.collect()))
}

/// Write a FeatureCollection to a GeoJSON file.
pub fn write_feature_collection<P: AsRef<Path>>(
    collection: &FeatureCollection,
    path: P,
) -> Result<()> {
    let text = to_geojson_string(collection)?;
    fs::write(path.as_ref(), text)?;
    Ok(())
}

/// Serialize a FeatureCollection as a GeoJSON string.
pub fn to_geojson_string(collection: &FeatureCollection) -> Result<String> {
    let features: Vec<Value> = collection.iter().map(feature_to_json).collect();
    let doc = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    serde_json::to_string_pretty(&doc).map_err(|e| Error::Other(e.to_string()))
}

fn feature_to_json(feature: &Feature) -> Value {
    let mut props = Map::new();
    for (key, value) in &feature.properties {
        props.insert(key.clone(), attribute_to_json(value));
    }

    let mut obj = Map::new();
    obj.insert("type".into(), json!("Feature"));
    if let Some(id) = &feature.id {
        obj.insert("id".into(), json!(id));
    }
    obj.insert(
        "geometry".into(),
        feature
            .geometry
            .as_ref()
            .map(geometry_to_json)
            .unwrap_or(Value::Null),
    );
    obj.insert("properties".into(), Value::Object(props));
    Value::Object(obj)
}

fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null => Value::Null,
        AttributeValue::Bool(b) => json!(b),
        AttributeValue::Int(i) => json!(i),
        AttributeValue::Float(f) => json!(f),
        AttributeValue::String(s) => json!(s),
    }
}

fn geometry_to_json(geom: &Geometry<f64>) -> Value {
    match geom {
        Geometry::Point(p) => json!({
            "type": "Point",
            "coordinates": [p.x(), p.y()],
        }),
        Geometry::LineString(ls) => json!({
            "type": "LineString",
            "coordinates": line_coords(ls),
        }),
        Geometry::MultiLineString(mls) => json!({
            "type": "MultiLineString",
            "coordinates": mls.0.iter().map(line_coords).collect::<Vec<_>>(),
        }),
        Geometry::Polygon(poly) => json!({
            "type": "Polygon",
            "coordinates": polygon_coords(poly),
        }),
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.0.iter().map(polygon_coords).collect::<Vec<_>>(),
        }),
        // Remaining geo-types variants never occur in our layers
        _ => Value::Null,
    }
}

fn line_coords(ls: &LineString<f64>) -> Vec<[f64; 2]> {
    ls.0.iter().map(|c| [c.x, c.y]).collect()
}

fn polygon_coords(poly: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    let mut rings = vec![line_coords(poly.exterior())];
    for interior in poly.interiors() {
        rings.push(line_coords(interior));
    }
    rings
}

#[cfg(test)]
mod tests {
    use super::*;

    const RIVERS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "strahler": 2, "name": "creek" },
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[29.0, 41.0], [29.1, 41.1]]
                }
            },
            {
                "type": "Feature",
                "id": 7,
                "properties": { "id": "marmara_n" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[28.0, 40.0], [30.0, 40.0], [30.0, 42.0], [28.0, 42.0], [28.0, 40.0]]]
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_feature_collection() {
        let fc = parse_feature_collection(RIVERS).unwrap();
        assert_eq!(fc.len(), 2);

        let river = &fc.features[0];
        assert_eq!(
            river.get_property("strahler").and_then(|v| v.as_i64()),
            Some(2)
        );
        assert!(matches!(river.geometry, Some(Geometry::LineString(_))));

        let boundary = &fc.features[1];
        assert_eq!(boundary.id.as_deref(), Some("7"));
        assert!(matches!(boundary.geometry, Some(Geometry::Polygon(_))));
    }

    #[test]
    fn test_roundtrip() {
        let fc = parse_feature_collection(RIVERS).unwrap();
        let text = to_geojson_string(&fc).unwrap();
        let back = parse_feature_collection(&text).unwrap();

        assert_eq!(back.len(), fc.len());
        assert_eq!(
            back.features[0].get_property("strahler"),
            fc.features[0].get_property("strahler")
        );
        assert_eq!(
            format!("{:?}", back.features[1].geometry),
            format!("{:?}", fc.features[1].geometry)
        );
    }

    #[test]
    fn test_rejects_unknown_type() {
        let doc = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {},
             "geometry": {"type": "CircularString", "coordinates": []}}
        ]}"#;
        assert!(parse_feature_collection(doc).is_err());
    }
}
