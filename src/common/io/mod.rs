mod geojson;
mod topojson;

use std::{fs, path::Path, str::FromStr};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::fragment::FeatureRecord;

pub use geojson::{merged_to_geojson, write_merged_geojson_bytes};

/// Problems in a tile payload.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing `{0}` member")]
    Missing(&'static str),
    #[error("unexpected object type `{0}`")]
    UnexpectedType(String),
    #[error("malformed payload: {0}")]
    Malformed(&'static str),
    #[error("arc index {0} out of range")]
    ArcOutOfRange(i64),
}

/// Encoding of the tiles a layer fetches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TileFormat {
    #[default]
    GeoJson,
    TopoJson,
}

impl TileFormat {
    /// Conventional file extension of a tile in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::GeoJson => "json",
            TileFormat::TopoJson => "topojson",
        }
    }

    /// Parse one tile payload into feature records.
    pub fn read_features(&self, bytes: &[u8], id_property: &str) -> Result<Vec<FeatureRecord>, FormatError> {
        let value: Value = serde_json::from_slice(bytes)?;
        match self {
            TileFormat::GeoJson => geojson::read_geojson_features(&value, id_property),
            TileFormat::TopoJson => topojson::read_topojson_features(&value, id_property),
        }
    }
}

impl FromStr for TileFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, FormatError> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "geojson" => Ok(TileFormat::GeoJson),
            "topojson" => Ok(TileFormat::TopoJson),
            other => Err(FormatError::UnexpectedType(other.to_string())),
        }
    }
}

/// Read one tile file from disk.
pub fn read_tile_file(path: &Path, format: TileFormat, id_property: &str) -> Result<Vec<FeatureRecord>> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read tile {}", path.display()))?;
    format.read_features(&bytes, id_property)
        .with_context(|| format!("Failed to parse tile {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_parse() {
        assert_eq!("json".parse::<TileFormat>().unwrap(), TileFormat::GeoJson);
        assert_eq!("TopoJSON".parse::<TileFormat>().unwrap(), TileFormat::TopoJson);
        assert!("kml".parse::<TileFormat>().is_err());
    }

    #[test]
    fn invalid_json_is_reported() {
        assert!(matches!(TileFormat::GeoJson.read_features(b"{", "id"), Err(FormatError::Json(_))));
    }

    #[test]
    fn tile_files_are_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.json");
        fs::write(&path, br#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"id":"a"},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}
        ]}"#).unwrap();

        let records = read_tile_file(&path, TileFormat::GeoJson, "id").unwrap();
        assert_eq!(records.len(), 1);
        assert!(read_tile_file(&dir.path().join("missing.json"), TileFormat::GeoJson, "id").is_err());
    }
}
