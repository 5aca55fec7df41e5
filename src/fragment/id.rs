use std::{fmt, sync::Arc};

/// Stable key shared by every fragment of one logical feature across tiles.
/// Cheap to clone, since the same id is held by many fragments and merged results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(Arc<str>);

impl FeatureId {
    pub fn new(id: &str) -> Self { Self(Arc::from(id)) }

    /// Get the underlying identifier text.
    #[inline] pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for FeatureId {
    fn from(id: &str) -> Self { Self::new(id) }
}

impl From<String> for FeatureId {
    fn from(id: String) -> Self { Self(Arc::from(id)) }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Address of one tile in an OSM-style z/x/y grid.
/// The merge engine treats it as an opaque key; only the host interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    pub fn new(z: u8, x: u32, y: u32) -> Self { Self { z, x, y } }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_ids_compare_by_text() {
        assert_eq!(FeatureId::new("FR-75"), FeatureId::from(String::from("FR-75")));
        assert!(FeatureId::new("a") < FeatureId::new("b"));
    }

    #[test]
    fn tile_id_displays_as_path() {
        assert_eq!(TileId::new(7, 64, 43).to_string(), "7/64/43");
    }
}
