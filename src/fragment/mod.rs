mod id;
mod store;

pub use id::{FeatureId, TileId};
pub use store::{DiscardedTile, FragmentStore, Snapshot};

use geo::{MultiPolygon, Polygon};
use serde_json::{Map, Value};

/// Opaque feature properties, carried through a merge untouched.
pub type Attributes = Map<String, Value>;

/// A feature as produced by the tile parsing collaborator, before validation.
/// Either field may be missing in real tile payloads.
#[derive(Debug, Clone, Default)]
pub struct FeatureRecord {
    pub id: Option<String>,
    pub geometry: Option<MultiPolygon<f64>>,
    pub attributes: Attributes,
}

impl FeatureRecord {
    pub fn new(id: impl Into<String>, geometry: impl Into<MultiPolygon<f64>>, attributes: Attributes) -> Self {
        Self { id: Some(id.into()), geometry: Some(geometry.into()), attributes }
    }
}

/// One tile's partial view of a feature. Immutable once accepted by the store.
#[derive(Debug, Clone)]
pub struct Fragment {
    feature_id: FeatureId,
    geometry: MultiPolygon<f64>,
    attributes: Attributes,
}

/// Why a `FeatureRecord` could not become a `Fragment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingId,
    MissingGeometry,
    EmptyGeometry,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::MissingId => "missing feature id",
            Rejection::MissingGeometry => "missing geometry",
            Rejection::EmptyGeometry => "empty geometry",
        }
    }
}

impl TryFrom<FeatureRecord> for Fragment {
    type Error = Rejection;

    fn try_from(record: FeatureRecord) -> Result<Self, Rejection> {
        let id = record.id
            .filter(|id| !id.trim().is_empty())
            .ok_or(Rejection::MissingId)?;
        let geometry = record.geometry.ok_or(Rejection::MissingGeometry)?;

        // A polygon without exterior coordinates contributes nothing to a union.
        let geometry = MultiPolygon(geometry.0.into_iter()
            .filter(|polygon| !polygon.exterior().0.is_empty())
            .collect::<Vec<Polygon<f64>>>());
        if geometry.0.is_empty() { return Err(Rejection::EmptyGeometry) }

        Ok(Self { feature_id: FeatureId::from(id), geometry, attributes: record.attributes })
    }
}

impl Fragment {
    #[inline] pub fn feature_id(&self) -> &FeatureId { &self.feature_id }

    #[inline] pub fn geometry(&self) -> &MultiPolygon<f64> { &self.geometry }

    #[inline] pub fn attributes(&self) -> &Attributes { &self.attributes }
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    fn square() -> Polygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)]
    }

    #[test]
    fn record_with_id_and_geometry_is_accepted() {
        let fragment = Fragment::try_from(FeatureRecord::new("a", square(), Attributes::new())).unwrap();
        assert_eq!(fragment.feature_id().as_str(), "a");
        assert_eq!(fragment.geometry().0.len(), 1);
    }

    #[test]
    fn blank_id_is_rejected() {
        let record = FeatureRecord { id: Some("  ".into()), geometry: Some(square().into()), ..Default::default() };
        assert_eq!(Fragment::try_from(record).unwrap_err(), Rejection::MissingId);
    }

    #[test]
    fn missing_or_empty_geometry_is_rejected() {
        let record = FeatureRecord { id: Some("a".into()), ..Default::default() };
        assert_eq!(Fragment::try_from(record).unwrap_err(), Rejection::MissingGeometry);

        let record = FeatureRecord { id: Some("a".into()), geometry: Some(MultiPolygon(vec![])), ..Default::default() };
        assert_eq!(Fragment::try_from(record).unwrap_err(), Rejection::EmptyGeometry);
    }
}
