use std::fmt;

use geo::MultiPolygon;

use crate::fragment::{Attributes, FeatureId};

/// Whether every fragment of a feature made it into its merged geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeStatus {
    Complete,
    Partial,
}

impl MergeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStatus::Complete => "complete",
            MergeStatus::Partial => "partial",
        }
    }
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// One feature stitched together from all fragments of a pass.
#[derive(Debug, Clone)]
pub struct MergedFeature {
    pub feature_id: FeatureId,
    pub geometry: MultiPolygon<f64>,
    pub attributes: Attributes, // from the last fragment in arrival order
    pub status: MergeStatus,
    pub fragments: usize,       // fragments considered, including skipped ones
}

/// The full output of one merge pass. Replaces the previously displayed batch as a whole.
#[derive(Debug, Clone)]
pub struct MergeBatch {
    pub generation: u64,
    pub features: Vec<MergedFeature>,
}

impl MergeBatch {
    #[inline] pub fn len(&self) -> usize { self.features.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.features.is_empty() }

    /// Look up a merged feature by id.
    pub fn get(&self, id: &str) -> Option<&MergedFeature> {
        self.features.iter().find(|feature| feature.feature_id.as_str() == id)
    }
}

/// Counters describing one pass, returned for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub generation: u64,
    pub fragments: usize,
    pub published: usize,
    pub partial: usize,
    pub dropped: usize,
}
