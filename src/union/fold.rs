use geo::MultiPolygon;
use tracing::warn;

use crate::{merge::MergeStatus, union::{UnionError, UnionOp}};

/// One fragment that could not be folded into the running union.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionFailure {
    pub index: usize, // position of the fragment in the input sequence
    pub error: UnionError,
}

/// Result of folding a feature's fragments.
#[derive(Debug, Clone)]
pub struct UnionOutcome {
    pub geometry: MultiPolygon<f64>,
    pub status: MergeStatus,
    pub merged: Vec<usize>, // positions of the fragments folded in, ascending
    pub failures: Vec<UnionFailure>,
}

/// Fold `geometries` into one shape with a running union, left to right.
///
/// A step that fails is skipped and downgrades the status to partial; the fold
/// carries on with the remaining fragments. Returns `None` when nothing could
/// be unioned at all, in which case the feature has no geometry to show.
pub fn union_fragments<'a, I>(op: &dyn UnionOp, geometries: I) -> Option<UnionOutcome>
where
    I: IntoIterator<Item = &'a MultiPolygon<f64>>,
{
    let mut running: Option<MultiPolygon<f64>> = None;
    let mut merged = Vec::new();
    let mut failures = Vec::new();
    let empty = MultiPolygon(vec![]);

    for (index, geometry) in geometries.into_iter().enumerate() {
        // The first fragment is unioned with the empty shape so it is validated like the rest.
        let acc = running.as_ref().unwrap_or(&empty);
        match op.union_fragment(acc, geometry) {
            Ok(geometry) => {
                running = Some(geometry);
                merged.push(index);
            }
            Err(error) => {
                warn!(index, %error, "skipping fragment that failed to union");
                failures.push(UnionFailure { index, error });
            }
        }
    }

    let geometry = running.filter(|geometry| !geometry.0.is_empty())?;
    let status = if failures.is_empty() { MergeStatus::Complete } else { MergeStatus::Partial };
    Some(UnionOutcome { geometry, status, merged, failures })
}
