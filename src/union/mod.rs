mod fold;

pub use fold::{union_fragments, UnionFailure, UnionOutcome};

use std::panic::{catch_unwind, AssertUnwindSafe};

use geo::{BooleanOps, MultiPolygon, Validation};

/// Why a single union step failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnionError {
    /// An operand is not a valid polygon (self-intersection, degenerate ring, non-finite coordinate, ...).
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// The underlying overlay computation aborted.
    #[error("union aborted: {0}")]
    Aborted(String),
}

/// Polygon union capability used by the merge fold.
/// Implementations report failure instead of panicking or returning broken geometry.
pub trait UnionOp: Send + Sync {
    fn union(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, UnionError>;

    /// Fold `fragment` into `acc`, where `acc` is empty or the output of earlier
    /// successful steps. Only `fragment` needs checking.
    fn union_fragment(&self, acc: &MultiPolygon<f64>, fragment: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, UnionError> {
        self.union(acc, fragment)
    }
}

impl<F> UnionOp for F
where
    F: Fn(&MultiPolygon<f64>, &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, UnionError> + Send + Sync,
{
    fn union(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, UnionError> {
        self(a, b)
    }
}

/// Union backed by `geo::BooleanOps`, with operand validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoUnion;

impl GeoUnion {
    fn validate(geometry: &MultiPolygon<f64>) -> Result<(), UnionError> {
        geometry.check_validation()
            .map_err(|problem| UnionError::InvalidGeometry(problem.to_string()))
    }
}

impl UnionOp for GeoUnion {
    fn union(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, UnionError> {
        Self::validate(a)?;
        self.union_fragment(a, b)
    }

    fn union_fragment(&self, acc: &MultiPolygon<f64>, fragment: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, UnionError> {
        Self::validate(fragment)?;

        catch_unwind(AssertUnwindSafe(|| acc.union(fragment)))
            .map_err(|payload| {
                let message = payload.downcast_ref::<&str>().map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "overlay panicked".to_string());
                UnionError::Aborted(message)
            })
    }
}
