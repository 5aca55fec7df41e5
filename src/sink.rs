use std::sync::{Arc, RwLock, PoisonError};

use crate::merge::{MergeBatch, MergedFeature};

/// Receives finished merge batches. The receiver replaces its whole displayed
/// set with each batch; batches are only delivered for non-empty passes.
pub trait PresentationSink: Send + Sync {
    fn on_merge_batch_ready(&self, batch: MergeBatch);
}

impl<F> PresentationSink for F
where
    F: Fn(MergeBatch) + Send + Sync,
{
    fn on_merge_batch_ready(&self, batch: MergeBatch) { self(batch) }
}

impl<S: PresentationSink + ?Sized> PresentationSink for Arc<S> {
    fn on_merge_batch_ready(&self, batch: MergeBatch) { (**self).on_merge_batch_ready(batch) }
}

#[derive(Debug, Default)]
struct Displayed {
    generation: u64,
    features: Arc<[MergedFeature]>,
}

/// The currently displayed feature set, swapped atomically on each batch.
/// Readers get a cheap shared handle to a complete generation, never a half-written one.
#[derive(Debug, Default)]
pub struct DisplayedFeatures {
    current: RwLock<Displayed>,
}

impl DisplayedFeatures {
    pub fn new() -> Self { Self::default() }

    /// Features of the latest published batch.
    pub fn current(&self) -> Arc<[MergedFeature]> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).features.clone()
    }

    /// Generation of the latest published batch (0 before any batch).
    pub fn generation(&self) -> u64 {
        self.current.read().unwrap_or_else(PoisonError::into_inner).generation
    }
}

impl PresentationSink for DisplayedFeatures {
    fn on_merge_batch_ready(&self, batch: MergeBatch) {
        let features: Arc<[MergedFeature]> = batch.features.into();
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Displayed { generation: batch.generation, features };
    }
}
