use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex, PoisonError,
};

use tracing::{debug, info, warn};

use crate::{
    fragment::{FragmentStore, Snapshot},
    merge::{MergeBatch, MergeStatus, MergedFeature, PassReport},
    sink::PresentationSink,
    union::{union_fragments, GeoUnion, UnionOp},
};

/// Runs merge passes: drain the store, union each feature, publish one batch.
#[derive(Debug, Default)]
pub struct MergeCoordinator<U = GeoUnion> {
    union: U,
    pass: Mutex<()>,        // held for the whole pass so passes never overlap
    generation: AtomicU64,  // last published generation
}

impl<U: UnionOp> MergeCoordinator<U> {
    pub fn new(union: U) -> Self {
        Self { union, pass: Mutex::new(()), generation: AtomicU64::new(0) }
    }

    /// Generation of the last published batch (0 if none yet).
    pub fn generation(&self) -> u64 { self.generation.load(Ordering::Acquire) }

    /// Run one pass over the fragments currently in `store`.
    ///
    /// Returns `None` when there was nothing to publish: either the store was
    /// empty or no feature produced any geometry. An empty batch is never
    /// published, so the displayed set is left as is.
    pub fn run_pass(&self, store: &FragmentStore, sink: &dyn PresentationSink) -> Option<PassReport> {
        let _pass = self.pass.lock().unwrap_or_else(PoisonError::into_inner);

        let snapshot = store.drain_all();
        if snapshot.is_empty() {
            debug!("merge pass found no fragments");
            return None
        }

        let (features, mut report) = self.merge_snapshot(snapshot);
        if features.is_empty() {
            warn!(dropped = report.dropped, "merge pass produced no geometry, keeping displayed features");
            return None
        }

        report.generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        report.published = features.len();
        info!(
            generation = report.generation,
            fragments = report.fragments,
            features = report.published,
            partial = report.partial,
            dropped = report.dropped,
            "publishing merged features"
        );
        sink.on_merge_batch_ready(MergeBatch { generation: report.generation, features });
        Some(report)
    }

    /// Union every feature of a drained snapshot, ordered by feature id.
    pub fn merge_snapshot(&self, snapshot: Snapshot) -> (Vec<MergedFeature>, PassReport) {
        let mut entries: Vec<_> = snapshot.into_iter().collect();
        entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

        let mut report = PassReport::default();
        let mut features = Vec::with_capacity(entries.len());

        for (feature_id, fragments) in entries {
            report.fragments += fragments.len();
            let Some(outcome) = union_fragments(&self.union, fragments.iter().map(|f| f.geometry())) else {
                warn!(%feature_id, fragments = fragments.len(), "no fragment could be unioned, dropping feature");
                report.dropped += 1;
                continue
            };

            if outcome.status == MergeStatus::Partial {
                warn!(%feature_id, skipped = outcome.failures.len(), "feature merged partially");
                report.partial += 1;
            }

            // Attributes follow the last fragment that made it into the geometry.
            let attributes = outcome.merged.last()
                .and_then(|&index| fragments.get(index))
                .map(|f| f.attributes().clone())
                .unwrap_or_default();
            features.push(MergedFeature {
                feature_id,
                geometry: outcome.geometry,
                attributes,
                status: outcome.status,
                fragments: fragments.len(),
            });
        }

        (features, report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use geo::{polygon, Area, MultiPolygon};
    use serde_json::json;

    use super::*;
    use crate::fragment::{Attributes, FeatureRecord, TileId};

    fn square(x: f64, v: i64) -> FeatureRecord {
        let mut attributes = Attributes::new();
        attributes.insert("v".into(), json!(v));
        let geometry = polygon![(x: x, y: 0.0), (x: x + 1.0, y: 0.0), (x: x + 1.0, y: 1.0), (x: x, y: 1.0)];
        FeatureRecord { id: None, geometry: Some(geometry.into()), attributes }
    }

    fn with_id(id: &str, record: FeatureRecord) -> FeatureRecord {
        FeatureRecord { id: Some(id.into()), ..record }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<MergeBatch>>);

    impl PresentationSink for Recorder {
        fn on_merge_batch_ready(&self, batch: MergeBatch) { self.0.lock().unwrap().push(batch) }
    }

    #[test]
    fn empty_store_publishes_nothing() {
        let coordinator = MergeCoordinator::new(GeoUnion);
        let sink = Recorder::default();
        assert!(coordinator.run_pass(&FragmentStore::new(), &sink).is_none());
        assert!(sink.0.lock().unwrap().is_empty());
        assert_eq!(coordinator.generation(), 0);
    }

    #[test]
    fn pass_merges_per_feature_and_counts() {
        let store = FragmentStore::new();
        store.add_fragment(TileId::new(1, 0, 0), with_id("b", square(0.0, 1)));
        store.add_fragment(TileId::new(1, 1, 0), with_id("b", square(1.0, 2)));
        store.add_fragment(TileId::new(1, 0, 0), with_id("a", square(5.0, 3)));

        let coordinator = MergeCoordinator::new(GeoUnion);
        let sink = Recorder::default();
        let report = coordinator.run_pass(&store, &sink).unwrap();

        assert_eq!(report, PassReport { generation: 1, fragments: 3, published: 2, partial: 0, dropped: 0 });
        let batches = sink.0.lock().unwrap();
        let ids: Vec<_> = batches[0].features.iter().map(|f| f.feature_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let b = batches[0].get("b").unwrap();
        assert_eq!(b.fragments, 2);
        assert_eq!(b.attributes["v"], json!(2));
        assert!((b.geometry.unsigned_area() - 2.0).abs() < 1e-9);
        assert!(store.is_empty());
    }

    #[test]
    fn attributes_skip_fragments_that_failed_to_union() {
        let store = FragmentStore::new();
        let mut bowtie = with_id("a", square(0.0, 2));
        bowtie.geometry = Some(polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 2.0), (x: 2.0, y: 0.0), (x: 0.0, y: 2.0)].into());
        store.add_fragment(TileId::new(1, 0, 0), with_id("a", square(0.0, 1)));
        store.add_fragment(TileId::new(1, 1, 0), bowtie);

        let coordinator = MergeCoordinator::new(GeoUnion);
        let sink = Recorder::default();
        assert_eq!(coordinator.run_pass(&store, &sink).unwrap().partial, 1);

        let batches = sink.0.lock().unwrap();
        let a = batches[0].get("a").unwrap();
        assert_eq!(a.status, MergeStatus::Partial);
        assert_eq!(a.attributes["v"], json!(1));
    }

    #[test]
    fn generations_increase_per_published_batch() {
        let store = FragmentStore::new();
        let coordinator = MergeCoordinator::new(GeoUnion);
        let sink = Recorder::default();

        store.add_fragment(TileId::new(1, 0, 0), with_id("a", square(0.0, 1)));
        coordinator.run_pass(&store, &sink);
        coordinator.run_pass(&store, &sink);
        store.add_fragment(TileId::new(1, 0, 0), with_id("a", square(0.0, 2)));
        coordinator.run_pass(&store, &sink);

        let generations: Vec<_> = sink.0.lock().unwrap().iter().map(|b| b.generation).collect();
        assert_eq!(generations, vec![1, 2]);
    }

    #[test]
    fn failing_union_op_drops_every_feature() {
        let broken = |_: &MultiPolygon<f64>, _: &MultiPolygon<f64>| -> Result<MultiPolygon<f64>, crate::UnionError> {
            Err(crate::UnionError::Aborted("topology exception".into()))
        };
        let store = FragmentStore::new();
        store.add_fragment(TileId::new(1, 0, 0), with_id("a", square(0.0, 1)));

        let coordinator = MergeCoordinator::new(broken);
        let sink = Recorder::default();
        assert!(coordinator.run_pass(&store, &sink).is_none());
        assert!(sink.0.lock().unwrap().is_empty());
    }
}
