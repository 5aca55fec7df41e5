use std::sync::{Mutex, MutexGuard, PoisonError};

use ahash::AHashMap;
use tracing::debug;

use crate::fragment::{FeatureId, FeatureRecord, Fragment, TileId};

/// Fragments drained for one merge pass, keyed by feature, in arrival order.
pub type Snapshot = AHashMap<FeatureId, Vec<Fragment>>;

#[derive(Debug)]
struct StoredFragment {
    tile: TileId,
    fragment: Fragment,
}

/// Load state of one tile, as reported by the host.
#[derive(Debug, Default)]
struct TileEntry {
    loading: bool,
    pending: usize, // fragments accepted from this tile since the last drain
}

#[derive(Debug, Default)]
struct Inner {
    fragments: AHashMap<FeatureId, Vec<StoredFragment>>,
    tiles: AHashMap<TileId, TileEntry>,
    pending: usize,
}

/// What `discard_tile` removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscardedTile {
    pub fragments: usize,  // undrained fragments dropped
    pub was_loading: bool, // the tile was still in flight
}

/// Accumulates fragments between merge passes.
///
/// All mutation goes through one lock, so `add_fragment` and `drain_all` are
/// linearizable: a fragment lands either in the snapshot being drained or in
/// the next window, never both and never neither.
#[derive(Debug, Default)]
pub struct FragmentStore {
    inner: Mutex<Inner>,
}

impl FragmentStore {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves `Inner` consistent, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate a record delivered by `tile` and append it to its feature's sequence.
    /// Returns false (and logs) when the record has no id or no usable geometry.
    pub fn add_fragment(&self, tile: TileId, record: FeatureRecord) -> bool {
        let fragment = match Fragment::try_from(record) {
            Ok(fragment) => fragment,
            Err(reason) => {
                debug!(%tile, reason = reason.as_str(), "discarding malformed fragment");
                return false
            }
        };

        let mut inner = self.lock();
        inner.tiles.entry(tile).or_default().pending += 1;
        inner.pending += 1;
        inner.fragments
            .entry(fragment.feature_id().clone())
            .or_default()
            .push(StoredFragment { tile, fragment });
        true
    }

    /// Take every fragment of the current window and start a new, empty one.
    pub fn drain_all(&self) -> Snapshot {
        let mut inner = self.lock();
        let fragments = std::mem::take(&mut inner.fragments);
        inner.pending = 0;
        inner.tiles.values_mut().for_each(|entry| entry.pending = 0);
        drop(inner);

        fragments.into_iter()
            .map(|(id, stored)| (id, stored.into_iter().map(|s| s.fragment).collect()))
            .collect()
    }

    /// Drop the not-yet-drained fragments delivered by `tile` and forget the tile,
    /// e.g. when the host unloads it. A tile that was still loading stops counting as in flight.
    pub fn discard_tile(&self, tile: TileId) -> DiscardedTile {
        let mut inner = self.lock();
        let mut removed = 0;
        inner.fragments.retain(|_, stored| {
            let before = stored.len();
            stored.retain(|s| s.tile != tile);
            removed += before - stored.len();
            !stored.is_empty()
        });
        inner.pending -= removed;
        let was_loading = inner.tiles.remove(&tile).is_some_and(|entry| entry.loading);
        DiscardedTile { fragments: removed, was_loading }
    }

    /// Record that `tile` started loading. Returns the number of tiles now in flight.
    pub fn begin_tile(&self, tile: TileId) -> usize {
        let mut inner = self.lock();
        inner.tiles.entry(tile).or_default().loading = true;
        Self::count_in_flight(&inner)
    }

    /// Record that `tile` finished loading (successfully or not).
    /// Returns the number of tiles still in flight.
    pub fn end_tile(&self, tile: TileId) -> usize {
        let mut inner = self.lock();
        match inner.tiles.get_mut(&tile) {
            Some(entry) => entry.loading = false,
            None => debug!(%tile, "load end for a tile that never started"),
        }
        Self::count_in_flight(&inner)
    }

    /// Number of tiles currently loading.
    pub fn in_flight(&self) -> usize { Self::count_in_flight(&self.lock()) }

    fn count_in_flight(inner: &Inner) -> usize {
        inner.tiles.values().filter(|entry| entry.loading).count()
    }

    /// Forget tiles that are neither loading nor holding undrained fragments.
    /// Returns the number of tile entries removed.
    pub fn prune_settled_tiles(&self) -> usize {
        let mut inner = self.lock();
        let before = inner.tiles.len();
        inner.tiles.retain(|_, entry| entry.loading || entry.pending > 0);
        before - inner.tiles.len()
    }

    /// Number of tiles the store is still tracking.
    pub fn tracked_tiles(&self) -> usize { self.lock().tiles.len() }

    /// Number of fragments waiting for the next drain.
    pub fn len(&self) -> usize { self.lock().pending }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
    use geo::{polygon, MultiPolygon};
    use serde_json::json;

    use super::*;
    use crate::fragment::Attributes;

    fn record(id: &str, v: i64) -> FeatureRecord {
        let mut attributes = Attributes::new();
        attributes.insert("v".into(), json!(v));
        let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        FeatureRecord::new(id, square, attributes)
    }

    #[test]
    fn malformed_records_are_not_stored() {
        let store = FragmentStore::new();
        let tile = TileId::new(1, 0, 0);
        assert!(!store.add_fragment(tile, FeatureRecord { id: None, ..record("a", 1) }));
        assert!(!store.add_fragment(tile, FeatureRecord { geometry: Some(MultiPolygon(vec![])), ..record("a", 1) }));
        assert!(store.is_empty());
    }

    #[test]
    fn drain_returns_fragments_in_arrival_order_and_clears() {
        let store = FragmentStore::new();
        store.add_fragment(TileId::new(1, 0, 0), record("a", 1));
        store.add_fragment(TileId::new(1, 1, 0), record("a", 2));
        store.add_fragment(TileId::new(1, 1, 0), record("b", 3));

        let snapshot = store.drain_all();
        assert_eq!(snapshot.len(), 2);
        let values: Vec<_> = snapshot[&FeatureId::new("a")].iter().map(|f| f.attributes()["v"].clone()).collect();
        assert_eq!(values, vec![json!(1), json!(2)]);

        assert!(store.is_empty());
        assert!(store.drain_all().is_empty());
    }

    #[test]
    fn duplicate_deliveries_are_kept() {
        let store = FragmentStore::new();
        let tile = TileId::new(1, 0, 0);
        store.add_fragment(tile, record("a", 1));
        store.add_fragment(tile, record("a", 1));
        assert_eq!(store.drain_all()[&FeatureId::new("a")].len(), 2);
    }

    #[test]
    fn fragments_added_after_drain_go_to_next_window() {
        let store = FragmentStore::new();
        store.add_fragment(TileId::new(1, 0, 0), record("a", 1));
        let first = store.drain_all();
        store.add_fragment(TileId::new(1, 0, 1), record("a", 2));
        let second = store.drain_all();

        assert_eq!(first[&FeatureId::new("a")].len(), 1);
        assert_eq!(second[&FeatureId::new("a")][0].attributes()["v"], json!(2));
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let store = std::sync::Arc::new(FragmentStore::new());
        let producers: Vec<_> = (0..4).map(|t| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..250 {
                    store.add_fragment(TileId::new(2, t, i), record(&format!("f{}", i % 10), i as i64));
                }
            })
        }).collect();

        let mut total = 0;
        while producers.iter().any(|p| !p.is_finished()) {
            total += store.drain_all().values().map(Vec::len).sum::<usize>();
        }
        for producer in producers { producer.join().unwrap() }
        total += store.drain_all().values().map(Vec::len).sum::<usize>();

        assert_eq!(total, 1000);
    }

    #[test]
    fn discard_tile_removes_only_its_pending_fragments() {
        let store = FragmentStore::new();
        let (a, b) = (TileId::new(3, 1, 1), TileId::new(3, 1, 2));
        store.add_fragment(a, record("x", 1));
        store.add_fragment(b, record("x", 2));
        store.add_fragment(a, record("y", 3));

        assert_eq!(store.discard_tile(a), DiscardedTile { fragments: 2, was_loading: false });
        assert_eq!(store.len(), 1);
        let snapshot = store.drain_all();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&FeatureId::new("x")][0].attributes()["v"], json!(2));
    }

    #[test]
    fn discarding_a_loading_tile_takes_it_out_of_flight() {
        let store = FragmentStore::new();
        let (a, b) = (TileId::new(3, 2, 0), TileId::new(3, 2, 1));
        store.begin_tile(a);
        store.begin_tile(b);
        store.add_fragment(b, record("x", 1));

        assert_eq!(store.discard_tile(b), DiscardedTile { fragments: 1, was_loading: true });
        assert_eq!(store.in_flight(), 1);
        assert_eq!(store.end_tile(a), 0);
    }

    #[test]
    fn in_flight_tracks_loading_tiles() {
        let store = FragmentStore::new();
        let (a, b) = (TileId::new(3, 0, 0), TileId::new(3, 0, 1));
        assert_eq!(store.begin_tile(a), 1);
        assert_eq!(store.begin_tile(b), 2);
        assert_eq!(store.begin_tile(b), 2);
        assert_eq!(store.end_tile(a), 1);
        assert_eq!(store.end_tile(TileId::new(9, 9, 9)), 1);
        assert_eq!(store.end_tile(b), 0);
    }

    #[test]
    fn prune_keeps_loading_and_pending_tiles() {
        let store = FragmentStore::new();
        let (loading, pending, settled) = (TileId::new(4, 0, 0), TileId::new(4, 0, 1), TileId::new(4, 0, 2));
        store.begin_tile(loading);
        store.begin_tile(pending);
        store.add_fragment(pending, record("p", 1));
        store.end_tile(pending);
        store.begin_tile(settled);
        store.end_tile(settled);

        assert_eq!(store.prune_settled_tiles(), 1);
        assert_eq!(store.tracked_tiles(), 2);

        store.drain_all();
        assert_eq!(store.prune_settled_tiles(), 1);
        assert_eq!(store.tracked_tiles(), 1);
    }
}
