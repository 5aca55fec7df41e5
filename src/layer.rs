use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    time::{Duration, Instant},
};

use tracing::{debug, error, warn};

use crate::{
    clock::{Clock, SystemClock},
    config::MergeConfig,
    fragment::{FeatureRecord, FragmentStore, TileId},
    merge::{MergeCoordinator, MergePhase, MergeScheduler, PassReport, Scheduled},
    sink::PresentationSink,
    union::{GeoUnion, UnionOp},
};

/// Tile lifecycle notifications a tiled-vector host delivers to a layer.
pub trait TileEvents {
    /// A tile request was issued.
    fn on_tile_load_start(&self, tile: TileId);

    /// One feature of a tile was parsed.
    fn on_feature_loaded(&self, tile: TileId, feature: FeatureRecord);

    /// A tile finished loading.
    fn on_tile_load_end(&self, tile: TileId);

    /// A tile failed to load. It no longer counts as in flight.
    fn on_tile_load_error(&self, tile: TileId);

    /// A tile left the grid; fragments it delivered that were not merged yet are discarded.
    fn on_tile_unload(&self, tile: TileId);

    /// The viewport stopped moving; the host is about to request a new batch of tiles.
    fn on_viewport_settled(&self);
}

/// A seamless vector layer: accumulates per-tile fragments and periodically
/// publishes one stitched geometry per feature id to its sink.
///
/// Timers are cooperative: the host calls `poll` whenever `next_deadline` has
/// passed (or simply on every frame). Every method takes `&self`, so producers
/// on other threads may feed tiles while a pass runs.
pub struct SeamlessLayer<S, U = GeoUnion, C = SystemClock> {
    name: String,
    config: MergeConfig,
    clock: C,
    store: FragmentStore,
    scheduler: MergeScheduler,
    coordinator: MergeCoordinator<U>,
    sink: S,
}

impl<S: PresentationSink> SeamlessLayer<S> {
    pub fn new(name: impl Into<String>, config: MergeConfig, sink: S) -> Self {
        Self {
            name: name.into(),
            config,
            clock: SystemClock,
            store: FragmentStore::new(),
            scheduler: MergeScheduler::new(),
            coordinator: MergeCoordinator::new(GeoUnion),
            sink,
        }
    }
}

impl<S, U, C> SeamlessLayer<S, U, C>
where
    S: PresentationSink,
    U: UnionOp,
    C: Clock,
{
    /// Replace the time source.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> SeamlessLayer<S, U, C2> {
        SeamlessLayer {
            name: self.name,
            config: self.config,
            clock,
            store: self.store,
            scheduler: self.scheduler,
            coordinator: self.coordinator,
            sink: self.sink,
        }
    }

    /// Replace the union capability.
    pub fn with_union<U2: UnionOp>(self, union: U2) -> SeamlessLayer<S, U2, C> {
        SeamlessLayer {
            name: self.name,
            config: self.config,
            clock: self.clock,
            store: self.store,
            scheduler: self.scheduler,
            coordinator: MergeCoordinator::new(union),
            sink: self.sink,
        }
    }

    #[inline] pub fn name(&self) -> &str { &self.name }

    #[inline] pub fn config(&self) -> &MergeConfig { &self.config }

    #[inline] pub fn sink(&self) -> &S { &self.sink }

    #[inline] pub fn store(&self) -> &FragmentStore { &self.store }

    #[inline] pub fn phase(&self) -> MergePhase { self.scheduler.phase() }

    /// Arm the merge window to fire `delay` from now, replacing any pending one.
    pub fn schedule_merge(&self, delay: Duration) -> Scheduled {
        self.scheduler.schedule_merge(self.clock.now(), delay)
    }

    /// Merge whatever is in the store right now and publish it.
    /// After a published pass, cleanup of settled tile bookkeeping is scheduled.
    pub fn run_pass(&self) -> Option<PassReport> {
        let report = self.coordinator.run_pass(&self.store, &self.sink)?;
        self.scheduler.schedule_cleanup(self.clock.now() + self.config.cleanup_delay);
        Some(report)
    }

    /// Fire every due timer. Returns the reports of the passes that published.
    ///
    /// If a merge was requested while a pass was running, the follow-up pass
    /// runs within the same call. A pass whose sink panics is logged and skipped.
    pub fn poll(&self) -> Vec<PassReport> {
        let mut reports = Vec::new();
        while let Some(window) = self.scheduler.take_due(self.clock.now()) {
            let id = window.id();
            debug!(layer = %self.name, window = id, "merge window fired");

            // The window is completed even if the sink panics, so later requests still fire.
            let pass = catch_unwind(AssertUnwindSafe(|| self.run_pass()));
            self.scheduler.complete(window, self.clock.now());
            match pass {
                Ok(report) => reports.extend(report),
                Err(_) => error!(layer = %self.name, window = id, "merge pass panicked, its fragments are lost"),
            }
        }

        if self.scheduler.take_due_cleanup(self.clock.now()) {
            let pruned = self.store.prune_settled_tiles();
            debug!(layer = %self.name, pruned, "cleaned up settled tiles");
        }
        reports
    }

    /// When the next timer is due, if any.
    pub fn next_deadline(&self) -> Option<Instant> { self.scheduler.next_deadline() }

    fn tile_settled(&self, tile: TileId) {
        let in_flight = self.store.end_tile(tile);
        debug!(layer = %self.name, %tile, in_flight, "tile settled");
        if in_flight == 0 {
            self.schedule_merge(self.config.short_delay);
        }
    }
}

impl<S, U, C> TileEvents for SeamlessLayer<S, U, C>
where
    S: PresentationSink,
    U: UnionOp,
    C: Clock,
{
    fn on_tile_load_start(&self, tile: TileId) {
        let in_flight = self.store.begin_tile(tile);
        debug!(layer = %self.name, %tile, in_flight, "tile loading");
    }

    fn on_feature_loaded(&self, tile: TileId, feature: FeatureRecord) {
        self.store.add_fragment(tile, feature);
    }

    fn on_tile_load_end(&self, tile: TileId) {
        self.tile_settled(tile);
    }

    fn on_tile_load_error(&self, tile: TileId) {
        warn!(layer = %self.name, %tile, "tile failed to load");
        self.tile_settled(tile);
    }

    fn on_tile_unload(&self, tile: TileId) {
        let discarded = self.store.discard_tile(tile);
        debug!(layer = %self.name, %tile, discarded = discarded.fragments, "tile unloaded");
        // Unloading the last tile in flight settles the grid like a load end would.
        if discarded.was_loading && self.store.in_flight() == 0 {
            self.schedule_merge(self.config.short_delay);
        }
    }

    fn on_viewport_settled(&self) {
        self.schedule_merge(self.config.long_delay);
    }
}
