#![doc = "Seamless tiled vector layers: stitch per-tile feature fragments into whole geometries"]
mod clock;
mod common;
mod config;
mod fragment;
mod layer;
mod merge;
mod sink;
mod union;

#[doc(inline)]
pub use clock::{Clock, ManualClock, SystemClock};

#[doc(inline)]
pub use common::{
    ensure_dir_exists, list_tile_files, merged_to_geojson, read_tile_file, tile_id_from_path,
    write_merged_geojson_bytes, FormatError, TileFormat,
};

#[doc(inline)]
pub use config::{MergeConfig, MergeOptions, DEFAULT_LONG_DELAY_MS, DEFAULT_SHORT_DELAY_MS};

#[doc(inline)]
pub use fragment::{Attributes, DiscardedTile, FeatureId, FeatureRecord, Fragment, FragmentStore, Rejection, Snapshot, TileId};

#[doc(inline)]
pub use layer::{SeamlessLayer, TileEvents};

#[doc(inline)]
pub use merge::{
    MergeBatch, MergeCoordinator, MergePhase, MergeScheduler, MergeStatus, MergeWindow, MergedFeature,
    PassReport, Scheduled, WindowState,
};

#[doc(inline)]
pub use sink::{DisplayedFeatures, PresentationSink};

#[doc(inline)]
pub use union::{union_fragments, GeoUnion, UnionError, UnionFailure, UnionOp, UnionOutcome};
