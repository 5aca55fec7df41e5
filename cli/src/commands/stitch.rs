use std::{path::{Path, PathBuf}, sync::Arc};

use anyhow::{Context, Result};
use seamless::{
    ensure_dir_exists, list_tile_files, read_tile_file, write_merged_geojson_bytes, DisplayedFeatures,
    ManualClock, MergeConfig, MergeOptions, MergeStatus, SeamlessLayer, TileEvents, TileFormat,
};
use tracing::{info, warn};

use crate::cli::{InputFormat, StitchArgs};

impl From<InputFormat> for TileFormat {
    fn from(format: InputFormat) -> Self {
        match format {
            InputFormat::Geojson => TileFormat::GeoJson,
            InputFormat::Topojson => TileFormat::TopoJson,
        }
    }
}

/// Outcome of a replay.
#[derive(Debug)]
pub struct StitchSummary {
    pub tiles: usize,
    pub failed_tiles: usize,
    pub features: usize,
    pub partial: usize,
    pub passes: usize,
}

/// Resolve layer timing from the optional config file and command line overrides.
/// Overrides are applied before validation, so a derived cleanup delay follows them.
fn load_config(args: &StitchArgs) -> Result<MergeConfig> {
    let mut options = match &args.config {
        Some(path) => MergeOptions::read_from_file(path)?,
        None => MergeOptions::default(),
    };
    if let Some(ms) = args.short_delay_ms {
        options.short_delay_ms = Some(ms.into());
    }
    if let Some(ms) = args.long_delay_ms {
        options.long_delay_ms = Some(ms.into());
    }
    Ok(MergeConfig::from_options(&options))
}

/// Replay every tile under `args.tiles` through a layer on a simulated clock:
/// the viewport settles, all tiles start loading, then each tile delivers its
/// features and completes. Timers are fired as their deadlines come up.
pub fn stitch_tiles(args: &StitchArgs, output: &Path) -> Result<StitchSummary> {
    let format = TileFormat::from(args.format);
    let config = load_config(args)?;
    let tiles = list_tile_files(&args.tiles, format)?;
    info!(tiles = tiles.len(), root = %args.tiles.display(), "replaying tiles");

    let clock = Arc::new(ManualClock::new());
    let displayed = Arc::new(DisplayedFeatures::new());
    let layer = SeamlessLayer::new("stitch", config, displayed.clone()).with_clock(clock.clone());

    layer.on_viewport_settled();
    for (tile, _) in &tiles {
        layer.on_tile_load_start(*tile);
    }

    let mut failed_tiles = 0;
    for (tile, path) in &tiles {
        match read_tile_file(path, format, &args.id_property) {
            Ok(records) => {
                records.into_iter().for_each(|record| layer.on_feature_loaded(*tile, record));
                layer.on_tile_load_end(*tile);
            }
            Err(error) => {
                warn!(%tile, error = %format!("{error:#}"), "skipping unreadable tile");
                failed_tiles += 1;
                layer.on_tile_load_error(*tile);
            }
        }
    }

    let mut passes = 0;
    while let Some(deadline) = layer.next_deadline() {
        clock.advance_to(deadline);
        passes += layer.poll().len();
    }

    let features = displayed.current();
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir_exists(parent)?;
    }
    std::fs::write(output, write_merged_geojson_bytes(&features)?)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    Ok(StitchSummary {
        tiles: tiles.len(),
        failed_tiles,
        features: features.len(),
        partial: features.iter().filter(|f| f.status == MergeStatus::Partial).count(),
        passes,
    })
}

pub fn run(_cli: &crate::cli::Cli, args: &StitchArgs) -> Result<()> {
    let output: PathBuf = args.output.clone().unwrap_or("./merged.geojson".into());

    println!("[stitch] reading tiles from {}", args.tiles.display());
    let summary = stitch_tiles(args, &output)?;

    if summary.failed_tiles > 0 {
        eprintln!("[stitch] {} of {} tiles could not be read", summary.failed_tiles, summary.tiles);
    }
    println!(
        "[stitch] wrote {} features ({} partial) from {} tiles in {} passes to {}",
        summary.features, summary.partial, summary.tiles, summary.passes, output.display()
    );
    Ok(())
}
