use std::path::PathBuf;

/// Seamless tile stitching CLI (argument schema only)
#[derive(clap::Parser, Debug)]
#[command(name = "seamless", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Replay a directory of z/x/y tiles through a seamless layer and write the merged features
    Stitch(StitchArgs),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, clap::ValueEnum)]
pub enum InputFormat { Geojson, Topojson }

#[derive(clap::Args, Debug)]
pub struct StitchArgs {
    /// Tile root directory, laid out as z/x/y.<ext>
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub tiles: PathBuf,

    /// Output GeoJSON file, defaults to "./merged.geojson"
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Tile payload format
    #[arg(short, long, value_enum, default_value_t = InputFormat::Geojson)]
    pub format: InputFormat,

    /// Feature property holding the cross-tile feature id
    #[arg(long, default_value = "id")]
    pub id_property: String,

    /// JSON file with layer options (shortDelayMs, longDelayMs, cleanupDelayMs)
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Debounce after a tile finishes loading, overrides the config file
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub short_delay_ms: Option<u64>,

    /// Debounce after the viewport settles, overrides the config file
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub long_delay_ms: Option<u64>,
}
