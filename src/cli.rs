use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

/// Vector tile pipeline CLI (argument schema only)
#[derive(Parser, Debug)]
#[command(name = "tilepress", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a tile archive from a feature source
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Input GeoJSON FeatureCollection
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub source: PathBuf,

    /// Output archive path (.pmtiles)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    /// Lowest zoom level to build
    #[arg(long, default_value_t = 0)]
    pub min_zoom: u8,

    /// Highest zoom level to build
    #[arg(long, default_value_t = 14)]
    pub max_zoom: u8,

    /// Output layer name
    #[arg(long, default_value = "features")]
    pub layer: String,

    /// Attribute to copy from input features (repeatable)
    #[arg(long = "attr")]
    pub attrs: Vec<String>,

    /// Buffer pixels around each tile clip
    #[arg(long, default_value_t = 4)]
    pub buffer: u16,

    /// Per-tile size budget in KiB
    #[arg(long, default_value_t = 500)]
    pub max_tile_kib: usize,

    /// Fail the run on an over-budget tile instead of writing best-effort
    #[arg(long)]
    pub strict: bool,
}
