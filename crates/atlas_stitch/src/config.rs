use clap::{Args, Parser, Subcommand};
use lunamap::geo::moon;
use lunamap::pds3::DEFAULT_TILE_SIZE;
use lunamap::{AtlasGeometry, ConvertOptions, DrawSize, ErrorPolicy, NativeTileSize, StitchConfig};
use std::path::PathBuf;
use std::time::Duration;

/// `atlas_stitch` - builds a global lunar atlas from geo-referenced tiles.
///
/// Tiles are read from `<input-dir>/<revision>/<sub-region>/<tile>.png`, each
/// with a `<tile>_metadata.csv` next to it, and drawn onto one
/// equirectangular PNG.
#[derive(Parser, Debug)]
#[command(name = "atlas_stitch", version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Place every tile at the position given by its metadata.
    Stitch(StitchArgs),

    /// Pack the first tile of every sub-region into a uniform grid. Metadata
    /// is not read.
    Grid(CommonArgs),

    /// Turn PDS3 `.img` frames into PNG tiles plus metadata CSVs, mirroring
    /// the input tree.
    #[command(name = "img2tiles")]
    Img2Tiles(Img2TilesArgs),
}

/// Options shared by both modes.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Root of the tile tree.
    #[arg(long, env = "ATLAS_INPUT_DIR", default_value = "tiles")]
    pub input_dir: PathBuf,

    /// Where the atlas PNG is written.
    #[arg(long, env = "ATLAS_OUTPUT", default_value = "lunar_map.png")]
    pub output: PathBuf,

    #[arg(long, env = "ATLAS_CANVAS_WIDTH", default_value_t = 8192)]
    pub canvas_width: u32,

    #[arg(long, env = "ATLAS_CANVAS_HEIGHT", default_value_t = 4096)]
    pub canvas_height: u32,

    /// What to do when one tile fails: `continue` or `abort`.
    #[arg(long, env = "ATLAS_ON_ERROR", default_value_t = ErrorPolicy::Continue)]
    pub on_error: ErrorPolicy,

    /// Number of tiles decoded in parallel before each draw pass.
    #[arg(long, env = "ATLAS_DECODE_BATCH", default_value_t = 64)]
    pub decode_batch: usize,

    /// Give up on a single image decode after this many milliseconds.
    #[arg(long, env = "ATLAS_LOAD_TIMEOUT_MS")]
    pub load_timeout_ms: Option<u64>,

    /// Extra decode attempts after a failure.
    #[arg(long, env = "ATLAS_LOAD_RETRIES", default_value_t = 1)]
    pub load_retries: u32,

    /// Optional JSON run report (configuration, counts, skipped tiles).
    #[arg(long, env = "ATLAS_REPORT")]
    pub report: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StitchArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Circumference of the mapped body in km.
    #[arg(long, env = "ATLAS_CIRCUMFERENCE_KM", default_value_t = moon::CIRCUMFERENCE_KM)]
    pub circumference_km: f64,

    /// Native tile size used with the pixel scale: `auto` or `<w>x<h>`.
    #[arg(long, env = "ATLAS_TILE_SIZE", default_value_t = NativeTileSize::default())]
    pub tile_size: NativeTileSize,

    /// `projected` (canvas-scaled footprint) or `kilometers` (km as pixels).
    #[arg(long, env = "ATLAS_DRAW_SIZE", default_value_t = DrawSize::Projected)]
    pub draw_size: DrawSize,
}

#[derive(Args, Debug, Clone)]
pub struct Img2TilesArgs {
    /// Root of the frame tree (`<revision>/<sub-region>/<frame>.img`).
    #[arg(long, env = "ATLAS_FRAME_DIR", default_value = "downloaded_files")]
    pub input_dir: PathBuf,

    /// Where the tile tree is written; `stitch --input-dir` reads it.
    #[arg(long, env = "ATLAS_TILE_DIR", default_value = "tiles")]
    pub output_dir: PathBuf,

    /// Edge of the square output tiles in pixels.
    #[arg(long, env = "ATLAS_FRAME_TILE_SIZE", default_value_t = DEFAULT_TILE_SIZE)]
    pub tile_size: u32,

    /// Keep each frame's native size instead of resizing.
    #[arg(long, default_value_t = false, conflicts_with = "tile_size")]
    pub native_size: bool,

    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Optional JSON conversion report.
    #[arg(long, env = "ATLAS_REPORT")]
    pub report: Option<PathBuf>,
}

impl Img2TilesArgs {
    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            tile_size: (!self.native_size).then_some(self.tile_size),
            overwrite: self.overwrite,
        }
    }
}

impl CommonArgs {
    pub fn stitch_config(&self, body_circumference_km: f64) -> Result<StitchConfig, lunamap::AtlasError> {
        Ok(StitchConfig {
            geometry: AtlasGeometry::new(
                self.canvas_width,
                self.canvas_height,
                body_circumference_km,
            )?,
            error_policy: self.on_error,
            decode_batch: self.decode_batch,
            load_timeout: self.load_timeout_ms.map(Duration::from_millis),
            load_retries: self.load_retries,
            ..StitchConfig::default()
        })
    }
}

impl StitchArgs {
    pub fn stitch_config(&self) -> Result<StitchConfig, lunamap::AtlasError> {
        Ok(StitchConfig {
            native_tile_size: self.tile_size,
            draw_size: self.draw_size,
            ..self.common.stitch_config(self.circumference_km)?
        })
    }
}
