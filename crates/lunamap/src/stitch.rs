//! End-to-end atlas run: load tiles, place them, composite them in order.
//!
//! Loading (metadata, placement, image decode) runs on the rayon pool one
//! batch at a time. Drawing is always sequential and follows the order of the
//! input list, so the result is the same as a fully serial run.

use crate::boundary::compute_boundary;
use crate::canvas::{load_tile, AtlasCanvas};
use crate::error::{AtlasError, TileError};
use crate::grid::grid_placements;
use crate::metadata::{require_reticle_fields, TileMetadata};
use crate::placement::{compute_placement, AtlasGeometry, DrawSize, PlacementRect};
use crate::walker::TileSource;
use image::GrayAlphaImage;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// What to do when a single tile cannot be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log, record in the summary, keep going.
    #[default]
    Continue,
    /// Stop the run at the first failing tile.
    Abort,
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "continue" => Ok(ErrorPolicy::Continue),
            "abort" => Ok(ErrorPolicy::Abort),
            other => Err(format!(
                "unknown error policy `{other}` (expected `continue` or `abort`)"
            )),
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorPolicy::Continue => "continue",
            ErrorPolicy::Abort => "abort",
        })
    }
}

/// Native pixel size used to turn per-pixel ground scale into a footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeTileSize {
    /// Use the decoded image's own dimensions.
    FromImage,
    Fixed { width: u32, height: u32 },
}

impl Default for NativeTileSize {
    fn default() -> Self {
        NativeTileSize::Fixed {
            width: 128,
            height: 128,
        }
    }
}

impl FromStr for NativeTileSize {
    type Err = String;

    /// Accepts `auto` or `<width>x<height>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(NativeTileSize::FromImage);
        }

        let (w, h) = s
            .split_once(|c: char| c.eq_ignore_ascii_case(&'x'))
            .ok_or_else(|| format!("expected `auto` or `<w>x<h>`, got `{s}`"))?;
        let width: u32 = w.trim().parse().map_err(|_| format!("bad tile width `{w}`"))?;
        let height: u32 = h.trim().parse().map_err(|_| format!("bad tile height `{h}`"))?;

        if width == 0 || height == 0 {
            return Err(format!("tile size must be non-zero, got `{s}`"));
        }

        Ok(NativeTileSize::Fixed { width, height })
    }
}

impl fmt::Display for NativeTileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeTileSize::FromImage => f.write_str("auto"),
            NativeTileSize::Fixed { width, height } => write!(f, "{width}x{height}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StitchConfig {
    pub geometry: AtlasGeometry,
    pub native_tile_size: NativeTileSize,
    pub draw_size: DrawSize,
    pub error_policy: ErrorPolicy,
    /// Tiles decoded in parallel before the next sequential draw pass.
    pub decode_batch: usize,
    /// Upper bound for a single image decode; `None` waits indefinitely.
    pub load_timeout: Option<Duration>,
    /// Extra decode attempts after a failed one.
    pub load_retries: u32,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            geometry: AtlasGeometry::default(),
            native_tile_size: NativeTileSize::default(),
            draw_size: DrawSize::default(),
            error_policy: ErrorPolicy::default(),
            decode_batch: 64,
            load_timeout: None,
            load_retries: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedTile {
    pub image_path: PathBuf,
    pub kind: &'static str,
    pub reason: String,
}

/// Outcome of a run. `skipped` lists tiles in draw order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StitchSummary {
    pub discovered: usize,
    pub drawn: usize,
    /// Placed successfully but entirely outside the canvas or zero-sized.
    pub off_canvas: usize,
    pub skipped: Vec<SkippedTile>,
    pub elapsed_ms: u64,
}

impl StitchSummary {
    pub fn log(&self) {
        info!(
            "Atlas done: {} discovered, {} drawn, {} off-canvas, {} skipped in {} ms",
            self.discovered,
            self.drawn,
            self.off_canvas,
            self.skipped.len(),
            self.elapsed_ms
        );
        for skipped in &self.skipped {
            info!(
                "  skipped {} [{}]: {}",
                skipped.image_path.display(),
                skipped.kind,
                skipped.reason
            );
        }
    }
}

/// A decoded tile and where to draw it.
pub struct PreparedTile {
    pub image: GrayAlphaImage,
    pub rect: PlacementRect,
}

pub struct AtlasStitcher {
    config: StitchConfig,
}

impl AtlasStitcher {
    pub fn new(config: StitchConfig) -> Result<Self, AtlasError> {
        if config.decode_batch == 0 {
            return Err(AtlasError::Config("decode batch must be at least 1".into()));
        }
        // Re-run the geometry checks for configs built by hand.
        AtlasGeometry::new(
            config.geometry.canvas_width,
            config.geometry.canvas_height,
            config.geometry.body_circumference_km,
        )?;

        Ok(Self { config })
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    pub fn new_canvas(&self) -> AtlasCanvas {
        AtlasCanvas::for_geometry(&self.config.geometry)
    }

    /// Reads metadata, derives the placement and decodes the image of one
    /// geo-referenced tile.
    pub fn prepare_tile(&self, source: &TileSource) -> Result<PreparedTile, TileError> {
        let metadata = TileMetadata::from_path(&source.metadata_path)?;
        require_reticle_fields(&metadata)?;

        let boundary = compute_boundary(&metadata);
        let geometry = &self.config.geometry;

        let (placement, image) = match self.config.native_tile_size {
            NativeTileSize::Fixed { width, height } => {
                // Validate metadata before paying for the decode.
                let placement = compute_placement(&boundary, &metadata, geometry, width, height)?;
                (placement, self.load_image(&source.image_path)?)
            }
            NativeTileSize::FromImage => {
                let image = self.load_image(&source.image_path)?;
                let (width, height) = image.dimensions();
                (
                    compute_placement(&boundary, &metadata, geometry, width, height)?,
                    image,
                )
            }
        };

        let rect = placement.draw_rect(self.config.draw_size);
        debug!(
            "{}: bounds lat=[{:.4}, {:.4}] lon=[{:.4}, {:.4}] -> x={:.2} y={:.2} w={:.2} h={:.2} ({:.3}x{:.3} km)",
            source.name,
            boundary.min_lat,
            boundary.max_lat,
            boundary.min_lon,
            boundary.max_lon,
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            placement.width_km,
            placement.height_km
        );

        Ok(PreparedTile { image, rect })
    }

    /// Composites every geo-referenced tile in `sources` onto `canvas`.
    pub fn stitch(
        &self,
        sources: &[TileSource],
        canvas: &mut AtlasCanvas,
    ) -> Result<StitchSummary, AtlasError> {
        info!(
            "Stitching {} tiles onto a {}x{} canvas (draw size: {}, native tile size: {})",
            sources.len(),
            canvas.width(),
            canvas.height(),
            self.config.draw_size,
            self.config.native_tile_size
        );
        self.run(sources, canvas, |_, source| self.prepare_tile(source))
    }

    /// Packs the tiles into a uniform grid, ignoring their metadata.
    pub fn stitch_grid(
        &self,
        sources: &[TileSource],
        canvas: &mut AtlasCanvas,
    ) -> Result<StitchSummary, AtlasError> {
        let cells = grid_placements(sources.len(), canvas.width(), canvas.height());
        info!(
            "Packing {} tiles into a {}x{} grid atlas",
            sources.len(),
            canvas.width(),
            canvas.height()
        );

        self.run(sources, canvas, |index, source| {
            let image = self.load_image(&source.image_path)?;
            Ok(PreparedTile {
                image,
                rect: cells[index],
            })
        })
    }

    fn run<F>(
        &self,
        sources: &[TileSource],
        canvas: &mut AtlasCanvas,
        prepare: F,
    ) -> Result<StitchSummary, AtlasError>
    where
        F: Fn(usize, &TileSource) -> Result<PreparedTile, TileError> + Sync,
    {
        let started = Instant::now();
        let mut summary = StitchSummary {
            discovered: sources.len(),
            ..StitchSummary::default()
        };

        let batch = self.config.decode_batch;
        for (batch_index, chunk) in sources.chunks(batch).enumerate() {
            let offset = batch_index * batch;

            let prepared: Vec<Result<PreparedTile, TileError>> = chunk
                .par_iter()
                .enumerate()
                .map(|(i, source)| prepare(offset + i, source))
                .collect();

            for (source, result) in chunk.iter().zip(prepared) {
                match result {
                    Ok(tile) => {
                        if canvas.composite_tile(&tile.image, &tile.rect) {
                            summary.drawn += 1;
                        } else {
                            debug!("{}: nothing to draw at {:?}", source.name, tile.rect);
                            summary.off_canvas += 1;
                        }
                    }
                    Err(err) => self.record_failure(&mut summary, source, err)?,
                }
            }

            debug!(
                "batch {}: {}/{} tiles drawn so far",
                batch_index,
                summary.drawn,
                sources.len()
            );
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(summary)
    }

    fn record_failure(
        &self,
        summary: &mut StitchSummary,
        source: &TileSource,
        err: TileError,
    ) -> Result<(), AtlasError> {
        warn!("Skipping {}: {}", source.image_path.display(), err);

        if self.config.error_policy == ErrorPolicy::Abort {
            return Err(AtlasError::Aborted {
                path: source.image_path.clone(),
                source: err,
            });
        }

        summary.skipped.push(SkippedTile {
            image_path: source.image_path.clone(),
            kind: err.kind(),
            reason: err.to_string(),
        });
        Ok(())
    }

    /// Decodes an image, retrying failed attempts with a short pause.
    fn load_image(&self, path: &Path) -> Result<GrayAlphaImage, TileError> {
        self.load_with(path, |p: &Path| load_tile(p))
    }

    /// Runs `decode` under the configured retry and timeout limits. At most
    /// `1 + load_retries` attempts are made.
    fn load_with<D>(&self, path: &Path, decode: D) -> Result<GrayAlphaImage, TileError>
    where
        D: Fn(&Path) -> Result<GrayAlphaImage, TileError> + Clone + Send + 'static,
    {
        let mut attempt = 0;
        loop {
            match self.load_once(path, decode.clone()) {
                Ok(image) => return Ok(image),
                Err(err) if attempt < self.config.load_retries => {
                    attempt += 1;
                    debug!("retrying {} ({attempt}): {err}", path.display());
                    thread::sleep(RETRY_BACKOFF);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn load_once<D>(&self, path: &Path, decode: D) -> Result<GrayAlphaImage, TileError>
    where
        D: FnOnce(&Path) -> Result<GrayAlphaImage, TileError> + Send + 'static,
    {
        let Some(timeout) = self.config.load_timeout else {
            return decode(path);
        };

        let failure = |reason: String| TileError::ImageLoadFailure {
            path: path.to_path_buf(),
            reason,
        };

        // The decode thread is detached on timeout and finishes on its own.
        let (tx, rx) = mpsc::channel();
        let owned = path.to_path_buf();
        thread::Builder::new()
            .name("tile-decode".into())
            .spawn(move || {
                let _ = tx.send(decode(&owned));
            })
            .map_err(|e| failure(format!("cannot spawn decoder: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(failure(format!("timed out after {timeout:?}"))),
            Err(RecvTimeoutError::Disconnected) => Err(failure("decoder thread panicked".into())),
        }
    }
}
