//! The atlas raster and the draw/encode operations on it.

use crate::error::{AtlasError, TileError};
use crate::placement::{AtlasGeometry, PixelBounds, PlacementRect};
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, GrayAlphaImage, ImageEncoder, ImageError, LumaA};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Equirectangular atlas surface, 8-bit gray plus alpha. Pixels no tile has
/// touched stay fully transparent.
#[derive(Debug, Clone)]
pub struct AtlasCanvas {
    image: GrayAlphaImage,
}

impl AtlasCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayAlphaImage::from_pixel(width, height, LumaA([0, 0])),
        }
    }

    pub fn for_geometry(geometry: &AtlasGeometry) -> Self {
        Self::new(geometry.canvas_width, geometry.canvas_height)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &GrayAlphaImage {
        &self.image
    }

    /// Draws `tile` stretched over `rect`, overwriting whatever is below it.
    ///
    /// Real-valued edges are rounded here and nowhere earlier. The part of the
    /// tile that falls outside the canvas is clipped. Returns `false` when
    /// nothing was written (zero-area or fully off-canvas rectangle).
    pub fn composite_tile(&mut self, tile: &GrayAlphaImage, rect: &PlacementRect) -> bool {
        let bounds = rect.pixel_bounds();
        if bounds.is_empty() || tile.width() == 0 || tile.height() == 0 {
            return false;
        }
        let Some(visible) = bounds.clip(self.width(), self.height()) else {
            return false;
        };

        // A footprint that fits on the canvas is resized whole; anything
        // larger is sampled only where it is visible.
        match (u32::try_from(bounds.width()), u32::try_from(bounds.height())) {
            (Ok(w), Ok(h)) if w <= self.width() && h <= self.height() => {
                let resized;
                let src = if tile.dimensions() == (w, h) {
                    tile
                } else {
                    resized = imageops::resize(tile, w, h, FilterType::Triangle);
                    &resized
                };
                imageops::replace(&mut self.image, src, bounds.x0, bounds.y0);
            }
            _ => self.sample_visible(tile, &bounds, &visible),
        }
        true
    }

    /// Bilinear resampling of `tile` over `bounds`, written only inside
    /// `visible`.
    fn sample_visible(
        &mut self,
        tile: &GrayAlphaImage,
        bounds: &PixelBounds,
        visible: &PixelBounds,
    ) {
        let (tw, th) = tile.dimensions();
        let sx = tw as f64 / bounds.width() as f64;
        let sy = th as f64 / bounds.height() as f64;

        for cy in visible.y0..visible.y1 {
            let v = ((cy as f64 - bounds.y0 as f64 + 0.5) * sy - 0.5)
                .clamp(0.0, (th - 1) as f64);
            for cx in visible.x0..visible.x1 {
                let u = ((cx as f64 - bounds.x0 as f64 + 0.5) * sx - 0.5)
                    .clamp(0.0, (tw - 1) as f64);
                self.image.put_pixel(cx as u32, cy as u32, bilinear(tile, u, v));
            }
        }
    }

    /// Encodes the canvas as a lossless PNG into `sink`.
    pub fn finalize<W: Write>(self, sink: W) -> Result<(), AtlasError> {
        let (w, h) = self.image.dimensions();
        PngEncoder::new(sink).write_image(self.image.as_raw(), w, h, ColorType::La8)?;
        Ok(())
    }

    pub fn write_png<P: AsRef<Path>>(self, path: P) -> Result<(), AtlasError> {
        let file = File::create(path.as_ref()).map_err(ImageError::IoError)?;
        let mut writer = BufWriter::new(file);
        self.finalize(&mut writer)?;
        writer.flush().map_err(ImageError::IoError)?;
        Ok(())
    }
}

fn bilinear(tile: &GrayAlphaImage, u: f64, v: f64) -> LumaA<u8> {
    let (x0, y0) = (u.floor() as u32, v.floor() as u32);
    let x1 = (x0 + 1).min(tile.width() - 1);
    let y1 = (y0 + 1).min(tile.height() - 1);
    let (fx, fy) = (u - x0 as f64, v - y0 as f64);

    let mut out = [0u8; 2];
    for (c, slot) in out.iter_mut().enumerate() {
        let at = |x: u32, y: u32| tile.get_pixel(x, y).0[c] as f64;
        let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
        let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
        *slot = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    LumaA(out)
}

/// Decodes a tile image of any PNG color type into gray plus alpha.
pub fn load_tile<P: AsRef<Path>>(path: P) -> Result<GrayAlphaImage, TileError> {
    let path = path.as_ref();
    image::open(path)
        .map(|img| img.into_luma_alpha8())
        .map_err(|e| TileError::ImageLoadFailure {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
