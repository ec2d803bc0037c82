//! Geographic-to-pixel placement of a tile on the equirectangular atlas.

use crate::boundary::TileBoundary;
use crate::error::{AtlasError, TileError};
use crate::geo::moon;
use crate::metadata::TileMetadata;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Fixed canvas dimensions and the circumference of the mapped body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AtlasGeometry {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub body_circumference_km: f64,
}

impl AtlasGeometry {
    pub fn new(
        canvas_width: u32,
        canvas_height: u32,
        body_circumference_km: f64,
    ) -> Result<Self, AtlasError> {
        if canvas_width == 0 || canvas_height == 0 {
            return Err(AtlasError::Config(format!(
                "canvas must be non-empty, got {canvas_width}x{canvas_height}"
            )));
        }
        if !body_circumference_km.is_finite() || body_circumference_km <= 0.0 {
            return Err(AtlasError::Config(format!(
                "body circumference must be positive, got {body_circumference_km}"
            )));
        }

        Ok(Self {
            canvas_width,
            canvas_height,
            body_circumference_km,
        })
    }
}

impl Default for AtlasGeometry {
    fn default() -> Self {
        Self {
            canvas_width: 8192,
            canvas_height: 4096,
            body_circumference_km: moon::CIRCUMFERENCE_KM,
        }
    }
}

/// Destination rectangle in real-valued canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlacementRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Integer pixel edges, `x0..x1` by `y0..y1` (exclusive ends).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl PixelBounds {
    pub fn width(&self) -> u64 {
        self.x1.saturating_sub(self.x0).max(0) as u64
    }

    pub fn height(&self) -> u64 {
        self.y1.saturating_sub(self.y0).max(0) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// The part of these bounds inside a `width` x `height` canvas, or `None`
    /// when nothing overlaps.
    pub fn clip(&self, width: u32, height: u32) -> Option<PixelBounds> {
        let clipped = PixelBounds {
            x0: self.x0.max(0),
            y0: self.y0.max(0),
            x1: self.x1.min(width as i64),
            y1: self.y1.min(height as i64),
        };
        (clipped.x0 < clipped.x1 && clipped.y0 < clipped.y1).then_some(clipped)
    }
}

impl PlacementRect {
    /// Rounds each edge on its own so that tiles sharing an edge in real
    /// coordinates also share it in pixels.
    pub fn pixel_bounds(&self) -> PixelBounds {
        let x0 = self.x.round() as i64;
        let y0 = self.y.round() as i64;
        let x1 = (self.x + self.width).round() as i64;
        let y1 = (self.y + self.height).round() as i64;
        PixelBounds {
            x0,
            y0,
            x1: x1.max(x0),
            y1: y1.max(y0),
        }
    }
}

/// Which size a tile is drawn at.
///
/// `Projected` uses the canvas-scaled footprint. `Kilometers` draws the tile
/// with its ground extent in km taken directly as a pixel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawSize {
    #[default]
    Projected,
    Kilometers,
}

impl FromStr for DrawSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "projected" => Ok(DrawSize::Projected),
            "kilometers" | "km" => Ok(DrawSize::Kilometers),
            other => Err(format!(
                "unknown draw size `{other}` (expected `projected` or `kilometers`)"
            )),
        }
    }
}

impl fmt::Display for DrawSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DrawSize::Projected => "projected",
            DrawSize::Kilometers => "kilometers",
        })
    }
}

/// Placement of one tile plus the ground extent it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TilePlacement {
    pub rect: PlacementRect,
    pub width_km: f64,
    pub height_km: f64,
}

impl TilePlacement {
    /// The rectangle handed to the compositor under `mode`.
    pub fn draw_rect(&self, mode: DrawSize) -> PlacementRect {
        match mode {
            DrawSize::Projected => self.rect,
            DrawSize::Kilometers => PlacementRect {
                width: self.width_km,
                height: self.height_km,
                ..self.rect
            },
        }
    }
}

/// Computes where a tile of `tile_width_px` x `tile_height_px` native pixels
/// lands on the canvas.
///
/// Both footprint sides are scaled by the canvas *width* so one canvas unit is
/// the same ground distance along x and y. A footprint wider or taller than the
/// body's circumference is rejected as [`TileError::FootprintTooLarge`].
pub fn compute_placement(
    boundary: &TileBoundary,
    metadata: &TileMetadata,
    geometry: &AtlasGeometry,
    tile_width_px: u32,
    tile_height_px: u32,
) -> Result<TilePlacement, TileError> {
    if boundary.is_degenerate() {
        return Err(TileError::MissingBoundary);
    }

    let horizontal_scale = metadata.horizontal_pixel_scale()?;
    let vertical_scale = metadata.vertical_pixel_scale()?;

    let width_km = tile_width_px as f64 * horizontal_scale;
    let height_km = tile_height_px as f64 * vertical_scale;

    let limit = geometry.body_circumference_km;
    if !(width_km <= limit && height_km <= limit) {
        return Err(TileError::FootprintTooLarge {
            width_km,
            height_km,
        });
    }

    let canvas_w = geometry.canvas_width as f64;
    let canvas_h = geometry.canvas_height as f64;

    let rect = PlacementRect {
        x: boundary.min_lon / 360.0 * canvas_w,
        y: (90.0 - boundary.max_lat) / 180.0 * canvas_h,
        width: width_km / geometry.body_circumference_km * canvas_w,
        height: height_km / geometry.body_circumference_km * canvas_w,
    };

    Ok(TilePlacement {
        rect,
        width_km,
        height_km,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::compute_boundary;
    use crate::metadata::{
        HORIZONTAL_PIXEL_SCALE, RETICLE_LATITUDE, RETICLE_LONGITUDE, VERTICAL_PIXEL_SCALE,
    };

    fn sample_metadata() -> TileMetadata {
        TileMetadata::from_pairs([
            (HORIZONTAL_PIXEL_SCALE, "0.0975 km/px"),
            (VERTICAL_PIXEL_SCALE, "0.0975 km/px"),
            (RETICLE_LATITUDE, "-10.0,-10.0,-9.9,-9.9"),
            (RETICLE_LONGITUDE, "40.0,40.1,40.0,40.1"),
        ])
    }

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn reference_tile_placement() {
        let md = sample_metadata();
        let boundary = compute_boundary(&md);
        let placement =
            compute_placement(&boundary, &md, &AtlasGeometry::default(), 128, 128).unwrap();

        assert_eq!(boundary.min_lon, 40.0);
        assert_eq!(boundary.max_lat, -9.9);

        let r = placement.rect;
        assert!(close(r.x, 40.0 / 360.0 * 8192.0, 1e-9));
        assert!(close(r.x, 910.22, 0.01));
        assert!(close(r.y, 99.9 / 180.0 * 4096.0, 1e-9));
        assert!(close(r.y, 2273.28, 0.01));
        assert!(close(placement.width_km, 12.48, 1e-9));
        assert!(close(r.width, 12.48 / 10921.0 * 8192.0, 1e-9));
        assert!(close(r.width, r.height, 1e-12));
    }

    #[test]
    fn canvas_width_scales_x_and_width_linearly() {
        let md = sample_metadata();
        let boundary = compute_boundary(&md);
        let base = AtlasGeometry::default();
        let doubled = AtlasGeometry {
            canvas_width: base.canvas_width * 2,
            ..base
        };

        let a = compute_placement(&boundary, &md, &base, 128, 128).unwrap().rect;
        let b = compute_placement(&boundary, &md, &doubled, 128, 128).unwrap().rect;

        assert!(close(b.x, 2.0 * a.x, 1e-9));
        assert!(close(b.width, 2.0 * a.width, 1e-9));
        assert!(close(b.height, 2.0 * a.height, 1e-9));
        assert_eq!(a.y, b.y);
    }

    #[test]
    fn height_is_scaled_by_canvas_width() {
        let md = sample_metadata();
        let boundary = compute_boundary(&md);
        let square = AtlasGeometry::new(4096, 4096, 10921.0).unwrap();
        let wide = AtlasGeometry::new(4096, 1024, 10921.0).unwrap();

        let a = compute_placement(&boundary, &md, &square, 128, 128).unwrap().rect;
        let b = compute_placement(&boundary, &md, &wide, 128, 128).unwrap().rect;
        assert_eq!(a.height, b.height);
    }

    #[test]
    fn circumference_is_a_parameter() {
        let md = sample_metadata();
        let boundary = compute_boundary(&md);
        let moon = AtlasGeometry::default();
        let bigger = AtlasGeometry {
            body_circumference_km: moon.body_circumference_km * 2.0,
            ..moon
        };

        let a = compute_placement(&boundary, &md, &moon, 128, 128).unwrap().rect;
        let b = compute_placement(&boundary, &md, &bigger, 128, 128).unwrap().rect;
        assert!(close(b.width * 2.0, a.width, 1e-9));
        assert_eq!(a.x, b.x);
    }

    #[test]
    fn degenerate_boundary_is_not_placed() {
        let md = sample_metadata();
        let err = compute_placement(
            &TileBoundary::DEGENERATE,
            &md,
            &AtlasGeometry::default(),
            128,
            128,
        )
        .unwrap_err();
        assert!(matches!(err, TileError::MissingBoundary));
    }

    #[test]
    fn malformed_scale_is_reported() {
        let md = TileMetadata::from_pairs([
            (HORIZONTAL_PIXEL_SCALE, "unknown"),
            (VERTICAL_PIXEL_SCALE, "0.1 km"),
            (RETICLE_LATITUDE, "1.0"),
            (RETICLE_LONGITUDE, "2.0"),
        ]);
        let boundary = compute_boundary(&md);
        let err = compute_placement(&boundary, &md, &AtlasGeometry::default(), 128, 128)
            .unwrap_err();
        assert!(matches!(err, TileError::MalformedScale { .. }));
    }

    #[test]
    fn draw_modes_pick_their_extent() {
        let md = sample_metadata();
        let boundary = compute_boundary(&md);
        let placement =
            compute_placement(&boundary, &md, &AtlasGeometry::default(), 128, 128).unwrap();

        let projected = placement.draw_rect(DrawSize::Projected);
        assert_eq!(projected, placement.rect);

        let km = placement.draw_rect(DrawSize::Kilometers);
        assert_eq!((km.x, km.y), (placement.rect.x, placement.rect.y));
        assert_eq!((km.width, km.height), (placement.width_km, placement.height_km));
        assert!(km.width > projected.width);
    }

    #[test]
    fn pixel_bounds_round_each_edge() {
        let r = PlacementRect {
            x: 10.4,
            y: 2.6,
            width: 4.2,
            height: 0.3,
        };
        let px = r.pixel_bounds();
        assert_eq!((px.x0, px.x1), (10, 15));
        assert_eq!((px.y0, px.y1), (3, 3));
        assert!(px.is_empty());

        // Neighbours meeting at 14.6 share the pixel edge 15.
        let right = PlacementRect { x: 14.6, ..r }.pixel_bounds();
        assert_eq!(right.x0, px.x1);
    }

    #[test]
    fn pixel_bounds_clip_to_canvas() {
        let huge = PlacementRect {
            x: -5.0,
            y: 3.0,
            width: 1e12,
            height: f64::INFINITY,
        }
        .pixel_bounds();
        assert!(huge.width() > u32::MAX as u64);

        let visible = huge.clip(64, 32).unwrap();
        assert_eq!(visible, PixelBounds { x0: 0, y0: 3, x1: 64, y1: 32 });
        assert_eq!(huge.clip(64, 3), None);
    }

    #[test]
    fn footprint_larger_than_the_body_is_rejected() {
        let md = TileMetadata::from_pairs([
            (HORIZONTAL_PIXEL_SCALE, "1e300 km"),
            (VERTICAL_PIXEL_SCALE, "0.1 km"),
            (RETICLE_LATITUDE, "1.0, 2.0"),
            (RETICLE_LONGITUDE, "3.0, 4.0"),
        ]);
        let boundary = compute_boundary(&md);
        let err = compute_placement(&boundary, &md, &AtlasGeometry::default(), 128, 128)
            .unwrap_err();
        assert!(matches!(err, TileError::FootprintTooLarge { .. }));
        assert_eq!(err.kind(), "footprint_too_large");

        // 128 px * 85 km = 10880 km still fits inside 10921 km.
        let md = TileMetadata::from_pairs([
            (HORIZONTAL_PIXEL_SCALE, "85 km"),
            (VERTICAL_PIXEL_SCALE, "85 km"),
            (RETICLE_LATITUDE, "1.0, 2.0"),
            (RETICLE_LONGITUDE, "3.0, 4.0"),
        ]);
        assert!(compute_placement(&boundary, &md, &AtlasGeometry::default(), 128, 128).is_ok());
    }

    #[test]
    fn draw_size_parses() {
        assert_eq!("projected".parse::<DrawSize>().unwrap(), DrawSize::Projected);
        assert_eq!("KM".parse::<DrawSize>().unwrap(), DrawSize::Kilometers);
        assert!("pixels".parse::<DrawSize>().is_err());
        assert_eq!(DrawSize::Kilometers.to_string(), "kilometers");
    }

    #[test]
    fn geometry_is_validated() {
        assert!(AtlasGeometry::new(0, 10, 1.0).is_err());
        assert!(AtlasGeometry::new(10, 10, 0.0).is_err());
        assert!(AtlasGeometry::new(10, 10, f64::NAN).is_err());
    }
}
