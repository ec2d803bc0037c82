//! Geographic footprint of a tile, derived from its reticle points.

use crate::error::TileError;
use crate::geo::normalize_longitude;
use crate::metadata::{TileMetadata, RETICLE_LATITUDE, RETICLE_LONGITUDE};
use log::warn;
use serde::Serialize;

/// Axis-aligned lat/lon box in degrees. Longitudes are east-positive and
/// start in `[0, 360)`; `max_lon` may exceed 360 for a footprint that crosses
/// the prime meridian.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TileBoundary {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl TileBoundary {
    /// Sentinel for "no usable reticle points". Never a valid placement.
    pub const DEGENERATE: TileBoundary = TileBoundary {
        min_lat: 0.0,
        max_lat: 0.0,
        min_lon: 0.0,
        max_lon: 0.0,
    };

    #[inline]
    pub fn is_degenerate(&self) -> bool {
        *self == Self::DEGENERATE
    }

    /// Strict variant of [`compute_boundary`].
    pub fn try_from_metadata(metadata: &TileMetadata) -> Result<Self, TileError> {
        let latitudes = metadata.reticle_latitudes()?;
        let longitudes = metadata.reticle_longitudes()?;
        Self::from_points(&latitudes, &longitudes)
    }

    /// Bounding box of the given corner coordinates.
    pub fn from_points(latitudes: &[f64], longitudes: &[f64]) -> Result<Self, TileError> {
        if latitudes.is_empty() {
            return Err(TileError::MissingField(RETICLE_LATITUDE));
        }
        if longitudes.is_empty() {
            return Err(TileError::MissingField(RETICLE_LONGITUDE));
        }

        let (mut min_lat, mut max_lat) = (f64::INFINITY, f64::NEG_INFINITY);
        for &lat in latitudes {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(TileError::CoordinateOutOfRange {
                    field: RETICLE_LATITUDE,
                    value: lat,
                });
            }
            min_lat = min_lat.min(lat);
            max_lat = max_lat.max(lat);
        }

        let mut lons = Vec::with_capacity(longitudes.len());
        for &lon in longitudes {
            if !(-360.0..=360.0).contains(&lon) {
                return Err(TileError::CoordinateOutOfRange {
                    field: RETICLE_LONGITUDE,
                    value: lon,
                });
            }
            lons.push(normalize_longitude(lon));
        }

        let (mut min_lon, mut max_lon) = min_max(&lons);

        // A footprint can't be wider than half the globe; a larger spread
        // means it straddles 0°/360°.
        if max_lon - min_lon > 180.0 {
            for lon in lons.iter_mut() {
                if *lon < 180.0 {
                    *lon += 360.0;
                }
            }
            (min_lon, max_lon) = min_max(&lons);
        }

        Ok(Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        })
    }
}

/// Boundary of a tile, or [`TileBoundary::DEGENERATE`] (with a warning) when
/// the reticle fields are absent or unusable. Callers must check
/// [`TileBoundary::is_degenerate`] before placing the tile.
pub fn compute_boundary(metadata: &TileMetadata) -> TileBoundary {
    match TileBoundary::try_from_metadata(metadata) {
        Ok(boundary) => boundary,
        Err(err) => {
            warn!("no usable tile boundary: {err}");
            TileBoundary::DEGENERATE
        }
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}
