//! Error taxonomy for the compositor, frame preparation and the LIDAR
//! converters.

use std::io;
use std::path::PathBuf;

/// A failure confined to one tile. The run logs it and moves on unless the
/// abort policy is selected.
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("metadata field `{0}` is missing")]
    MissingField(&'static str),

    #[error("metadata field `{field}` has a non-numeric scale: {raw:?}")]
    MalformedScale { field: &'static str, raw: String },

    #[error("metadata field `{field}` holds no decimal coordinates: {raw:?}")]
    MalformedCoordinates { field: &'static str, raw: String },

    #[error("{field} value {value} is outside the valid range")]
    CoordinateOutOfRange { field: &'static str, value: f64 },

    #[error("tile boundary is degenerate (metadata missing)")]
    MissingBoundary,

    #[error("tile footprint {width_km} x {height_km} km exceeds the body circumference")]
    FootprintTooLarge { width_km: f64, height_km: f64 },

    #[error("cannot read metadata {path}: {source}")]
    MetadataUnreadable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("cannot load image {path}: {reason}")]
    ImageLoadFailure { path: PathBuf, reason: String },
}

impl TileError {
    /// Short machine-friendly tag used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            TileError::MissingField(_) => "missing_field",
            TileError::MalformedScale { .. } => "malformed_scale",
            TileError::MalformedCoordinates { .. } => "malformed_coordinates",
            TileError::CoordinateOutOfRange { .. } => "coordinate_out_of_range",
            TileError::MissingBoundary => "missing_boundary",
            TileError::FootprintTooLarge { .. } => "footprint_too_large",
            TileError::MetadataUnreadable { .. } => "metadata_unreadable",
            TileError::ImageLoadFailure { .. } => "image_load_failure",
        }
    }
}

/// Run-level failures. `Encode` means no atlas was produced; `Io` covers the
/// output directories of a run.
#[derive(Debug, thiserror::Error)]
pub enum AtlasError {
    #[error("cannot walk tile directory {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to encode atlas: {0}")]
    Encode(#[from] image::ImageError),

    #[error("run aborted on {path}: {source}")]
    Aborted {
        path: PathBuf,
        #[source]
        source: TileError,
    },

    #[error("invalid atlas configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A failure confined to one PDS3 frame.
#[derive(Debug, thiserror::Error)]
pub enum Pds3Error {
    #[error("label has no END line")]
    UnterminatedLabel,

    #[error("label keyword `{0}` is missing")]
    MissingKey(&'static str),

    #[error("label keyword `{key}` has an invalid value: {raw:?}")]
    BadValue { key: &'static str, raw: String },

    #[error("unsupported SAMPLE_BITS {0} (expected 8, 16 or 32)")]
    UnsupportedSampleBits(u64),

    #[error("frame holds {found} samples, {expected} expected")]
    Truncated { expected: usize, found: usize },

    #[error("failed to write tile: {0}")]
    Encode(#[from] image::ImageError),

    #[error("failed to write metadata: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures while reading LIDAR tables or writing geometry files.
#[derive(Debug, thiserror::Error)]
pub enum LidarError {
    #[error("table holds no usable shots")]
    Empty,

    #[error(transparent)]
    Io(#[from] io::Error),
}
