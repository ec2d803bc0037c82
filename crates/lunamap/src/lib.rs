//! LUNAMAP: lunar global atlas compositing and LIDAR geometry export.
//!
//! Atlas side:
//! - Tiles live in `root/<revision>/<sub-region>/<tile>.png`, each with a
//!   `<tile>_metadata.csv` sibling (key/value rows, no header).
//! - Metadata gives reticle corner latitudes/longitudes and km-per-pixel
//!   scales; the corners become a lat/lon boundary.
//! - The boundary maps onto an equirectangular canvas (default 8192 x 4096):
//!     x      = min_lon / 360 * W
//!     y      = (90 - max_lat) / 180 * H
//!     width  = width_km  / circumference * W
//!     height = height_km / circumference * W
//! - Tiles are decoded in parallel batches, drawn sequentially in walk order
//!   (later tiles win on overlap), and the canvas is written as gray+alpha PNG.
//!
//! Frame preparation:
//! - PDS3 `.img` frames (attached label, raw 8/16/32-bit samples) become
//!   gray PNG tiles plus `<tile>_metadata.csv` files holding every label
//!   keyword, laid out in the same `revision/sub-region` tree.
//!
//! LIDAR side:
//! - Clementine topography tables -> colored point cloud (PLY).
//! - UV sphere with equirect texture coordinates, optionally displaced by
//!   gridded LIDAR elevations (OBJ + MTL).
//!
//! Longitudes are degrees east in `[0, 360)` throughout; latitudes are
//! degrees in `[-90, 90]`, north positive.

pub mod boundary;
pub mod canvas;
pub mod error;
pub mod geo;
pub mod grid;
pub mod lidar;
pub mod mesh;
pub mod metadata;
pub mod pds3;
pub mod placement;
pub mod ply;
pub mod stitch;
pub mod walker;

pub use boundary::{compute_boundary, TileBoundary};
pub use canvas::{load_tile, AtlasCanvas};
pub use error::{AtlasError, LidarError, Pds3Error, TileError};
pub use grid::{grid_cell_size, grid_placements};
pub use lidar::{read_table, read_table_file, ElevationRamp, LidarShot, LidarTable, PointTransform};
pub use mesh::{ElevationGrid, SphereMesh};
pub use metadata::{parse_metadata, TileMetadata};
pub use placement::{compute_placement, AtlasGeometry, DrawSize, PlacementRect, TilePlacement};
pub use pds3::{convert_tree, discover_frames, ConvertOptions, ConvertSummary, Pds3Image, Pds3Label};
pub use ply::{write_ply, write_ply_file, ColoredPoint, PlyFormat};
pub use stitch::{AtlasStitcher, ErrorPolicy, NativeTileSize, SkippedTile, StitchConfig, StitchSummary};
pub use walker::{discover_tiles, first_tile_per_region, TileSource};
