//! Enumerates `revision/sub-region/<tile>.png` trees and pairs every tile with
//! its `<tile>_metadata.csv` sibling.

use crate::error::AtlasError;
use log::{debug, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Depth of tile files below the root: revision / sub-region / file.
const TILE_DEPTH: usize = 3;

pub(crate) const METADATA_SUFFIX: &str = "_metadata.csv";

/// One tile image and where its metadata is expected to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileSource {
    /// File stem, e.g. `lua1234a.100`.
    pub name: String,
    pub image_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl TileSource {
    pub fn from_image_path(image_path: PathBuf) -> Self {
        let name = image_path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        let metadata_path = image_path.with_file_name(format!("{name}{METADATA_SUFFIX}"));

        Self {
            name,
            image_path,
            metadata_path,
        }
    }

    /// `revision/sub-region` part of the path, for grouping.
    pub fn region(&self) -> Option<&Path> {
        self.image_path.parent()
    }
}

/// Lists every tile under `root` in draw order.
///
/// Entries are visited in lexicographic file-name order at every level, so
/// the result is stable across platforms. When two tiles overlap on the
/// atlas, the later one in this list wins. A tile without its metadata file
/// is still returned; the missing file is reported when the tile is loaded.
pub fn discover_tiles<P: AsRef<Path>>(root: P) -> Result<Vec<TileSource>, AtlasError> {
    let root = root.as_ref();
    let mut tiles = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .min_depth(TILE_DEPTH)
        .max_depth(TILE_DEPTH)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(AtlasError::Walk {
                    path: root.to_path_buf(),
                    source: err,
                });
            }
            Err(err) => {
                warn!("skipping unreadable entry: {err}");
                continue;
            }
        };

        if !entry.file_type().is_file() || !is_png(entry.path()) {
            continue;
        }

        let tile = TileSource::from_image_path(entry.into_path());
        if !tile.metadata_path.is_file() {
            debug!("{} has no metadata file", tile.image_path.display());
        }
        tiles.push(tile);
    }

    Ok(tiles)
}

/// The first tile (in file-name order) of every sub-region directory.
pub fn first_tile_per_region(tiles: &[TileSource]) -> Vec<TileSource> {
    let mut firsts: Vec<TileSource> = Vec::new();
    for tile in tiles {
        let is_new_region = firsts
            .last()
            .map_or(true, |last| last.region() != tile.region());
        if is_new_region {
            firsts.push(tile.clone());
        }
    }
    firsts
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("png"))
}
