//! Uniform square-cell layout for packing tiles without geo-metadata.

use crate::placement::PlacementRect;

/// Side of the square cell used to pack `count` tiles into a
/// `width` x `height` atlas: the largest size not above
/// `sqrt(width * height / count)` at which every cell still fits.
pub fn grid_cell_size(count: usize, width: u32, height: u32) -> u32 {
    if count == 0 || width == 0 || height == 0 {
        return 0;
    }

    let area = width as f64 * height as f64;
    let mut cell = ((area / count as f64).sqrt().floor() as u32).clamp(1, width.min(height));

    while cell > 1 {
        let columns = (width / cell).max(1) as usize;
        let rows = count.div_ceil(columns);
        if rows as u64 * cell as u64 <= height as u64 {
            break;
        }
        cell -= 1;
    }

    cell
}

/// Row-major cell rectangles for `count` tiles.
pub fn grid_placements(count: usize, width: u32, height: u32) -> Vec<PlacementRect> {
    let cell = grid_cell_size(count, width, height);
    if cell == 0 {
        return Vec::new();
    }

    let columns = (width / cell).max(1) as usize;
    let side = cell as f64;

    (0..count)
        .map(|i| PlacementRect {
            x: (i % columns) as f64 * side,
            y: (i / columns) as f64 * side,
            width: side,
            height: side,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_atlas_with_square_count() {
        let cells = grid_placements(16, 4096, 4096);
        assert_eq!(cells.len(), 16);
        assert_eq!(cells[0].width, 1024.0);
        assert_eq!((cells[5].x, cells[5].y), (1024.0, 1024.0));
        assert_eq!((cells[15].x, cells[15].y), (3072.0, 3072.0));
    }

    #[test]
    fn cells_always_fit() {
        for count in 1..200 {
            for (w, h) in [(10, 10), (4096, 4096), (8192, 4096), (100, 7)] {
                let cells = grid_placements(count, w, h);
                assert_eq!(cells.len(), count);
                if count as u64 <= w as u64 * h as u64 {
                    for c in &cells {
                        assert!(c.x + c.width <= w as f64, "{count} {w}x{h}");
                        assert!(c.y + c.height <= h as f64, "{count} {w}x{h}");
                    }
                }
            }
        }
    }

    #[test]
    fn shrinks_cell_when_rows_overflow() {
        // sqrt(100 / 5) = 4.47, but 4px cells need 3 rows of 2 = 12px.
        assert_eq!(grid_cell_size(5, 10, 10), 3);
    }

    #[test]
    fn empty_inputs() {
        assert!(grid_placements(0, 64, 64).is_empty());
        assert_eq!(grid_cell_size(3, 0, 64), 0);
    }
}
