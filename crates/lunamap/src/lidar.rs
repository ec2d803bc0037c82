//! Clementine LIDAR topography tables.
//!
//! Each data row is a whitespace-delimited record of 37 columns. Only four are
//! used here:
//!
//! | column | meaning                                 |
//! |--------|-----------------------------------------|
//! | 3      | latitude (deg)                          |
//! | 4      | longitude (deg east)                    |
//! | 6      | lunar spheroid radius (km)              |
//! | 28     | first elevation inside range window (km)|
//!
//! A bounce point sits at `spheroid radius + elevation` from the centre.

use crate::error::LidarError;
use crate::geo::spherical_to_cartesian;
use crate::ply::ColoredPoint;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub const COL_LATITUDE: usize = 3;
pub const COL_LONGITUDE: usize = 4;
pub const COL_SPHEROID_RADIUS: usize = 6;
pub const COL_FIRST_ELEVATION: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LidarShot {
    pub lat_deg: f64,
    pub lon_deg: f64,
    pub spheroid_radius_km: f64,
    pub elevation_km: f64,
}

impl LidarShot {
    /// Parses one table row.
    ///
    /// Rows without a numeric latitude/longitude or a positive spheroid radius
    /// are rejected. A missing or non-numeric elevation counts as 0.
    pub fn parse_row(line: &str) -> Option<Self> {
        let columns: Vec<&str> = line.split_whitespace().collect();
        let number = |idx: usize| -> Option<f64> {
            columns
                .get(idx)
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };

        let lat_deg = number(COL_LATITUDE)?;
        let lon_deg = number(COL_LONGITUDE)?;
        if !(-90.0..=90.0).contains(&lat_deg) {
            return None;
        }

        let spheroid_radius_km = number(COL_SPHEROID_RADIUS).filter(|r| *r > 0.0)?;
        let elevation_km = number(COL_FIRST_ELEVATION).unwrap_or(0.0);

        Some(Self {
            lat_deg,
            lon_deg,
            spheroid_radius_km,
            elevation_km,
        })
    }

    #[inline]
    pub fn radius_km(&self) -> f64 {
        self.spheroid_radius_km + self.elevation_km
    }

    /// Body-fixed Cartesian position in km.
    #[inline]
    pub fn position(&self) -> [f64; 3] {
        spherical_to_cartesian(self.lat_deg, self.lon_deg, self.radius_km())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LidarTable {
    pub shots: Vec<LidarShot>,
    /// Non-blank rows that could not be used.
    pub skipped_rows: usize,
}

impl LidarTable {
    /// `(min, max)` elevation over all shots.
    pub fn elevation_range(&self) -> Option<(f64, f64)> {
        if self.shots.is_empty() {
            return None;
        }
        Some(self.shots.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), s| (lo.min(s.elevation_km), hi.max(s.elevation_km)),
        ))
    }

    /// Converts every shot to a colored vertex.
    pub fn colored_points(&self, transform: &PointTransform) -> Vec<ColoredPoint> {
        let ramp = ElevationRamp::from_shots(&self.shots);
        self.shots
            .par_iter()
            .map(|shot| ColoredPoint {
                position: transform.apply(shot.position()),
                color: ramp.color(shot.elevation_km),
            })
            .collect()
    }
}

/// Reads a table, skipping blank lines and counting unusable rows.
pub fn read_table<R: BufRead>(reader: R) -> Result<LidarTable, LidarError> {
    let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;

    let parsed: Vec<Option<LidarShot>> = lines
        .par_iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| LidarShot::parse_row(line))
        .collect();

    let skipped_rows = parsed.iter().filter(|p| p.is_none()).count();
    let shots: Vec<LidarShot> = parsed.into_iter().flatten().collect();

    if shots.is_empty() {
        return Err(LidarError::Empty);
    }

    Ok(LidarTable {
        shots,
        skipped_rows,
    })
}

pub fn read_table_file<P: AsRef<Path>>(path: P) -> Result<LidarTable, LidarError> {
    let file = File::open(path)?;
    read_table(BufReader::new(file))
}

/// Maps elevations onto a blue → red → green ramp across the observed range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationRamp {
    pub min: f64,
    pub max: f64,
}

impl ElevationRamp {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn from_shots(shots: &[LidarShot]) -> Self {
        let (min, max) = shots.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), s| (lo.min(s.elevation_km), hi.max(s.elevation_km)),
        );
        if min.is_finite() && max.is_finite() {
            Self::new(min, max)
        } else {
            Self::new(0.0, 0.0)
        }
    }

    /// Position of `elevation` in `[0, 1]`; a flat range maps to 0.
    pub fn normalize(&self, elevation: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.0;
        }
        ((elevation - self.min) / span).clamp(0.0, 1.0)
    }

    pub fn color(&self, elevation: f64) -> [u8; 3] {
        ramp_color(self.normalize(elevation)).map(|c| (c * 255.0).round() as u8)
    }
}

/// Lows are blue, the middle is red, highs are green.
pub fn ramp_color(t: f64) -> [f64; 3] {
    let r = (2.0 * (0.5 - (0.5 - t).abs())).clamp(0.0, 1.0);
    let g = (2.0 * (t - 0.5)).clamp(0.0, 1.0);
    let b = (2.0 * (0.5 - t)).clamp(0.0, 1.0);
    [r, g, b]
}

/// Uniform scale plus an optional axis swap into a Y-up viewer frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointTransform {
    pub scale: f64,
    /// `(x, y, z) -> (x, -z, -y)`.
    pub viewer_axes: bool,
}

impl Default for PointTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            viewer_axes: false,
        }
    }
}

impl PointTransform {
    pub fn apply(&self, p: [f64; 3]) -> [f32; 3] {
        let [x, y, z] = p.map(|v| v * self.scale);
        let out = if self.viewer_axes {
            [x, -z, -y]
        } else {
            [x, y, z]
        };
        out.map(|v| v as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(lat: &str, lon: &str, radius: &str, elevation: &str) -> String {
        let mut cols: Vec<String> = (0..37).map(|i| format!("{i}")).collect();
        cols[COL_LATITUDE] = lat.into();
        cols[COL_LONGITUDE] = lon.into();
        cols[COL_SPHEROID_RADIUS] = radius.into();
        cols[COL_FIRST_ELEVATION] = elevation.into();
        cols.join("   ")
    }

    #[test]
    fn row_columns_are_picked_by_position() {
        let shot = LidarShot::parse_row(&row("-12.5", "45.0", "1738.0", "-2.0")).unwrap();
        assert_eq!(shot.lat_deg, -12.5);
        assert_eq!(shot.lon_deg, 45.0);
        assert_eq!(shot.radius_km(), 1736.0);

        let [x, y, z] = shot.position();
        let r = (x * x + y * y + z * z).sqrt();
        assert!((r - 1736.0).abs() < 1e-9);
        assert!((x - y).abs() < 1e-9);
        assert!(z < 0.0);
    }

    #[test]
    fn unusable_rows() {
        assert!(LidarShot::parse_row(&row("N/A", "45.0", "1738.0", "0.0")).is_none());
        assert!(LidarShot::parse_row(&row("95.0", "45.0", "1738.0", "0.0")).is_none());
        assert!(LidarShot::parse_row(&row("1.0", "45.0", "0.0", "0.0")).is_none());
        assert!(LidarShot::parse_row("1 2 3").is_none());

        // Elevation defaults to zero.
        let shot = LidarShot::parse_row(&row("1.0", "2.0", "1737.4", "***")).unwrap();
        assert_eq!(shot.elevation_km, 0.0);
    }

    #[test]
    fn table_counts_skipped_rows() {
        let text = format!(
            "{}\n\n{}\nPDS_VERSION_ID = PDS3\n{}\n",
            row("1.0", "2.0", "1737.0", "1.0"),
            row("3.0", "4.0", "1737.0", "-1.0"),
            row("x", "4.0", "1737.0", "-1.0"),
        );
        let table = read_table(text.as_bytes()).unwrap();
        assert_eq!(table.shots.len(), 2);
        assert_eq!(table.skipped_rows, 2);
        assert_eq!(table.elevation_range(), Some((-1.0, 1.0)));
    }

    #[test]
    fn empty_table_is_an_error() {
        assert!(matches!(read_table("\n\n".as_bytes()), Err(LidarError::Empty)));
    }

    #[test]
    fn ramp_endpoints() {
        assert_eq!(ramp_color(0.0), [0.0, 0.0, 1.0]);
        assert_eq!(ramp_color(0.5), [1.0, 0.0, 0.0]);
        assert_eq!(ramp_color(1.0), [0.0, 1.0, 0.0]);

        let ramp = ElevationRamp::new(-4.0, 4.0);
        assert_eq!(ramp.color(-4.0), [0, 0, 255]);
        assert_eq!(ramp.color(0.0), [255, 0, 0]);
        assert_eq!(ramp.color(2.0), [128, 128, 0]);
        assert_eq!(ramp.color(99.0), [0, 255, 0]);

        assert_eq!(ElevationRamp::new(3.0, 3.0).normalize(3.0), 0.0);
    }

    #[test]
    fn viewer_axes_swap() {
        let t = PointTransform {
            scale: 2.0,
            viewer_axes: true,
        };
        assert_eq!(t.apply([1.0, 2.0, 3.0]), [2.0, -6.0, -4.0]);
        assert_eq!(PointTransform::default().apply([1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn points_carry_ramp_colors() {
        let table = read_table(
            format!(
                "{}\n{}\n",
                row("0.0", "0.0", "1737.0", "-1.0"),
                row("0.0", "90.0", "1737.0", "1.0")
            )
            .as_bytes(),
        )
        .unwrap();

        let points = table.colored_points(&PointTransform::default());
        assert_eq!(points[0].color, [0, 0, 255]);
        assert_eq!(points[1].color, [0, 255, 0]);
        assert_eq!(points[0].position, [1736.0, 0.0, 0.0]);
    }
}
