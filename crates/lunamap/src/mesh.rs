//! Textured UV sphere with optional elevation relief, exported as Wavefront OBJ.

use crate::geo::{equirect_uv, normalize_longitude, spherical_to_cartesian};
use crate::lidar::LidarShot;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Material name written by [`write_obj`] and [`write_mtl`].
pub const ATLAS_MATERIAL: &str = "lunar_atlas";

/// Latitude/longitude grid sphere. Vertex `(ix, iy)` sits at
/// `lon = 360 * ix / width_segments`, `lat = 90 - 180 * iy / height_segments`,
/// so the seam column and both pole rows are duplicated for texturing.
#[derive(Debug, Clone)]
pub struct SphereMesh {
    pub positions: Vec<[f32; 3]>,
    /// Equirect atlas coordinates, v growing south.
    pub uvs: Vec<[f32; 2]>,
    pub triangles: Vec<[u32; 3]>,
    width_segments: u32,
    height_segments: u32,
}

impl SphereMesh {
    pub fn uv_sphere(radius: f64, width_segments: u32, height_segments: u32) -> Self {
        let ws = width_segments.max(3);
        let hs = height_segments.max(2);
        let row = ws + 1;

        let mut positions = Vec::with_capacity((row * (hs + 1)) as usize);
        let mut uvs = Vec::with_capacity(positions.capacity());
        for iy in 0..=hs {
            let lat = 90.0 - 180.0 * iy as f64 / hs as f64;
            for ix in 0..=ws {
                let lon = 360.0 * ix as f64 / ws as f64;
                positions.push(spherical_to_cartesian(lat, lon, radius).map(|v| v as f32));
                // The seam column keeps u = 1 instead of wrapping back to 0.
                let [u, v] = equirect_uv(lat, lon);
                let u = if ix == ws { 1.0 } else { u };
                uvs.push([u as f32, v as f32]);
            }
        }

        // Counter-clockwise seen from outside. Pole rows only get the one
        // triangle per quad that has area.
        let mut triangles = Vec::new();
        for iy in 0..hs {
            for ix in 0..ws {
                let a = iy * row + ix;
                let b = a + row;
                let c = b + 1;
                let d = a + 1;
                if iy != 0 {
                    triangles.push([a, b, d]);
                }
                if iy != hs - 1 {
                    triangles.push([b, c, d]);
                }
            }
        }

        Self {
            positions,
            uvs,
            triangles,
            width_segments: ws,
            height_segments: hs,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// `(lat, lon)` in degrees of vertex `index`.
    pub fn vertex_lat_lon(&self, index: usize) -> (f64, f64) {
        let row = self.width_segments as usize + 1;
        let (iy, ix) = (index / row, index % row);
        (
            90.0 - 180.0 * iy as f64 / self.height_segments as f64,
            360.0 * ix as f64 / self.width_segments as f64,
        )
    }

    /// Pushes vertex `i` radially by `1 + elevations[i] * factor`. Vertices
    /// beyond the end of `elevations` are left where they are.
    pub fn displace_by_elevation(&mut self, elevations: &[f64], factor: f64) {
        for (p, e) in self.positions.iter_mut().zip(elevations) {
            let s = (1.0 + e * factor) as f32;
            *p = p.map(|v| v * s);
        }
    }
}

/// Mean elevation per lat/lon cell, used to sample sparse LIDAR shots onto a
/// mesh.
#[derive(Debug, Clone)]
pub struct ElevationGrid {
    cell_deg: f64,
    columns: usize,
    rows: usize,
    sums: Vec<f64>,
    counts: Vec<u32>,
}

impl ElevationGrid {
    pub fn new(cell_deg: f64) -> Self {
        let cell_deg = if cell_deg.is_finite() && cell_deg > 0.0 {
            cell_deg.min(180.0)
        } else {
            1.0
        };
        let columns = (360.0 / cell_deg).ceil() as usize;
        let rows = (180.0 / cell_deg).ceil() as usize;

        Self {
            cell_deg,
            columns,
            rows,
            sums: vec![0.0; columns * rows],
            counts: vec![0; columns * rows],
        }
    }

    pub fn from_shots(shots: &[LidarShot], cell_deg: f64) -> Self {
        let mut grid = Self::new(cell_deg);
        for shot in shots {
            grid.add(shot.lat_deg, shot.lon_deg, shot.elevation_km);
        }
        grid
    }

    pub fn cell_deg(&self) -> f64 {
        self.cell_deg
    }

    fn cell_index(&self, lat_deg: f64, lon_deg: f64) -> usize {
        let row = ((90.0 - lat_deg.clamp(-90.0, 90.0)) / self.cell_deg) as usize;
        let col = (normalize_longitude(lon_deg) / self.cell_deg) as usize;
        row.min(self.rows - 1) * self.columns + col.min(self.columns - 1)
    }

    pub fn add(&mut self, lat_deg: f64, lon_deg: f64, elevation: f64) {
        let i = self.cell_index(lat_deg, lon_deg);
        self.sums[i] += elevation;
        self.counts[i] += 1;
    }

    /// Mean elevation of the cell containing the point; 0 when empty.
    pub fn sample(&self, lat_deg: f64, lon_deg: f64) -> f64 {
        let i = self.cell_index(lat_deg, lon_deg);
        match self.counts[i] {
            0 => 0.0,
            n => self.sums[i] / n as f64,
        }
    }

    /// One sampled elevation per mesh vertex, in vertex order.
    pub fn elevations_for(&self, mesh: &SphereMesh) -> Vec<f64> {
        (0..mesh.vertex_count())
            .map(|i| {
                let (lat, lon) = mesh.vertex_lat_lon(i);
                self.sample(lat, lon)
            })
            .collect()
    }
}

/// Writes `v`, `vt` and `f v/vt` records. OBJ puts the texture origin at the
/// bottom left, so `vt` carries `1 - v`.
pub fn write_obj<W: Write>(mut w: W, mesh: &SphereMesh, mtllib: Option<&str>) -> io::Result<()> {
    if let Some(lib) = mtllib {
        writeln!(w, "mtllib {lib}")?;
        writeln!(w, "usemtl {ATLAS_MATERIAL}")?;
    }
    for [x, y, z] in &mesh.positions {
        writeln!(w, "v {x} {y} {z}")?;
    }
    for [u, v] in &mesh.uvs {
        writeln!(w, "vt {u} {}", 1.0 - v)?;
    }
    for t in &mesh.triangles {
        let [a, b, c] = t.map(|i| i + 1);
        writeln!(w, "f {a}/{a} {b}/{b} {c}/{c}")?;
    }
    Ok(())
}

/// Material that maps the atlas image onto the mesh.
pub fn write_mtl<W: Write>(mut w: W, texture: &str) -> io::Result<()> {
    writeln!(w, "newmtl {ATLAS_MATERIAL}")?;
    writeln!(w, "Kd 1 1 1")?;
    writeln!(w, "map_Kd {texture}")
}

pub fn write_obj_file<P: AsRef<Path>>(
    path: P,
    mesh: &SphereMesh,
    mtllib: Option<&str>,
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_obj(&mut writer, mesh, mtllib)?;
    writer.flush()
}
