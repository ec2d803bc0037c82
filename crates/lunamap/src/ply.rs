//! Colored point clouds as Stanford PLY.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColoredPoint {
    pub position: [f32; 3],
    pub color: [u8; 3],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlyFormat {
    Ascii,
    #[default]
    BinaryLittleEndian,
}

impl PlyFormat {
    fn header_name(self) -> &'static str {
        match self {
            PlyFormat::Ascii => "ascii",
            PlyFormat::BinaryLittleEndian => "binary_little_endian",
        }
    }
}

impl fmt::Display for PlyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlyFormat::Ascii => "ascii",
            PlyFormat::BinaryLittleEndian => "binary",
        })
    }
}

impl FromStr for PlyFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ascii" => Ok(PlyFormat::Ascii),
            "binary" | "binary_little_endian" => Ok(PlyFormat::BinaryLittleEndian),
            other => Err(format!("unknown PLY format `{other}` (ascii, binary)")),
        }
    }
}

/// Bytes per vertex in the binary body: 3 x f32 + 3 x u8.
pub const BINARY_VERTEX_SIZE: usize = 15;

/// Writes a single `vertex` element with `x y z` floats and `red green blue`
/// uchar properties.
pub fn write_ply<W: Write>(mut w: W, points: &[ColoredPoint], format: PlyFormat) -> io::Result<()> {
    write!(
        w,
        "ply\n\
         format {} 1.0\n\
         element vertex {}\n\
         property float x\n\
         property float y\n\
         property float z\n\
         property uchar red\n\
         property uchar green\n\
         property uchar blue\n\
         end_header\n",
        format.header_name(),
        points.len()
    )?;

    match format {
        PlyFormat::Ascii => {
            for p in points {
                let [x, y, z] = p.position;
                let [r, g, b] = p.color;
                writeln!(w, "{x} {y} {z} {r} {g} {b}")?;
            }
        }
        PlyFormat::BinaryLittleEndian => {
            let mut record = [0u8; BINARY_VERTEX_SIZE];
            for p in points {
                for (i, v) in p.position.iter().enumerate() {
                    record[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
                }
                record[12..].copy_from_slice(&p.color);
                w.write_all(&record)?;
            }
        }
    }

    Ok(())
}

pub fn write_ply_file<P: AsRef<Path>>(
    path: P,
    points: &[ColoredPoint],
    format: PlyFormat,
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_ply(&mut writer, points, format)?;
    writer.flush()
}
