//! PDS3 frame preparation: raw `.img` frames become the PNG tiles and
//! `<tile>_metadata.csv` files the stitcher reads.
//!
//! A frame is an attached `KEY = VALUE` label terminated by a line holding
//! only `END`, followed by the raw samples. The samples start at
//! `LABEL_RECORDS * RECORD_BYTES` (or at the `^IMAGE` pointer when
//! `LABEL_RECORDS` is absent) and are stored row by row, top line first.
//!
//! Every label keyword is written to the metadata CSV verbatim, so fields such
//! as `RETICLE_POINT_LATITUDE` and `HORIZONTAL_PIXEL_SCALE` reach the
//! compositor unchanged. No radiometric calibration is applied.

use crate::error::{AtlasError, Pds3Error};
use crate::walker::METADATA_SUFFIX;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageFormat, Luma};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

pub const LINE_SAMPLES: &str = "LINE_SAMPLES";
pub const LINES: &str = "LINES";
pub const RECORD_BYTES: &str = "RECORD_BYTES";
pub const LABEL_RECORDS: &str = "LABEL_RECORDS";
pub const SAMPLE_BITS: &str = "SAMPLE_BITS";
pub const SAMPLE_TYPE: &str = "SAMPLE_TYPE";
pub const IMAGE_POINTER: &str = "^IMAGE";

/// Edge length of a converted tile, matching the stitcher's default native
/// tile size.
pub const DEFAULT_TILE_SIZE: u32 = 128;

/// Ordered label keywords. A repeated keyword keeps its first position and
/// its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pds3Label {
    fields: Vec<(String, String)>,
}

impl Pds3Label {
    pub fn parse(text: &str) -> Result<Self, Pds3Error> {
        Self::parse_lines(text.lines())
    }

    /// Parses the label at the start of a frame; bytes after `END` are not
    /// inspected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Pds3Error> {
        Self::parse_lines(bytes.split(|&b| b == b'\n').map(String::from_utf8_lossy))
    }

    fn parse_lines<I, S>(lines: I) -> Result<Self, Pds3Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut label = Self::default();
        // A value whose parentheses, braces or quotes continue on later lines.
        let mut pending: Option<(String, String)> = None;

        for line in lines {
            let line = line.as_ref().trim();

            if let Some((_, value)) = pending.as_mut() {
                value.push(' ');
                value.push_str(line);
                if is_complete(value) {
                    if let Some((key, value)) = pending.take() {
                        label.insert(key, value);
                    }
                }
                continue;
            }

            if line == "END" {
                return Ok(label);
            }
            if line.starts_with("/*") {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() {
                continue;
            }

            if is_complete(value) {
                label.insert(key.to_owned(), value.to_owned());
            } else {
                pending = Some((key.to_owned(), value.to_owned()));
            }
        }

        Err(Pds3Error::UnterminatedLabel)
    }

    fn insert(&mut self, key: String, value: String) {
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Leading integer of a keyword's value; trailing units are ignored.
    pub fn integer(&self, key: &'static str) -> Result<u64, Pds3Error> {
        let raw = self.get(key).ok_or(Pds3Error::MissingKey(key))?;
        leading_integer(raw).ok_or_else(|| Pds3Error::BadValue {
            key,
            raw: raw.to_owned(),
        })
    }

    /// Byte offset of the first sample.
    pub fn data_offset(&self) -> Result<u64, Pds3Error> {
        let record_bytes = self.integer(RECORD_BYTES)?;
        if self.get(LABEL_RECORDS).is_some() || self.get(IMAGE_POINTER).is_none() {
            return Ok(self.integer(LABEL_RECORDS)?.saturating_mul(record_bytes));
        }

        // `^IMAGE = 3` is a 1-based record, `^IMAGE = 1025 <BYTES>` a 1-based byte.
        let pointer = self.integer(IMAGE_POINTER)?.max(1) - 1;
        let in_bytes = self
            .get(IMAGE_POINTER)
            .map_or(false, |raw| raw.to_ascii_uppercase().contains("<BYTES>"));
        Ok(if in_bytes {
            pointer
        } else {
            pointer.saturating_mul(record_bytes)
        })
    }

    /// Writes every keyword as a `key,value` row, in label order.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), Pds3Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        for (key, value) in self.fields() {
            wtr.write_record([key, value])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn is_complete(value: &str) -> bool {
    let mut depth = 0i32;
    let mut quoted = false;
    for c in value.chars() {
        match c {
            '"' => quoted = !quoted,
            '(' | '{' if !quoted => depth += 1,
            ')' | '}' if !quoted => depth -= 1,
            _ => {}
        }
    }
    !quoted && depth <= 0
}

fn leading_integer(raw: &str) -> Option<u64> {
    raw.split_whitespace().next()?.trim_matches('"').parse().ok()
}

/// On-disk sample encoding, from `SAMPLE_BITS` and `SAMPLE_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    U16 { big_endian: bool },
    F32 { big_endian: bool },
}

impl SampleFormat {
    /// `MSB_*` and `IEEE_REAL` types are big-endian; everything else
    /// (`LSB_*`, `PC_REAL`, or no `SAMPLE_TYPE`) is read little-endian.
    pub fn from_label(label: &Pds3Label) -> Result<Self, Pds3Error> {
        let big_endian = label.get(SAMPLE_TYPE).map_or(false, |raw| {
            let kind = raw.trim_matches('"').to_ascii_uppercase();
            kind.starts_with("MSB") || kind.starts_with("IEEE")
        });

        match label.integer(SAMPLE_BITS)? {
            8 => Ok(SampleFormat::U8),
            16 => Ok(SampleFormat::U16 { big_endian }),
            32 => Ok(SampleFormat::F32 { big_endian }),
            other => Err(Pds3Error::UnsupportedSampleBits(other)),
        }
    }

    pub fn bytes(&self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::U16 { .. } => 2,
            SampleFormat::F32 { .. } => 4,
        }
    }

    fn decode(&self, chunk: &[u8]) -> f32 {
        match *self {
            SampleFormat::U8 => chunk[0] as f32,
            SampleFormat::U16 { big_endian } => {
                let raw = [chunk[0], chunk[1]];
                if big_endian {
                    u16::from_be_bytes(raw) as f32
                } else {
                    u16::from_le_bytes(raw) as f32
                }
            }
            SampleFormat::F32 { big_endian } => {
                let raw = [chunk[0], chunk[1], chunk[2], chunk[3]];
                if big_endian {
                    f32::from_be_bytes(raw)
                } else {
                    f32::from_le_bytes(raw)
                }
            }
        }
    }
}

/// A decoded frame: `height` rows of `width` samples.
#[derive(Debug, Clone)]
pub struct Pds3Image {
    pub label: Pds3Label,
    pub format: SampleFormat,
    pub width: u32,
    pub height: u32,
    pub samples: Vec<f32>,
}

impl Pds3Image {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Pds3Error> {
        Self::from_bytes(&fs::read(path)?)
    }

    /// Decodes a whole frame. Bytes past the last sample are ignored; fewer
    /// bytes than `LINES * LINE_SAMPLES` samples is an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Pds3Error> {
        let label = Pds3Label::from_bytes(bytes)?;
        let width = dimension(&label, LINE_SAMPLES)?;
        let height = dimension(&label, LINES)?;
        let format = SampleFormat::from_label(&label)?;

        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| Pds3Error::BadValue {
                key: LINES,
                raw: format!("{height} x {width}"),
            })?;

        let offset = usize::try_from(label.data_offset()?).unwrap_or(usize::MAX);
        let data = bytes.get(offset..).unwrap_or_default();
        let found = data.len() / format.bytes();
        if found < expected {
            return Err(Pds3Error::Truncated { expected, found });
        }
        if found > expected {
            debug!("ignoring {} trailing samples", found - expected);
        }

        let samples = data
            .chunks_exact(format.bytes())
            .take(expected)
            .map(|chunk| format.decode(chunk))
            .collect();

        Ok(Self {
            label,
            format,
            width,
            height,
            samples,
        })
    }

    /// Linear min-max stretch of the finite samples to 0..=255. A flat frame
    /// and non-finite samples map to 0.
    pub fn to_gray(&self) -> GrayImage {
        let (lo, hi) = self
            .samples
            .iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let span = hi - lo;
        let stride = self.width as usize;

        GrayImage::from_fn(self.width, self.height, |x, y| {
            let v = self.samples[y as usize * stride + x as usize];
            let level = if span > 0.0 && v.is_finite() {
                ((v - lo) / span * 255.0).round()
            } else {
                0.0
            };
            Luma([level as u8])
        })
    }

    /// The stretched frame resampled to `size` x `size`, or at native size.
    pub fn to_tile(&self, size: Option<u32>) -> GrayImage {
        let gray = self.to_gray();
        match size {
            Some(size) if gray.dimensions() != (size, size) => {
                imageops::resize(&gray, size, size, FilterType::Triangle)
            }
            _ => gray,
        }
    }
}

fn dimension(label: &Pds3Label, key: &'static str) -> Result<u32, Pds3Error> {
    let bad = || Pds3Error::BadValue {
        key,
        raw: label.get(key).unwrap_or_default().to_owned(),
    };
    match u32::try_from(label.integer(key)?) {
        Ok(0) | Err(_) => Err(bad()),
        Ok(n) => Ok(n),
    }
}

/// Converts one frame into `png_path` and `csv_path`. Returns the tile size.
pub fn convert_frame(
    img_path: &Path,
    png_path: &Path,
    csv_path: &Path,
    tile_size: Option<u32>,
) -> Result<(u32, u32), Pds3Error> {
    let frame = Pds3Image::open(img_path)?;
    debug!(
        "{}: {}x{} {:?}, {} label keywords",
        img_path.display(),
        frame.width,
        frame.height,
        frame.format,
        frame.label.len()
    );

    let tile = frame.to_tile(tile_size);
    tile.save_with_format(png_path, ImageFormat::Png)?;

    let mut writer = BufWriter::new(File::create(csv_path)?);
    frame.label.write_csv(&mut writer)?;
    writer.flush()?;

    Ok(tile.dimensions())
}

/// Lists every frame under `root` in file-name order. Calibration frames
/// (`bp*`, `ff*`) and anything inside a `calib` directory are left out.
pub fn discover_frames<P: AsRef<Path>>(root: P) -> Result<Vec<PathBuf>, AtlasError> {
    let root = root.as_ref();
    let mut frames = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() > 0 && e.file_type().is_dir() && is_calib_dir(e.file_name()))
        });

    for entry in walker {
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

        if entry.file_type().is_file() && is_frame(entry.path()) {
            frames.push(entry.into_path());
        }
    }

    Ok(frames)
}

fn is_calib_dir(name: &OsStr) -> bool {
    name.to_str()
        .map_or(false, |name| name.eq_ignore_ascii_case("calib"))
}

fn is_frame(path: &Path) -> bool {
    let is_img = path
        .extension()
        .and_then(|s| s.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("img"));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    is_img && !name.starts_with("bp") && !name.starts_with("ff")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConvertOptions {
    /// Square output edge; `None` keeps the frame's native size.
    pub tile_size: Option<u32>,
    /// Rewrite tiles whose PNG and CSV already exist.
    pub overwrite: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            tile_size: Some(DEFAULT_TILE_SIZE),
            overwrite: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFrame {
    pub image_path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConvertSummary {
    pub discovered: usize,
    pub converted: usize,
    /// Left alone because both outputs were already present.
    pub existing: usize,
    pub failed: Vec<FailedFrame>,
    pub elapsed_ms: u64,
}

impl ConvertSummary {
    pub fn log(&self) {
        info!(
            "Frames done: {} discovered, {} converted, {} existing, {} failed in {} ms",
            self.discovered,
            self.converted,
            self.existing,
            self.failed.len(),
            self.elapsed_ms
        );
        for failed in &self.failed {
            info!("  failed {}: {}", failed.image_path.display(), failed.reason);
        }
    }
}

enum Outcome {
    Converted,
    Existing,
}

/// Converts every frame below `input_root` into a tile tree under
/// `output_root` that mirrors the input directories.
///
/// Frames are converted in parallel. A frame that fails is recorded in the
/// summary and does not stop the others.
pub fn convert_tree<P: AsRef<Path>, Q: AsRef<Path>>(
    input_root: P,
    output_root: Q,
    options: &ConvertOptions,
) -> Result<ConvertSummary, AtlasError> {
    let (input_root, output_root) = (input_root.as_ref(), output_root.as_ref());
    if options.tile_size == Some(0) {
        return Err(AtlasError::Config("tile size must be at least 1".into()));
    }

    let started = Instant::now();
    let frames = discover_frames(input_root)?;
    fs::create_dir_all(output_root)?;
    info!(
        "Converting {} frames from {} into {}",
        frames.len(),
        input_root.display(),
        output_root.display()
    );

    let results: Vec<Result<Outcome, Pds3Error>> = frames
        .par_iter()
        .map(|frame| convert_one(frame, input_root, output_root, options))
        .collect();

    let mut summary = ConvertSummary {
        discovered: frames.len(),
        ..ConvertSummary::default()
    };
    for (frame, result) in frames.iter().zip(results) {
        match result {
            Ok(Outcome::Converted) => summary.converted += 1,
            Ok(Outcome::Existing) => summary.existing += 1,
            Err(err) => {
                warn!("Skipping {}: {}", frame.display(), err);
                summary.failed.push(FailedFrame {
                    image_path: frame.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    summary.elapsed_ms = started.elapsed().as_millis() as u64;
    Ok(summary)
}

fn convert_one(
    frame: &Path,
    input_root: &Path,
    output_root: &Path,
    options: &ConvertOptions,
) -> Result<Outcome, Pds3Error> {
    let relative = frame
        .parent()
        .and_then(|dir| dir.strip_prefix(input_root).ok())
        .unwrap_or_else(|| Path::new(""));
    let out_dir = output_root.join(relative);
    let stem = frame
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned();
    let png_path = out_dir.join(format!("{stem}.png"));
    let csv_path = out_dir.join(format!("{stem}{METADATA_SUFFIX}"));

    if !options.overwrite && png_path.is_file() && csv_path.is_file() {
        debug!("Skipping existing tile: {}", png_path.display());
        return Ok(Outcome::Existing);
    }

    fs::create_dir_all(&out_dir)?;
    let (w, h) = convert_frame(frame, &png_path, &csv_path, options.tile_size)?;
    debug!("OK {} -> {} ({w}x{h})", frame.display(), png_path.display());
    Ok(Outcome::Converted)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABEL_BYTES: usize = 1024;

    /// Attached-label frame: two 512-byte label records, then `data`.
    fn frame(
        width: u32,
        height: u32,
        bits: u32,
        sample_type: &str,
        extra: &str,
        data: &[u8],
    ) -> Vec<u8> {
        let label = format!(
            "PDS_VERSION_ID = PDS3\r\n\
             RECORD_TYPE = FIXED_LENGTH\r\n\
             RECORD_BYTES = 512\r\n\
             LABEL_RECORDS = 2\r\n\
             {extra}\
             OBJECT = IMAGE\r\n\
             \x20 LINES = {height}\r\n\
             \x20 LINE_SAMPLES = {width}\r\n\
             \x20 SAMPLE_TYPE = {sample_type}\r\n\
             \x20 SAMPLE_BITS = {bits}\r\n\
             END_OBJECT = IMAGE\r\n\
             END\r\n"
        );
        assert!(label.len() <= LABEL_BYTES);

        let mut bytes = label.into_bytes();
        bytes.resize(LABEL_BYTES, b' ');
        bytes.extend_from_slice(data);
        bytes
    }

    #[test]
    fn label_keywords_in_order() {
        let label = Pds3Label::parse(
            "/* Clementine UVVIS frame */\n\
             MISSION_NAME = \"DEEP SPACE PROGRAM SCIENCE EXPERIMENT\"\n\
             RETICLE_POINT_LATITUDE = (-10.0,-10.0,\n\
             \x20   -9.9,-9.9)\n\
             HORIZONTAL_PIXEL_SCALE = 0.0975 <KM>\n\
             no equals sign here\n\
             OBJECT = IMAGE\n\
             OBJECT = IMAGE_HISTOGRAM\n\
             END\n\
             AFTER = ignored\n",
        )
        .unwrap();

        let keys: Vec<&str> = label.fields().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            [
                "MISSION_NAME",
                "RETICLE_POINT_LATITUDE",
                "HORIZONTAL_PIXEL_SCALE",
                "OBJECT"
            ]
        );
        assert_eq!(
            label.get("RETICLE_POINT_LATITUDE"),
            Some("(-10.0,-10.0, -9.9,-9.9)")
        );
        assert_eq!(label.get("OBJECT"), Some("IMAGE_HISTOGRAM"));
        assert_eq!(label.get("AFTER"), None);
    }

    #[test]
    fn label_without_end_is_rejected() {
        let err = Pds3Label::parse("LINES = 2\nEND_OBJECT = IMAGE\n").unwrap_err();
        assert!(matches!(err, Pds3Error::UnterminatedLabel));
    }

    #[test]
    fn decodes_eight_bit_frame() {
        let bytes = frame(3, 2, 8, "UNSIGNED_INTEGER", "", &[0, 10, 20, 30, 40, 50]);
        let img = Pds3Image::from_bytes(&bytes).unwrap();

        assert_eq!((img.width, img.height), (3, 2));
        assert_eq!(img.format, SampleFormat::U8);
        assert_eq!(img.samples, [0.0, 10.0, 20.0, 30.0, 40.0, 50.0]);

        let gray = img.to_gray();
        assert_eq!(gray.get_pixel(0, 0), &Luma([0]));
        assert_eq!(gray.get_pixel(2, 0), &Luma([102]));
        assert_eq!(gray.get_pixel(2, 1), &Luma([255]));
    }

    #[test]
    fn sixteen_bit_byte_order_follows_sample_type() {
        let data = [0x01, 0x02, 0x03, 0x04];

        let msb = frame(2, 1, 16, "MSB_UNSIGNED_INTEGER", "", &data);
        let msb = Pds3Image::from_bytes(&msb).unwrap();
        assert_eq!(msb.samples, [258.0, 772.0]);

        let lsb = frame(2, 1, 16, "LSB_UNSIGNED_INTEGER", "", &data);
        let lsb = Pds3Image::from_bytes(&lsb).unwrap();
        assert_eq!(lsb.samples, [513.0, 1027.0]);
    }

    #[test]
    fn decodes_float_frame_and_ignores_trailing_bytes() {
        let mut data = Vec::new();
        for v in [1.5f32, -2.0, f32::NAN, 4.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(&[0xff; 3]);

        let img = Pds3Image::from_bytes(&frame(2, 2, 32, "PC_REAL", "", &data)).unwrap();
        assert_eq!(img.samples.len(), 4);
        assert_eq!(img.samples[0], 1.5);

        let gray = img.to_gray();
        assert_eq!(gray.get_pixel(1, 0), &Luma([0]));
        assert_eq!(gray.get_pixel(0, 1), &Luma([0]));
        assert_eq!(gray.get_pixel(1, 1), &Luma([255]));
    }

    #[test]
    fn short_data_and_odd_sample_bits_are_errors() {
        let short = frame(4, 4, 8, "UNSIGNED_INTEGER", "", &[1; 15]);
        let err = Pds3Image::from_bytes(&short).unwrap_err();
        assert!(matches!(
            err,
            Pds3Error::Truncated {
                expected: 16,
                found: 15
            }
        ));

        let twelve_bit = frame(1, 1, 12, "UNSIGNED_INTEGER", "", &[0; 2]);
        let err = Pds3Image::from_bytes(&twelve_bit).unwrap_err();
        assert!(matches!(err, Pds3Error::UnsupportedSampleBits(12)));

        let empty = frame(0, 1, 8, "UNSIGNED_INTEGER", "", &[]);
        let err = Pds3Image::from_bytes(&empty).unwrap_err();
        assert!(matches!(err, Pds3Error::BadValue { key: LINE_SAMPLES, .. }));

        let err = Pds3Image::from_bytes(b"RECORD_BYTES = 10\nEND\n").unwrap_err();
        assert!(matches!(err, Pds3Error::MissingKey(LINE_SAMPLES)));
    }

    #[test]
    fn image_pointer_locates_data_without_label_records() {
        let label = Pds3Label::parse("RECORD_BYTES = 100\n^IMAGE = 3\nEND\n").unwrap();
        assert_eq!(label.data_offset().unwrap(), 200);

        let label =
            Pds3Label::parse("RECORD_BYTES = 100\n^IMAGE = 2049 <BYTES>\nEND\n").unwrap();
        assert_eq!(label.data_offset().unwrap(), 2048);

        let label = Pds3Label::parse("RECORD_BYTES = 100\nEND\n").unwrap();
        assert!(matches!(
            label.data_offset(),
            Err(Pds3Error::MissingKey(LABEL_RECORDS))
        ));
    }

    #[test]
    fn flat_frame_is_black_and_tiles_are_resized() {
        let bytes = frame(4, 2, 8, "UNSIGNED_INTEGER", "", &[7; 8]);
        let img = Pds3Image::from_bytes(&bytes).unwrap();

        assert!(img.to_gray().pixels().all(|p| p.0 == [0]));
        assert_eq!(img.to_tile(Some(DEFAULT_TILE_SIZE)).dimensions(), (128, 128));
        assert_eq!(img.to_tile(None).dimensions(), (4, 2));
    }

    #[test]
    fn metadata_csv_reads_back_as_tile_metadata() {
        let label = Pds3Label::parse(
            "RETICLE_POINT_LATITUDE = (-10.0, -10.0, -9.9, -9.9)\n\
             TARGET_NAME = \"MOON\"\n\
             END\n",
        )
        .unwrap();

        let mut csv = Vec::new();
        label.write_csv(&mut csv).unwrap();
        let text = String::from_utf8(csv.clone()).unwrap();
        assert!(text.starts_with("RETICLE_POINT_LATITUDE,\"(-10.0, -10.0, -9.9, -9.9)\"\n"));

        let md = crate::TileMetadata::read_csv(csv.as_slice()).unwrap();
        assert_eq!(md.reticle_latitudes().unwrap(), [-10.0, -10.0, -9.9, -9.9]);
        assert_eq!(md.get("target_name"), Some("\"MOON\""));
    }

    #[test]
    fn discovery_skips_calibration_frames() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for rel in [
            "rev100/a/lua0001.img",
            "rev100/a/LUA0002.IMG",
            "rev100/a/bp_dark.img",
            "rev100/a/ff_flat.img",
            "rev100/a/notes.lbl",
            "rev100/calib/lua_cal.img",
            "rev200/b/lua0003.img",
        ] {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"").unwrap();
        }

        let frames = discover_frames(root).unwrap();
        let rel: Vec<PathBuf> = frames
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            rel,
            [
                PathBuf::from("rev100/a/LUA0002.IMG"),
                PathBuf::from("rev100/a/lua0001.img"),
                PathBuf::from("rev200/b/lua0003.img"),
            ]
        );
    }

    #[test]
    fn convert_tree_mirrors_input_layout() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("frames");
        let output = dir.path().join("tiles");

        let good = input.join("rev100/a/lua0001.img");
        fs::create_dir_all(good.parent().unwrap()).unwrap();
        let bytes = frame(2, 2, 8, "UNSIGNED_INTEGER", "", &[0, 85, 170, 255]);
        fs::write(&good, bytes).unwrap();
        fs::write(input.join("rev100/a/lua0002.img"), b"garbage").unwrap();

        let options = ConvertOptions {
            tile_size: Some(8),
            overwrite: false,
        };
        let summary = convert_tree(&input, &output, &options).unwrap();
        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.converted, 1);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].image_path.ends_with("lua0002.img"));

        let png = output.join("rev100/a/lua0001.png");
        let tile = image::open(&png).unwrap().into_luma8();
        assert_eq!(tile.dimensions(), (8, 8));
        assert_eq!(tile.get_pixel(0, 0), &Luma([0]));
        assert_eq!(tile.get_pixel(7, 7), &Luma([255]));

        let csv = fs::read_to_string(output.join("rev100/a/lua0001_metadata.csv")).unwrap();
        assert!(csv.contains("SAMPLE_BITS,8\n"));

        let again = convert_tree(&input, &output, &options).unwrap();
        assert_eq!((again.converted, again.existing), (0, 1));
    }

    #[test]
    fn zero_tile_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let options = ConvertOptions {
            tile_size: Some(0),
            overwrite: true,
        };
        assert!(matches!(
            convert_tree(dir.path(), dir.path(), &options),
            Err(AtlasError::Config(_))
        ));
    }
}
