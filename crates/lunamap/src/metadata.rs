//! Per-tile geo-metadata as written next to each PNG tile.
//!
//! A metadata file is a two-column CSV (`field,value`) with no header
//! contract. Field names are normalized (trimmed, lowercased, whitespace
//! replaced by `_`) so `Reticle Point Latitude` and `reticle_point_latitude`
//! address the same entry. Later rows win over earlier rows that normalize to
//! the same name.
//!
//! Coordinate grammar for the reticle fields: the value is free text and every
//! match of `[+-]?\d+\.\d+` is one coordinate, in order of appearance. Commas,
//! spaces, parentheses and unit tokens between the numbers are ignored. A field
//! without a single match is an error, not an empty list.

use crate::error::TileError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const RETICLE_LATITUDE: &str = "reticle_point_latitude";
pub const RETICLE_LONGITUDE: &str = "reticle_point_longitude";
pub const HORIZONTAL_PIXEL_SCALE: &str = "horizontal_pixel_scale";
pub const VERTICAL_PIXEL_SCALE: &str = "vertical_pixel_scale";

static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[+-]?\d+\.\d+").unwrap());

/// Normalized `field -> raw value` mapping for one tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileMetadata {
    fields: BTreeMap<String, String>,
}

impl TileMetadata {
    /// Builds a record from raw `(name, value)` pairs without validating it.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut fields = BTreeMap::new();
        for (name, value) in pairs {
            fields.insert(normalize_field_name(name.as_ref()), value.into());
        }
        Self { fields }
    }

    /// Reads a metadata CSV. Rows with fewer than two columns are ignored and
    /// columns past the second are dropped.
    pub fn read_csv<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut pairs = Vec::new();
        for result in rdr.records() {
            let record = result?;
            if let (Some(name), Some(value)) = (record.get(0), record.get(1)) {
                if !name.is_empty() {
                    pairs.push((name.to_owned(), value.to_owned()));
                }
            }
        }

        Ok(Self::from_pairs(pairs))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, TileError> {
        let path = path.as_ref();
        let unreadable = |source: csv::Error| TileError::MetadataUnreadable {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(|e| unreadable(csv::Error::from(e)))?;
        Self::read_csv(file).map_err(unreadable)
    }

    /// Raw value of a field, looked up by its normalized name.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(&normalize_field_name(field)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn reticle_latitudes(&self) -> Result<Vec<f64>, TileError> {
        self.decimal_list(RETICLE_LATITUDE)
    }

    pub fn reticle_longitudes(&self) -> Result<Vec<f64>, TileError> {
        self.decimal_list(RETICLE_LONGITUDE)
    }

    /// Kilometres per pixel along the image rows.
    pub fn horizontal_pixel_scale(&self) -> Result<f64, TileError> {
        self.scale(HORIZONTAL_PIXEL_SCALE)
    }

    /// Kilometres per pixel along the image columns.
    pub fn vertical_pixel_scale(&self) -> Result<f64, TileError> {
        self.scale(VERTICAL_PIXEL_SCALE)
    }

    fn decimal_list(&self, field: &'static str) -> Result<Vec<f64>, TileError> {
        let raw = self.get(field).ok_or(TileError::MissingField(field))?;
        parse_decimal_list(field, raw)
    }

    fn scale(&self, field: &'static str) -> Result<f64, TileError> {
        let raw = self.get(field).ok_or(TileError::MissingField(field))?;
        parse_scale(field, raw)
    }
}

/// Builds a record and rejects it when either reticle field is absent.
pub fn parse_metadata<I, K, V>(pairs: I) -> Result<TileMetadata, TileError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let metadata = TileMetadata::from_pairs(pairs);
    require_reticle_fields(&metadata)?;
    Ok(metadata)
}

pub fn require_reticle_fields(metadata: &TileMetadata) -> Result<(), TileError> {
    for field in [RETICLE_LATITUDE, RETICLE_LONGITUDE] {
        if metadata.get(field).is_none() {
            return Err(TileError::MissingField(field));
        }
    }
    Ok(())
}

/// `" Reticle  Point\tLatitude "` -> `"reticle__point_latitude"`.
pub fn normalize_field_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_whitespace() {
                '_'
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

/// Every signed decimal token in `raw`, in order.
pub fn scan_decimals(raw: &str) -> Vec<f64> {
    DECIMAL
        .find_iter(raw)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

pub fn parse_decimal_list(field: &'static str, raw: &str) -> Result<Vec<f64>, TileError> {
    let values = scan_decimals(raw);
    if values.is_empty() {
        return Err(TileError::MalformedCoordinates {
            field,
            raw: raw.to_owned(),
        });
    }
    Ok(values)
}

/// Parses the leading numeric token of a value such as `"0.0975 km/px"`.
pub fn parse_scale(field: &'static str, raw: &str) -> Result<f64, TileError> {
    let malformed = || TileError::MalformedScale {
        field,
        raw: raw.to_owned(),
    };

    let token = raw.split_whitespace().next().ok_or_else(malformed)?;
    let value: f64 = token.parse().map_err(|_| malformed())?;

    if !value.is_finite() || value <= 0.0 {
        return Err(malformed());
    }

    Ok(value)
}
