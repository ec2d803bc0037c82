//! Selenographic constants and coordinate helpers.

pub mod moon {
    /// Mean radius in kilometres.
    pub const MEAN_RADIUS_KM: f64 = 1_737.4;

    /// Equatorial circumference in kilometres, as used for atlas scaling.
    pub const CIRCUMFERENCE_KM: f64 = 10_921.0;
}

/// Maps a longitude onto `[0, 360)` degrees east.
#[inline]
pub fn normalize_longitude(lon_deg: f64) -> f64 {
    let lon = lon_deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if lon >= 360.0 {
        0.0
    } else {
        lon
    }
}

/// Spherical body-fixed coordinates to Cartesian, in the unit of `radius`.
#[inline]
pub fn spherical_to_cartesian(lat_deg: f64, lon_deg: f64, radius: f64) -> [f64; 3] {
    let (sin_lat, cos_lat) = lat_deg.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon_deg.to_radians().sin_cos();

    [
        radius * cos_lat * cos_lon,
        radius * cos_lat * sin_lon,
        radius * sin_lat,
    ]
}

/// Equirectangular texture coordinates for a point, matching the atlas layout
/// (u grows east from 0°, v grows south from +90°).
#[inline]
pub fn equirect_uv(lat_deg: f64, lon_deg: f64) -> [f64; 2] {
    [
        normalize_longitude(lon_deg) / 360.0,
        (90.0 - lat_deg.clamp(-90.0, 90.0)) / 180.0,
    ]
}
