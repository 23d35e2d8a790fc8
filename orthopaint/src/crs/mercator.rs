//! Spherical Web Mercator (EPSG:3857).

use std::f64::consts::FRAC_PI_4;

/// Sphere radius used by Web Mercator, equal to the WGS84 semi-major axis.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude limit where Web Mercator becomes a square.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Web Mercator projection.
#[derive(Debug, Clone, Default)]
pub struct WebMercator;

impl WebMercator {
    pub fn new() -> Self {
        Self
    }

    /// (lon, lat) degrees to (x, y) meters. Latitude is clamped to the
    /// projection's valid band.
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let x = EARTH_RADIUS * lon.to_radians();
        let y = EARTH_RADIUS * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
        (x, y)
    }

    /// (x, y) meters to (lon, lat) degrees.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let lon = (x / EARTH_RADIUS).to_degrees();
        let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
        (lon, lat)
    }
}
