//! Coordinate reference system identifiers and transforms.
//!
//! The tile engine never hard-codes projection math in the protocol handlers.
//! Every change of reference system goes through a [`CrsTransform`], which
//! keeps the geodesy primitive swappable. [`BuiltinTransform`] covers the
//! systems the IGN lidar workflow needs:
//!
//! - `EPSG:4326` - WGS84 geographic, expressed as (longitude, latitude) degrees
//! - `EPSG:3857` - spherical Web Mercator, meters
//! - `EPSG:2154` - RGF93 / Lambert-93, meters
//!
//! RGF93 and WGS84 are treated as the same datum (sub-meter difference).
//! With the `proj` feature, [`ProjTransform`] hands any other EPSG code to
//! libproj.

mod lambert;
mod mercator;
#[cfg(feature = "proj")]
mod proj;

pub use lambert::LambertConformalConic;
pub use mercator::WebMercator;
#[cfg(feature = "proj")]
pub use self::proj::ProjTransform;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised by coordinate transforms.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CrsError {
    /// The transform does not know one of the two reference systems.
    #[error("unsupported CRS transform {from} -> {to}")]
    Unsupported { from: String, to: String },

    /// Input or output is not a finite number.
    #[error("invalid coordinate ({x}, {y}) in {crs}")]
    InvalidCoordinate { x: f64, y: f64, crs: String },
}

/// Normalized CRS identifier such as `EPSG:3857`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CrsId(String);

impl CrsId {
    /// Parse and normalize an identifier.
    ///
    /// Accepts `EPSG:xxxx` in any case, OGC URNs
    /// (`urn:ogc:def:crs:EPSG::3857`), `CRS:84`, and a few well-known aliases.
    pub fn new(raw: &str) -> Self {
        Self(normalize(raw.trim()))
    }

    /// WGS84 geographic coordinates.
    pub fn wgs84() -> Self {
        Self("EPSG:4326".to_string())
    }

    /// Spherical Web Mercator.
    pub fn web_mercator() -> Self {
        Self("EPSG:3857".to_string())
    }

    /// RGF93 / Lambert-93.
    pub fn lambert93() -> Self {
        Self("EPSG:2154".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// EPSG code when the identifier is in the EPSG namespace.
    pub fn epsg_code(&self) -> Option<u32> {
        self.0.strip_prefix("EPSG:").and_then(|c| c.parse().ok())
    }

    /// True for geographic (degree based) systems.
    pub fn is_geographic(&self) -> bool {
        self.epsg_code() == Some(4326)
    }

    /// Short tag safe for file names (`EPSG:3857` -> `EPSG3857`).
    pub fn file_tag(&self) -> String {
        self.0.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
    }
}

impl fmt::Display for CrsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CrsId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

fn normalize(raw: &str) -> String {
    let upper = raw.to_ascii_uppercase();

    // urn:ogc:def:crs:EPSG:6.18:3857 and urn:ogc:def:crs:EPSG::3857
    let epsg = if upper.starts_with("URN:OGC:DEF:CRS:") {
        if upper.contains(":EPSG:") {
            upper.rsplit(':').next().map(str::to_string)
        } else if upper.ends_with(":CRS84") {
            Some("4326".to_string())
        } else {
            None
        }
    } else if let Some(code) = upper.strip_prefix("EPSG:") {
        Some(code.to_string())
    } else {
        None
    };

    if let Some(code) = epsg {
        return match code.as_str() {
            "900913" | "3785" | "102100" | "102113" => "EPSG:3857".to_string(),
            _ => format!("EPSG:{}", code),
        };
    }

    match upper.as_str() {
        "CRS:84" | "WGS84" => "EPSG:4326".to_string(),
        "IGNF:LAMB93" => "EPSG:2154".to_string(),
        _ => upper,
    }
}

/// Point transform between two reference systems.
///
/// Implementations must be thread-safe: one transform is shared by every
/// worker processing ground cells.
pub trait CrsTransform: Send + Sync {
    /// Transform a single point. Identity when `from == to`.
    fn transform(&self, from: &CrsId, to: &CrsId, x: f64, y: f64)
        -> Result<(f64, f64), CrsError>;

    /// Whether `crs` can be used as either end of a transform.
    fn supports(&self, crs: &CrsId) -> bool;
}

/// Transform for production use: PROJ when compiled in, builtin math otherwise.
pub fn default_transform() -> Arc<dyn CrsTransform> {
    #[cfg(feature = "proj")]
    {
        Arc::new(ProjTransform::new())
    }
    #[cfg(not(feature = "proj"))]
    {
        Arc::new(BuiltinTransform::new())
    }
}

/// Pure-Rust transform for WGS84, Web Mercator and Lambert-93.
#[derive(Debug, Clone)]
pub struct BuiltinTransform {
    mercator: WebMercator,
    lambert93: LambertConformalConic,
}

impl Default for BuiltinTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinTransform {
    pub fn new() -> Self {
        Self {
            mercator: WebMercator::new(),
            lambert93: LambertConformalConic::lambert93(),
        }
    }

    fn to_geographic(&self, crs: &CrsId, x: f64, y: f64) -> Option<(f64, f64)> {
        match crs.epsg_code()? {
            4326 => Some((x, y)),
            3857 => Some(self.mercator.inverse(x, y)),
            2154 => Some(self.lambert93.inverse(x, y)),
            _ => None,
        }
    }

    fn from_geographic(&self, crs: &CrsId, lon: f64, lat: f64) -> Option<(f64, f64)> {
        match crs.epsg_code()? {
            4326 => Some((lon, lat)),
            3857 => Some(self.mercator.forward(lon, lat)),
            2154 => Some(self.lambert93.forward(lon, lat)),
            _ => None,
        }
    }
}

impl CrsTransform for BuiltinTransform {
    fn transform(
        &self,
        from: &CrsId,
        to: &CrsId,
        x: f64,
        y: f64,
    ) -> Result<(f64, f64), CrsError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(CrsError::InvalidCoordinate {
                x,
                y,
                crs: from.to_string(),
            });
        }
        if from == to {
            return Ok((x, y));
        }

        let unsupported = || CrsError::Unsupported {
            from: from.to_string(),
            to: to.to_string(),
        };
        let (lon, lat) = self.to_geographic(from, x, y).ok_or_else(unsupported)?;
        let (tx, ty) = self
            .from_geographic(to, lon, lat)
            .ok_or_else(unsupported)?;

        if !tx.is_finite() || !ty.is_finite() {
            return Err(CrsError::InvalidCoordinate {
                x,
                y,
                crs: from.to_string(),
            });
        }
        Ok((tx, ty))
    }

    fn supports(&self, crs: &CrsId) -> bool {
        matches!(crs.epsg_code(), Some(4326 | 3857 | 2154))
    }
}
