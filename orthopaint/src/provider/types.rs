//! Provider types and traits

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;

use super::capabilities::LayerCapabilities;
use crate::coord::{CoordError, GeoBounds, GroundCell, TileRange};
use crate::crs::CrsId;

/// Default placeholder color for tiles that could not be fetched.
pub const DEFAULT_PLACEHOLDER: [u8; 3] = [250, 0, 0];

/// Default pause after each network request that missed the cache.
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 100;

/// Errors that can occur during provider operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Capability document could not be fetched, parsed or resolved
    DiscoveryUnavailable(String),
    /// A single grid tile could not be fetched or decoded
    TileFetchFailed { tile: String, reason: String },
    /// The single image request of a bounding-box protocol failed
    BoundingBoxFetchFailed(String),
    /// Request geometry could not be computed from the input coordinates
    InvalidCoordinate(String),
    /// Server answered with a non-success status
    HttpStatus { status: u16, url: String },
    /// Transport-level HTTP failure
    Http(String),
    /// Geometry or fetch requested before `discover()` succeeded
    NotDiscovered(String),
    /// Image decoding or encoding failed
    Image(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::DiscoveryUnavailable(msg) => {
                write!(f, "Capability discovery unavailable: {}", msg)
            }
            ProviderError::TileFetchFailed { tile, reason } => {
                write!(f, "Tile {} unavailable: {}", tile, reason)
            }
            ProviderError::BoundingBoxFetchFailed(msg) => {
                write!(f, "Bounding box image request failed: {}", msg)
            }
            ProviderError::InvalidCoordinate(msg) => write!(f, "Invalid coordinate: {}", msg),
            ProviderError::HttpStatus { status, url } => {
                write!(f, "HTTP {} from {}", status, url)
            }
            ProviderError::Http(msg) => write!(f, "HTTP error: {}", msg),
            ProviderError::NotDiscovered(name) => {
                write!(f, "Provider {} used before capability discovery", name)
            }
            ProviderError::Image(msg) => write!(f, "Image error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<CoordError> for ProviderError {
    fn from(e: CoordError) -> Self {
        ProviderError::InvalidCoordinate(e.to_string())
    }
}

impl From<image::ImageError> for ProviderError {
    fn from(e: image::ImageError) -> Self {
        ProviderError::Image(e.to_string())
    }
}

/// Pixel and geographic extent of the request for one ground cell.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestGeometry {
    /// Integer tile range; `None` for bounding-box protocols
    pub tiles: Option<TileRange>,
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Extent of the raster in the protocol's native CRS
    pub bounds: GeoBounds,
    pub crs: CrsId,
}

/// A tile replaced by the placeholder color.
#[derive(Debug, Clone, PartialEq)]
pub struct TileWarning {
    pub tile_x: i64,
    pub tile_y: i64,
    pub reason: String,
}

/// Raster returned by a protocol handler.
#[derive(Debug, Clone)]
pub struct Raster {
    pub image: RgbImage,
    pub warnings: Vec<TileWarning>,
}

/// Knobs shared by every handler.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Pause after each network request that missed the cache
    pub request_delay: Duration,
    /// Fill color of tiles that could not be fetched
    pub placeholder: [u8; 3],
    /// CRS in which ground cells are expressed
    pub cell_crs: CrsId,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            placeholder: DEFAULT_PLACEHOLDER,
            cell_crs: CrsId::lambert93(),
        }
    }
}

/// A remote imagery protocol.
///
/// Implementations discover the server's capabilities once, then turn ground
/// cells into request geometry and geometry into pixels. They are shared by
/// every worker, so all methods take `&self`.
pub trait ProtocolHandler: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Fetch and resolve server capabilities. Idempotent: later calls return
    /// the cached result without a network round trip.
    fn discover(&self) -> Result<Arc<LayerCapabilities>, ProviderError>;

    /// CRS of the rasters produced by this handler.
    fn native_crs(&self) -> Result<CrsId, ProviderError>;

    /// Raster extent covering `cell` grown by `margin_m`.
    fn compute_geometry(
        &self,
        cell: &GroundCell,
        margin_m: f64,
    ) -> Result<RequestGeometry, ProviderError>;

    /// Fetch the pixels for `geometry`.
    fn fetch_raster(&self, geometry: &RequestGeometry) -> Result<Raster, ProviderError>;
}
