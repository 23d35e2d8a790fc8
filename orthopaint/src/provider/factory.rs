//! Provider factory for centralized handler creation.
//!
//! The CLI and tests describe a source with a [`ProviderConfig`]; the
//! [`ProviderFactory`] owns the shared collaborators (HTTP client, tile cache,
//! CRS transform, fetch settings) and wires them into the matching handler.

use std::sync::Arc;

use super::grid::HandlerContext;
use super::http::HttpClient;
use super::template::{TemplateConfig, TemplateHandler};
use super::types::{FetchSettings, ProtocolHandler};
use super::wms::{WmsConfig, WmsHandler};
use super::wmts::{WmtsConfig, WmtsHandler};
use crate::cache::TileCache;
use crate::crs::CrsTransform;

/// IGN Géoplateforme WMTS endpoint.
pub const IGN_WMTS_URL: &str = "https://data.geopf.fr/wmts";

/// IGN orthophoto layer.
pub const IGN_ORTHO_LAYER: &str = "ORTHOIMAGERY.ORTHOPHOTOS";

/// Zoom used when none is configured.
pub const DEFAULT_ZOOM: u8 = 19;

/// Configuration for creating a protocol handler.
///
/// # Example
///
/// ```
/// use orthopaint::provider::{ProviderConfig, TemplateConfig};
///
/// let ign = ProviderConfig::ign_ortho();
/// assert_eq!(ign.name(), "WMTS");
///
/// let osm = ProviderConfig::Template(TemplateConfig {
///     template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
///     zoom: 18,
///     layer: "osm".to_string(),
/// });
/// assert_eq!(osm.zoom(), Some(18));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderConfig {
    /// Grid tiles located through `GetCapabilities`.
    Wmts(WmtsConfig),

    /// Grid tiles from a URL template.
    Template(TemplateConfig),

    /// One rendered image per ground cell.
    Wms(WmsConfig),
}

impl ProviderConfig {
    /// IGN orthophotos over WMTS, `PM` matrix set, zoom 19.
    pub fn ign_ortho() -> Self {
        Self::Wmts(WmtsConfig {
            url: IGN_WMTS_URL.to_string(),
            layer: IGN_ORTHO_LAYER.to_string(),
            style: Some("normal".to_string()),
            matrix_set: "PM".to_string(),
            zoom: DEFAULT_ZOOM,
            format: Some("image/jpeg".to_string()),
        })
    }

    /// Returns the protocol name for this configuration.
    pub fn name(&self) -> &str {
        match self {
            Self::Wmts(_) => "WMTS",
            Self::Template(_) => "Template",
            Self::Wms(_) => "WMS",
        }
    }

    /// Tile zoom level; `None` for bounding-box protocols.
    pub fn zoom(&self) -> Option<u8> {
        match self {
            Self::Wmts(c) => Some(c.zoom),
            Self::Template(c) => Some(c.zoom),
            Self::Wms(_) => None,
        }
    }

    /// Replace the zoom level of grid protocols.
    pub fn set_zoom(&mut self, zoom: u8) {
        match self {
            Self::Wmts(c) => c.zoom = zoom,
            Self::Template(c) => c.zoom = zoom,
            Self::Wms(_) => {}
        }
    }

    /// Layer name, used as the cache namespace for grid protocols.
    pub fn layer(&self) -> &str {
        match self {
            Self::Wmts(c) => &c.layer,
            Self::Template(c) => &c.layer,
            Self::Wms(c) => &c.layer,
        }
    }
}

/// Factory for creating protocol handlers.
pub struct ProviderFactory {
    ctx: HandlerContext,
}

impl ProviderFactory {
    pub fn new(
        client: Arc<dyn HttpClient>,
        cache: Arc<TileCache>,
        transform: Arc<dyn CrsTransform>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            ctx: HandlerContext {
                client,
                cache,
                transform,
                settings,
            },
        }
    }

    /// Creates the handler for `config`.
    ///
    /// Nothing touches the network here; call
    /// [`ProtocolHandler::discover`] before use.
    pub fn create(&self, config: &ProviderConfig) -> Arc<dyn ProtocolHandler> {
        let ctx = self.ctx.clone();
        match config {
            ProviderConfig::Wmts(c) => Arc::new(WmtsHandler::new(c.clone(), ctx)),
            ProviderConfig::Template(c) => Arc::new(TemplateHandler::new(c.clone(), ctx)),
            ProviderConfig::Wms(c) => Arc::new(WmsHandler::new(c.clone(), ctx)),
        }
    }
}
