//! Remote imagery protocols.
//!
//! Three incompatible protocols hide behind the [`ProtocolHandler`] trait:
//!
//! - [`WmtsHandler`]: grid tiles located through `GetCapabilities`
//! - [`TemplateHandler`]: grid tiles from a slippy-map URL template
//! - [`WmsHandler`]: one `GetMap` image per bounding box
//!
//! # Factory Pattern
//!
//! ```ignore
//! use orthopaint::provider::{ProviderConfig, ProviderFactory, ReqwestClient};
//!
//! let factory = ProviderFactory::new(client, cache, transform, settings);
//! let handler = factory.create(&ProviderConfig::ign_ortho());
//! handler.discover()?;
//! ```

pub mod capabilities;
mod factory;
mod grid;
mod http;
mod template;
mod types;
mod wms;
mod wmts;

pub use factory::{ProviderConfig, ProviderFactory, DEFAULT_ZOOM, IGN_ORTHO_LAYER, IGN_WMTS_URL};
pub use grid::HandlerContext;
pub use http::{kvp_url, HttpClient, ReqwestClient, DEFAULT_TIMEOUT_SECS};
pub use template::{TemplateConfig, TemplateHandler, UrlTemplate};
pub use types::{
    FetchSettings, ProtocolHandler, ProviderError, Raster, RequestGeometry, TileWarning,
    DEFAULT_PLACEHOLDER, DEFAULT_REQUEST_DELAY_MS,
};
pub use wms::{WmsConfig, WmsHandler, TARGET_GROUND_RESOLUTION_M};
pub use wmts::{WmtsConfig, WmtsHandler};

#[cfg(test)]
pub use http::tests::{solid_png, ColorTileClient, MockHttpClient, RoutingHttpClient, TEST_COLORS};
