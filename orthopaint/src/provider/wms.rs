//! WMS provider (one bounding-box image per ground cell).
//!
//! The server renders the whole extent in a single `GetMap` response, so
//! there is no tile grid, no cache, and no placeholder: either the image
//! arrives intact or the cell fails with
//! [`ProviderError::BoundingBoxFetchFailed`].

use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use super::capabilities::{wms, LayerCapabilities};
use super::grid::HandlerContext;
use super::http::kvp_url;
use super::types::{ProtocolHandler, ProviderError, Raster, RequestGeometry};
use crate::cache::ImageFormat;
use crate::coord::{reproject_bounds, GroundCell, STANDARD_PIXEL_SIZE_M};
use crate::crs::CrsId;

/// Ground size of one requested pixel, in meters.
pub const TARGET_GROUND_RESOLUTION_M: f64 = 0.2;

const WMS_VERSION: &str = "1.3.0";

/// Configuration of a WMS layer.
#[derive(Debug, Clone, PartialEq)]
pub struct WmsConfig {
    pub url: String,
    pub layer: String,
    /// Empty string requests the server default
    pub style: Option<String>,
    /// Request CRS; first supported layer CRS when `None`
    pub crs: Option<String>,
    /// MIME type; first decodable advertised format when `None`
    pub format: Option<String>,
}

struct WmsState {
    capabilities: Arc<LayerCapabilities>,
    crs: CrsId,
    mime: String,
    max_width: u32,
    max_height: u32,
    min_scale: Option<f64>,
    max_scale: Option<f64>,
}

/// WMS protocol handler.
pub struct WmsHandler {
    config: WmsConfig,
    ctx: HandlerContext,
    state: OnceLock<WmsState>,
}

impl WmsHandler {
    pub fn new(config: WmsConfig, ctx: HandlerContext) -> Self {
        Self {
            config,
            ctx,
            state: OnceLock::new(),
        }
    }

    fn state(&self) -> Result<&WmsState, ProviderError> {
        self.state
            .get()
            .ok_or_else(|| ProviderError::NotDiscovered(self.name().to_string()))
    }

    fn resolve(&self, xml: &str) -> Result<WmsState, ProviderError> {
        let parsed = wms::parse(xml)?;
        let unavailable = |msg: String| ProviderError::DiscoveryUnavailable(msg);

        let layer = parsed
            .root
            .resolve(&self.config.layer)
            .ok_or_else(|| unavailable(format!("layer {} not advertised", self.config.layer)))?;

        let crs = match &self.config.crs {
            Some(raw) => {
                let wanted = CrsId::new(raw);
                if !layer.crs.contains(&wanted) {
                    return Err(unavailable(format!(
                        "layer {} does not offer {}",
                        self.config.layer, wanted
                    )));
                }
                if !self.ctx.transform.supports(&wanted) {
                    return Err(unavailable(format!("CRS {} is not supported", wanted)));
                }
                wanted
            }
            None => layer
                .crs
                .iter()
                .find(|c| self.ctx.transform.supports(c))
                .cloned()
                .ok_or_else(|| {
                    unavailable(format!(
                        "layer {} offers no supported CRS",
                        self.config.layer
                    ))
                })?,
        };

        let mime = match &self.config.format {
            Some(format) => format.clone(),
            None => layer
                .format
                .iter()
                .chain(parsed.formats.iter())
                .find(|f| ImageFormat::from_mime(f).is_some())
                .cloned()
                .ok_or_else(|| {
                    unavailable(format!(
                        "layer {} offers no decodable format",
                        self.config.layer
                    ))
                })?,
        };

        info!(
            layer = %self.config.layer,
            crs = %crs,
            format = %mime,
            max_width = parsed.max_width,
            max_height = parsed.max_height,
            "Resolved WMS layer"
        );

        Ok(WmsState {
            capabilities: Arc::new(parsed.to_layer_capabilities()),
            crs,
            mime,
            max_width: parsed.max_width,
            max_height: parsed.max_height,
            min_scale: layer.min_scale,
            max_scale: layer.max_scale,
        })
    }

    fn get_map_url(&self, state: &WmsState, geometry: &RequestGeometry) -> String {
        let b = &geometry.bounds;
        // 1.3.0 uses the CRS axis order, latitude first for EPSG:4326
        let bbox = if state.crs.is_geographic() {
            format!("{},{},{},{}", b.min_y, b.min_x, b.max_y, b.max_x)
        } else {
            format!("{},{},{},{}", b.min_x, b.min_y, b.max_x, b.max_y)
        };
        let width = geometry.pixel_width.to_string();
        let height = geometry.pixel_height.to_string();

        kvp_url(
            &self.config.url,
            &[
                ("SERVICE", "WMS"),
                ("REQUEST", "GetMap"),
                ("VERSION", WMS_VERSION),
                ("LAYERS", &self.config.layer),
                ("STYLES", self.config.style.as_deref().unwrap_or("")),
                ("CRS", state.crs.as_str()),
                ("BBOX", &bbox),
                ("WIDTH", &width),
                ("HEIGHT", &height),
                ("FORMAT", &state.mime),
            ],
        )
    }
}

/// Pixels needed to cover `extent_m` at the target resolution, capped.
fn pixel_count(extent_m: f64, max: u32) -> u32 {
    let wanted = (extent_m / TARGET_GROUND_RESOLUTION_M).ceil();
    if wanted >= max as f64 {
        max
    } else {
        (wanted as u32).max(1)
    }
}

impl ProtocolHandler for WmsHandler {
    fn name(&self) -> &str {
        "WMS"
    }

    fn discover(&self) -> Result<Arc<LayerCapabilities>, ProviderError> {
        if let Some(state) = self.state.get() {
            return Ok(Arc::clone(&state.capabilities));
        }

        let url = kvp_url(
            &self.config.url,
            &[
                ("SERVICE", "WMS"),
                ("REQUEST", "GetCapabilities"),
                ("VERSION", WMS_VERSION),
            ],
        );
        debug!(url = %url, "Fetching WMS capabilities");
        let body = self
            .ctx
            .client
            .get(&url)
            .map_err(|e| ProviderError::DiscoveryUnavailable(e.to_string()))?;
        let resolved = self.resolve(&String::from_utf8_lossy(&body))?;

        let state = self.state.get_or_init(|| resolved);
        Ok(Arc::clone(&state.capabilities))
    }

    fn native_crs(&self) -> Result<CrsId, ProviderError> {
        Ok(self.state()?.crs.clone())
    }

    fn compute_geometry(
        &self,
        cell: &GroundCell,
        margin_m: f64,
    ) -> Result<RequestGeometry, ProviderError> {
        let state = self.state()?;
        let ground = cell.bounds(margin_m)?;
        let bounds = reproject_bounds(
            self.ctx.transform.as_ref(),
            &ground,
            &self.ctx.settings.cell_crs,
            &state.crs,
        )?;

        let pixel_width = pixel_count(ground.width(), state.max_width);
        let pixel_height = pixel_count(ground.height(), state.max_height);

        let scale = ground.width() / pixel_width as f64 / STANDARD_PIXEL_SIZE_M;
        let below = state.min_scale.is_some_and(|min| scale < min);
        let above = state.max_scale.is_some_and(|max| scale > max);
        if below || above {
            warn!(
                layer = %self.config.layer,
                scale,
                "Requested scale is outside the layer's advertised range"
            );
        }

        Ok(RequestGeometry {
            tiles: None,
            pixel_width,
            pixel_height,
            bounds,
            crs: state.crs.clone(),
        })
    }

    fn fetch_raster(&self, geometry: &RequestGeometry) -> Result<Raster, ProviderError> {
        let state = self.state()?;
        let url = self.get_map_url(state, geometry);
        debug!(url = %url, "Requesting WMS image");

        let body = self
            .ctx
            .client
            .get(&url)
            .map_err(|e| ProviderError::BoundingBoxFetchFailed(e.to_string()))?;
        let image = image::load_from_memory(&body)
            .map_err(|e| ProviderError::BoundingBoxFetchFailed(format!("undecodable image: {}", e)))?
            .to_rgb8();

        if image.dimensions() != (geometry.pixel_width, geometry.pixel_height) {
            return Err(ProviderError::BoundingBoxFetchFailed(format!(
                "server returned {}x{}, requested {}x{}",
                image.width(),
                image.height(),
                geometry.pixel_width,
                geometry.pixel_height
            )));
        }

        Ok(Raster {
            image,
            warnings: Vec::new(),
        })
    }
}
