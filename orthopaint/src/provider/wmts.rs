//! WMTS provider (grid tiles with capability discovery).
//!
//! # Request flow
//!
//! 1. `GetCapabilities` is fetched once and resolved into a single tile grid
//!    for the configured layer, matrix set and zoom.
//! 2. Each ground cell is projected into tile space and over-covered with an
//!    integer tile range.
//! 3. Tiles are fetched with KVP `GetTile` requests, cache first.
//!
//! The IGN Géoplateforme (`https://data.geopf.fr/wmts`) is the reference
//! server: layer `ORTHOIMAGERY.ORTHOPHOTOS`, style `normal`, matrix set `PM`.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use super::capabilities::{wmts, LayerCapabilities};
use super::grid::{fetch_grid, GridRequest, HandlerContext};
use super::http::kvp_url;
use super::types::{ProtocolHandler, ProviderError, Raster, RequestGeometry};
use crate::cache::ImageFormat;
use crate::coord::{CoordinateSpace, GroundCell};
use crate::crs::CrsId;

/// Style used when neither configuration nor capabilities name one.
const FALLBACK_STYLE: &str = "normal";

/// Configuration of a WMTS layer.
#[derive(Debug, Clone, PartialEq)]
pub struct WmtsConfig {
    /// Service endpoint, without query string
    pub url: String,
    pub layer: String,
    /// Style identifier; capabilities default when `None`
    pub style: Option<String>,
    pub matrix_set: String,
    pub zoom: u8,
    /// MIME type; first advertised format when `None`
    pub format: Option<String>,
}

/// State resolved by discovery.
struct WmtsState {
    capabilities: Arc<LayerCapabilities>,
    space: CoordinateSpace,
    matrix_id: String,
    format: ImageFormat,
    mime: String,
    style: String,
}

/// WMTS protocol handler.
pub struct WmtsHandler {
    config: WmtsConfig,
    ctx: HandlerContext,
    state: OnceLock<WmtsState>,
}

impl WmtsHandler {
    pub fn new(config: WmtsConfig, ctx: HandlerContext) -> Self {
        Self {
            config,
            ctx,
            state: OnceLock::new(),
        }
    }

    fn state(&self) -> Result<&WmtsState, ProviderError> {
        self.state
            .get()
            .ok_or_else(|| ProviderError::NotDiscovered(self.name().to_string()))
    }

    fn capabilities_url(&self) -> String {
        kvp_url(
            &self.config.url,
            &[
                ("SERVICE", "WMTS"),
                ("REQUEST", "GetCapabilities"),
                ("VERSION", "1.0.0"),
            ],
        )
    }

    fn tile_url(&self, state: &WmtsState, tile_x: i64, tile_y: i64) -> String {
        let row = tile_y.to_string();
        let col = tile_x.to_string();
        kvp_url(
            &self.config.url,
            &[
                ("SERVICE", "WMTS"),
                ("REQUEST", "GetTile"),
                ("VERSION", "1.0.0"),
                ("LAYER", &self.config.layer),
                ("STYLE", &state.style),
                ("TILEMATRIXSET", &self.config.matrix_set),
                ("TILEMATRIX", &state.matrix_id),
                ("TILEROW", &row),
                ("TILECOL", &col),
                ("FORMAT", &state.mime),
            ],
        )
    }

    fn resolve(&self, xml: &str) -> Result<WmtsState, ProviderError> {
        let parsed = wmts::parse(xml)?;
        let unavailable = |msg: String| ProviderError::DiscoveryUnavailable(msg);

        let layer = parsed
            .layer(&self.config.layer)
            .ok_or_else(|| unavailable(format!("layer {} not advertised", self.config.layer)))?;

        if !layer.matrix_set_links.contains(&self.config.matrix_set) {
            return Err(unavailable(format!(
                "layer {} is not linked to matrix set {}",
                self.config.layer, self.config.matrix_set
            )));
        }
        let set = parsed.matrix_sets.get(&self.config.matrix_set).ok_or_else(|| {
            unavailable(format!("matrix set {} not advertised", self.config.matrix_set))
        })?;
        let matrix = set.matrix_for_zoom(self.config.zoom).ok_or_else(|| {
            unavailable(format!(
                "matrix set {} has no zoom {}",
                self.config.matrix_set, self.config.zoom
            ))
        })?;
        let grid = matrix
            .zoom_config(&set.crs)
            .map_err(|e| unavailable(format!("tile matrix {}: {}", matrix.identifier, e)))?;

        if !self.ctx.transform.supports(&set.crs) {
            return Err(unavailable(format!(
                "matrix set CRS {} is not supported",
                set.crs
            )));
        }

        let mime = match &self.config.format {
            Some(format) => format.clone(),
            None => layer
                .formats
                .first()
                .cloned()
                .ok_or_else(|| unavailable(format!("layer {} lists no format", layer.identifier)))?,
        };
        let format = ImageFormat::from_mime(&mime)
            .ok_or_else(|| unavailable(format!("unsupported tile format {}", mime)))?;

        let style = self
            .config
            .style
            .clone()
            .or_else(|| layer.default_style.clone())
            .or_else(|| layer.styles.first().cloned())
            .unwrap_or_else(|| FALLBACK_STYLE.to_string());

        info!(
            layer = %self.config.layer,
            matrix = %matrix.identifier,
            crs = %set.crs,
            resolution = grid.meters_per_pixel(),
            "Resolved WMTS tile grid"
        );

        Ok(WmtsState {
            capabilities: Arc::new(parsed.to_layer_capabilities(&self.config.matrix_set)),
            space: CoordinateSpace::new(grid, set.crs.clone(), Arc::clone(&self.ctx.transform)),
            matrix_id: matrix.identifier.clone(),
            format,
            mime,
            style,
        })
    }
}

impl ProtocolHandler for WmtsHandler {
    fn name(&self) -> &str {
        "WMTS"
    }

    fn discover(&self) -> Result<Arc<LayerCapabilities>, ProviderError> {
        if let Some(state) = self.state.get() {
            return Ok(Arc::clone(&state.capabilities));
        }

        let url = self.capabilities_url();
        debug!(url = %url, "Fetching WMTS capabilities");
        let body = self
            .ctx
            .client
            .get(&url)
            .map_err(|e| ProviderError::DiscoveryUnavailable(e.to_string()))?;
        let xml = String::from_utf8_lossy(&body);
        let resolved = self.resolve(&xml)?;

        let state = self.state.get_or_init(|| resolved);
        Ok(Arc::clone(&state.capabilities))
    }

    fn native_crs(&self) -> Result<CrsId, ProviderError> {
        Ok(self.state()?.space.crs().clone())
    }

    fn compute_geometry(
        &self,
        cell: &GroundCell,
        margin_m: f64,
    ) -> Result<RequestGeometry, ProviderError> {
        let state = self.state()?;
        let bounds = cell.bounds(margin_m)?;
        let range = state
            .space
            .covering_range(&bounds, &self.ctx.settings.cell_crs)?;
        let grid = state.space.grid();
        let (pixel_width, pixel_height) =
            range.pixel_size(grid.tile_width_px(), grid.tile_height_px())?;

        Ok(RequestGeometry {
            tiles: Some(range),
            pixel_width,
            pixel_height,
            bounds: state.space.range_bounds(&range)?,
            crs: state.space.crs().clone(),
        })
    }

    fn fetch_raster(&self, geometry: &RequestGeometry) -> Result<Raster, ProviderError> {
        let state = self.state()?;
        let range = geometry.tiles.ok_or_else(|| {
            ProviderError::InvalidCoordinate("WMTS geometry without tile range".to_string())
        })?;
        let grid = state.space.grid();

        let request = GridRequest {
            layer: &self.config.layer,
            tile_set: &self.config.matrix_set,
            zoom: self.config.zoom,
            format: state.format,
            tile_width: grid.tile_width_px(),
            tile_height: grid.tile_height_px(),
        };
        fetch_grid(&self.ctx, &request, &range, |x, y| self.tile_url(state, x, y))
    }
}
