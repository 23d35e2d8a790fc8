//! URL-template provider (slippy map / TMS).
//!
//! # Placeholders
//!
//! | Token            | Value                                   |
//! |------------------|-----------------------------------------|
//! | `{x}`            | tile column                             |
//! | `{y}`            | tile row, counted from the north        |
//! | `{z}`, `{zoom}`  | zoom level                              |
//! | `{-y}`           | TMS row: `2^z - 1 - y`                  |
//! | `{!y}`           | OSGeo row: `2^(z-1) - 1 - y`            |
//! | `{switch:a,b,c}` | rotates through `a`, `b`, `c`           |
//!
//! The switch advances once per URL built. URLs are only built for cache
//! misses, so the rotation follows network fetch order.
//!
//! Template servers publish no capabilities: the grid is always Web Mercator.
//!
//! Cached tiles are keyed by a digest of the template, so two templates
//! configured under the same layer name never read each other's tiles.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use sha2::{Digest, Sha256};
use tracing::debug;

use super::capabilities::{LayerCapabilities, LayerInfo, DEFAULT_MAX_DIMENSION};
use super::grid::{fetch_grid, GridRequest, HandlerContext};
use super::types::{ProtocolHandler, ProviderError, Raster, RequestGeometry};
use crate::cache::ImageFormat;
use crate::coord::{CoordinateSpace, GroundCell, ZoomConfig, MAX_ZOOM};
use crate::crs::CrsId;

/// One piece of a parsed URL template.
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    X,
    Y,
    Z,
    InvertedY,
    OsgeoY,
    Switch(Vec<String>),
}

/// A parsed tile URL template.
#[derive(Debug)]
pub struct UrlTemplate {
    raw: String,
    segments: Vec<Segment>,
    counter: AtomicUsize,
}

impl UrlTemplate {
    /// Parse `raw`. Unknown `{tokens}` are kept as literal text.
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|c| open + c) else {
                break;
            };
            literal.push_str(&rest[..open]);

            let token = &rest[open + 1..close];
            match parse_token(token) {
                Some(segment) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                }
                None => literal.push_str(&rest[open..=close]),
            }
            rest = &rest[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            raw: raw.to_string(),
            segments,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Stable cache key: `xyz-` and the first 12 hex digits of the
    /// template's SHA-256.
    pub fn cache_key(&self) -> String {
        let digest = Sha256::digest(self.raw.as_bytes());
        let hex: String = digest.iter().take(6).map(|b| format!("{:02x}", b)).collect();
        format!("xyz-{}", hex)
    }

    /// Build the URL for one tile, advancing the switch rotation.
    pub fn build(&self, zoom: u8, tile_x: i64, tile_y: i64) -> String {
        let rotation = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut url = String::with_capacity(self.raw.len() + 16);

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => url.push_str(text),
                Segment::X => url.push_str(&tile_x.to_string()),
                Segment::Y => url.push_str(&tile_y.to_string()),
                Segment::Z => url.push_str(&zoom.to_string()),
                Segment::InvertedY => {
                    let rows = 1i64 << zoom;
                    url.push_str(&(rows - 1 - tile_y).to_string());
                }
                Segment::OsgeoY => {
                    let rows = (1i64 << zoom) >> 1;
                    url.push_str(&(rows - 1 - tile_y).to_string());
                }
                Segment::Switch(choices) => url.push_str(&choices[rotation % choices.len()]),
            }
        }
        url
    }

    /// Extension of the path, if the template ends in one (`.png`, `.jpg`).
    fn extension(&self) -> Option<&str> {
        let path = self.raw.split(|c: char| c == '?' || c == '#').next()?;
        let last = path.rsplit('/').next()?;
        let (_, ext) = last.rsplit_once('.')?;
        (!ext.contains('{')).then_some(ext)
    }
}

fn parse_token(token: &str) -> Option<Segment> {
    match token {
        "x" => Some(Segment::X),
        "y" => Some(Segment::Y),
        "z" | "zoom" => Some(Segment::Z),
        "-y" => Some(Segment::InvertedY),
        "!y" => Some(Segment::OsgeoY),
        _ => {
            let list = token.strip_prefix("switch:")?;
            let choices: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            (!choices.is_empty()).then_some(Segment::Switch(choices))
        }
    }
}

/// Configuration of a template source.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateConfig {
    pub template: String,
    pub zoom: u8,
    /// Cache namespace for the tiles
    pub layer: String,
}

struct TemplateState {
    capabilities: Arc<LayerCapabilities>,
    space: CoordinateSpace,
}

/// Slippy-map / TMS protocol handler.
pub struct TemplateHandler {
    config: TemplateConfig,
    template: UrlTemplate,
    tile_set: String,
    format: ImageFormat,
    ctx: HandlerContext,
    state: OnceLock<TemplateState>,
}

impl TemplateHandler {
    pub fn new(config: TemplateConfig, ctx: HandlerContext) -> Self {
        let template = UrlTemplate::parse(&config.template);
        let format = template
            .extension()
            .and_then(ImageFormat::from_extension)
            .unwrap_or(ImageFormat::Jpeg);
        let tile_set = template.cache_key();

        Self {
            config,
            template,
            tile_set,
            format,
            ctx,
            state: OnceLock::new(),
        }
    }

    fn state(&self) -> Result<&TemplateState, ProviderError> {
        self.state
            .get()
            .ok_or_else(|| ProviderError::NotDiscovered(self.name().to_string()))
    }

    fn synthesize(&self) -> Result<TemplateState, ProviderError> {
        if self.config.zoom > MAX_ZOOM {
            return Err(ProviderError::DiscoveryUnavailable(format!(
                "zoom {} exceeds the maximum of {}",
                self.config.zoom, MAX_ZOOM
            )));
        }
        let grid = ZoomConfig::web_mercator(self.config.zoom);
        let crs = CrsId::web_mercator();

        let mut zooms = BTreeMap::new();
        zooms.insert(self.config.zoom, grid);
        let info = LayerInfo {
            name: self.config.layer.clone(),
            formats: vec![self.format.mime().to_string()],
            crs: vec![crs.clone()],
            zooms,
            ..Default::default()
        };

        let mut layers = BTreeMap::new();
        layers.insert(self.config.layer.clone(), info);

        debug!(template = %self.template.as_str(), zoom = self.config.zoom, "Template grid ready");

        Ok(TemplateState {
            capabilities: Arc::new(LayerCapabilities {
                layers,
                max_width: DEFAULT_MAX_DIMENSION,
                max_height: DEFAULT_MAX_DIMENSION,
                tree: None,
            }),
            space: CoordinateSpace::new(grid, crs, Arc::clone(&self.ctx.transform)),
        })
    }
}

impl ProtocolHandler for TemplateHandler {
    fn name(&self) -> &str {
        "Template"
    }

    fn discover(&self) -> Result<Arc<LayerCapabilities>, ProviderError> {
        if let Some(state) = self.state.get() {
            return Ok(Arc::clone(&state.capabilities));
        }
        let synthesized = self.synthesize()?;
        let state = self.state.get_or_init(|| synthesized);
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
            ProviderError::InvalidCoordinate("template geometry without tile range".to_string())
        })?;
        let grid = state.space.grid();

        let request = GridRequest {
            layer: &self.config.layer,
            tile_set: &self.tile_set,
            zoom: self.config.zoom,
            format: self.format,
            tile_width: grid.tile_width_px(),
            tile_height: grid.tile_height_px(),
        };
        let zoom = self.config.zoom;
        fetch_grid(&self.ctx, &request, &range, |x, y| {
            self.template.build(zoom, x, y)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TileCache;
    use crate::crs::BuiltinTransform;
    use crate::provider::http::tests::{solid_png, ColorTileClient, RoutingHttpClient, TEST_COLORS};
    use crate::provider::http::HttpClient;
    use crate::provider::types::FetchSettings;
    use std::time::Duration;
    use tempfile::TempDir;

    fn handler(template: &str, zoom: u8, client: Arc<dyn HttpClient>, dir: &TempDir) -> TemplateHandler {
        let ctx = HandlerContext {
            client,
            cache: Arc::new(TileCache::new(dir.path())),
            transform: Arc::new(BuiltinTransform::new()),
            settings: FetchSettings {
                request_delay: Duration::ZERO,
                ..Default::default()
            },
        };
        let config = TemplateConfig {
            template: template.to_string(),
            zoom,
            layer: "osm".to_string(),
        };
        TemplateHandler::new(config, ctx)
    }

    #[test]
    fn test_plain_substitution() {
        let t = UrlTemplate::parse("https://tile.test/{z}/{x}/{y}.png");
        assert_eq!(t.build(19, 265_000, 180_000), "https://tile.test/19/265000/180000.png");
    }

    #[test]
    fn test_zoom_alias() {
        let t = UrlTemplate::parse("/{zoom}/{x}/{y}");
        assert_eq!(t.build(3, 1, 2), "/3/1/2");
    }

    #[test]
    fn test_tms_and_osgeo_rows() {
        let t = UrlTemplate::parse("{-y}|{!y}");
        // zoom 3: 8 rows, OSGeo counts 4
        assert_eq!(t.build(3, 0, 2), "5|1");
        assert_eq!(t.build(0, 0, 0), "0|-1");
    }

    #[test]
    fn test_switch_rotates_per_url() {
        let t = UrlTemplate::parse("https://{switch:a,b,c}.tile.test/{z}/{x}/{y}.png");
        let hosts: Vec<String> = (0..6)
            .map(|i| t.build(1, i, 0))
            .map(|url| url[8..9].to_string())
            .collect();
        assert_eq!(hosts, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn test_no_switch_yields_no_rotation_text() {
        let t = UrlTemplate::parse("{z}/{x}/{y}.png");
        assert_eq!(t.build(2, 1, 1), "2/1/1.png");
        assert_eq!(t.build(2, 1, 1), "2/1/1.png");
    }

    #[test]
    fn test_unknown_tokens_left_literal() {
        let t = UrlTemplate::parse("/{s}/{z}/{x}/{y}?key={apikey}");
        assert_eq!(t.build(4, 5, 6), "/{s}/4/5/6?key={apikey}");
    }

    #[test]
    fn test_unclosed_brace() {
        let t = UrlTemplate::parse("/{z}/{x");
        assert_eq!(t.build(4, 5, 6), "/4/{x");
    }

    #[test]
    fn test_format_from_extension() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(ColorTileClient::new(256));
        assert_eq!(
            handler("https://t/{z}/{x}/{y}.png", 18, client.clone(), &temp).format,
            ImageFormat::Png
        );
        assert_eq!(
            handler("https://t/{z}/{x}/{y}", 18, client, &temp).format,
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_discover_is_synthetic() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(RoutingHttpClient::new(Ok(Vec::new())));
        let h = handler("https://t/{z}/{x}/{y}.png", 19, client.clone(), &temp);

        let caps = h.discover().unwrap();
        assert_eq!(client.request_count(), 0);
        assert_eq!(h.native_crs().unwrap(), CrsId::web_mercator());
        let info = caps.layer("osm").unwrap();
        assert!(info.zooms.contains_key(&19));
    }

    #[test]
    fn test_fetch_before_discover() {
        let temp = TempDir::new().unwrap();
        let h = handler("{z}/{x}/{y}", 19, Arc::new(ColorTileClient::new(256)), &temp);
        assert!(matches!(
            h.compute_geometry(&GroundCell::new(650, 6860), 0.0),
            Err(ProviderError::NotDiscovered(_))
        ));
    }

    #[test]
    fn test_switch_follows_fetch_order() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(RoutingHttpClient::new(Ok(solid_png(256, 256, [1, 2, 3]))));
        let h = handler(
            "https://{switch:a,b,c}.t/{z}/{x}/{y}.png",
            17,
            client.clone(),
            &temp,
        );
        h.discover().unwrap();

        let geometry = h.compute_geometry(&GroundCell::new(650, 6860), 0.0).unwrap();
        h.fetch_raster(&geometry).unwrap();

        let hosts: Vec<char> = client
            .requests()
            .iter()
            .map(|url| url.chars().nth(8).unwrap())
            .collect();
        assert!(hosts.len() >= 4);
        for (i, host) in hosts.iter().enumerate() {
            assert_eq!(*host, ['a', 'b', 'c'][i % 3]);
        }
    }

    #[test]
    fn test_cache_key_depends_on_template() {
        let osm = UrlTemplate::parse("https://tile.test/{z}/{x}/{y}.jpg");
        let tms = UrlTemplate::parse("https://tile.test/{z}/{x}/{-y}.jpg");

        assert_eq!(osm.cache_key(), UrlTemplate::parse(osm.as_str()).cache_key());
        assert_ne!(osm.cache_key(), tms.cache_key());
        assert!(osm.cache_key().starts_with("xyz-"));
        assert_eq!(osm.cache_key().len(), 16);
    }

    #[test]
    fn test_legacy_cache_files_not_served_to_templates() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(RoutingHttpClient::new(Ok(solid_png(256, 256, [1, 2, 3]))));
        let mut h = handler("https://t/{z}/{x}/{y}.jpg", 17, client.clone(), &temp);
        h.config.layer = "ORTHOIMAGERY.ORTHOPHOTOS".to_string();
        h.discover().unwrap();

        let geometry = h.compute_geometry(&GroundCell::new(650, 6860), 70.0).unwrap();
        let range = geometry.tiles.unwrap();
        for (x, y) in range.iter() {
            let legacy = temp.path().join(format!("orig-17-{}-{}.jpg", x, y));
            std::fs::write(legacy, b"ign").unwrap();
        }

        let raster = h.fetch_raster(&geometry).unwrap();

        assert!(raster.warnings.is_empty());
        assert_eq!(client.request_count(), range.len());
        assert_eq!(raster.image.get_pixel(0, 0).0, [1, 2, 3]);
        let first_legacy = format!("orig-17-{}-{}.jpg", range.x_start, range.y_start);
        assert!(temp.path().join(first_legacy).exists());
    }

    #[test]
    fn test_templates_sharing_a_layer_keep_separate_tiles() {
        let temp = TempDir::new().unwrap();
        let first_client = Arc::new(RoutingHttpClient::new(Ok(solid_png(256, 256, [1, 1, 1]))));
        let second_client = Arc::new(RoutingHttpClient::new(Ok(solid_png(256, 256, [2, 2, 2]))));
        let first = handler("https://a.test/{z}/{x}/{y}.png", 17, first_client, &temp);
        let second = handler("https://b.test/{z}/{x}/{y}.png", 17, second_client.clone(), &temp);
        first.discover().unwrap();
        second.discover().unwrap();

        let cell = GroundCell::new(650, 6860);
        first.fetch_raster(&first.compute_geometry(&cell, 0.0).unwrap()).unwrap();
        let geometry = second.compute_geometry(&cell, 0.0).unwrap();
        let raster = second.fetch_raster(&geometry).unwrap();

        assert_eq!(second_client.request_count(), geometry.tiles.unwrap().len());
        assert_eq!(raster.image.get_pixel(0, 0).0, [2, 2, 2]);
    }

    #[test]
    fn test_oversized_geometry_is_invalid_coordinate() {
        let temp = TempDir::new().unwrap();
        let h = handler("{z}/{x}/{y}.png", 30, Arc::new(ColorTileClient::new(256)), &temp);
        h.discover().unwrap();

        let result = h.compute_geometry(&GroundCell::new(650, 6860), 1_000_000.0);

        assert!(matches!(result, Err(ProviderError::InvalidCoordinate(_))));
    }

    #[test]
    fn test_test_mode_palette() {
        let temp = TempDir::new().unwrap();
        let h = handler("{z}/{x}/{y}.png", 17, Arc::new(ColorTileClient::new(256)), &temp);
        h.discover().unwrap();

        let geometry = h.compute_geometry(&GroundCell::new(650, 6860), 0.0).unwrap();
        let raster = h.fetch_raster(&geometry).unwrap();

        assert!(raster.warnings.is_empty());
        assert_eq!(raster.image.get_pixel(0, 0).0, TEST_COLORS[0]);
        assert_eq!(raster.image.get_pixel(256, 0).0, TEST_COLORS[1]);
    }
}
