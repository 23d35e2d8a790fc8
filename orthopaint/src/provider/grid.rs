//! Tile-by-tile raster assembly shared by the grid protocols.

use std::sync::Arc;
use std::thread;

use image::{imageops, Rgb, RgbImage};
use tracing::{debug, warn};

use super::http::HttpClient;
use super::types::{FetchSettings, ProviderError, Raster, TileWarning};
use crate::cache::{ImageFormat, TileAddress, TileCache};
use crate::coord::TileRange;
use crate::crs::CrsTransform;

/// Collaborators every handler is built from.
#[derive(Clone)]
pub struct HandlerContext {
    pub client: Arc<dyn HttpClient>,
    pub cache: Arc<TileCache>,
    pub transform: Arc<dyn CrsTransform>,
    pub settings: FetchSettings,
}

/// Fixed description of the tiles being fetched.
pub(crate) struct GridRequest<'a> {
    pub layer: &'a str,
    /// Cache qualifier: matrix set or template key
    pub tile_set: &'a str,
    pub zoom: u8,
    pub format: ImageFormat,
    pub tile_width: u32,
    pub tile_height: u32,
}

/// Fetch every tile of `range` in row-major order and paste it into one
/// canvas.
///
/// Each tile is served from the cache when present, otherwise fetched from
/// `url_for(x, y)` and written through, followed by the configured delay.
/// A tile that cannot be fetched or decoded is painted with the placeholder
/// color and reported as a [`TileWarning`]; it never aborts the raster.
pub(crate) fn fetch_grid<F>(
    ctx: &HandlerContext,
    request: &GridRequest<'_>,
    range: &TileRange,
    url_for: F,
) -> Result<Raster, ProviderError>
where
    F: Fn(i64, i64) -> String,
{
    let (width, height) = range.pixel_size(request.tile_width, request.tile_height)?;

    let mut canvas = RgbImage::new(width, height);
    let mut warnings = Vec::new();

    for (x, y) in range.iter() {
        let addr = TileAddress::new(
            request.layer,
            request.tile_set,
            request.zoom,
            x,
            y,
            request.format,
        );
        let offset_x = (x - range.x_start) * request.tile_width as i64;
        let offset_y = (y - range.y_start) * request.tile_height as i64;

        match fetch_tile(ctx, &addr, &url_for) {
            Ok(tile) => imageops::replace(&mut canvas, &tile, offset_x, offset_y),
            Err(e) => {
                warn!(tile = %addr, error = %e, "Tile unavailable, using placeholder");
                let placeholder = RgbImage::from_pixel(
                    request.tile_width,
                    request.tile_height,
                    Rgb(ctx.settings.placeholder),
                );
                imageops::replace(&mut canvas, &placeholder, offset_x, offset_y);
                warnings.push(TileWarning {
                    tile_x: x,
                    tile_y: y,
                    reason: e.to_string(),
                });
            }
        }
    }

    debug!(
        layer = request.layer,
        tiles = range.len(),
        failed = warnings.len(),
        width,
        height,
        "Assembled tile grid"
    );

    Ok(Raster {
        image: canvas,
        warnings,
    })
}

fn fetch_tile<F>(
    ctx: &HandlerContext,
    addr: &TileAddress,
    url_for: &F,
) -> Result<RgbImage, ProviderError>
where
    F: Fn(i64, i64) -> String,
{
    let outcome = ctx.cache.get_or_fetch(addr, || {
        let url = url_for(addr.tile_x, addr.tile_y);
        debug!(url = %url, "Fetching tile");
        let result = ctx.client.get(&url);
        if !ctx.settings.request_delay.is_zero() {
            thread::sleep(ctx.settings.request_delay);
        }
        result
    });

    let bytes = outcome.map_err(|e| ProviderError::TileFetchFailed {
        tile: addr.to_string(),
        reason: e.to_string(),
    })?;

    image::load_from_memory(bytes.bytes())
        .map(|img| img.to_rgb8())
        .map_err(|e| ProviderError::TileFetchFailed {
            tile: addr.to_string(),
            reason: format!("undecodable image: {}", e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::BuiltinTransform;
    use crate::provider::http::tests::{solid_png, RoutingHttpClient};
    use std::time::Duration;
    use tempfile::TempDir;

    fn context(client: Arc<dyn HttpClient>, cache_dir: &std::path::Path) -> HandlerContext {
        HandlerContext {
            client,
            cache: Arc::new(TileCache::new(cache_dir)),
            transform: Arc::new(BuiltinTransform::new()),
            settings: FetchSettings {
                request_delay: Duration::ZERO,
                ..Default::default()
            },
        }
    }

    fn request() -> GridRequest<'static> {
        GridRequest {
            layer: "L",
            tile_set: "S",
            zoom: 5,
            format: ImageFormat::Png,
            tile_width: 4,
            tile_height: 4,
        }
    }

    fn range() -> TileRange {
        TileRange {
            x_start: 10,
            x_end: 12,
            y_start: 20,
            y_end: 22,
        }
    }

    #[test]
    fn test_tiles_pasted_at_offsets() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(
            RoutingHttpClient::new(Ok(solid_png(4, 4, [1, 1, 1])))
                .route("/11/21", Ok(solid_png(4, 4, [9, 9, 9]))),
        );
        let ctx = context(client.clone(), temp.path());

        let raster = fetch_grid(&ctx, &request(), &range(), |x, y| {
            format!("http://t/{}/{}", x, y)
        })
        .unwrap();

        assert_eq!(raster.image.dimensions(), (8, 8));
        assert_eq!(raster.image.get_pixel(0, 0).0, [1, 1, 1]);
        assert_eq!(raster.image.get_pixel(5, 5).0, [9, 9, 9]);
        assert!(raster.warnings.is_empty());
        assert_eq!(
            client.requests(),
            vec!["http://t/10/20", "http://t/11/20", "http://t/10/21", "http://t/11/21"]
        );
    }

    #[test]
    fn test_failed_tile_becomes_placeholder() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(
            RoutingHttpClient::new(Ok(solid_png(4, 4, [0, 0, 200]))).route(
                "/10/21",
                Err(ProviderError::HttpStatus {
                    status: 404,
                    url: "http://t/10/21".to_string(),
                }),
            ),
        );
        let ctx = context(client, temp.path());

        let raster = fetch_grid(&ctx, &request(), &range(), |x, y| {
            format!("http://t/{}/{}", x, y)
        })
        .unwrap();

        assert_eq!(raster.image.dimensions(), (8, 8));
        assert_eq!(raster.image.get_pixel(1, 6).0, [250, 0, 0]);
        assert_eq!(raster.image.get_pixel(6, 6).0, [0, 0, 200]);
        assert_eq!(raster.warnings.len(), 1);
        assert_eq!((raster.warnings[0].tile_x, raster.warnings[0].tile_y), (10, 21));
    }

    #[test]
    fn test_undecodable_tile_becomes_placeholder() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(RoutingHttpClient::new(Ok(b"<ServiceException/>".to_vec())));
        let ctx = context(client, temp.path());

        let raster = fetch_grid(&ctx, &request(), &range(), |x, y| {
            format!("http://t/{}/{}", x, y)
        })
        .unwrap();

        assert_eq!(raster.warnings.len(), 4);
        assert_eq!(raster.image.get_pixel(7, 7).0, [250, 0, 0]);
    }

    #[test]
    fn test_second_pass_served_from_cache() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(RoutingHttpClient::new(Ok(solid_png(4, 4, [3, 3, 3]))));
        let ctx = context(client.clone(), temp.path());
        let url = |x: i64, y: i64| format!("http://t/{}/{}", x, y);

        let first = fetch_grid(&ctx, &request(), &range(), url).unwrap();
        let second = fetch_grid(&ctx, &request(), &range(), url).unwrap();

        assert_eq!(client.request_count(), 4);
        assert_eq!(first.image, second.image);
    }

    #[test]
    fn test_tile_sets_do_not_share_cache() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(RoutingHttpClient::new(Ok(solid_png(4, 4, [3, 3, 3]))));
        let ctx = context(client.clone(), temp.path());
        let url = |x: i64, y: i64| format!("http://t/{}/{}", x, y);
        let other = GridRequest {
            tile_set: "T",
            ..request()
        };

        fetch_grid(&ctx, &request(), &range(), url).unwrap();
        fetch_grid(&ctx, &other, &range(), url).unwrap();

        assert_eq!(client.request_count(), 8);
    }

    #[test]
    fn test_oversized_range_rejected_before_fetch() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(RoutingHttpClient::new(Ok(solid_png(4, 4, [3, 3, 3]))));
        let ctx = context(client.clone(), temp.path());
        let huge = TileRange {
            x_start: 0,
            x_end: 2_000_000_000,
            y_start: 0,
            y_end: 1,
        };

        let result = fetch_grid(&ctx, &request(), &huge, |x, y| format!("http://t/{}/{}", x, y));

        assert!(matches!(result, Err(ProviderError::InvalidCoordinate(_))));
        assert_eq!(client.request_count(), 0);
    }
}
