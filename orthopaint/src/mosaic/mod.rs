//! Mosaic assembly for one ground cell.
//!
//! The assembler asks the protocol handler for request geometry, fetches the
//! raster, and pairs the pixels with the corner coordinates downstream
//! georeferencing needs. Pixels are never reprojected here; the mosaic stays
//! in the protocol's native CRS.

use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, warn};

use crate::coord::{GeoBounds, GroundCell};
use crate::crs::CrsId;
use crate::provider::{ProtocolHandler, ProviderError, TileWarning};

/// Stitched raster with its georeferencing.
#[derive(Debug, Clone)]
pub struct Mosaic {
    pub image: RgbImage,
    /// Outer edges of the raster in `crs`
    pub bounds: GeoBounds,
    pub crs: CrsId,
    /// Tiles replaced by the placeholder color
    pub warnings: Vec<TileWarning>,
}

impl Mosaic {
    /// Upper-left and lower-right corners, in `gdal_translate -a_ullr` order.
    pub fn ullr(&self) -> [f64; 4] {
        let (ulx, uly) = self.bounds.upper_left();
        let (lrx, lry) = self.bounds.lower_right();
        [ulx, uly, lrx, lry]
    }

    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Drives one ground cell through a protocol handler.
pub struct MosaicAssembler {
    handler: Arc<dyn ProtocolHandler>,
}

impl MosaicAssembler {
    pub fn new(handler: Arc<dyn ProtocolHandler>) -> Self {
        Self { handler }
    }

    /// Build the mosaic covering `cell` grown by `margin_m` on every side.
    pub fn assemble(&self, cell: &GroundCell, margin_m: f64) -> Result<Mosaic, ProviderError> {
        let geometry = self.handler.compute_geometry(cell, margin_m)?;
        debug!(
            cell = %cell,
            provider = self.handler.name(),
            width = geometry.pixel_width,
            height = geometry.pixel_height,
            "Computed request geometry"
        );

        let raster = self.handler.fetch_raster(&geometry)?;
        let (width, height) = raster.image.dimensions();
        if (width, height) != (geometry.pixel_width, geometry.pixel_height) {
            return Err(ProviderError::Image(format!(
                "raster is {}x{}, geometry expects {}x{}",
                width, height, geometry.pixel_width, geometry.pixel_height
            )));
        }

        if !raster.warnings.is_empty() {
            warn!(
                cell = %cell,
                placeholders = raster.warnings.len(),
                "Mosaic contains placeholder tiles"
            );
        }

        Ok(Mosaic {
            image: raster.image,
            bounds: geometry.bounds,
            crs: geometry.crs,
            warnings: raster.warnings,
        })
    }
}
