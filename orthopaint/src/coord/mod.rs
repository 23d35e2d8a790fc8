//! Coordinate conversion module
//!
//! Maps positions between a projected CRS and the fractional tile space of a
//! [`ZoomConfig`] grid. Tile space has its origin at the grid's top-left
//! corner: `tile_x` grows eastward while `tile_y` grows *southward*, so the y
//! axis is inverted relative to projected northing.
//!
//! Changes of reference system are delegated to a [`CrsTransform`]; the
//! affine grid math itself never reprojects.

mod types;

pub use types::{
    CoordError, GeoBounds, GroundCell, TilePoint, TileRange, TileRangeIter, ZoomConfig,
    CELL_SIZE_M, DEFAULT_TILE_SIZE, MAX_ZOOM, METERS_PER_DEGREE, STANDARD_PIXEL_SIZE_M,
    WEB_MERCATOR_HALF_EXTENT, WEB_MERCATOR_ZOOM0_SCALE,
};

use std::sync::Arc;

use crate::crs::{CrsId, CrsTransform};

/// Interior points sampled on each edge of a reprojected box.
pub const EDGE_SAMPLES: usize = 8;

/// Tile grid bound to its native CRS and a transform for foreign inputs.
#[derive(Clone)]
pub struct CoordinateSpace {
    grid: ZoomConfig,
    crs: CrsId,
    transform: Arc<dyn CrsTransform>,
}

impl std::fmt::Debug for CoordinateSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateSpace")
            .field("grid", &self.grid)
            .field("crs", &self.crs)
            .finish()
    }
}

impl CoordinateSpace {
    pub fn new(grid: ZoomConfig, crs: CrsId, transform: Arc<dyn CrsTransform>) -> Self {
        Self {
            grid,
            crs,
            transform,
        }
    }

    pub fn grid(&self) -> &ZoomConfig {
        &self.grid
    }

    /// The grid's native CRS.
    pub fn crs(&self) -> &CrsId {
        &self.crs
    }

    /// Reproject a point from `from` into the grid's native CRS.
    pub fn to_native(&self, from: &CrsId, x: f64, y: f64) -> Result<(f64, f64), CoordError> {
        check_finite(x, y)?;
        let (nx, ny) = self.transform.transform(from, &self.crs, x, y)?;
        check_finite(nx, ny)?;
        Ok((nx, ny))
    }

    /// Convert a point expressed in `from` to fractional tile coordinates.
    pub fn to_tile(&self, from: &CrsId, x: f64, y: f64) -> Result<TilePoint, CoordError> {
        let (native_x, native_y) = self.to_native(from, x, y)?;

        let tile_x = (native_x - self.grid.origin_x()) / self.grid.tile_span_x();
        let tile_y = (self.grid.origin_y() - native_y) / self.grid.tile_span_y();
        check_finite(tile_x, tile_y)?;

        Ok(TilePoint {
            tile_x,
            tile_y,
            native_x,
            native_y,
        })
    }

    /// Native CRS position of a (possibly fractional) tile corner.
    ///
    /// Exact inverse of the affine part of [`Self::to_tile`]; never reprojects.
    pub fn tile_to_geo(&self, tile_x: f64, tile_y: f64) -> Result<(f64, f64), CoordError> {
        check_finite(tile_x, tile_y)?;

        let x = self.grid.origin_x() + tile_x * self.grid.tile_span_x();
        let y = self.grid.origin_y() - tile_y * self.grid.tile_span_y();
        check_finite(x, y)?;
        Ok((x, y))
    }

    /// Tile corner expressed in another CRS.
    pub fn tile_to_crs(
        &self,
        tile_x: f64,
        tile_y: f64,
        to: &CrsId,
    ) -> Result<(f64, f64), CoordError> {
        let (x, y) = self.tile_to_geo(tile_x, tile_y)?;
        let (tx, ty) = self.transform.transform(&self.crs, to, x, y)?;
        check_finite(tx, ty)?;
        Ok((tx, ty))
    }

    /// Enclosing box, in the native CRS, of `bounds` expressed in `from`.
    ///
    /// Corners and [`EDGE_SAMPLES`] points per edge are reprojected.
    pub fn native_bounds(&self, bounds: &GeoBounds, from: &CrsId) -> Result<GeoBounds, CoordError> {
        reproject_bounds(self.transform.as_ref(), bounds, from, &self.crs)
    }

    /// Smallest integer tile range that fully covers `bounds` (over-cover).
    pub fn covering_range(&self, bounds: &GeoBounds, from: &CrsId) -> Result<TileRange, CoordError> {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for (x, y) in bounds.perimeter_points(EDGE_SAMPLES) {
            let p = self.to_tile(from, x, y)?;
            min_x = min_x.min(p.tile_x);
            min_y = min_y.min(p.tile_y);
            max_x = max_x.max(p.tile_x);
            max_y = max_y.max(p.tile_y);
        }

        TileRange::covering(min_x, min_y, max_x, max_y)
    }

    /// Native CRS box of an integer tile range.
    pub fn range_bounds(&self, range: &TileRange) -> Result<GeoBounds, CoordError> {
        let (min_x, max_y) = self.tile_to_geo(range.x_start as f64, range.y_start as f64)?;
        let (max_x, min_y) = self.tile_to_geo(range.x_end as f64, range.y_end as f64)?;
        GeoBounds::new(min_x, min_y, max_x, max_y)
    }
}

/// Enclosing box in `to` of `bounds` expressed in `from`.
///
/// Corners and [`EDGE_SAMPLES`] points per edge are reprojected.
pub fn reproject_bounds(
    transform: &dyn CrsTransform,
    bounds: &GeoBounds,
    from: &CrsId,
    to: &CrsId,
) -> Result<GeoBounds, CoordError> {
    let points = bounds
        .perimeter_points(EDGE_SAMPLES)
        .into_iter()
        .map(|(x, y)| -> Result<(f64, f64), CoordError> {
            let (tx, ty) = transform.transform(from, to, x, y)?;
            check_finite(tx, ty)?;
            Ok((tx, ty))
        })
        .collect::<Result<Vec<_>, _>>()?;

    GeoBounds::enclosing(points)
        .ok_or_else(|| CoordError::InvalidCoordinate("empty bounds".to_string()))
}

fn check_finite(x: f64, y: f64) -> Result<(), CoordError> {
    if x.is_finite() && y.is_finite() {
        Ok(())
    } else {
        Err(CoordError::InvalidCoordinate(format!(
            "({}, {}) is outside the finite range",
            x, y
        )))
    }
}
