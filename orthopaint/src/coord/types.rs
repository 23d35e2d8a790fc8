//! Coordinate types and constants

use thiserror::Error;

use crate::crs::CrsError;

/// Half extent of the Web Mercator square, in meters.
pub const WEB_MERCATOR_HALF_EXTENT: f64 = 20_037_508.342_789_244;

/// Scale denominator of the Web Mercator zoom 0 tile matrix.
pub const WEB_MERCATOR_ZOOM0_SCALE: f64 = 559_082_264.028_717_9;

/// OGC standardized rendering pixel size, in meters.
pub const STANDARD_PIXEL_SIZE_M: f64 = 0.00028;

/// Meters per degree along the equator of the WMTS well-known scale sets
/// (`2π × 6378137 / 360`).
pub const METERS_PER_DEGREE: f64 = 111_319.490_793_273_58;

/// Default tile edge, in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Edge of a ground cell, in meters.
pub const CELL_SIZE_M: f64 = 1000.0;

/// Highest supported zoom level for synthetic Web Mercator grids.
pub const MAX_ZOOM: u8 = 30;

/// Errors that can occur during coordinate conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Input or computed coordinate is not usable (non-finite, negative margin, ...)
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// The reference system pair cannot be transformed
    #[error("Reference system error: {0}")]
    Crs(CrsError),
}

impl From<CrsError> for CoordError {
    fn from(e: CrsError) -> Self {
        match e {
            CrsError::InvalidCoordinate { .. } => CoordError::InvalidCoordinate(e.to_string()),
            other => CoordError::Crs(other),
        }
    }
}

/// Affine tile grid for one (layer, zoom) pair.
///
/// `meters_per_pixel` is in the units of the grid's CRS: meters for
/// projected systems, degrees for geographic ones.
///
/// Fields are private: a resolved grid is never mutated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomConfig {
    origin_x: f64,
    origin_y: f64,
    meters_per_pixel: f64,
    tile_width_px: u32,
    tile_height_px: u32,
}

impl ZoomConfig {
    /// Create a grid from an explicit resolution.
    ///
    /// The origin is the top-left corner of tile (0, 0) in the grid's CRS.
    pub fn new(
        origin_x: f64,
        origin_y: f64,
        meters_per_pixel: f64,
        tile_width_px: u32,
        tile_height_px: u32,
    ) -> Result<Self, CoordError> {
        if !origin_x.is_finite() || !origin_y.is_finite() {
            return Err(CoordError::InvalidCoordinate(format!(
                "grid origin ({}, {}) is not finite",
                origin_x, origin_y
            )));
        }
        if !meters_per_pixel.is_finite() || meters_per_pixel <= 0.0 {
            return Err(CoordError::InvalidCoordinate(format!(
                "resolution {} must be a positive number",
                meters_per_pixel
            )));
        }
        if tile_width_px == 0 || tile_height_px == 0 {
            return Err(CoordError::InvalidCoordinate(format!(
                "tile size {}x{} must be non-zero",
                tile_width_px, tile_height_px
            )));
        }

        Ok(Self {
            origin_x,
            origin_y,
            meters_per_pixel,
            tile_width_px,
            tile_height_px,
        })
    }

    /// Create a grid from a WMTS scale denominator.
    pub fn from_scale_denominator(
        origin_x: f64,
        origin_y: f64,
        scale_denominator: f64,
        tile_width_px: u32,
        tile_height_px: u32,
    ) -> Result<Self, CoordError> {
        Self::new(
            origin_x,
            origin_y,
            scale_denominator * STANDARD_PIXEL_SIZE_M,
            tile_width_px,
            tile_height_px,
        )
    }

    /// Create a grid from a WMTS scale denominator in a geographic CRS.
    ///
    /// The OGC pixel size is a ground distance; dividing by
    /// [`METERS_PER_DEGREE`] expresses the resolution in degrees, the unit of
    /// the grid's CRS.
    pub fn from_scale_denominator_degrees(
        origin_x: f64,
        origin_y: f64,
        scale_denominator: f64,
        tile_width_px: u32,
        tile_height_px: u32,
    ) -> Result<Self, CoordError> {
        Self::new(
            origin_x,
            origin_y,
            scale_denominator * STANDARD_PIXEL_SIZE_M / METERS_PER_DEGREE,
            tile_width_px,
            tile_height_px,
        )
    }

    /// The well-known Web Mercator (`PM`, `GoogleMapsCompatible`) grid.
    ///
    /// Zoom is clamped to [`MAX_ZOOM`].
    pub fn web_mercator(zoom: u8) -> Self {
        let zoom = zoom.min(MAX_ZOOM);
        let scale = WEB_MERCATOR_ZOOM0_SCALE / 2.0_f64.powi(zoom as i32);
        Self {
            origin_x: -WEB_MERCATOR_HALF_EXTENT,
            origin_y: WEB_MERCATOR_HALF_EXTENT,
            meters_per_pixel: scale * STANDARD_PIXEL_SIZE_M,
            tile_width_px: DEFAULT_TILE_SIZE,
            tile_height_px: DEFAULT_TILE_SIZE,
        }
    }

    pub fn origin_x(&self) -> f64 {
        self.origin_x
    }

    pub fn origin_y(&self) -> f64 {
        self.origin_y
    }

    pub fn meters_per_pixel(&self) -> f64 {
        self.meters_per_pixel
    }

    pub fn tile_width_px(&self) -> u32 {
        self.tile_width_px
    }

    pub fn tile_height_px(&self) -> u32 {
        self.tile_height_px
    }

    /// Ground width of one tile in CRS units.
    pub fn tile_span_x(&self) -> f64 {
        self.tile_width_px as f64 * self.meters_per_pixel
    }

    /// Ground height of one tile in CRS units.
    pub fn tile_span_y(&self) -> f64 {
        self.tile_height_px as f64 * self.meters_per_pixel
    }
}

/// A 1 km × 1 km ground cell, addressed by its northwest corner in kilometers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroundCell {
    pub x_km: i64,
    pub y_km: i64,
}

impl GroundCell {
    pub fn new(x_km: i64, y_km: i64) -> Self {
        Self { x_km, y_km }
    }

    /// Cell extent grown by `margin_m` on all four sides.
    ///
    /// The cell spans `[x, x + 1 km]` eastward and `[y - 1 km, y]` southward
    /// of its northwest corner.
    pub fn bounds(&self, margin_m: f64) -> Result<GeoBounds, CoordError> {
        if !margin_m.is_finite() || margin_m < 0.0 {
            return Err(CoordError::InvalidCoordinate(format!(
                "margin {} must be a non-negative number",
                margin_m
            )));
        }

        let west = self.x_km as f64 * CELL_SIZE_M;
        let north = self.y_km as f64 * CELL_SIZE_M;

        GeoBounds::new(
            west - margin_m,
            north - CELL_SIZE_M - margin_m,
            west + CELL_SIZE_M + margin_m,
            north + margin_m,
        )
    }
}

impl std::fmt::Display for GroundCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}_{:04}", self.x_km, self.y_km)
    }
}

/// Axis-aligned box in a single CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl GeoBounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self, CoordError> {
        if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
            return Err(CoordError::InvalidCoordinate(format!(
                "bounds ({}, {}, {}, {}) are not finite",
                min_x, min_y, max_x, max_y
            )));
        }
        if min_x > max_x || min_y > max_y {
            return Err(CoordError::InvalidCoordinate(format!(
                "bounds ({}, {}, {}, {}) are inverted",
                min_x, min_y, max_x, max_y
            )));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Smallest box containing every point. `None` for an empty iterator.
    pub fn enclosing<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        points.into_iter().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => Self {
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                },
                Some(b) => Self {
                    min_x: b.min_x.min(x),
                    min_y: b.min_y.min(y),
                    max_x: b.max_x.max(x),
                    max_y: b.max_y.max(y),
                },
            })
        })
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Upper-left corner (min x, max y).
    pub fn upper_left(&self) -> (f64, f64) {
        (self.min_x, self.max_y)
    }

    /// Lower-right corner (max x, min y).
    pub fn lower_right(&self) -> (f64, f64) {
        (self.max_x, self.min_y)
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Points along the perimeter: the four corners plus `per_edge` evenly
    /// spaced interior points on each edge.
    ///
    /// Reprojected boxes are not rectangles, so sampling the edges keeps the
    /// enclosing box from clipping a bulging side.
    pub fn perimeter_points(&self, per_edge: usize) -> Vec<(f64, f64)> {
        let steps = per_edge + 1;
        let mut points = Vec::with_capacity(4 * steps);

        for i in 0..steps {
            let t = i as f64 / steps as f64;
            let x = self.min_x + t * self.width();
            let y = self.min_y + t * self.height();
            points.push((x, self.max_y));
            points.push((self.max_x - t * self.width(), self.min_y));
            points.push((self.min_x, y));
            points.push((self.max_x, self.max_y - t * self.height()));
        }
        points
    }
}

/// A position in fractional tile space plus the native CRS point it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePoint {
    pub tile_x: f64,
    pub tile_y: f64,
    pub native_x: f64,
    pub native_y: f64,
}

/// Half-open integer tile range `[x_start, x_end) × [y_start, y_end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRange {
    pub x_start: i64,
    pub x_end: i64,
    pub y_start: i64,
    pub y_end: i64,
}

impl TileRange {
    /// Integer range covering a fractional tile box: floor the start, ceil
    /// the end, and always keep at least one tile per axis.
    pub fn covering(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self, CoordError> {
        if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
            return Err(CoordError::InvalidCoordinate(format!(
                "tile box ({}, {}, {}, {}) is not finite",
                min_x, min_y, max_x, max_y
            )));
        }

        let x_start = min_x.floor() as i64;
        let y_start = min_y.floor() as i64;
        let x_end = (max_x.ceil() as i64).max(x_start.saturating_add(1));
        let y_end = (max_y.ceil() as i64).max(y_start.saturating_add(1));

        Ok(Self {
            x_start,
            x_end,
            y_start,
            y_end,
        })
    }

    /// Number of columns, saturating at `u32::MAX`.
    pub fn columns(&self) -> u32 {
        span(self.x_start, self.x_end).unwrap_or(u32::MAX)
    }

    /// Number of rows, saturating at `u32::MAX`.
    pub fn rows(&self) -> u32 {
        span(self.y_start, self.y_end).unwrap_or(u32::MAX)
    }

    pub fn len(&self) -> usize {
        (self.columns() as usize).saturating_mul(self.rows() as usize)
    }

    /// Pixel size of the raster covering the range with tiles of
    /// `tile_width` × `tile_height` pixels.
    pub fn pixel_size(&self, tile_width: u32, tile_height: u32) -> Result<(u32, u32), CoordError> {
        let too_large = || {
            CoordError::InvalidCoordinate(format!(
                "tile range {}..{} x {}..{} is too large for one raster",
                self.x_start, self.x_end, self.y_start, self.y_end
            ))
        };
        let width = span(self.x_start, self.x_end)
            .and_then(|c| c.checked_mul(tile_width))
            .ok_or_else(too_large)?;
        let height = span(self.y_start, self.y_end)
            .and_then(|r| r.checked_mul(tile_height))
            .ok_or_else(too_large)?;
        Ok((width, height))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate tiles in row-major order.
    pub fn iter(&self) -> TileRangeIter {
        TileRangeIter {
            range: *self,
            x: self.x_start,
            y: self.y_start,
        }
    }
}

/// Length of `[start, end)`; `None` when it does not fit a `u32`.
fn span(start: i64, end: i64) -> Option<u32> {
    let len = end.checked_sub(start)?.max(0);
    u32::try_from(len).ok()
}

/// Row-major iterator over the tiles of a [`TileRange`], yielding `(x, y)`.
#[derive(Debug, Clone)]
pub struct TileRangeIter {
    range: TileRange,
    x: i64,
    y: i64,
}

impl Iterator for TileRangeIter {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.y >= self.range.y_end || self.range.x_start >= self.range.x_end {
            return None;
        }

        let item = (self.x, self.y);
        self.x += 1;
        if self.x >= self.range.x_end {
            self.x = self.range.x_start;
            self.y += 1;
        }
        Some(item)
    }
}

impl IntoIterator for &TileRange {
    type Item = (i64, i64);
    type IntoIter = TileRangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
