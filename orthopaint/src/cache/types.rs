//! Cache key types.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the tile cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem operation failed
    #[error("Cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Encoded image format of a tile payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Tiff,
    Webp,
}

impl ImageFormat {
    /// Parse a MIME type such as `image/jpeg`. Parameters after `;` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let base = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match base.as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" | "image/png8" | "image/png24" => Some(ImageFormat::Png),
            "image/tiff" | "image/geotiff" => Some(ImageFormat::Tiff),
            "image/webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    /// Guess from a file extension or URL suffix.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "tif" | "tiff" => Some(ImageFormat::Tiff),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Webp => "webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// Layer stored by the first generation of the cache.
pub const LEGACY_LAYER: &str = "ORTHOIMAGERY.ORTHOPHOTOS";

/// Tile matrix set of the first-generation cache entries.
pub const LEGACY_TILE_SET: &str = "PM";

/// Identity of one cached tile payload.
///
/// `tile_set` names the grid the tile belongs to: the WMTS tile matrix set,
/// or a key derived from the URL template. Two sources that share a layer
/// name never share cache files.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileAddress {
    pub layer: String,
    pub tile_set: String,
    pub zoom: u8,
    pub tile_x: i64,
    pub tile_y: i64,
    pub format: ImageFormat,
}

impl TileAddress {
    pub fn new(
        layer: impl Into<String>,
        tile_set: impl Into<String>,
        zoom: u8,
        tile_x: i64,
        tile_y: i64,
        format: ImageFormat,
    ) -> Self {
        Self {
            layer: layer.into(),
            tile_set: tile_set.into(),
            zoom,
            tile_x,
            tile_y,
            format,
        }
    }

    /// Address a first-generation entry maps to.
    pub fn legacy(zoom: u8, tile_x: i64, tile_y: i64) -> Self {
        Self::new(LEGACY_LAYER, LEGACY_TILE_SET, zoom, tile_x, tile_y, ImageFormat::Jpeg)
    }

    /// Deterministic cache file name: `{layer}@{tile_set}-{zoom}-{x}-{y}.{ext}`.
    ///
    /// Both names are sanitized, which never yields `@`, so the separator is
    /// unambiguous.
    pub fn file_name(&self) -> String {
        format!(
            "{}@{}-{}-{}-{}.{}",
            sanitize_layer(&self.layer),
            sanitize_layer(&self.tile_set),
            self.zoom,
            self.tile_x,
            self.tile_y,
            self.format.extension()
        )
    }

    /// File name used by the first generation of the cache, which only
    /// stored IGN orthophoto JPEG tiles of the `PM` matrix set.
    pub fn legacy_file_name(&self) -> Option<String> {
        let is_legacy_source = self.layer == LEGACY_LAYER
            && self.tile_set == LEGACY_TILE_SET
            && self.format == ImageFormat::Jpeg;
        is_legacy_source.then(|| format!("orig-{}-{}-{}.jpg", self.zoom, self.tile_x, self.tile_y))
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]@{}/{}/{}",
            self.layer, self.tile_set, self.zoom, self.tile_x, self.tile_y
        )
    }
}

/// Keep only `[A-Za-z0-9_.-]`; anything else becomes `_`.
pub fn sanitize_layer(layer: &str) -> String {
    let cleaned: String = layer
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        let addr = TileAddress::new(
            "ORTHOIMAGERY.ORTHOPHOTOS",
            "PM",
            19,
            265_519,
            180_412,
            ImageFormat::Jpeg,
        );
        assert_eq!(addr.file_name(), "ORTHOIMAGERY.ORTHOPHOTOS@PM-19-265519-180412.jpg");
    }

    #[test]
    fn test_file_name_sanitizes_layer() {
        let addr = TileAddress::new("a/b c:d", "EPSG:4326", 3, 1, 2, ImageFormat::Png);
        assert_eq!(addr.file_name(), "a_b_c_d@EPSG_4326-3-1-2.png");
    }

    #[test]
    fn test_tile_set_separates_sources() {
        let pm = TileAddress::new("ORTHO", "PM", 17, 1, 2, ImageFormat::Jpeg);
        let lamb = TileAddress::new("ORTHO", "LAMB93", 17, 1, 2, ImageFormat::Jpeg);
        assert_ne!(pm.file_name(), lamb.file_name());
    }

    #[test]
    fn test_legacy_name_only_for_ign_pm_jpeg() {
        let ign = TileAddress::legacy(19, 10, 20);
        assert_eq!(ign.legacy_file_name().as_deref(), Some("orig-19-10-20.jpg"));

        let png = TileAddress::new(LEGACY_LAYER, LEGACY_TILE_SET, 19, 10, 20, ImageFormat::Png);
        assert!(png.legacy_file_name().is_none());

        let other_set = TileAddress::new(LEGACY_LAYER, "LAMB93", 19, 10, 20, ImageFormat::Jpeg);
        assert!(other_set.legacy_file_name().is_none());

        let other_layer = TileAddress::new("osm", LEGACY_TILE_SET, 19, 10, 20, ImageFormat::Jpeg);
        assert!(other_layer.legacy_file_name().is_none());
    }

    #[test]
    fn test_format_from_mime() {
        assert_eq!(ImageFormat::from_mime("image/jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_mime("IMAGE/PNG"), Some(ImageFormat::Png));
        assert_eq!(
            ImageFormat::from_mime("image/png; mode=8bit"),
            Some(ImageFormat::Png)
        );
        assert_eq!(ImageFormat::from_mime("application/xml"), None);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ImageFormat::from_extension("JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("tif"), Some(ImageFormat::Tiff));
        assert_eq!(ImageFormat::from_extension("gif"), None);
    }
}
