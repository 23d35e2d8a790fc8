//! WMTS 1.0.0 capabilities parsing.

use std::collections::BTreeMap;

use roxmltree::{Document, Node};

use super::{child_text, children_named, LayerCapabilities, LayerInfo, DEFAULT_MAX_DIMENSION};
use crate::coord::{CoordError, ZoomConfig};
use crate::crs::CrsId;
use crate::provider::ProviderError;

/// Parsed `<Capabilities>` document.
#[derive(Debug, Clone, PartialEq)]
pub struct WmtsCapabilities {
    pub layers: Vec<WmtsLayer>,
    pub matrix_sets: BTreeMap<String, TileMatrixSet>,
}

/// One `Contents/Layer`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WmtsLayer {
    pub identifier: String,
    pub formats: Vec<String>,
    pub styles: Vec<String>,
    pub default_style: Option<String>,
    pub matrix_set_links: Vec<String>,
}

/// One `Contents/TileMatrixSet`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMatrixSet {
    pub identifier: String,
    pub crs: CrsId,
    pub matrices: Vec<TileMatrix>,
}

/// One `TileMatrix` of a matrix set.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMatrix {
    pub identifier: String,
    pub scale_denominator: f64,
    pub top_left_x: f64,
    pub top_left_y: f64,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl TileMatrix {
    /// Zoom level encoded in the identifier: `19`, or `PM:19` style.
    pub fn zoom_level(&self) -> Option<u8> {
        self.identifier.rsplit(':').next()?.parse().ok()
    }

    /// Tile grid of this matrix in the units of `crs`.
    pub fn zoom_config(&self, crs: &CrsId) -> Result<ZoomConfig, CoordError> {
        let (x, y, scale) = (self.top_left_x, self.top_left_y, self.scale_denominator);
        if crs.is_geographic() {
            ZoomConfig::from_scale_denominator_degrees(x, y, scale, self.tile_width, self.tile_height)
        } else {
            ZoomConfig::from_scale_denominator(x, y, scale, self.tile_width, self.tile_height)
        }
    }
}

impl TileMatrixSet {
    /// Matrix for `zoom`: exact identifier match first, then the segment
    /// after the last `:`.
    pub fn matrix_for_zoom(&self, zoom: u8) -> Option<&TileMatrix> {
        let wanted = zoom.to_string();
        self.matrices
            .iter()
            .find(|m| m.identifier == wanted)
            .or_else(|| self.matrices.iter().find(|m| m.zoom_level() == Some(zoom)))
    }
}

impl WmtsCapabilities {
    pub fn layer(&self, identifier: &str) -> Option<&WmtsLayer> {
        self.layers.iter().find(|l| l.identifier == identifier)
    }

    /// Flatten into [`LayerCapabilities`], attaching to each layer the
    /// `preferred_set` when linked, else its first linked matrix set.
    pub fn to_layer_capabilities(&self, preferred_set: &str) -> LayerCapabilities {
        let mut layers = BTreeMap::new();

        for layer in &self.layers {
            let set = layer
                .matrix_set_links
                .iter()
                .find(|s| s.as_str() == preferred_set)
                .or_else(|| layer.matrix_set_links.first())
                .and_then(|id| self.matrix_sets.get(id));

            let mut info = LayerInfo {
                name: layer.identifier.clone(),
                formats: layer.formats.clone(),
                style: layer
                    .default_style
                    .clone()
                    .or_else(|| layer.styles.first().cloned()),
                ..Default::default()
            };

            if let Some(set) = set {
                info.matrix_set = Some(set.identifier.clone());
                info.crs = vec![set.crs.clone()];
                for matrix in &set.matrices {
                    if let (Some(zoom), Ok(grid)) = (matrix.zoom_level(), matrix.zoom_config(&set.crs)) {
                        info.zooms.insert(zoom, grid);
                    }
                }
                info.min_scale = set
                    .matrices
                    .iter()
                    .map(|m| m.scale_denominator)
                    .reduce(f64::min);
                info.max_scale = set
                    .matrices
                    .iter()
                    .map(|m| m.scale_denominator)
                    .reduce(f64::max);
            }

            layers.insert(layer.identifier.clone(), info);
        }

        LayerCapabilities {
            layers,
            max_width: DEFAULT_MAX_DIMENSION,
            max_height: DEFAULT_MAX_DIMENSION,
            tree: None,
        }
    }
}

/// Parse a WMTS capabilities document.
pub fn parse(xml: &str) -> Result<WmtsCapabilities, ProviderError> {
    let doc = Document::parse(xml).map_err(|e| {
        ProviderError::DiscoveryUnavailable(format!("invalid WMTS capabilities XML: {}", e))
    })?;

    let contents = doc
        .root_element()
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "Contents")
        .ok_or_else(|| {
            ProviderError::DiscoveryUnavailable(
                "WMTS capabilities missing Contents element".to_string(),
            )
        })?;

    let layers = children_named(contents, "Layer").map(parse_layer).collect();

    let mut matrix_sets = BTreeMap::new();
    for node in children_named(contents, "TileMatrixSet") {
        let set = parse_matrix_set(node)?;
        matrix_sets.insert(set.identifier.clone(), set);
    }

    Ok(WmtsCapabilities {
        layers,
        matrix_sets,
    })
}

fn parse_layer(node: Node<'_, '_>) -> WmtsLayer {
    let mut layer = WmtsLayer {
        identifier: child_text(node, "Identifier").unwrap_or_default().to_string(),
        ..Default::default()
    };

    for child in node.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "Format" => {
                if let Some(text) = child.text() {
                    layer.formats.push(text.trim().to_string());
                }
            }
            "Style" => {
                if let Some(id) = child_text(child, "Identifier") {
                    if child.attribute("isDefault") == Some("true") {
                        layer.default_style = Some(id.to_string());
                    }
                    layer.styles.push(id.to_string());
                }
            }
            "TileMatrixSetLink" => {
                if let Some(id) = child_text(child, "TileMatrixSet") {
                    layer.matrix_set_links.push(id.to_string());
                }
            }
            _ => {}
        }
    }
    layer
}

fn parse_matrix_set(node: Node<'_, '_>) -> Result<TileMatrixSet, ProviderError> {
    let identifier = required(node, "Identifier", "TileMatrixSet")?.to_string();
    let crs = CrsId::new(required(node, "SupportedCRS", &identifier)?);

    let matrices = children_named(node, "TileMatrix")
        .map(|m| parse_matrix(m, &crs))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TileMatrixSet {
        identifier,
        crs,
        matrices,
    })
}

fn parse_matrix(node: Node<'_, '_>, crs: &CrsId) -> Result<TileMatrix, ProviderError> {
    let identifier = required(node, "Identifier", "TileMatrix")?.to_string();
    let context = format!("TileMatrix {}", identifier);

    let scale_denominator = parse_number(required(node, "ScaleDenominator", &context)?, &context)?;
    let (first, second) = parse_corner(required(node, "TopLeftCorner", &context)?, &context)?;
    let tile_width = parse_number(required(node, "TileWidth", &context)?, &context)?;
    let tile_height = parse_number(required(node, "TileHeight", &context)?, &context)?;

    // Geographic CRSs list the corner as latitude, longitude
    let (top_left_x, top_left_y) = if crs.is_geographic() {
        (second, first)
    } else {
        (first, second)
    };

    Ok(TileMatrix {
        identifier,
        scale_denominator,
        top_left_x,
        top_left_y,
        tile_width,
        tile_height,
    })
}

fn required<'a>(node: Node<'a, 'a>, name: &str, context: &str) -> Result<&'a str, ProviderError> {
    child_text(node, name).ok_or_else(|| {
        ProviderError::DiscoveryUnavailable(format!("{} missing {}", context, name))
    })
}

fn parse_number<T: std::str::FromStr>(raw: &str, context: &str) -> Result<T, ProviderError> {
    raw.parse().map_err(|_| {
        ProviderError::DiscoveryUnavailable(format!("{}: invalid number '{}'", context, raw))
    })
}

fn parse_corner(raw: &str, context: &str) -> Result<(f64, f64), ProviderError> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.len() != 2 {
        return Err(ProviderError::DiscoveryUnavailable(format!(
            "{}: TopLeftCorner must contain two numbers",
            context
        )));
    }
    Ok((parse_number(parts[0], context)?, parse_number(parts[1], context)?))
}
