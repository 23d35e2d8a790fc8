//! WMS 1.3.0 / 1.1.1 capabilities parsing.

use std::collections::BTreeMap;

use roxmltree::{Document, Node};

use super::{child_text, children_named, LayerCapabilities, LayerInfo, LayerNode, DEFAULT_MAX_DIMENSION};
use crate::crs::CrsId;
use crate::provider::ProviderError;

/// Parsed `<WMS_Capabilities>` document.
#[derive(Debug, Clone, PartialEq)]
pub struct WmsCapabilities {
    pub max_width: u32,
    pub max_height: u32,
    /// Formats advertised for GetMap
    pub formats: Vec<String>,
    pub root: LayerNode,
}

impl WmsCapabilities {
    /// Flatten into [`LayerCapabilities`], resolving every named layer.
    pub fn to_layer_capabilities(&self) -> LayerCapabilities {
        let mut layers = BTreeMap::new();

        for name in self.root.named_layers() {
            if let Some(resolved) = self.root.resolve(&name) {
                let formats = match &resolved.format {
                    Some(format) => vec![format.clone()],
                    None => self.formats.clone(),
                };
                layers.insert(
                    name.clone(),
                    LayerInfo {
                        name,
                        formats,
                        crs: resolved.crs,
                        min_scale: resolved.min_scale,
                        max_scale: resolved.max_scale,
                        ..Default::default()
                    },
                );
            }
        }

        LayerCapabilities {
            layers,
            max_width: self.max_width,
            max_height: self.max_height,
            tree: Some(self.root.clone()),
        }
    }
}

/// Parse a WMS capabilities document.
pub fn parse(xml: &str) -> Result<WmsCapabilities, ProviderError> {
    let doc = Document::parse(xml).map_err(|e| {
        ProviderError::DiscoveryUnavailable(format!("invalid WMS capabilities XML: {}", e))
    })?;
    let root = doc.root_element();

    let service = children_named(root, "Service").next();
    let max_width = service
        .and_then(|s| child_text(s, "MaxWidth"))
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_DIMENSION);
    let max_height = service
        .and_then(|s| child_text(s, "MaxHeight"))
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_DIMENSION);

    let capability = children_named(root, "Capability").next().ok_or_else(|| {
        ProviderError::DiscoveryUnavailable("WMS capabilities missing Capability".to_string())
    })?;

    let formats = children_named(capability, "Request")
        .flat_map(|r| children_named(r, "GetMap"))
        .flat_map(|g| children_named(g, "Format"))
        .filter_map(|f| f.text())
        .map(|t| t.trim().to_string())
        .collect();

    let mut top: Vec<LayerNode> = children_named(capability, "Layer").map(parse_layer).collect();
    let root = match top.len() {
        0 => {
            return Err(ProviderError::DiscoveryUnavailable(
                "WMS capabilities declare no layers".to_string(),
            ))
        }
        1 => top.remove(0),
        _ => LayerNode {
            children: top,
            ..Default::default()
        },
    };

    Ok(WmsCapabilities {
        max_width,
        max_height,
        formats,
        root,
    })
}

fn parse_layer(node: Node<'_, '_>) -> LayerNode {
    let mut layer = LayerNode {
        name: child_text(node, "Name").map(str::to_string),
        title: child_text(node, "Title").map(str::to_string),
        min_scale: child_text(node, "MinScaleDenominator").and_then(|v| v.parse().ok()),
        max_scale: child_text(node, "MaxScaleDenominator").and_then(|v| v.parse().ok()),
        format: child_text(node, "Format").map(str::to_string),
        ..Default::default()
    };

    for child in node.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            // 1.1.1 allows several codes in one SRS element
            "CRS" | "SRS" => {
                for code in child.text().unwrap_or_default().split_whitespace() {
                    let crs = CrsId::new(code);
                    if !layer.crs.contains(&crs) {
                        layer.crs.push(crs);
                    }
                }
            }
            "Layer" => layer.children.push(parse_layer(child)),
            _ => {}
        }
    }
    layer
}
