//! Server capability documents.
//!
//! WMTS and WMS capability XML is parsed with `roxmltree` into plain structs,
//! then flattened into a [`LayerCapabilities`] that is shared read-only by
//! every worker after discovery.
//!
//! WMS layers nest: a child inherits CRS lists, scale limits and format from
//! its ancestors. The tree is kept as explicit [`LayerNode`]s and resolved
//! by folding attributes along the root-to-target path.

pub mod wms;
pub mod wmts;

use std::collections::BTreeMap;

use roxmltree::Node;

use crate::coord::ZoomConfig;
use crate::crs::CrsId;

/// Fallback for servers that do not advertise `MaxWidth` / `MaxHeight`.
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;

/// Everything a handler learned from discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerCapabilities {
    pub layers: BTreeMap<String, LayerInfo>,
    /// Largest image the server will render (bounding-box protocols)
    pub max_width: u32,
    pub max_height: u32,
    /// Raw layer tree (bounding-box protocols)
    pub tree: Option<LayerNode>,
}

impl LayerCapabilities {
    pub fn layer(&self, name: &str) -> Option<&LayerInfo> {
        self.layers.get(name)
    }
}

/// Resolved attributes of one layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerInfo {
    pub name: String,
    pub formats: Vec<String>,
    pub style: Option<String>,
    pub matrix_set: Option<String>,
    pub crs: Vec<CrsId>,
    pub zooms: BTreeMap<u8, ZoomConfig>,
    pub min_scale: Option<f64>,
    pub max_scale: Option<f64>,
}

/// One `<Layer>` element of a WMS capability tree.
///
/// Attributes hold only what the element itself declares.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerNode {
    pub name: Option<String>,
    pub title: Option<String>,
    pub crs: Vec<CrsId>,
    pub min_scale: Option<f64>,
    pub max_scale: Option<f64>,
    pub format: Option<String>,
    pub children: Vec<LayerNode>,
}

/// A layer with inherited attributes merged in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedLayer {
    pub name: String,
    pub title: Option<String>,
    /// Union of the CRS lists along the path, ancestors first
    pub crs: Vec<CrsId>,
    pub min_scale: Option<f64>,
    pub max_scale: Option<f64>,
    pub format: Option<String>,
}

impl LayerNode {
    /// Resolve the named layer. Walks the root-to-target path once.
    pub fn resolve(&self, name: &str) -> Option<ResolvedLayer> {
        let mut path = Vec::new();
        if !self.find_path(name, &mut path) {
            return None;
        }

        let mut resolved = ResolvedLayer {
            name: name.to_string(),
            ..Default::default()
        };
        for node in path {
            for crs in &node.crs {
                if !resolved.crs.contains(crs) {
                    resolved.crs.push(crs.clone());
                }
            }
            if node.min_scale.is_some() {
                resolved.min_scale = node.min_scale;
            }
            if node.max_scale.is_some() {
                resolved.max_scale = node.max_scale;
            }
            if node.format.is_some() {
                resolved.format = node.format.clone();
            }
            if node.title.is_some() {
                resolved.title = node.title.clone();
            }
        }
        Some(resolved)
    }

    /// Names of every named layer, depth first.
    pub fn named_layers(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names(&self, names: &mut Vec<String>) {
        if let Some(name) = &self.name {
            names.push(name.clone());
        }
        for child in &self.children {
            child.collect_names(names);
        }
    }

    fn find_path<'a>(&'a self, name: &str, path: &mut Vec<&'a LayerNode>) -> bool {
        path.push(self);
        if self.name.as_deref() == Some(name) {
            return true;
        }
        for child in &self.children {
            if child.find_path(name, path) {
                return true;
            }
        }
        path.pop();
        false
    }
}

/// Trimmed text of the first child element called `name`.
pub(crate) fn child_text<'a>(node: Node<'a, 'a>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == name)
        .and_then(|child| child.text())
        .map(str::trim)
}

/// Child elements called `name`.
pub(crate) fn children_named<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |child| child.is_element() && child.tag_name().name() == name)
}
