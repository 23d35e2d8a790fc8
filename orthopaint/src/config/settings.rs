//! Settings structs for every configuration section.
//!
//! Each struct maps to one `[section]` of `config.ini`. Conversions into the
//! provider and orchestrator types live here too, so the CLI never assembles
//! them by hand.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::crs::CrsId;
use crate::orchestrator::{OrchestratorSettings, ToolPaths, DEFAULT_MARGIN_M};
use crate::provider::{
    FetchSettings, ProviderConfig, TemplateConfig, WmsConfig, WmtsConfig, DEFAULT_REQUEST_DELAY_MS,
    DEFAULT_TIMEOUT_SECS, DEFAULT_ZOOM, IGN_ORTHO_LAYER, IGN_WMTS_URL,
};

use super::file::ConfigFileError;

/// Default WMTS tile matrix set.
pub const DEFAULT_MATRIX_SET: &str = "PM";

/// Default number of cells processed in parallel.
pub const DEFAULT_WORKERS: usize = 1;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub general: GeneralSettings,
    pub protocol: ProtocolSettings,
    pub download: DownloadSettings,
    pub tools: ToolPaths,
}

/// `[general]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralSettings {
    /// Tile cache directory
    pub cache_dir: PathBuf,
    /// Directory for intermediate rasters and colorized output
    pub work_dir: PathBuf,
    pub keep_temp_files: bool,
    /// CRS of the input point clouds
    pub target_crs: String,
    pub workers: usize,
    /// Margin added around each ground cell, in meters
    pub margin_m: f64,
}

/// Supported imagery protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    Wmts,
    Template,
    Wms,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Wmts => "wmts",
            ProtocolKind::Template => "template",
            ProtocolKind::Wms => "wms",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wmts" => Ok(ProtocolKind::Wmts),
            "template" | "xyz" => Ok(ProtocolKind::Template),
            "wms" => Ok(ProtocolKind::Wms),
            other => Err(format!(
                "unknown protocol '{}', expected wmts, template or wms",
                other
            )),
        }
    }
}

/// `[protocol]` section.
///
/// Not every key applies to every protocol: `matrix_set` is WMTS only,
/// `crs` is WMS only, and `template` is required for template sources.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolSettings {
    pub kind: ProtocolKind,
    pub url: String,
    pub layer: String,
    pub style: Option<String>,
    pub matrix_set: String,
    pub zoom: u8,
    pub format: Option<String>,
    pub crs: Option<String>,
    pub template: Option<String>,
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSettings {
    /// HTTP timeout in seconds
    pub timeout: u64,
    /// Pause after each network request that missed the cache
    pub request_delay_ms: u64,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("orthopaint");

        Self {
            general: GeneralSettings {
                cache_dir,
                work_dir: PathBuf::from("."),
                keep_temp_files: false,
                target_crs: CrsId::lambert93().as_str().to_string(),
                workers: DEFAULT_WORKERS,
                margin_m: DEFAULT_MARGIN_M,
            },
            protocol: ProtocolSettings {
                kind: ProtocolKind::Wmts,
                url: IGN_WMTS_URL.to_string(),
                layer: IGN_ORTHO_LAYER.to_string(),
                style: Some("normal".to_string()),
                matrix_set: DEFAULT_MATRIX_SET.to_string(),
                zoom: DEFAULT_ZOOM,
                format: Some("image/jpeg".to_string()),
                crs: None,
                template: None,
            },
            download: DownloadSettings {
                timeout: DEFAULT_TIMEOUT_SECS,
                request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            },
            tools: ToolPaths::default(),
        }
    }
}

impl ConfigFile {
    /// Handler configuration for the `[protocol]` section.
    pub fn provider_config(&self) -> Result<ProviderConfig, ConfigFileError> {
        let p = &self.protocol;
        let config = match p.kind {
            ProtocolKind::Wmts => ProviderConfig::Wmts(WmtsConfig {
                url: p.url.clone(),
                layer: p.layer.clone(),
                style: p.style.clone(),
                matrix_set: p.matrix_set.clone(),
                zoom: p.zoom,
                format: p.format.clone(),
            }),
            ProtocolKind::Template => {
                let template = p.template.clone().ok_or_else(|| ConfigFileError::InvalidValue {
                    section: "protocol".to_string(),
                    key: "template".to_string(),
                    value: String::new(),
                    reason: "required when type = template".to_string(),
                })?;
                ProviderConfig::Template(TemplateConfig {
                    template,
                    zoom: p.zoom,
                    layer: p.layer.clone(),
                })
            }
            ProtocolKind::Wms => ProviderConfig::Wms(WmsConfig {
                url: p.url.clone(),
                layer: p.layer.clone(),
                style: p.style.clone(),
                crs: p.crs.clone(),
                format: p.format.clone(),
            }),
        };
        Ok(config)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            request_delay: Duration::from_millis(self.download.request_delay_ms),
            cell_crs: CrsId::new(&self.general.target_crs),
            ..FetchSettings::default()
        }
    }

    /// Orchestrator settings; `zoom` only names intermediate files.
    pub fn orchestrator_settings(&self, zoom: Option<u8>) -> OrchestratorSettings {
        OrchestratorSettings {
            work_dir: self.general.work_dir.clone(),
            target_crs: CrsId::new(&self.general.target_crs),
            margin_m: self.general.margin_m,
            workers: self.general.workers,
            keep_temp_files: self.general.keep_temp_files,
            zoom,
            tools: self.tools.clone(),
        }
    }
}
