//! Common types and utilities shared across CLI commands.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use orthopaint::config::{config_file_path, ConfigFile, ProtocolKind};

use crate::error::CliError;

/// Imagery protocol selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum ProtocolArg {
    /// OGC WMTS (IGN Géoplateforme by default)
    Wmts,
    /// XYZ/TMS tile server from a URL template
    Template,
    /// OGC WMS, one GetMap image per cell
    Wms,
}

impl From<ProtocolArg> for ProtocolKind {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Wmts => ProtocolKind::Wmts,
            ProtocolArg::Template => ProtocolKind::Template,
            ProtocolArg::Wms => ProtocolKind::Wms,
        }
    }
}

/// Config file to use: `--config` when given, otherwise the default path.
pub fn config_path(cli_path: Option<&Path>) -> PathBuf {
    cli_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path)
}

/// Load configuration, falling back to defaults when the file is missing.
pub fn load_config(cli_path: Option<&Path>) -> Result<ConfigFile, CliError> {
    Ok(ConfigFile::load_from(&config_path(cli_path))?)
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
