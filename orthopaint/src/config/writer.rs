//! INI serialization: `ConfigFile` → commented INI string.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let style = config.protocol.style.as_deref().unwrap_or("");
    let format = config.protocol.format.as_deref().unwrap_or("");
    let crs = config.protocol.crs.as_deref().unwrap_or("");
    let template = config.protocol.template.as_deref().unwrap_or("");
    let keep_temp_files = if config.general.keep_temp_files {
        "true"
    } else {
        "false"
    };

    format!(
        r#"[general]
; Tile cache directory, shared by every run
cache_dir = {}
; Where intermediate rasters and colorized point clouds are written
work_dir = {}
; Keep the mosaic PNG, GeoTIFFs and PDAL pipeline of each cell
keep_temp_files = {}
; CRS of the input point clouds (IGN lidar tiles are Lambert-93)
target_crs = {}
; Ground cells processed in parallel
workers = {}
; Margin added around each 1 km cell, in meters
margin_m = {}

[protocol]
; Imagery source:
;   wmts     - OGC WMTS, tiles located through GetCapabilities
;   template - XYZ/TMS tile server, see `template` below
;   wms      - OGC WMS, one GetMap image per cell
type = {}
; Service endpoint (wmts, wms)
url = {}
; Layer identifier; also the tile cache namespace
layer = {}
; Style; empty uses the server default
style = {}
; WMTS tile matrix set
matrix_set = {}
; Tile zoom level (wmts, template)
zoom = {}
; Image MIME type; empty uses the first advertised format
format = {}
; WMS request CRS; empty uses the first supported CRS of the layer
crs = {}
; URL template with {{z}} {{x}} {{y}}, {{-y}} for TMS rows and {{switch:a,b,c}}
; Example: template = https://{{switch:a,b,c}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png
template = {}

[download]
; HTTP timeout in seconds
timeout = {}
; Pause after each tile fetched from the network, in milliseconds
request_delay_ms = {}

[tools]
; External programs; bare names are looked up on PATH
gdal_translate = {}
gdalwarp = {}
pdal = {}
"#,
        path_to_string(&config.general.cache_dir),
        path_to_string(&config.general.work_dir),
        keep_temp_files,
        config.general.target_crs,
        config.general.workers,
        config.general.margin_m,
        config.protocol.kind,
        config.protocol.url,
        config.protocol.layer,
        style,
        config.protocol.matrix_set,
        config.protocol.zoom,
        format,
        crs,
        template,
        config.download.timeout,
        config.download.request_delay_ms,
        path_to_string(&config.tools.gdal_translate),
        path_to_string(&config.tools.gdalwarp),
        path_to_string(&config.tools.pdal),
    )
}

/// Convert path to display string, collapsing home dir to ~.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::super::settings::{ConfigFile, ProtocolKind};
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");

        let mut config = ConfigFile::default();
        config.general.work_dir = PathBuf::from("/data/colorized");
        config.general.workers = 2;
        config.protocol.kind = ProtocolKind::Template;
        config.protocol.template = Some("https://{switch:a,b}.t/{z}/{x}/{-y}.png".to_string());
        config.protocol.style = None;
        config.download.timeout = 60;

        config.save_to(&config_path).unwrap();
        let loaded = ConfigFile::load_from(&config_path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_default_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");

        ConfigFile::default().save_to(&config_path).unwrap();
        let text = std::fs::read_to_string(&config_path).unwrap();

        assert!(text.contains("type = wmts"));
        assert!(text.contains("matrix_set = PM"));
        assert!(text.contains("{z}"));
        assert_eq!(ConfigFile::load_from(&config_path).unwrap(), ConfigFile::default());
    }
}
