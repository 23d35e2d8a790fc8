//! INI parsing: `Ini` → `ConfigFile`.
//!
//! The single place where INI key names are mapped to struct fields.

use std::path::PathBuf;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::{ConfigFile, ProtocolKind};
use crate::coord::MAX_ZOOM;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [general] section
    if let Some(section) = ini.section(Some("general")) {
        if let Some(v) = non_empty(section, "cache_dir") {
            config.general.cache_dir = expand_tilde(v);
        }
        if let Some(v) = non_empty(section, "work_dir") {
            config.general.work_dir = expand_tilde(v);
        }
        if let Some(v) = section.get("keep_temp_files") {
            config.general.keep_temp_files = parse_bool(v);
        }
        if let Some(v) = non_empty(section, "target_crs") {
            config.general.target_crs = v.to_string();
        }
        if let Some(v) = section.get("workers") {
            config.general.workers = v
                .trim()
                .parse()
                .ok()
                .filter(|&n: &usize| n > 0)
                .ok_or_else(|| invalid("general", "workers", v, "must be a positive integer"))?;
        }
        if let Some(v) = section.get("margin_m") {
            config.general.margin_m = v
                .trim()
                .parse()
                .ok()
                .filter(|m: &f64| m.is_finite() && *m >= 0.0)
                .ok_or_else(|| {
                    invalid("general", "margin_m", v, "must be a non-negative number of meters")
                })?;
        }
    }

    // [protocol] section
    if let Some(section) = ini.section(Some("protocol")) {
        if let Some(v) = section.get("type") {
            config.protocol.kind = v
                .parse::<ProtocolKind>()
                .map_err(|_| invalid("protocol", "type", v, "must be one of: wmts, template, wms"))?;
        }
        if let Some(v) = non_empty(section, "url") {
            config.protocol.url = v.to_string();
        }
        if let Some(v) = non_empty(section, "layer") {
            config.protocol.layer = v.to_string();
        }
        if let Some(v) = section.get("style") {
            config.protocol.style = optional(v);
        }
        if let Some(v) = non_empty(section, "matrix_set") {
            config.protocol.matrix_set = v.to_string();
        }
        if let Some(v) = section.get("zoom") {
            config.protocol.zoom = v
                .trim()
                .parse()
                .ok()
                .filter(|&z: &u8| z <= MAX_ZOOM)
                .ok_or_else(|| {
                    invalid(
                        "protocol",
                        "zoom",
                        v,
                        &format!("must be an integer between 0 and {}", MAX_ZOOM),
                    )
                })?;
        }
        if let Some(v) = section.get("format") {
            config.protocol.format = optional(v);
        }
        if let Some(v) = section.get("crs") {
            config.protocol.crs = optional(v);
        }
        if let Some(v) = section.get("template") {
            config.protocol.template = optional(v);
        }
    }

    // [download] section
    if let Some(section) = ini.section(Some("download")) {
        if let Some(v) = section.get("timeout") {
            config.download.timeout = v
                .trim()
                .parse()
                .ok()
                .filter(|&t: &u64| t > 0)
                .ok_or_else(|| {
                    invalid("download", "timeout", v, "must be a positive integer (seconds)")
                })?;
        }
        if let Some(v) = section.get("request_delay_ms") {
            config.download.request_delay_ms = v.trim().parse().map_err(|_| {
                invalid(
                    "download",
                    "request_delay_ms",
                    v,
                    "must be a non-negative integer (milliseconds)",
                )
            })?;
        }
    }

    // [tools] section
    if let Some(section) = ini.section(Some("tools")) {
        if let Some(v) = non_empty(section, "gdal_translate") {
            config.tools.gdal_translate = expand_tilde(v);
        }
        if let Some(v) = non_empty(section, "gdalwarp") {
            config.tools.gdalwarp = expand_tilde(v);
        }
        if let Some(v) = non_empty(section, "pdal") {
            config.tools.pdal = expand_tilde(v);
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn optional(value: &str) -> Option<String> {
    let v = value.trim();
    (!v.is_empty()).then(|| v.to_string())
}

/// Parse a boolean value from a config string.
/// Accepts: true/false, yes/no, 1/0, on/off (case-insensitive)
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderConfig;

    fn parse(text: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(text).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_ini_is_default() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_overlay_values() {
        let config = parse(
            "[general]\n\
             work_dir = /tmp/out\n\
             keep_temp_files = yes\n\
             workers = 3\n\
             margin_m = 25.5\n\
             [protocol]\n\
             type = template\n\
             template = https://tile.openstreetmap.org/{z}/{x}/{y}.png\n\
             layer = osm\n\
             zoom = 18\n\
             [download]\n\
             request_delay_ms = 0\n\
             [tools]\n\
             pdal = /opt/pdal/bin/pdal\n",
        )
        .unwrap();

        assert_eq!(config.general.work_dir, PathBuf::from("/tmp/out"));
        assert!(config.general.keep_temp_files);
        assert_eq!(config.general.workers, 3);
        assert_eq!(config.general.margin_m, 25.5);
        assert_eq!(config.protocol.kind, ProtocolKind::Template);
        assert_eq!(config.download.request_delay_ms, 0);
        assert_eq!(config.tools.pdal, PathBuf::from("/opt/pdal/bin/pdal"));
        assert_eq!(config.tools.gdalwarp, PathBuf::from("gdalwarp"));

        match config.provider_config().unwrap() {
            ProviderConfig::Template(t) => {
                assert_eq!(t.zoom, 18);
                assert_eq!(t.layer, "osm");
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_empty_optional_clears_default() {
        let config = parse("[protocol]\nstyle =\nformat = \n").unwrap();
        assert_eq!(config.protocol.style, None);
        assert_eq!(config.protocol.format, None);
    }

    #[test]
    fn test_invalid_values() {
        let cases = [
            ("[protocol]\ntype = tms\n", "type"),
            ("[protocol]\nzoom = 31\n", "zoom"),
            ("[general]\nworkers = 0\n", "workers"),
            ("[general]\nmargin_m = -5\n", "margin_m"),
            ("[download]\ntimeout = soon\n", "timeout"),
            ("[download]\nrequest_delay_ms = -1\n", "request_delay_ms"),
        ];
        for (text, expected_key) in cases {
            match parse(text) {
                Err(ConfigFileError::InvalidValue { key, .. }) => assert_eq!(key, expected_key),
                other => panic!("{}: unexpected result {:?}", expected_key, other),
            }
        }
    }

    #[test]
    fn test_parse_bool() {
        for v in ["true", "YES", "1", " on "] {
            assert!(parse_bool(v), "{}", v);
        }
        for v in ["false", "no", "0", ""] {
            assert!(!parse_bool(v), "{}", v);
        }
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/cache"), home.join("cache"));
        }
    }
}
