//! User configuration.
//!
//! Settings are read from `~/.orthopaint/config.ini` (or an explicit path) and
//! passed by value into the provider factory and the orchestrator. There is
//! no global configuration state.
//!
//! # Example
//!
//! ```
//! use orthopaint::config::{ConfigFile, ProtocolKind};
//!
//! let config = ConfigFile::default();
//! assert_eq!(config.protocol.kind, ProtocolKind::Wmts);
//!
//! let settings = config.orchestrator_settings(Some(19));
//! assert_eq!(settings.margin_m, 70.0);
//! ```

mod file;
mod parser;
mod settings;
mod writer;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    ConfigFile, DownloadSettings, GeneralSettings, ProtocolKind, ProtocolSettings,
    DEFAULT_MATRIX_SET, DEFAULT_WORKERS,
};
