//! orthopaint - Aerial imagery for lidar colorization
//!
//! Fetches orthophotos from WMTS, WMS and XYZ tile servers, stitches them into
//! one georeferenced mosaic per 1 km lidar cell, and drives GDAL and PDAL to
//! paint the point cloud with the mosaic's colors.
//!
//! # High-Level API
//!
//! ```ignore
//! use orthopaint::config::ConfigFile;
//! use orthopaint::orchestrator::{Orchestrator, ProcessRunner};
//! use orthopaint::provider::{ProviderFactory, ReqwestClient};
//!
//! let config = ConfigFile::load()?;
//! let provider = config.provider_config()?;
//! let handler = ProviderFactory::new(client, cache, transform, config.fetch_settings())
//!     .create(&provider);
//!
//! let orchestrator = Orchestrator::new(
//!     handler,
//!     Arc::new(ProcessRunner),
//!     config.orchestrator_settings(provider.zoom()),
//! );
//! let summary = orchestrator.run(&inputs)?;
//! ```

pub mod cache;
pub mod config;
pub mod coord;
pub mod crs;
pub mod logging;
pub mod mosaic;
pub mod orchestrator;
pub mod provider;

/// Version of the orthopaint library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
