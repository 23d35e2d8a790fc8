//! CLI command implementations.
//!
//! - [`colorize`] - Colorize lidar tiles (main command)
//! - [`cache`] - Tile cache management (stats, clear, migrate)
//! - [`config`] - Configuration file (init, show, path)

pub mod cache;
pub mod colorize;
pub mod common;
pub mod config;
