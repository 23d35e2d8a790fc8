//! Tile cache
//!
//! A content-addressed, write-through disk store for raw tile payloads keyed
//! by [`TileAddress`]. Protocol handlers consult it before any network fetch
//! and persist every fetched payload before using it.
//!
//! # Example
//!
//! ```ignore
//! use orthopaint::cache::{ImageFormat, TileAddress, TileCache};
//!
//! let cache = TileCache::new("/home/user/.orthopaint/cache");
//! let addr = TileAddress::new("ORTHOIMAGERY.ORTHOPHOTOS", "PM", 19, 265519, 180412, ImageFormat::Jpeg);
//! let outcome = cache.get_or_fetch(&addr, || client.get(&url))?;
//! ```

mod disk;
pub mod migrate;
mod types;

pub use disk::{clear_disk_cache, disk_cache_stats, CacheOutcome, ClearResult, TileCache};
pub use migrate::{migrate_legacy_entries, MigrateResult};
pub use types::{
    sanitize_layer, CacheError, ImageFormat, TileAddress, LEGACY_LAYER, LEGACY_TILE_SET,
};
