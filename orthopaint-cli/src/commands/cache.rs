//! Cache management CLI commands.

use clap::Subcommand;
use orthopaint::cache::{
    clear_disk_cache, disk_cache_stats, migrate_legacy_entries, LEGACY_LAYER, LEGACY_TILE_SET,
};
use orthopaint::config::ConfigFile;

use super::common::format_size;
use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Clear the tile cache, removing all cached tiles
    Clear,
    /// Show tile cache statistics
    Stats,
    /// Rename first-generation `orig-*` IGN orthophoto tiles to the current layout
    Migrate,
}

/// Run a cache subcommand.
pub fn run(action: CacheAction, config: &ConfigFile) -> Result<(), CliError> {
    let cache_dir = &config.general.cache_dir;

    match action {
        CacheAction::Clear => {
            println!("Clearing tile cache at: {}", cache_dir.display());

            let result =
                clear_disk_cache(cache_dir).map_err(|e| CliError::CacheClear(e.to_string()))?;
            println!(
                "Deleted {} files, freed {}",
                result.files_deleted,
                format_size(result.bytes_freed)
            );
            Ok(())
        }
        CacheAction::Stats => {
            println!("Tile cache: {}", cache_dir.display());

            let (files, bytes) =
                disk_cache_stats(cache_dir).map_err(|e| CliError::CacheStats(e.to_string()))?;
            println!("  Files: {}", files);
            println!("  Size:  {}", format_size(bytes));
            Ok(())
        }
        CacheAction::Migrate => {
            println!(
                "Migrating legacy tiles in {} to {}@{}",
                cache_dir.display(),
                LEGACY_LAYER,
                LEGACY_TILE_SET
            );

            let result = migrate_legacy_entries(cache_dir)
                .map_err(|e| CliError::CacheMigrate(e.to_string()))?;
            println!(
                "Renamed {} files ({}), skipped {}",
                result.files_renamed,
                format_size(result.bytes_migrated),
                result.files_skipped
            );
            Ok(())
        }
    }
}
