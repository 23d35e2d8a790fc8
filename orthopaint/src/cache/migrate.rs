//! Bulk migration of legacy cache entries.
//!
//! The first generation of the cache stored IGN orthophoto tiles of the `PM`
//! matrix set as `orig-{zoom}-{x}-{y}.jpg`. [`migrate_legacy_entries`]
//! renames every such file to the current
//! `ORTHOIMAGERY.ORTHOPHOTOS@PM-{zoom}-{x}-{y}.jpg` name. Lookups of that
//! source perform the same rename lazily, so running this is optional.
//!
//! Running it twice is safe: migrated files no longer match the legacy
//! pattern.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use super::types::TileAddress;

/// Result of migrating legacy cache files.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrateResult {
    /// Files renamed to the current scheme
    pub files_renamed: u64,
    /// Legacy files left in place because the target already existed
    pub files_skipped: u64,
    /// Bytes renamed
    pub bytes_migrated: u64,
}

fn legacy_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^orig-(\d{1,2})-(-?\d+)-(-?\d+)\.jpg$").expect("legacy cache pattern is valid")
    })
}

/// Parse a legacy file name into the address it now lives at.
pub fn parse_legacy_name(name: &str) -> Option<TileAddress> {
    let caps = legacy_pattern().captures(name)?;
    let zoom = caps[1].parse().ok()?;
    let x = caps[2].parse().ok()?;
    let y = caps[3].parse().ok()?;
    Some(TileAddress::legacy(zoom, x, y))
}

/// Rename every legacy entry in `cache_dir` to the current scheme.
pub fn migrate_legacy_entries(cache_dir: &Path) -> io::Result<MigrateResult> {
    let mut result = MigrateResult::default();

    if !cache_dir.exists() {
        return Ok(result);
    }

    for entry in fs::read_dir(cache_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let addr = match path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_legacy_name)
        {
            Some(addr) => addr,
            None => continue,
        };

        let dest = cache_dir.join(addr.file_name());
        if dest.exists() {
            debug!(file = %path.display(), "Current entry already present, skipping");
            result.files_skipped += 1;
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        fs::rename(&path, &dest)?;
        result.files_renamed += 1;
        result.bytes_migrated += size;
    }

    info!(
        dir = %cache_dir.display(),
        renamed = result.files_renamed,
        skipped = result.files_skipped,
        "Legacy cache migration finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_legacy_name() {
        let addr = parse_legacy_name("orig-19-265519-180412.jpg").unwrap();
        assert_eq!(addr.zoom, 19);
        assert_eq!(addr.tile_x, 265_519);
        assert_eq!(addr.tile_y, 180_412);
        assert_eq!(addr.layer, "ORTHOIMAGERY.ORTHOPHOTOS");
        assert_eq!(addr.tile_set, "PM");

        assert!(parse_legacy_name("ORTHO@PM-19-1-2.jpg").is_none());
        assert!(parse_legacy_name("orig-19-1-2.png").is_none());
    }

    #[test]
    fn test_migrate_renames_legacy_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("orig-19-1-2.jpg"), vec![0u8; 10]).unwrap();
        fs::write(temp.path().join("orig-19-3-4.jpg"), vec![0u8; 20]).unwrap();
        fs::write(temp.path().join("notes.txt"), b"keep").unwrap();

        let result = migrate_legacy_entries(temp.path()).unwrap();

        assert_eq!(result.files_renamed, 2);
        assert_eq!(result.bytes_migrated, 30);
        assert!(temp.path().join("ORTHOIMAGERY.ORTHOPHOTOS@PM-19-1-2.jpg").exists());
        assert!(temp.path().join("ORTHOIMAGERY.ORTHOPHOTOS@PM-19-3-4.jpg").exists());
        assert!(temp.path().join("notes.txt").exists());
        assert!(!temp.path().join("orig-19-1-2.jpg").exists());
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("orig-19-1-2.jpg"), b"x").unwrap();

        migrate_legacy_entries(temp.path()).unwrap();
        let second = migrate_legacy_entries(temp.path()).unwrap();

        assert_eq!(second, MigrateResult::default());
    }

    #[test]
    fn test_migrate_skips_existing_target() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("orig-19-1-2.jpg"), b"old").unwrap();
        let current = temp.path().join("ORTHOIMAGERY.ORTHOPHOTOS@PM-19-1-2.jpg");
        fs::write(&current, b"new").unwrap();

        let result = migrate_legacy_entries(temp.path()).unwrap();

        assert_eq!(result.files_skipped, 1);
        assert_eq!(fs::read(&current).unwrap(), b"new");
    }

    #[test]
    fn test_migrate_missing_directory() {
        let temp = TempDir::new().unwrap();
        let result = migrate_legacy_entries(&temp.path().join("missing")).unwrap();
        assert_eq!(result, MigrateResult::default());
    }
}
