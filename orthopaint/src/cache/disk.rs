//! On-disk tile store.
//!
//! One file per [`TileAddress`] in a flat directory. Writes land in a
//! uniquely named temp file in the same directory and are then renamed over
//! the final name, so a reader only ever sees complete payloads. Two writers
//! racing on the same key write identical bytes, so the last rename wins
//! harmlessly and no locking is needed.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use super::types::{CacheError, TileAddress};

/// Suffix of in-flight temp files.
const TEMP_SUFFIX: &str = ".tmp";

/// Outcome of [`TileCache::get_or_fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from disk
    Hit(Vec<u8>),
    /// Fetched and written through
    Miss(Vec<u8>),
}

impl CacheOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheOutcome::Hit(_))
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            CacheOutcome::Hit(b) | CacheOutcome::Miss(b) => b,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            CacheOutcome::Hit(b) | CacheOutcome::Miss(b) => b,
        }
    }
}

/// Write-through tile cache backed by a directory.
#[derive(Debug)]
pub struct TileCache {
    dir: PathBuf,
    temp_counter: AtomicU64,
}

impl TileCache {
    /// Create a cache rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            temp_counter: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of a cached tile.
    pub fn path_for(&self, addr: &TileAddress) -> PathBuf {
        self.dir.join(addr.file_name())
    }

    /// Read a cached tile.
    ///
    /// A legacy `orig-{z}-{x}-{y}.jpg` entry is renamed to the current name
    /// the first time an IGN orthophoto `PM` tile is looked up.
    pub fn get(&self, addr: &TileAddress) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(addr);

        match fs::read(&path) {
            Ok(data) => return Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(path, e)),
        }

        if self.adopt_legacy(addr, &path)? {
            return match fs::read(&path) {
                Ok(data) => Ok(Some(data)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(CacheError::io(path, e)),
            };
        }

        Ok(None)
    }

    /// Store a tile atomically.
    pub fn put(&self, addr: &TileAddress, data: &[u8]) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;

        let path = self.path_for(addr);
        let temp = self.temp_path(addr);

        if let Err(e) = fs::write(&temp, data) {
            let _ = fs::remove_file(&temp);
            return Err(CacheError::io(temp, e));
        }
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(CacheError::io(path, e));
        }

        debug!(tile = %addr, bytes = data.len(), "Cached tile");
        Ok(())
    }

    /// Look up `addr`; on a miss call `fetch`, persist its bytes, then
    /// return them.
    ///
    /// Cache I/O failures are logged and treated as a miss (on read) or
    /// ignored (on write); they never fail the fetch.
    pub fn get_or_fetch<F, E>(&self, addr: &TileAddress, fetch: F) -> Result<CacheOutcome, E>
    where
        F: FnOnce() -> Result<Vec<u8>, E>,
    {
        match self.get(addr) {
            Ok(Some(data)) => return Ok(CacheOutcome::Hit(data)),
            Ok(None) => {}
            Err(e) => warn!(tile = %addr, error = %e, "Cache read failed, fetching"),
        }

        let data = fetch()?;
        if let Err(e) = self.put(addr, &data) {
            warn!(tile = %addr, error = %e, "Cache write failed");
        }
        Ok(CacheOutcome::Miss(data))
    }

    fn temp_path(&self, addr: &TileAddress) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}.{}{}",
            addr.file_name(),
            std::process::id(),
            n,
            TEMP_SUFFIX
        ))
    }

    fn adopt_legacy(&self, addr: &TileAddress, path: &Path) -> Result<bool, CacheError> {
        let legacy = match addr.legacy_file_name() {
            Some(name) => self.dir.join(name),
            None => return Ok(false),
        };

        match fs::rename(&legacy, path) {
            Ok(()) => {
                info!(
                    from = %legacy.display(),
                    to = %path.display(),
                    "Migrated legacy cache entry"
                );
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(legacy, e)),
        }
    }
}

/// Result of clearing the disk cache.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClearResult {
    pub files_deleted: u64,
    pub bytes_freed: u64,
}

/// Count files and bytes in the cache directory.
///
/// A missing directory is an empty cache.
pub fn disk_cache_stats(dir: &Path) -> io::Result<(u64, u64)> {
    let mut files = 0;
    let mut bytes = 0;

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok((0, 0)),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            files += 1;
            bytes += metadata.len();
        }
    }

    Ok((files, bytes))
}

/// Delete every cached file. Subdirectories are left alone.
pub fn clear_disk_cache(dir: &Path) -> io::Result<ClearResult> {
    let mut result = ClearResult::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(result),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        fs::remove_file(entry.path())?;
        result.files_deleted += 1;
        result.bytes_freed += metadata.len();
    }

    info!(
        dir = %dir.display(),
        files = result.files_deleted,
        bytes = result.bytes_freed,
        "Cleared disk cache"
    );
    Ok(result)
}
