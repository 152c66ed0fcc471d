// src/infrastructure/cache_directory.rs
//
// Cache Directory Handle
//
// CRITICAL RULES:
// - The cache root is passed explicitly, never a process-wide global
// - Files are sharded by the first two hex chars of the key digest
// - In-progress writes use dot-prefixed temp names in the target shard,
//   so a rename into place is atomic and temp files never match a lookup

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::error::{ResolutionError, ResolveResult};

/// Temp files older than this belong to writes that can no longer finish
const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

/// Durable directory holding materialized conversions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDirectory {
    root: PathBuf,
}

impl CacheDirectory {
    /// Open (creating if needed) a cache directory at `root`, and remove
    /// temp files left behind by interrupted writes.
    pub fn open<P: AsRef<Path>>(root: P) -> ResolveResult<Self> {
        let root = root.as_ref().to_path_buf();

        std::fs::create_dir_all(&root).map_err(|e| {
            ResolutionError::CacheWriteFailed(format!(
                "Failed to create cache directory {:?}: {}",
                root, e
            ))
        })?;

        let cache_dir = Self { root };
        let swept = cache_dir.sweep_stale_temps(STALE_TEMP_AGE);
        if swept > 0 {
            log::info!("Removed {} stale temp files from {:?}", swept, cache_dir.root);
        }

        Ok(cache_dir)
    }

    /// Platform cache location.
    ///
    /// Path structure: {CACHE_DIR}/media-resolver/conversions
    pub fn default_location() -> ResolveResult<PathBuf> {
        let cache_dir = dirs::cache_dir().ok_or_else(|| {
            ResolutionError::CacheWriteFailed(
                "Could not determine platform cache directory".to_string(),
            )
        })?;

        Ok(cache_dir.join("media-resolver").join("conversions"))
    }

    /// Delete temp files in the shards that have not been touched for
    /// `max_age`. Younger ones may still belong to a live writer.
    /// Returns how many were removed.
    pub fn sweep_stale_temps(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in walkdir::WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e: Result<walkdir::DirEntry, walkdir::Error>| e.ok())
        {
            if !entry.file_type().is_file()
                || !Self::is_temp_name(&entry.file_name().to_string_lossy())
            {
                continue;
            }

            let age = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Failed to remove stale temp {:?}: {}", entry.path(), e),
            }
        }

        removed
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shard directory for a digest
    pub fn shard_dir(&self, digest: &str) -> PathBuf {
        let prefix = digest.get(..2).unwrap_or("00");
        self.root.join(prefix)
    }

    /// Final path of a data file
    pub fn data_path(&self, digest: &str, extension: &str) -> PathBuf {
        self.shard_dir(digest).join(format!("{}.{}", digest, extension))
    }

    /// Sidecar metadata path
    pub fn sidecar_path(&self, digest: &str) -> PathBuf {
        self.shard_dir(digest).join(format!("{}.json", digest))
    }

    /// Fresh, unique temp path in the same shard as the final file
    pub fn temp_path(&self, digest: &str) -> PathBuf {
        self.shard_dir(digest)
            .join(format!(".{}.{}.tmp", digest, Uuid::new_v4()))
    }

    /// Whether a file name inside a shard is an in-progress write
    pub fn is_temp_name(name: &str) -> bool {
        name.starts_with('.') && name.ends_with(".tmp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "ab3f00000000000000000000000000000000000000000000000000000000cafe";

    #[test]
    fn test_open_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/cache");

        let cache_dir = CacheDirectory::open(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(cache_dir.root(), root.as_path());
    }

    #[test]
    fn test_layout_is_sharded() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = CacheDirectory::open(dir.path()).unwrap();

        assert_eq!(cache_dir.shard_dir(DIGEST), dir.path().join("ab"));
        assert_eq!(
            cache_dir.data_path(DIGEST, "heic"),
            dir.path().join("ab").join(format!("{}.heic", DIGEST))
        );
        assert_eq!(
            cache_dir.sidecar_path(DIGEST),
            dir.path().join("ab").join(format!("{}.json", DIGEST))
        );
    }

    #[test]
    fn test_temp_paths_are_unique_and_recognizable() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = CacheDirectory::open(dir.path()).unwrap();

        let a = cache_dir.temp_path(DIGEST);
        let b = cache_dir.temp_path(DIGEST);
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(cache_dir.shard_dir(DIGEST).as_path()));

        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(CacheDirectory::is_temp_name(name));
        assert!(!CacheDirectory::is_temp_name(&format!("{}.jpg", DIGEST)));
    }

    #[test]
    fn test_default_location_layout() {
        if let Ok(path) = CacheDirectory::default_location() {
            assert!(path.ends_with("media-resolver/conversions"));
        }
    }

    #[test]
    fn test_open_sweeps_stale_temps_only() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = CacheDirectory::open(dir.path()).unwrap();
        std::fs::create_dir_all(cache_dir.shard_dir(DIGEST)).unwrap();

        let stale = cache_dir.temp_path(DIGEST);
        let fresh = cache_dir.temp_path(DIGEST);
        let data = cache_dir.data_path(DIGEST, "jpg");
        for path in [&stale, &fresh, &data] {
            std::fs::write(path, b"x").unwrap();
        }

        let two_hours_ago = SystemTime::now() - Duration::from_secs(2 * 60 * 60);
        for path in [&stale, &data] {
            std::fs::File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(two_hours_ago)
                .unwrap();
        }

        CacheDirectory::open(dir.path()).unwrap();

        assert!(!stale.exists());
        assert!(fresh.exists());
        assert!(data.exists());
    }

    #[test]
    fn test_sweep_with_zero_age_removes_every_temp() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = CacheDirectory::open(dir.path()).unwrap();
        std::fs::create_dir_all(cache_dir.shard_dir(DIGEST)).unwrap();
        std::fs::write(cache_dir.temp_path(DIGEST), b"x").unwrap();

        assert_eq!(cache_dir.sweep_stale_temps(Duration::ZERO), 1);
        assert_eq!(cache_dir.sweep_stale_temps(Duration::ZERO), 0);
    }
}
