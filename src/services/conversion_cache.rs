// src/services/conversion_cache.rs
//
// Conversion Cache
//
// Content-addressed on-disk memo of expensive exports and conversions:
// CacheKey (asset id, format slot) → fully materialized file.
//
// CRITICAL RULES:
// - Every key maps to exactly one data path, so lookup is a single stat
// - Readers see either no entry or a complete one (temp file + rename)
// - Latest write for a key wins; there is no versioning
// - Nothing here evicts on its own. `invalidate` exists for external policy
// - A missing sidecar never hides a data file from `lookup`
//
// The Native slot's encoding is only known at write time, so its data file
// carries a fixed `.native` suffix and its format lives in the sidecar,
// which is written before the data file becomes visible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::domain::{CacheEntry, CacheKey, FormatSlot, MimeFormat};
use crate::error::{ResolutionError, ResolveResult};
use crate::infrastructure::CacheDirectory;

/// Data file suffix of the Native slot
const NATIVE_EXTENSION: &str = "native";

/// Bytes to place in the cache
#[derive(Debug, Clone)]
pub enum CacheSource {
    /// In-memory bytes, e.g. conversion output
    Bytes(Vec<u8>),

    /// An existing file to copy in
    File(PathBuf),
}

/// Metadata written next to each data file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    key: CacheKey,
    format: MimeFormat,
    written_at: DateTime<Utc>,
    size_bytes: u64,
}

pub struct ConversionCache {
    dir: CacheDirectory,
}

impl ConversionCache {
    pub fn new(dir: CacheDirectory) -> Self {
        Self { dir }
    }

    pub fn directory(&self) -> &CacheDirectory {
        &self.dir
    }

    /// The single data path a key can occupy
    pub fn data_path(&self, key: &CacheKey) -> PathBuf {
        let digest = key.digest();
        match &key.slot {
            FormatSlot::Explicit(format) => self.dir.data_path(&digest, format.extension()),
            FormatSlot::Native => self.dir.data_path(&digest, NATIVE_EXTENSION),
        }
    }

    // ========================================================================
    // LOOKUP
    // ========================================================================

    /// Existence check for a key: one path derivation and one stat
    pub async fn lookup(&self, key: &CacheKey) -> ResolveResult<Option<CacheEntry>> {
        let path = self.data_path(key);

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                log::warn!("Cache entry {} unreadable, treating as miss: {}", key, e);
                return Ok(None);
            }
        };

        let sidecar = self.read_sidecar(&key.digest()).await.filter(|s| &s.key == key);

        let format = match &key.slot {
            FormatSlot::Explicit(format) => format.clone(),
            FormatSlot::Native => sidecar
                .as_ref()
                .map(|s| s.format.clone())
                .unwrap_or_else(MimeFormat::octet_stream),
        };

        let written_at = sidecar
            .as_ref()
            .map(|s| s.written_at)
            .or_else(|| metadata.modified().ok().map(DateTime::<Utc>::from))
            .unwrap_or_else(Utc::now);

        Ok(Some(CacheEntry {
            key: key.clone(),
            path,
            format,
            written_at,
            size_bytes: metadata.len(),
        }))
    }

    async fn read_sidecar(&self, digest: &str) -> Option<Sidecar> {
        let raw = tokio::fs::read(self.dir.sidecar_path(digest)).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(sidecar) => Some(sidecar),
            Err(e) => {
                log::warn!("Ignoring unreadable cache sidecar for {}: {}", digest, e);
                None
            }
        }
    }

    // ========================================================================
    // STORE
    // ========================================================================

    /// Write bytes for a key and make them visible atomically.
    /// `format` is the encoding of the bytes being stored.
    pub async fn store(
        &self,
        key: &CacheKey,
        source: CacheSource,
        format: &MimeFormat,
    ) -> ResolveResult<CacheEntry> {
        let digest = key.digest();
        let shard = self.dir.shard_dir(&digest);

        tokio::fs::create_dir_all(&shard)
            .await
            .map_err(|e| write_failed(key, &shard, e))?;

        let temp = self.dir.temp_path(&digest);
        let size_bytes = match write_temp(&temp, &source).await {
            Ok(size_bytes) => size_bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(write_failed(key, &temp, e));
            }
        };

        let entry = CacheEntry {
            key: key.clone(),
            path: self.data_path(key),
            format: format.clone(),
            written_at: Utc::now(),
            size_bytes,
        };

        // The Native slot cannot report its format without the sidecar
        if let Err(e) = self.write_sidecar(&digest, &entry).await {
            if key.slot == FormatSlot::Native {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(write_failed(key, &self.dir.sidecar_path(&digest), e));
            }
            log::warn!("Failed to write cache sidecar for {}: {}", key, e);
        }

        if let Err(e) = tokio::fs::rename(&temp, &entry.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(write_failed(key, &entry.path, e));
        }

        log::debug!("Cached {} at {:?} ({} bytes)", key, entry.path, entry.size_bytes);
        Ok(entry)
    }

    async fn write_sidecar(&self, digest: &str, entry: &CacheEntry) -> std::io::Result<()> {
        let sidecar = Sidecar {
            key: entry.key.clone(),
            format: entry.format.clone(),
            written_at: entry.written_at,
            size_bytes: entry.size_bytes,
        };
        let raw = serde_json::to_vec_pretty(&sidecar)?;

        let temp = self.dir.temp_path(digest);
        if let Err(e) = write_synced(&temp, &raw).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }
        tokio::fs::rename(&temp, self.dir.sidecar_path(digest)).await
    }

    // ========================================================================
    // INVALIDATION & LISTING
    // ========================================================================

    /// Remove the entry for a key. Returns whether anything was removed.
    pub async fn invalidate(&self, key: &CacheKey) -> ResolveResult<bool> {
        let path = self.data_path(key);

        let removed = match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(write_failed(key, &path, e)),
        };

        let _ = tokio::fs::remove_file(self.dir.sidecar_path(&key.digest())).await;

        if removed {
            log::info!("Invalidated cache entry {}", key);
        }
        Ok(removed)
    }

    /// Every entry that has a readable sidecar and a data file
    pub async fn entries(&self) -> ResolveResult<Vec<CacheEntry>> {
        let mut result = Vec::new();

        let mut shards = match tokio::fs::read_dir(self.dir.root()).await {
            Ok(shards) => shards,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(result),
            Err(e) => {
                return Err(ResolutionError::CacheWriteFailed(format!(
                    "Failed to list cache directory {:?}: {}",
                    self.dir.root(),
                    e
                )))
            }
        };

        while let Ok(Some(shard)) = shards.next_entry().await {
            let Ok(mut files) = tokio::fs::read_dir(shard.path()).await else {
                continue;
            };

            while let Ok(Some(file)) = files.next_entry().await {
                let name = file.file_name();
                let name = name.to_string_lossy();
                let Some(digest) = name.strip_suffix(".json") else {
                    continue;
                };

                let Some(sidecar) = self.read_sidecar(digest).await else {
                    continue;
                };
                if let Some(entry) = self.lookup(&sidecar.key).await? {
                    result.push(entry);
                }
            }
        }

        Ok(result)
    }

    /// Remove every entry belonging to an asset
    pub async fn invalidate_asset(&self, asset_id: &str) -> ResolveResult<usize> {
        let mut removed = 0;
        for entry in self.entries().await? {
            if entry.key.asset_id == asset_id && self.invalidate(&entry.key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Fill `temp` from `source`, synced to disk. Returns the byte count.
async fn write_temp(temp: &Path, source: &CacheSource) -> std::io::Result<u64> {
    match source {
        CacheSource::Bytes(bytes) => {
            write_synced(temp, bytes).await?;
            Ok(bytes.len() as u64)
        }
        CacheSource::File(source_path) => {
            let copied = tokio::fs::copy(source_path, temp).await?;
            tokio::fs::File::open(temp).await?.sync_all().await?;
            Ok(copied)
        }
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

fn write_failed(key: &CacheKey, path: &Path, err: std::io::Error) -> ResolutionError {
    ResolutionError::CacheWriteFailed(format!("{} at {:?}: {}", key, path, err))
}
