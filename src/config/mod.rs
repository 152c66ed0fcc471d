// src/config/mod.rs
//
// Resolver configuration.
//
// Every field has a default, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ResolutionError, ResolveResult};
use crate::infrastructure::CacheDirectory;

/// Whether failed remote exports are remembered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NegativeCachePolicy {
    /// Every request may try the remote again
    Disabled,

    /// Fail fast with the remembered error for a while
    RememberFor { seconds: u64 },
}

impl Default for NegativeCachePolicy {
    fn default() -> Self {
        NegativeCachePolicy::Disabled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Cache root; the platform cache directory when unset
    pub cache_dir: Option<PathBuf>,

    pub jpeg_quality: u8,

    /// Per-request timeout for network-backed stores
    pub export_timeout_secs: u64,

    pub negative_cache: NegativeCachePolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            jpeg_quality: 90,
            export_timeout_secs: 30,
            negative_cache: NegativeCachePolicy::Disabled,
        }
    }
}

impl ResolverConfig {
    pub fn from_json_str(raw: &str) -> ResolveResult<Self> {
        let config: Self = serde_json::from_str(raw).map_err(|e| {
            ResolutionError::InvalidRequest(format!("Invalid resolver config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ResolveResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ResolutionError::InvalidRequest(format!(
                "Failed to read resolver config {:?}: {}",
                path, e
            ))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> ResolveResult<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ResolutionError::InvalidRequest(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.export_timeout_secs == 0 {
            return Err(ResolutionError::InvalidRequest(
                "export_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }

    /// Open the configured cache directory (or the platform default)
    pub fn open_cache_directory(&self) -> ResolveResult<CacheDirectory> {
        match &self.cache_dir {
            Some(dir) => CacheDirectory::open(dir),
            None => CacheDirectory::open(CacheDirectory::default_location()?),
        }
    }
}
