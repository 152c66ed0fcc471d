// src/domain/resolution/value_objects.rs
//
// Resolution Value Objects
//
// Pure, immutable data describing what a caller asks for and what the
// resolver hands back. No I/O happens here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::domain::asset::AssetDescriptor;
use crate::domain::format::MimeFormat;

// ============================================================================
// REQUEST
// ============================================================================

/// One resolution call.
///
/// `requested_format == None` means the native format is acceptable.
/// `require_local_file` forces a guaranteed-present file even when a bare
/// path would otherwise do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub asset: AssetDescriptor,
    pub requested_format: Option<MimeFormat>,
    pub require_local_file: bool,
}

impl ResolutionRequest {
    /// Cheapest request: any path in the native format
    pub fn path(asset: AssetDescriptor) -> Self {
        Self {
            asset,
            requested_format: None,
            require_local_file: false,
        }
    }

    pub fn with_format(mut self, format: MimeFormat) -> Self {
        self.requested_format = Some(format);
        self
    }

    pub fn require_local_file(mut self) -> Self {
        self.require_local_file = true;
        self
    }

    /// The cache slot this request would materialize into
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(
            self.asset.id.clone(),
            FormatSlot::from_requested(self.requested_format.clone()),
        )
    }
}

// ============================================================================
// RESULT
// ============================================================================

/// A successful resolution.
///
/// `PathOnly` is never produced for a request with `require_local_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolutionResult {
    /// A path the store already exposes, no work performed
    PathOnly { path: PathBuf },

    /// A materialized local file in a known format
    ExportedFile { path: PathBuf, format: MimeFormat },
}

impl ResolutionResult {
    pub fn path(&self) -> &PathBuf {
        match self {
            ResolutionResult::PathOnly { path } => path,
            ResolutionResult::ExportedFile { path, .. } => path,
        }
    }

    pub fn format(&self) -> Option<&MimeFormat> {
        match self {
            ResolutionResult::PathOnly { .. } => None,
            ResolutionResult::ExportedFile { format, .. } => Some(format),
        }
    }

    pub fn is_path_only(&self) -> bool {
        matches!(self, ResolutionResult::PathOnly { .. })
    }

    pub fn is_exported_file(&self) -> bool {
        matches!(self, ResolutionResult::ExportedFile { .. })
    }
}

// ============================================================================
// CACHE KEY
// ============================================================================

/// Which representation of an asset a cache slot holds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "slot", content = "format", rename_all = "snake_case")]
pub enum FormatSlot {
    /// The asset's original encoding, whatever it is
    Native,

    /// A specific encoding the caller asked for
    Explicit(MimeFormat),
}

impl FormatSlot {
    pub fn from_requested(format: Option<MimeFormat>) -> Self {
        match format {
            Some(format) => FormatSlot::Explicit(format),
            None => FormatSlot::Native,
        }
    }

    pub fn explicit_format(&self) -> Option<&MimeFormat> {
        match self {
            FormatSlot::Native => None,
            FormatSlot::Explicit(format) => Some(format),
        }
    }
}

impl std::fmt::Display for FormatSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatSlot::Native => write!(f, "native"),
            FormatSlot::Explicit(format) => write!(f, "{}", format),
        }
    }
}

/// `(asset id, format slot)`: identifies one cache slot and one
/// coordination slot. Maps to at most one valid cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub asset_id: String,
    pub slot: FormatSlot,
}

impl CacheKey {
    pub fn new(asset_id: impl Into<String>, slot: FormatSlot) -> Self {
        Self {
            asset_id: asset_id.into(),
            slot,
        }
    }

    pub fn native(asset_id: impl Into<String>) -> Self {
        Self::new(asset_id, FormatSlot::Native)
    }

    pub fn explicit(asset_id: impl Into<String>, format: MimeFormat) -> Self {
        Self::new(asset_id, FormatSlot::Explicit(format))
    }

    /// Deterministic SHA-256 hex digest used to name the cache file.
    /// The separator byte keeps `("ab", "c")` and `("a", "bc")` apart.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.asset_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.slot.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.asset_id, self.slot)
    }
}

// ============================================================================
// CACHE ENTRY
// ============================================================================

/// A fully materialized file in the conversion cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub path: PathBuf,

    /// Encoding of the bytes on disk
    pub format: MimeFormat,

    pub written_at: DateTime<Utc>,
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = ResolutionRequest::path(AssetDescriptor::image("img-1"))
            .with_format(MimeFormat::heic())
            .require_local_file();

        assert_eq!(request.requested_format, Some(MimeFormat::heic()));
        assert!(request.require_local_file);
        assert_eq!(request.cache_key(), CacheKey::explicit("img-1", MimeFormat::heic()));
    }

    #[test]
    fn test_native_and_explicit_keys_differ() {
        let native = CacheKey::native("img-1");
        let jpeg = CacheKey::explicit("img-1", MimeFormat::jpeg());

        assert_ne!(native, jpeg);
        assert_ne!(native.digest(), jpeg.digest());
    }

    #[test]
    fn test_digest_is_deterministic() {
        let a = CacheKey::explicit("img-1", MimeFormat::parse("image/jpg").unwrap());
        let b = CacheKey::explicit("img-1", MimeFormat::jpeg());

        // Aliases normalize before hashing
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_digest_separates_id_and_slot() {
        let a = CacheKey::native("a");
        let b = CacheKey::native("a\0native");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_result_accessors() {
        let path_only = ResolutionResult::PathOnly {
            path: PathBuf::from("/photos/img-1.jpg"),
        };
        assert!(path_only.is_path_only());
        assert!(path_only.format().is_none());

        let exported = ResolutionResult::ExportedFile {
            path: PathBuf::from("/cache/ab/abcd.heic"),
            format: MimeFormat::heic(),
        };
        assert!(exported.is_exported_file());
        assert_eq!(exported.format(), Some(&MimeFormat::heic()));
        assert_eq!(exported.path(), &PathBuf::from("/cache/ab/abcd.heic"));
    }
}
