// src/stores/asset_store.rs
//
// Asset Store Contracts
//
// The resolver talks to exactly two kinds of backing store:
// - LocalIndexedStore: index-backed, may expose the original path and its
//   native format directly.
// - RemoteBackedStore: never exposes originals; bytes only through an
//   explicit, possibly network-bound export.
//
// RULES:
// - Stores are the only I/O boundary besides the cache directory
// - The variant is picked once per context (AssetStore), never per call
// - Unknown ids are Err(NotFound); known ids without a path are Ok(None)

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::{AssetDescriptor, MimeFormat};
use crate::error::ResolveResult;

/// Original file exposed by a local index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedAsset {
    pub path: PathBuf,
    pub native_format: MimeFormat,
}

/// Raw bytes produced by an export, in their source encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedAsset {
    pub bytes: Vec<u8>,
    pub format: MimeFormat,
}

#[async_trait]
pub trait LocalIndexedStore: Send + Sync {
    /// Fast index lookup of the original file
    async fn query_path(&self, asset: &AssetDescriptor) -> ResolveResult<Option<IndexedAsset>>;

    /// Read the original bytes so they can be converted
    async fn load_original(&self, asset: &AssetDescriptor) -> ResolveResult<ExportedAsset>;
}

#[async_trait]
pub trait RemoteBackedStore: Send + Sync {
    /// Previously materialized copy held by the store itself. Never touches
    /// the remote source.
    async fn query_cached_path(&self, _asset: &AssetDescriptor) -> ResolveResult<Option<PathBuf>> {
        Ok(None)
    }

    /// Native format, if known from metadata alone
    async fn native_format(&self, _asset: &AssetDescriptor) -> ResolveResult<Option<MimeFormat>> {
        Ok(None)
    }

    /// Fetch the original bytes. Expensive and may fail transiently.
    async fn export(&self, asset: &AssetDescriptor) -> ResolveResult<ExportedAsset>;
}

/// Capability flag of the store backing a resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCapability {
    LocalIndexed,
    RemoteBacked,
}

impl std::fmt::Display for StoreCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreCapability::LocalIndexed => write!(f, "local_indexed"),
            StoreCapability::RemoteBacked => write!(f, "remote_backed"),
        }
    }
}

/// The store a resolver is bound to
#[derive(Clone)]
pub enum AssetStore {
    LocalIndexed(Arc<dyn LocalIndexedStore>),
    RemoteBacked(Arc<dyn RemoteBackedStore>),
}

impl AssetStore {
    pub fn local(store: impl LocalIndexedStore + 'static) -> Self {
        AssetStore::LocalIndexed(Arc::new(store))
    }

    pub fn remote(store: impl RemoteBackedStore + 'static) -> Self {
        AssetStore::RemoteBacked(Arc::new(store))
    }

    pub fn capability(&self) -> StoreCapability {
        match self {
            AssetStore::LocalIndexed(_) => StoreCapability::LocalIndexed,
            AssetStore::RemoteBacked(_) => StoreCapability::RemoteBacked,
        }
    }

    /// Obtain original bytes through whichever export the variant offers
    pub async fn fetch_original(&self, asset: &AssetDescriptor) -> ResolveResult<ExportedAsset> {
        match self {
            AssetStore::LocalIndexed(store) => store.load_original(asset).await,
            AssetStore::RemoteBacked(store) => store.export(asset).await,
        }
    }
}

impl std::fmt::Debug for AssetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AssetStore").field(&self.capability()).finish()
    }
}
