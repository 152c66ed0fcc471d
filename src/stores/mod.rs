// src/stores/mod.rs
//
// Asset Stores - the resolver's only I/O boundary towards media sources

pub mod asset_store;
pub mod directory_store;
pub mod http_store;

pub use asset_store::{
    AssetStore, ExportedAsset, IndexedAsset, LocalIndexedStore, RemoteBackedStore,
    StoreCapability,
};
pub use directory_store::DirectoryIndexedStore;
pub use http_store::HttpRemoteStore;
