// src/stores/directory_store.rs
//
// Directory-backed LocalIndexedStore.
//
// Keeps an in-memory index of asset id → original file. Ids come from
// explicit registration or from a recursive scan, where the id is the path
// relative to the scanned root with `/` separators.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use super::asset_store::{ExportedAsset, IndexedAsset, LocalIndexedStore};
use crate::domain::{AssetDescriptor, AssetKind, MimeFormat};
use crate::error::{ResolutionError, ResolveResult};

#[derive(Debug, Default)]
pub struct DirectoryIndexedStore {
    index: RwLock<HashMap<String, PathBuf>>,
}

impl DirectoryIndexedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-point) a single asset
    pub fn register(&self, id: impl Into<String>, path: impl Into<PathBuf>) {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        index.insert(id.into(), path.into());
    }

    /// Forget an asset. Returns whether it was indexed.
    pub fn unregister(&self, id: &str) -> bool {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        index.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.index.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Walk `root` and index every image or video file found.
    /// Returns the descriptors of the newly indexed assets.
    pub fn scan(&self, root: &Path) -> ResolveResult<Vec<AssetDescriptor>> {
        if !root.is_dir() {
            return Err(ResolutionError::InvalidRequest(format!(
                "Scan root is not a directory: {:?}",
                root
            )));
        }

        let mut found = Vec::new();

        for entry in walkdir::WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e: Result<walkdir::DirEntry, walkdir::Error>| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let kind = match MimeFormat::from_path(path) {
                Some(format) if format.is_image() => AssetKind::Image,
                Some(format) if format.is_video() => AssetKind::Video,
                _ => continue,
            };

            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let id = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            self.register(id.clone(), path.to_path_buf());
            found.push(AssetDescriptor::new(id, kind));
        }

        log::info!("Indexed {} assets under {:?}", found.len(), root);
        Ok(found)
    }

    fn lookup(&self, asset: &AssetDescriptor) -> ResolveResult<PathBuf> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        index
            .get(&asset.id)
            .cloned()
            .ok_or_else(|| ResolutionError::NotFound(asset.id.clone()))
    }
}

#[async_trait]
impl LocalIndexedStore for DirectoryIndexedStore {
    async fn query_path(&self, asset: &AssetDescriptor) -> ResolveResult<Option<IndexedAsset>> {
        let path = self.lookup(asset)?;

        // Indexed but gone from disk: known asset, no path to expose
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            log::warn!("Indexed original for {} is missing: {:?}", asset.id, path);
            return Ok(None);
        }

        let native_format = MimeFormat::from_path(&path).unwrap_or_else(MimeFormat::octet_stream);
        Ok(Some(IndexedAsset {
            path,
            native_format,
        }))
    }

    async fn load_original(&self, asset: &AssetDescriptor) -> ResolveResult<ExportedAsset> {
        let path = self.lookup(asset)?;

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            ResolutionError::ExportFailed(format!("Failed to read original {:?}: {}", path, e))
        })?;

        Ok(ExportedAsset {
            bytes,
            format: MimeFormat::from_path(&path).unwrap_or_else(MimeFormat::octet_stream),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_query_registered_asset() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("IMG_0001.JPG");
        fs::write(&original, b"jpeg bytes").unwrap();

        let store = DirectoryIndexedStore::new();
        store.register("img-1", &original);

        let indexed = store
            .query_path(&AssetDescriptor::image("img-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(indexed.path, original);
        assert_eq!(indexed.native_format, MimeFormat::jpeg());
    }

    #[tokio::test]
    async fn test_unknown_asset_is_not_found() {
        let store = DirectoryIndexedStore::new();
        let result = store.query_path(&AssetDescriptor::image("nope")).await;
        assert_eq!(result, Err(ResolutionError::NotFound("nope".to_string())));
    }

    #[tokio::test]
    async fn test_missing_original_exposes_no_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryIndexedStore::new();
        store.register("img-1", dir.path().join("deleted.jpg"));

        let asset = AssetDescriptor::image("img-1");
        assert_eq!(store.query_path(&asset).await.unwrap(), None);
        assert!(matches!(
            store.load_original(&asset).await,
            Err(ResolutionError::ExportFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_load_original_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("clip.mov");
        fs::write(&original, b"mov bytes").unwrap();

        let store = DirectoryIndexedStore::new();
        store.register("vid-1", &original);

        let exported = store.load_original(&AssetDescriptor::video("vid-1")).await.unwrap();
        assert_eq!(exported.bytes, b"mov bytes");
        assert_eq!(exported.format.as_str(), "video/quicktime");
    }

    #[test]
    fn test_scan_indexes_media_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("2024/trip")).unwrap();
        fs::write(dir.path().join("2024/trip/a.jpg"), b"a").unwrap();
        fs::write(dir.path().join("2024/b.mp4"), b"b").unwrap();
        fs::write(dir.path().join("notes.txt"), b"c").unwrap();

        let store = DirectoryIndexedStore::new();
        let mut found = store.scan(dir.path()).unwrap();
        found.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(
            found,
            vec![
                AssetDescriptor::video("2024/b.mp4"),
                AssetDescriptor::image("2024/trip/a.jpg"),
            ]
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_scan_rejects_non_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.jpg");
        fs::write(&file, b"x").unwrap();

        let store = DirectoryIndexedStore::new();
        assert!(store.scan(&file).is_err());
    }
}
