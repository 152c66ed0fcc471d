// src/stores/http_store.rs
//
// HTTP-backed RemoteBackedStore.
//
// ARCHITECTURE:
// - Originals live behind `{base_url}/{asset id}`
// - Nothing is ever exposed as a path; export downloads the bytes
// - The response Content-Type decides the native format
//
// CRITICAL RULES:
// - 404 → NotFound (deterministic, not retried)
// - Every other transport or status failure → ExportFailed (retryable)
// - Latency is bounded by the client timeout, not by the resolver

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode, Url};
use std::time::Duration;

use super::asset_store::{ExportedAsset, RemoteBackedStore};
use crate::config::ResolverConfig;
use crate::domain::{AssetDescriptor, MimeFormat};
use crate::error::{ResolutionError, ResolveResult};

pub struct HttpRemoteStore {
    base_url: Url,
    http_client: Client,
    auth_token: Option<String>,
}

impl HttpRemoteStore {
    /// Create a store rooted at `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> ResolveResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ResolutionError::InvalidRequest(format!(
                "Invalid remote store URL {:?}: {}",
                base_url, e
            ))
        })?;

        if base_url.cannot_be_a_base() {
            return Err(ResolutionError::InvalidRequest(format!(
                "Remote store URL cannot be a base: {}",
                base_url
            )));
        }

        let http_client = Client::builder().timeout(timeout).build().map_err(|e| {
            ResolutionError::InvalidRequest(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            base_url,
            http_client,
            auth_token: None,
        })
    }

    /// Create a store whose export timeout comes from `config`
    pub fn from_config(base_url: &str, config: &ResolverConfig) -> ResolveResult<Self> {
        config.validate()?;
        Self::new(base_url, config.export_timeout())
    }

    /// Attach a bearer token to every export request
    pub fn with_auth(mut self, token: String) -> Self {
        self.auth_token = Some(token);
        self
    }

    /// URL of an asset's original. The id is pushed as a single,
    /// percent-encoded path segment.
    pub fn asset_url(&self, asset: &AssetDescriptor) -> ResolveResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ResolutionError::InvalidRequest(format!(
                    "Remote store URL cannot be a base: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push(&asset.id);
        Ok(url)
    }

    fn format_from_response(headers: &header::HeaderMap, url: &Url) -> MimeFormat {
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| MimeFormat::parse(value).ok())
            .filter(|format| format.as_str() != "application/octet-stream")
            .or_else(|| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .and_then(|last| last.rsplit_once('.'))
                    .and_then(|(_, ext)| MimeFormat::from_extension(ext))
            })
            .unwrap_or_else(MimeFormat::octet_stream)
    }
}

#[async_trait]
impl RemoteBackedStore for HttpRemoteStore {
    async fn export(&self, asset: &AssetDescriptor) -> ResolveResult<ExportedAsset> {
        let url = self.asset_url(asset)?;
        log::debug!("Exporting {} from {}", asset.id, url);

        let mut request = self.http_client.get(url.clone());
        if let Some(token) = &self.auth_token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ResolutionError::ExportFailed(format!("Export of {} timed out", asset.id))
            } else {
                ResolutionError::ExportFailed(format!(
                    "Export request for {} failed: {}",
                    asset.id, e
                ))
            }
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(ResolutionError::NotFound(asset.id.clone())),
            status if !status.is_success() => {
                return Err(ResolutionError::ExportFailed(format!(
                    "Remote store returned status {} for {}",
                    status, asset.id
                )));
            }
            _ => {}
        }

        let format = Self::format_from_response(response.headers(), &url);

        let bytes = response.bytes().await.map_err(|e| {
            ResolutionError::ExportFailed(format!(
                "Failed to read export body for {}: {}",
                asset.id, e
            ))
        })?;

        Ok(ExportedAsset {
            bytes: bytes.to_vec(),
            format,
        })
    }
}
