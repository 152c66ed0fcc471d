// src/error/types.rs
use crate::domain::DomainError;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the resolution engine.
///
/// `Clone` because a single Leader outcome is fanned out to every Follower
/// waiting on the same cache key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Cache write failed: {0}")]
    CacheWriteFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Operation cancelled before it settled")]
    Cancelled,
}

impl ResolutionError {
    /// Whether a caller may reasonably retry the same request later.
    ///
    /// `NotFound`, `ConversionFailed` and `InvalidRequest` are deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResolutionError::ExportFailed(_)
                | ResolutionError::CacheWriteFailed(_)
                | ResolutionError::Cancelled
        )
    }

    /// Short stable name of the error kind, used in events and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ResolutionError::NotFound(_) => "not_found",
            ResolutionError::ExportFailed(_) => "export_failed",
            ResolutionError::ConversionFailed(_) => "conversion_failed",
            ResolutionError::CacheWriteFailed(_) => "cache_write_failed",
            ResolutionError::InvalidRequest(_) => "invalid_request",
            ResolutionError::Cancelled => "cancelled",
        }
    }
}

impl Serialize for ResolutionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<DomainError> for ResolutionError {
    fn from(err: DomainError) -> Self {
        ResolutionError::InvalidRequest(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ResolutionError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            ResolutionError::Cancelled
        } else {
            ResolutionError::ConversionFailed(format!("Conversion task panicked: {}", err))
        }
    }
}

pub type ResolveResult<T> = Result<T, ResolutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ResolutionError::ExportFailed("timeout".to_string()).is_retryable());
        assert!(ResolutionError::CacheWriteFailed("disk full".to_string()).is_retryable());
        assert!(ResolutionError::Cancelled.is_retryable());

        assert!(!ResolutionError::NotFound("img-1".to_string()).is_retryable());
        assert!(!ResolutionError::ConversionFailed("bad data".to_string()).is_retryable());
        assert!(!ResolutionError::InvalidRequest("empty id".to_string()).is_retryable());
    }

    #[test]
    fn test_serializes_as_display_string() {
        let err = ResolutionError::NotFound("img-1".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Asset not found: img-1\"");
    }

    #[test]
    fn test_domain_error_becomes_invalid_request() {
        let err: ResolutionError =
            DomainError::InvariantViolation("Asset id cannot be empty".to_string()).into();
        assert_eq!(err.kind(), "invalid_request");
    }
}
