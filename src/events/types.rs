// src/events/types.rs
//
// All resolution events in the system.
// Each event represents an immutable fact that has already occurred.
//
// CRITICAL RULES:
// - Events are facts, not commands
// - Events are immutable
// - Events carry only the data needed to react
// - No business logic in event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::{CacheKey, MimeFormat};

/// Trait that all domain events must implement
pub trait DomainEvent: std::fmt::Debug + Clone {
    /// Unique identifier for this event instance
    fn event_id(&self) -> Uuid;

    /// When this event occurred
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Human-readable event type name
    fn event_type(&self) -> &'static str;
}

// ============================================================================
// RESOLUTION EVENTS
// ============================================================================

/// Emitted when a request was answered without entering the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPathResolved {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub asset_id: String,
    pub rule: String, // "direct_lookup", "existing_local_file", "cached_conversion"
    pub path: PathBuf,
}

impl AssetPathResolved {
    pub fn new(asset_id: String, rule: &str, path: PathBuf) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            asset_id,
            rule: rule.to_string(),
            path,
        }
    }
}

impl DomainEvent for AssetPathResolved {
    fn event_id(&self) -> Uuid { self.event_id }
    fn occurred_at(&self) -> DateTime<Utc> { self.occurred_at }
    fn event_type(&self) -> &'static str { "AssetPathResolved" }
}

/// Emitted by the Leader once the requested representation is materialized
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMaterialized {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub key: CacheKey,
    pub path: PathBuf,
    pub format: MimeFormat,
    pub converted: bool,
}

impl AssetMaterialized {
    pub fn new(key: CacheKey, path: PathBuf, format: MimeFormat, converted: bool) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            key,
            path,
            format,
            converted,
        }
    }
}

impl DomainEvent for AssetMaterialized {
    fn event_id(&self) -> Uuid { self.event_id }
    fn occurred_at(&self) -> DateTime<Utc> { self.occurred_at }
    fn event_type(&self) -> &'static str { "AssetMaterialized" }
}

/// Emitted once per failed `resolve` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionFailed {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub asset_id: String,
    pub error_kind: String,
    pub message: String,
}

impl ResolutionFailed {
    pub fn new(asset_id: String, error_kind: &str, message: String) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            asset_id,
            error_kind: error_kind.to_string(),
            message,
        }
    }
}

impl DomainEvent for ResolutionFailed {
    fn event_id(&self) -> Uuid { self.event_id }
    fn occurred_at(&self) -> DateTime<Utc> { self.occurred_at }
    fn event_type(&self) -> &'static str { "ResolutionFailed" }
}

/// Emitted whenever a complete file becomes visible in the conversion cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionCacheWritten {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub key: CacheKey,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl ConversionCacheWritten {
    pub fn new(key: CacheKey, path: PathBuf, size_bytes: u64) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            key,
            path,
            size_bytes,
        }
    }
}

impl DomainEvent for ConversionCacheWritten {
    fn event_id(&self) -> Uuid { self.event_id }
    fn occurred_at(&self) -> DateTime<Utc> { self.occurred_at }
    fn event_type(&self) -> &'static str { "ConversionCacheWritten" }
}
