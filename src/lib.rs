// src/lib.rs
// MediaResolver - path resolution and conversion cache for photo/video assets
//
// Architecture:
// - Domain-centric: requests, cache keys and the decision table are pure values
// - Explicit: the backing store and cache directory are handed in, never global
// - Coordinated: expensive export/convert work runs once per cache key
// - Observable: every outcome is logged and emitted on the event bus

pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod infrastructure;
pub mod services;
pub mod stores;

// ============================================================================
// PUBLIC API - Domain
// ============================================================================

pub use domain::{
    decide,
    validate_asset,
    AssetDescriptor,
    AssetKind,
    CacheEntry,
    CacheKey,
    DomainError,
    DomainResult,
    FormatSlot,
    LookupFacts,
    MimeFormat,
    ResolutionRequest,
    ResolutionResult,
    ResolutionRule,
};

// ============================================================================
// PUBLIC API - Errors & Configuration
// ============================================================================

pub use error::{ResolutionError, ResolveResult};

pub use config::{NegativeCachePolicy, ResolverConfig};

// ============================================================================
// PUBLIC API - Events
// ============================================================================

pub use events::{
    create_event_bus,
    AssetMaterialized,
    AssetPathResolved,
    ConversionCacheWritten,
    DomainEvent,
    EventBus,
    EventLogEntry,
    ResolutionFailed,
};

// ============================================================================
// PUBLIC API - Stores
// ============================================================================

pub use stores::{
    AssetStore,
    DirectoryIndexedStore,
    ExportedAsset,
    HttpRemoteStore,
    IndexedAsset,
    LocalIndexedStore,
    RemoteBackedStore,
    StoreCapability,
};

// ============================================================================
// PUBLIC API - Services & Infrastructure
// ============================================================================

pub use infrastructure::CacheDirectory;

pub use services::{
    CacheSource,
    ConversionCache,
    ConversionEngine,
    ImageConversionEngine,
    PathResolver,
    RequestCoordinator,
    ResolverStats,
};
