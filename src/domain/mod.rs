// src/domain/mod.rs
//
// Domain Root - The Single Source of Truth for Domain API
//
// All other modules import from `crate::domain::*`

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod asset;
pub mod format;
pub mod resolution;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Asset Domain
pub use asset::{validate_asset, AssetDescriptor, AssetKind};

// Formats
pub use format::MimeFormat;

// Resolution Domain
pub use resolution::{
    decide, CacheEntry, CacheKey, DirectPath, FormatSlot, LookupFacts, PathOrigin,
    ResolutionRequest, ResolutionResult, ResolutionRule,
};

// ============================================================================
// DOMAIN ERROR TYPES
// ============================================================================

use thiserror::Error;

/// Domain-level errors
/// These represent violations of invariants on incoming values
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Domain result type
pub type DomainResult<T> = Result<T, DomainError>;
