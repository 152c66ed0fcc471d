// src/domain/resolution/mod.rs
//
// Resolution Domain
//
// Value objects describing requests, results and cache slots, plus the pure
// decision table that maps cheap lookup facts to a resolution rule.

pub mod rules;
pub mod value_objects;

pub use rules::{decide, DirectPath, LookupFacts, PathOrigin, ResolutionRule};
pub use value_objects::{
    CacheEntry, CacheKey, FormatSlot, ResolutionRequest, ResolutionResult,
};
