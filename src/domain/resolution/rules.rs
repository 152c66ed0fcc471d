// src/domain/resolution/rules.rs
//
// Resolution decision table.
//
// The resolver first gathers every cheap fact it can (index path, cached
// copies, native format hint) into a LookupFacts, then asks `decide` which
// rule applies. `decide` is pure: no I/O, same facts → same rule.

use std::path::PathBuf;

use super::value_objects::{CacheEntry, CacheKey, FormatSlot, ResolutionRequest, ResolutionResult};
use crate::domain::format::MimeFormat;

/// Where a directly usable path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOrigin {
    /// The store's own index exposes the original file
    StoreIndex,

    /// A native copy previously materialized into a cache
    Cache,
}

/// A path that can be handed out without any export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectPath {
    pub path: PathBuf,
    pub format: Option<MimeFormat>,
    pub origin: PathOrigin,
}

/// Everything learned from cheap lookups, before any expensive work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupFacts {
    /// Original or cached native path, if any
    pub direct: Option<DirectPath>,

    /// Native format, when the store can tell without exporting
    pub native_format: Option<MimeFormat>,

    /// Existing cache entry for the explicitly requested format
    pub converted: Option<CacheEntry>,
}

impl LookupFacts {
    fn native_format(&self) -> Option<&MimeFormat> {
        self.native_format
            .as_ref()
            .or_else(|| self.direct.as_ref().and_then(|d| d.format.as_ref()))
    }
}

/// The rule chosen for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionRule {
    /// Hand out an existing path as-is
    DirectLookup { path: PathBuf },

    /// An existing file already satisfies a guaranteed-local request
    ExistingLocalFile { path: PathBuf, format: MimeFormat },

    /// A converted copy for the requested format is already cached
    CachedConversion { path: PathBuf, format: MimeFormat },

    /// Expensive path: export (and convert) through the coordinator
    Materialize { key: CacheKey },

    /// Nothing cheap exists and the caller did not ask for an export
    Unavailable,
}

impl ResolutionRule {
    pub fn name(&self) -> &'static str {
        match self {
            ResolutionRule::DirectLookup { .. } => "direct_lookup",
            ResolutionRule::ExistingLocalFile { .. } => "existing_local_file",
            ResolutionRule::CachedConversion { .. } => "cached_conversion",
            ResolutionRule::Materialize { .. } => "materialize",
            ResolutionRule::Unavailable => "unavailable",
        }
    }

    /// Final result for rules that need no further work
    pub fn immediate_result(&self) -> Option<ResolutionResult> {
        match self {
            ResolutionRule::DirectLookup { path } => {
                Some(ResolutionResult::PathOnly { path: path.clone() })
            }
            ResolutionRule::ExistingLocalFile { path, format }
            | ResolutionRule::CachedConversion { path, format } => {
                Some(ResolutionResult::ExportedFile {
                    path: path.clone(),
                    format: format.clone(),
                })
            }
            ResolutionRule::Materialize { .. } | ResolutionRule::Unavailable => None,
        }
    }
}

/// Pick the cheapest rule that satisfies the request
pub fn decide(request: &ResolutionRequest, facts: &LookupFacts) -> ResolutionRule {
    let asset_id = &request.asset.id;

    match &request.requested_format {
        // No format: any native representation will do. Never converts.
        None => match (&facts.direct, request.require_local_file) {
            (Some(direct), false) => ResolutionRule::DirectLookup {
                path: direct.path.clone(),
            },
            (None, false) => ResolutionRule::Unavailable,
            (Some(direct), true) => match facts.native_format() {
                Some(format) => ResolutionRule::ExistingLocalFile {
                    path: direct.path.clone(),
                    format: format.clone(),
                },
                None => ResolutionRule::Materialize {
                    key: CacheKey::native(asset_id.clone()),
                },
            },
            (None, true) => ResolutionRule::Materialize {
                key: CacheKey::native(asset_id.clone()),
            },
        },

        Some(requested) => {
            // Native format already matches: converting to itself is skipped
            if facts.native_format() == Some(requested) {
                return match &facts.direct {
                    Some(direct) if request.require_local_file => {
                        ResolutionRule::ExistingLocalFile {
                            path: direct.path.clone(),
                            format: requested.clone(),
                        }
                    }
                    Some(direct) => ResolutionRule::DirectLookup {
                        path: direct.path.clone(),
                    },
                    None => ResolutionRule::Materialize {
                        key: CacheKey::native(asset_id.clone()),
                    },
                };
            }

            if let Some(entry) = &facts.converted {
                return ResolutionRule::CachedConversion {
                    path: entry.path.clone(),
                    format: entry.format.clone(),
                };
            }

            ResolutionRule::Materialize {
                key: CacheKey::new(asset_id.clone(), FormatSlot::Explicit(requested.clone())),
            }
        }
    }
}
