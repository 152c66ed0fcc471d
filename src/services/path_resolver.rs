// src/services/path_resolver.rs
//
// Path Resolver - the public entry point of the engine
//
// Turns a ResolutionRequest into a usable on-disk path, doing the least
// amount of work that satisfies the request.
//
// CRITICAL RULES:
// - Cheap lookups first; they never enter the RequestCoordinator
// - A request without a format never triggers a conversion
// - A native format match never converts and never rewrites the cache
// - Export/convert/write for a key happens at most once at a time
// - The Leader re-checks the cache inside the coordinated section
// - Failures are returned, logged and emitted, never cached (unless the
//   negative cache policy says otherwise for remote export failures)

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::conversion_cache::{CacheSource, ConversionCache};
use super::conversion_engine::{ConversionEngine, ImageConversionEngine};
use super::negative_cache::NegativeCache;
use super::request_coordinator::{RequestCoordinator, Role};
use crate::config::{NegativeCachePolicy, ResolverConfig};
use crate::domain::{
    decide, validate_asset, AssetDescriptor, CacheEntry, CacheKey, DirectPath, FormatSlot,
    LookupFacts, MimeFormat, PathOrigin, ResolutionRequest, ResolutionResult, ResolutionRule,
};
use crate::error::ResolveResult;
use crate::events::{
    AssetMaterialized, AssetPathResolved, ConversionCacheWritten, EventBus, ResolutionFailed,
};
use crate::stores::{AssetStore, ExportedAsset, StoreCapability};

// ============================================================================
// STATISTICS
// ============================================================================

/// Running counters, shared with in-flight Leader tasks
#[derive(Debug, Default)]
struct ResolverCounters {
    direct_lookups: AtomicU64,
    cache_hits: AtomicU64,
    unavailable: AtomicU64,
    exports: AtomicU64,
    conversions: AtomicU64,
    cache_writes: AtomicU64,
    joined_in_flight: AtomicU64,
    failures: AtomicU64,
}

impl ResolverCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of the resolver counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub direct_lookups: u64,
    pub cache_hits: u64,
    pub unavailable: u64,
    pub exports: u64,
    pub conversions: u64,
    pub cache_writes: u64,
    pub joined_in_flight: u64,
    pub failures: u64,
}

// ============================================================================
// PATH RESOLVER
// ============================================================================

pub struct PathResolver {
    store: AssetStore,
    cache: Arc<ConversionCache>,
    engine: Arc<dyn ConversionEngine>,
    coordinator: RequestCoordinator<CacheEntry>,
    negative_cache: NegativeCache,
    event_bus: Arc<EventBus>,
    counters: Arc<ResolverCounters>,
}

impl PathResolver {
    pub fn new(
        store: AssetStore,
        cache: Arc<ConversionCache>,
        engine: Arc<dyn ConversionEngine>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            cache,
            engine,
            coordinator: RequestCoordinator::new(),
            negative_cache: NegativeCache::new(NegativeCachePolicy::Disabled),
            event_bus,
            counters: Arc::new(ResolverCounters::default()),
        }
    }

    /// Replace the negative cache policy (disabled by default)
    pub fn with_negative_cache(mut self, policy: NegativeCachePolicy) -> Self {
        self.negative_cache = NegativeCache::new(policy);
        self
    }

    /// Build a resolver with the reference conversion engine and a fresh
    /// event bus, all driven by `config`.
    pub fn from_config(store: AssetStore, config: &ResolverConfig) -> ResolveResult<Self> {
        config.validate()?;

        let cache = Arc::new(ConversionCache::new(config.open_cache_directory()?));
        let engine: Arc<dyn ConversionEngine> =
            Arc::new(ImageConversionEngine::new(config.jpeg_quality));

        Ok(Self::new(store, cache, engine, Arc::new(EventBus::new()))
            .with_negative_cache(config.negative_cache))
    }

    pub fn capability(&self) -> StoreCapability {
        self.store.capability()
    }

    pub fn cache(&self) -> &Arc<ConversionCache> {
        &self.cache
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn in_flight_count(&self) -> usize {
        self.coordinator.in_flight_count()
    }

    pub fn stats(&self) -> ResolverStats {
        let c = &self.counters;
        ResolverStats {
            direct_lookups: c.direct_lookups.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            unavailable: c.unavailable.load(Ordering::Relaxed),
            exports: c.exports.load(Ordering::Relaxed),
            conversions: c.conversions.load(Ordering::Relaxed),
            cache_writes: c.cache_writes.load(Ordering::Relaxed),
            joined_in_flight: c.joined_in_flight.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // PUBLIC API
    // ========================================================================

    /// Resolve a request to a path.
    ///
    /// `Ok(None)` means no path exists without an export and the request did
    /// not ask for one (`require_local_file == false`, no format).
    pub async fn resolve(
        &self,
        request: ResolutionRequest,
    ) -> ResolveResult<Option<ResolutionResult>> {
        let outcome = self.resolve_request(&request).await;

        if let Err(e) = &outcome {
            ResolverCounters::bump(&self.counters.failures);
            log::warn!("Resolution of {} failed: {}", request.asset.id, e);
            self.event_bus.emit(ResolutionFailed::new(
                request.asset.id.clone(),
                e.kind(),
                e.to_string(),
            ));
        }

        outcome
    }

    async fn resolve_request(
        &self,
        request: &ResolutionRequest,
    ) -> ResolveResult<Option<ResolutionResult>> {
        validate_asset(&request.asset)?;

        let facts = self.gather_facts(request).await?;
        let rule = decide(request, &facts);

        log::debug!(
            "Resolving {} (format: {:?}, require_local: {}) via {}",
            request.asset.id,
            request.requested_format.as_ref().map(MimeFormat::as_str),
            request.require_local_file,
            rule.name()
        );

        match rule {
            ResolutionRule::Unavailable => {
                ResolverCounters::bump(&self.counters.unavailable);
                Ok(None)
            }
            ResolutionRule::Materialize { key } => self.materialize(request, key).await.map(Some),
            immediate => {
                let counter = match &immediate {
                    ResolutionRule::CachedConversion { .. } => &self.counters.cache_hits,
                    _ => &self.counters.direct_lookups,
                };
                ResolverCounters::bump(counter);

                let result = immediate.immediate_result();
                if let Some(result) = &result {
                    self.event_bus.emit(AssetPathResolved::new(
                        request.asset.id.clone(),
                        immediate.name(),
                        result.path().clone(),
                    ));
                }
                Ok(result)
            }
        }
    }

    // ========================================================================
    // CHEAP LOOKUPS
    // ========================================================================

    /// Gather every fact that costs no export
    async fn gather_facts(&self, request: &ResolutionRequest) -> ResolveResult<LookupFacts> {
        let asset = &request.asset;
        let mut facts = LookupFacts::default();

        match &self.store {
            AssetStore::LocalIndexed(store) => match store.query_path(asset).await? {
                Some(indexed) => {
                    facts.direct = Some(DirectPath {
                        path: indexed.path,
                        format: Some(indexed.native_format.clone()),
                        origin: PathOrigin::StoreIndex,
                    });
                    facts.native_format = Some(indexed.native_format);
                }
                None => facts.direct = self.cached_native(asset).await?,
            },
            AssetStore::RemoteBacked(store) => {
                facts.direct = self.cached_native(asset).await?;

                if facts.direct.is_none() {
                    if let Some(path) = store.query_cached_path(asset).await? {
                        facts.direct = Some(DirectPath {
                            format: MimeFormat::from_path(&path),
                            path,
                            origin: PathOrigin::StoreIndex,
                        });
                    }
                }

                // A format read from an existing copy beats any metadata hint,
                // and the hint is only worth asking for when a format
                // comparison can follow
                let known_format = facts.direct.as_ref().and_then(|d| d.format.as_ref());
                let wants_format = request.requested_format.is_some() || request.require_local_file;
                if known_format.is_none() && wants_format {
                    facts.native_format = store.native_format(asset).await?;
                }
            }
        }

        if let Some(format) = &request.requested_format {
            let key = CacheKey::explicit(asset.id.clone(), format.clone());
            facts.converted = self.cache.lookup(&key).await?;
        }

        Ok(facts)
    }

    async fn cached_native(&self, asset: &AssetDescriptor) -> ResolveResult<Option<DirectPath>> {
        let entry = self.cache.lookup(&CacheKey::native(asset.id.clone())).await?;
        Ok(entry.map(|entry| DirectPath {
            path: entry.path,
            format: Some(entry.format),
            origin: PathOrigin::Cache,
        }))
    }

    // ========================================================================
    // EXPENSIVE PATH
    // ========================================================================

    async fn materialize(
        &self,
        request: &ResolutionRequest,
        key: CacheKey,
    ) -> ResolveResult<ResolutionResult> {
        let entry = self.coordinated(&request.asset, key).await?;

        // The Native slot is picked on a cheap format hint; the exported
        // encoding is what counts
        let mismatched = request
            .requested_format
            .as_ref()
            .filter(|requested| {
                entry.key.slot == FormatSlot::Native && entry.format != **requested
            });
        let entry = match mismatched {
            Some(requested) => {
                log::warn!(
                    "Native copy of {} is {}, not the expected {}; converting",
                    request.asset.id,
                    entry.format,
                    requested
                );
                let explicit = CacheKey::explicit(request.asset.id.clone(), requested.clone());
                self.coordinated(&request.asset, explicit).await?
            }
            None => entry,
        };

        Ok(ResolutionResult::ExportedFile {
            path: entry.path,
            format: entry.format,
        })
    }

    /// Produce the cache entry for `key` through the coordinator
    async fn coordinated(
        &self,
        asset: &AssetDescriptor,
        key: CacheKey,
    ) -> ResolveResult<CacheEntry> {
        let remote = self.store.capability() == StoreCapability::RemoteBacked;

        if remote {
            if let Some(error) = self.negative_cache.check(&key) {
                log::debug!("Failing fast for {}: recent export failure", key);
                return Err(error);
            }
        }

        let job = MaterializeJob {
            asset: asset.clone(),
            key: key.clone(),
            store: self.store.clone(),
            cache: Arc::clone(&self.cache),
            engine: Arc::clone(&self.engine),
            event_bus: Arc::clone(&self.event_bus),
            counters: Arc::clone(&self.counters),
        };

        let coordinated = self.coordinator.run(&key, move || job.run()).await;

        if coordinated.role == Role::Follower {
            ResolverCounters::bump(&self.counters.joined_in_flight);
        }

        match coordinated.outcome {
            Ok(entry) => {
                if remote {
                    self.negative_cache.forget(&key);
                }
                Ok(entry)
            }
            Err(e) => {
                if remote {
                    self.negative_cache.record(&key, &e);
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for PathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathResolver")
            .field("store", &self.store)
            .field("cache_root", &self.cache.directory().root())
            .field("in_flight", &self.coordinator.in_flight_count())
            .finish()
    }
}

// ============================================================================
// LEADER WORK
// ============================================================================

/// Everything the Leader needs, owned so the work can outlive its caller
struct MaterializeJob {
    asset: AssetDescriptor,
    key: CacheKey,
    store: AssetStore,
    cache: Arc<ConversionCache>,
    engine: Arc<dyn ConversionEngine>,
    event_bus: Arc<EventBus>,
    counters: Arc<ResolverCounters>,
}

impl MaterializeJob {
    async fn run(self) -> ResolveResult<CacheEntry> {
        // Another Leader may have finished between the lookups and election
        if let Some(entry) = self.cache.lookup(&self.key).await? {
            log::debug!("{} already cached, skipping export", self.key);
            return Ok(entry);
        }

        if self.key.slot == FormatSlot::Native {
            if let Some((path, format)) = self.store_copy().await? {
                log::debug!("Seeding native slot of {} from {:?}", self.asset.id, path);
                let entry = self
                    .cache
                    .store(&self.key, CacheSource::File(path), &format)
                    .await?;
                return Ok(self.written(entry, false));
            }
        }

        let source = self.load_source().await?;

        let target = match &self.key.slot {
            FormatSlot::Native => source.format.clone(),
            FormatSlot::Explicit(format) => format.clone(),
        };
        let converted = source.format != target;

        let bytes = if converted {
            ResolverCounters::bump(&self.counters.conversions);
            log::info!("Converting {} from {} to {}", self.asset.id, source.format, target);

            let engine = Arc::clone(&self.engine);
            let output = target.clone();
            let input = source.bytes;
            tokio::task::spawn_blocking(move || engine.convert(&input, &output)).await??
        } else {
            source.bytes
        };

        let entry = self
            .cache
            .store(&self.key, CacheSource::Bytes(bytes), &target)
            .await?;
        Ok(self.written(entry, converted))
    }

    fn written(&self, entry: CacheEntry, converted: bool) -> CacheEntry {
        ResolverCounters::bump(&self.counters.cache_writes);

        self.event_bus.emit(ConversionCacheWritten::new(
            entry.key.clone(),
            entry.path.clone(),
            entry.size_bytes,
        ));
        self.event_bus.emit(AssetMaterialized::new(
            entry.key.clone(),
            entry.path.clone(),
            entry.format.clone(),
            converted,
        ));

        entry
    }

    /// A copy a remote store already holds locally, with its best known format
    async fn store_copy(&self) -> ResolveResult<Option<(PathBuf, MimeFormat)>> {
        let AssetStore::RemoteBacked(store) = &self.store else {
            return Ok(None);
        };
        let Some(path) = store.query_cached_path(&self.asset).await? else {
            return Ok(None);
        };

        let format = match MimeFormat::from_path(&path) {
            Some(format) => format,
            None => store
                .native_format(&self.asset)
                .await?
                .unwrap_or_else(MimeFormat::octet_stream),
        };
        Ok(Some((path, format)))
    }

    /// Original bytes, preferring copies that need no export
    async fn load_source(&self) -> ResolveResult<ExportedAsset> {
        if matches!(self.key.slot, FormatSlot::Explicit(_)) {
            let native_key = CacheKey::native(self.asset.id.clone());
            let local_copy = match self.cache.lookup(&native_key).await? {
                Some(native) => Some((native.path, native.format)),
                None => self.store_copy().await?,
            };

            if let Some((path, format)) = local_copy {
                match tokio::fs::read(&path).await {
                    Ok(bytes) => {
                        log::debug!("Converting {} from local copy {:?}", self.asset.id, path);
                        return Ok(ExportedAsset { bytes, format });
                    }
                    Err(e) => log::warn!(
                        "Local copy of {} unreadable, exporting again: {}",
                        self.asset.id,
                        e
                    ),
                }
            }
        }

        ResolverCounters::bump(&self.counters.exports);
        log::info!("Exporting {} from {} store", self.asset.id, self.store.capability());

        self.store.fetch_original(&self.asset).await
    }
}
