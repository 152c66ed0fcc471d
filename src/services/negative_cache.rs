// src/services/negative_cache.rs
//
// Negative Cache
//
// In-memory memory of recent remote export failures, so a flapping or
// offline remote is not hammered by every request for the same key.
//
// RULES:
// - Only ExportFailed is remembered; NotFound is already deterministic
// - Entries expire after the configured window and are then forgotten
// - Nothing is ever persisted

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::NegativeCachePolicy;
use crate::domain::CacheKey;
use crate::error::ResolutionError;

pub struct NegativeCache {
    window: Option<Duration>,
    failures: Mutex<HashMap<CacheKey, (Instant, ResolutionError)>>,
}

impl NegativeCache {
    pub fn new(policy: NegativeCachePolicy) -> Self {
        let window = match policy {
            NegativeCachePolicy::Disabled => None,
            NegativeCachePolicy::RememberFor { seconds } => Some(Duration::from_secs(seconds)),
        };
        Self {
            window,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.window.is_some()
    }

    /// Remembered failure for `key`, if still inside the window
    pub fn check(&self, key: &CacheKey) -> Option<ResolutionError> {
        let window = self.window?;
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);

        match failures.get(key) {
            Some((at, error)) if at.elapsed() < window => Some(error.clone()),
            Some(_) => {
                failures.remove(key);
                None
            }
            None => None,
        }
    }

    /// Remember `error` for `key` when the policy allows it. Expired
    /// entries for other keys are pruned on the way.
    pub fn record(&self, key: &CacheKey, error: &ResolutionError) {
        let Some(window) = self.window else {
            return;
        };
        if !matches!(error, ResolutionError::ExportFailed(_)) {
            return;
        }

        log::info!("Remembering export failure for {}", key);
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        failures.retain(|_, (at, _)| at.elapsed() < window);
        failures.insert(key.clone(), (Instant::now(), error.clone()));
    }

    /// Forget `key`, e.g. after a later success
    pub fn forget(&self, key: &CacheKey) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn len(&self) -> usize {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CacheKey {
        CacheKey::native("vid-9")
    }

    fn offline() -> ResolutionError {
        ResolutionError::ExportFailed("remote offline".to_string())
    }

    #[test]
    fn test_disabled_remembers_nothing() {
        let cache = NegativeCache::new(NegativeCachePolicy::Disabled);
        cache.record(&key(), &offline());

        assert!(!cache.is_enabled());
        assert!(cache.check(&key()).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_export_failure_remembered_within_window() {
        let cache = NegativeCache::new(NegativeCachePolicy::RememberFor { seconds: 60 });
        cache.record(&key(), &offline());

        assert_eq!(cache.check(&key()), Some(offline()));
        assert!(cache.check(&CacheKey::native("img-1")).is_none());
    }

    #[test]
    fn test_not_found_is_never_remembered() {
        let cache = NegativeCache::new(NegativeCachePolicy::RememberFor { seconds: 60 });
        cache.record(&key(), &ResolutionError::NotFound("vid-9".to_string()));
        cache.record(&key(), &ResolutionError::ConversionFailed("bad".to_string()));

        assert!(cache.check(&key()).is_none());
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let cache = NegativeCache::new(NegativeCachePolicy::RememberFor { seconds: 0 });
        cache.record(&key(), &offline());

        assert!(cache.check(&key()).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_record_prunes_expired_entries() {
        let cache = NegativeCache::new(NegativeCachePolicy::RememberFor { seconds: 0 });

        for id in ["vid-1", "vid-2", "vid-3"] {
            cache.record(&CacheKey::native(id), &offline());
        }

        // Only the entry recorded last survives until the next record
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_forget() {
        let cache = NegativeCache::new(NegativeCachePolicy::RememberFor { seconds: 60 });
        cache.record(&key(), &offline());
        cache.forget(&key());

        assert!(cache.check(&key()).is_none());
    }
}
