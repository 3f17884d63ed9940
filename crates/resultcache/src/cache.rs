//! The cached-call orchestrator
//!
//! [`CachedFunction`] wraps a callable together with a storage backend and
//! the configured policy rules. Each call resolves the cache key, applies the
//! disable and cached-only policies, and consults the backend at most once
//! for a read and once for a write. The wrapped callable runs at most once
//! per call and its errors pass through unchanged and uncached.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, CallError, Result};
use crate::identifier::{BoundArgs, CacheKey, CallArgs, FunctionIdentifier, Signature};
use crate::metrics::CacheMetrics;
use crate::rules::RuleSet;
use crate::storage::{DiskBackend, MemoryBackend, StorageBackend};

/// A function wrapped with result caching.
///
/// Holds the function's resolved identifier, its declared signature, the
/// storage backend, and the policy rule sets taken from the configuration at
/// construction time.
pub struct CachedFunction<F, T, E> {
    identifier: FunctionIdentifier,
    signature: Signature,
    backend: Arc<dyn StorageBackend>,
    disable: RuleSet,
    cached_only: RuleSet,
    metrics: CacheMetrics,
    func: F,
    _result: PhantomData<fn() -> (T, E)>,
}

impl<F, T, E> CachedFunction<F, T, E>
where
    F: Fn(&BoundArgs) -> std::result::Result<T, E>,
    T: Serialize + DeserializeOwned,
{
    /// Wrap `func` with the given backend and configuration
    pub fn new(
        identifier: FunctionIdentifier,
        signature: Signature,
        backend: Arc<dyn StorageBackend>,
        config: &CacheConfig,
        func: F,
    ) -> Self {
        Self {
            identifier,
            signature,
            backend,
            disable: config.disable().clone(),
            cached_only: config.cached_only().clone(),
            metrics: CacheMetrics::new(),
            func,
            _result: PhantomData,
        }
    }

    /// The wrapped function's resolved identifier
    pub fn identifier(&self) -> &FunctionIdentifier {
        &self.identifier
    }

    /// Counters for this function's cache activity
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// The full cache key this function would use for the given arguments.
    ///
    /// Lets operators pre-populate or inspect entries for a specific call.
    pub fn key_for(&self, args: &CallArgs) -> Result<CacheKey> {
        let bound = self.signature.bind(args)?;
        Ok(CacheKey::new(self.identifier.clone(), bound.call_key()))
    }

    /// Invoke the function through the cache.
    ///
    /// Disabled functions call through directly with no storage interaction.
    /// Otherwise a stored result is returned as-is; on a miss the function
    /// runs, unless a cached-only rule turns the miss into a hard
    /// [`CacheError::NotCached`] failure without invoking the function.
    pub fn call(&self, args: CallArgs) -> std::result::Result<T, CallError<E>> {
        let bound = self.signature.bind(&args).map_err(CallError::Cache)?;

        if self.disable.matches(&self.identifier) {
            debug!(function = %self.identifier, "caching disabled, calling through");
            self.metrics.record_bypass();
            return (self.func)(&bound).map_err(CallError::Function);
        }

        let key = CacheKey::new(self.identifier.clone(), bound.call_key());
        if let Some(stored) = self.lookup(&key) {
            debug!(key = %key, "cache hit");
            self.metrics.record_hit();
            return Ok(stored);
        }
        self.metrics.record_miss();

        if self.cached_only.matches(&self.identifier) {
            return Err(CallError::Cache(CacheError::not_cached(
                self.identifier.as_str(),
                key.call_key().as_str(),
            )));
        }

        debug!(key = %key, "cache miss, computing");
        let result = (self.func)(&bound).map_err(CallError::Function)?;
        let value = serde_json::to_value(&result).map_err(CacheError::from)?;
        self.backend.put(&key, &value).map_err(CallError::Cache)?;
        self.metrics.record_store();
        Ok(result)
    }

    /// Read an entry, degrading unreadable or undecodable entries to a miss
    fn lookup(&self, key: &CacheKey) -> Option<T> {
        let value = match self.backend.get(key) {
            Ok(value) => value?,
            Err(err) => {
                warn!(key = %key, error = %err, "unreadable cache entry, recomputing");
                return None;
            }
        };
        match serde_json::from_value(value) {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(key = %key, error = %err, "stored entry does not decode, recomputing");
                None
            }
        }
    }
}

/// Wrap a function with durable caching rooted at the configured cache home.
///
/// Entries persist across process runs; repeated wrapping over the same home
/// sees the same entries.
pub fn store<F, T, E>(
    identifier: FunctionIdentifier,
    signature: Signature,
    config: &CacheConfig,
    func: F,
) -> CachedFunction<F, T, E>
where
    F: Fn(&BoundArgs) -> std::result::Result<T, E>,
    T: Serialize + DeserializeOwned,
{
    let backend = Arc::new(DiskBackend::new(config.home()));
    CachedFunction::new(identifier, signature, backend, config, func)
}

/// Wrap a function with memory-only caching; entries last for the process
/// lifetime.
pub fn cache<F, T, E>(
    identifier: FunctionIdentifier,
    signature: Signature,
    config: &CacheConfig,
    func: F,
) -> CachedFunction<F, T, E>
where
    F: Fn(&BoundArgs) -> std::result::Result<T, E>,
    T: Serialize + DeserializeOwned,
{
    CachedFunction::new(
        identifier,
        signature,
        Arc::new(MemoryBackend::new()),
        config,
        func,
    )
}
