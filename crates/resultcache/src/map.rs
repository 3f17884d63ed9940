//! Per-element caching for map-valued functions
//!
//! [`CachedMapFunction`] wraps a function that takes a list of elements and
//! returns one result per element. Entries are keyed on every parameter
//! except the element list, and the stored value is a single JSON object
//! accumulating element results across calls. A later call that asks for a
//! mix of known and new elements invokes the function for the new elements
//! only and merges the answers into the stored object.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, CallError, Result};
use crate::identifier::{render_value, BoundArgs, CacheKey, CallArgs, FunctionIdentifier, Signature};
use crate::metrics::CacheMetrics;
use crate::rules::RuleSet;
use crate::storage::{DiskBackend, StorageBackend};

/// A map-valued function wrapped with per-element result caching.
///
/// One declared parameter, the key parameter, holds the list of elements the
/// caller wants. The wrapped function receives bound arguments whose key
/// parameter has been narrowed to the elements that are not yet stored, and
/// must return a map containing a result for each of them. Element results
/// are keyed by the canonical rendering of the element value.
pub struct CachedMapFunction<F, T, E> {
    identifier: FunctionIdentifier,
    signature: Signature,
    key_param: String,
    backend: Arc<dyn StorageBackend>,
    disable: RuleSet,
    cached_only: RuleSet,
    metrics: CacheMetrics,
    func: F,
    _result: PhantomData<fn() -> (T, E)>,
}

impl<F, T, E> CachedMapFunction<F, T, E>
where
    F: Fn(&BoundArgs) -> std::result::Result<BTreeMap<String, T>, E>,
    T: Serialize + DeserializeOwned,
{
    /// Wrap `func` with the given backend and configuration.
    ///
    /// `key_param` names the declared parameter that carries the element
    /// list; every call must bind it to an array.
    pub fn new(
        identifier: FunctionIdentifier,
        signature: Signature,
        key_param: impl Into<String>,
        backend: Arc<dyn StorageBackend>,
        config: &CacheConfig,
        func: F,
    ) -> Self {
        Self {
            identifier,
            signature,
            key_param: key_param.into(),
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

    /// Counters for this function's cache activity.
    ///
    /// A call served entirely from stored elements counts as one hit; any
    /// call that has to compute at least one element counts as one miss.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// The cache key this function would use for the given arguments.
    ///
    /// The key covers every parameter except the element list, so calls that
    /// differ only in which elements they ask for share one entry.
    pub fn key_for(&self, args: &CallArgs) -> Result<CacheKey> {
        let bound = self.signature.bind(args)?;
        Ok(self.entry_key(&bound))
    }

    /// Invoke the function through the cache.
    ///
    /// Returns a map holding exactly the requested elements. Disabled
    /// functions call through with the full element list and no storage
    /// interaction. Under a cached-only rule, any element without a stored
    /// result fails the call with [`CacheError::NotCached`].
    pub fn call(&self, args: CallArgs) -> std::result::Result<BTreeMap<String, T>, CallError<E>> {
        let bound = self.signature.bind(&args).map_err(CallError::Cache)?;
        let requested = self.requested_elements(&bound).map_err(CallError::Cache)?;

        if self.disable.matches(&self.identifier) {
            debug!(function = %self.identifier, "caching disabled, calling through");
            self.metrics.record_bypass();
            let mut computed = (self.func)(&bound).map_err(CallError::Function)?;
            return self
                .extract(&requested, |element| computed.remove(element))
                .map_err(CallError::Cache);
        }

        let key = self.entry_key(&bound);
        let mut stored = self.lookup(&key);

        // Split the request into elements already stored and elements that
        // still need computing; undecodable stored elements count as missing.
        let mut ready: BTreeMap<String, T> = BTreeMap::new();
        let mut missing: Vec<(String, Value)> = Vec::new();
        for (element, value) in requested.iter() {
            match stored.get(element).cloned() {
                Some(raw) => match serde_json::from_value(raw) {
                    Ok(result) => {
                        ready.insert(element.clone(), result);
                    }
                    Err(err) => {
                        warn!(key = %key, element = %element, error = %err, "stored element does not decode, recomputing");
                        stored.remove(element);
                        missing.push((element.clone(), value.clone()));
                    }
                },
                None => missing.push((element.clone(), value.clone())),
            }
        }

        if missing.is_empty() {
            debug!(key = %key, elements = requested.len(), "cache hit");
            self.metrics.record_hit();
            return Ok(ready);
        }
        self.metrics.record_miss();

        if self.cached_only.matches(&self.identifier) {
            return Err(CallError::Cache(CacheError::not_cached(
                self.identifier.as_str(),
                key.call_key().as_str(),
            )));
        }

        debug!(key = %key, elements = missing.len(), "computing missing elements");
        let subset = bound
            .rebind(
                &self.key_param,
                Value::Array(missing.iter().map(|(_, value)| value.clone()).collect()),
            )
            .map_err(CallError::Cache)?;
        let computed = (self.func)(&subset).map_err(CallError::Function)?;

        for (element, result) in computed {
            let raw = serde_json::to_value(&result).map_err(CacheError::from)?;
            stored.insert(element.clone(), raw);
            ready.insert(element, result);
        }
        self.backend
            .put(&key, &Value::Object(stored))
            .map_err(CallError::Cache)?;
        self.metrics.record_store();

        self.extract(&requested, |element| ready.remove(element))
            .map_err(CallError::Cache)
    }

    fn entry_key(&self, bound: &BoundArgs) -> CacheKey {
        CacheKey::new(
            self.identifier.clone(),
            bound.call_key_excluding(&[self.key_param.as_str()]),
        )
    }

    /// The requested elements, in order and deduplicated, paired with their
    /// canonical rendering.
    fn requested_elements(&self, bound: &BoundArgs) -> Result<Vec<(String, Value)>> {
        let value = bound.get(&self.key_param).ok_or_else(|| {
            CacheError::key_derivation(format!(
                "no bound value for parameter `{}`",
                self.key_param
            ))
        })?;
        let elements = match value {
            Value::Array(elements) => elements,
            other => {
                return Err(CacheError::key_derivation(format!(
                    "parameter `{}` must be an array of elements, got {other}",
                    self.key_param
                )));
            }
        };
        let mut requested: Vec<(String, Value)> = Vec::with_capacity(elements.len());
        for element in elements {
            let rendered = render_value(element);
            if !requested.iter().any(|(seen, _)| *seen == rendered) {
                requested.push((rendered, element.clone()));
            }
        }
        Ok(requested)
    }

    /// Read the stored element map, degrading anything unreadable to empty
    fn lookup(&self, key: &CacheKey) -> Map<String, Value> {
        match self.backend.get(key) {
            Ok(Some(Value::Object(map))) => map,
            Ok(Some(other)) => {
                warn!(key = %key, "stored entry is not an element map ({other}), recomputing");
                Map::new()
            }
            Ok(None) => Map::new(),
            Err(err) => {
                warn!(key = %key, error = %err, "unreadable cache entry, recomputing");
                Map::new()
            }
        }
    }

    /// Assemble the result map for the requested elements, failing on any
    /// element the function did not produce.
    fn extract(
        &self,
        requested: &[(String, Value)],
        mut take: impl FnMut(&str) -> Option<T>,
    ) -> Result<BTreeMap<String, T>> {
        let mut result = BTreeMap::new();
        for (element, _) in requested {
            match take(element) {
                Some(value) => {
                    result.insert(element.clone(), value);
                }
                None => {
                    return Err(CacheError::missing_element(
                        self.identifier.as_str(),
                        element.clone(),
                    ));
                }
            }
        }
        Ok(result)
    }
}

/// Wrap a map-valued function with durable per-element caching rooted at the
/// configured cache home.
pub fn store_map<F, T, E>(
    identifier: FunctionIdentifier,
    signature: Signature,
    key_param: impl Into<String>,
    config: &CacheConfig,
    func: F,
) -> CachedMapFunction<F, T, E>
where
    F: Fn(&BoundArgs) -> std::result::Result<BTreeMap<String, T>, E>,
    T: Serialize + DeserializeOwned,
{
    let backend = Arc::new(DiskBackend::new(config.home()));
    CachedMapFunction::new(identifier, signature, key_param, backend, config, func)
}
