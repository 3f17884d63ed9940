//! # resultcache
//!
//! Function-result caching with durable and in-memory backends and
//! rule-based policies.
//!
//! A wrapped function is named by a stable dotted-path identifier; each call
//! binds its arguments into a canonical call key, and the pair addresses one
//! stored result. Results either persist across process runs under a cache
//! home directory or live in memory for the process lifetime.
//!
//! ## Features
//!
//! - **Canonical call keys**: positional and keyword argument forms of the
//!   same call derive the same key, declared defaults included
//! - **Durable or memory storage**: one JSON file per entry under the cache
//!   home, or a process-lifetime map
//! - **Policy rules**: dotted-path prefixes disable caching per function or
//!   module, or require a cached result to already exist
//! - **Per-element map caching**: a map-valued function accumulates element
//!   results under one entry and computes only elements not yet stored
//! - **Transparent failures**: corrupt durable entries degrade to
//!   recomputation; wrapped-function errors pass through uncached
//!
//! ## Example
//!
//! ```
//! use resultcache::{cache, BoundArgs, CacheConfig, CacheError, CallArgs, Signature};
//!
//! let config = CacheConfig::default();
//! let multiply = cache::<_, i64, CacheError>(
//!     resultcache::function_identifier!("multiply"),
//!     Signature::new(["a", "b"]),
//!     &config,
//!     |args: &BoundArgs| Ok(args.value::<i64>("a")? * args.value::<i64>("b")?),
//! );
//!
//! let result = multiply.call(CallArgs::new().arg(2)?.arg(3)?)?;
//! assert_eq!(result, 6);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod identifier;
pub mod map;
pub mod metrics;
pub mod rules;
pub mod storage;

pub use cache::{cache, store, CachedFunction};
pub use map::{store_map, CachedMapFunction};
pub use config::{CacheConfig, CACHED_ONLY_ENV, DISABLE_ENV, HOME_ENV};
pub use error::{CacheError, CallError, Result};
pub use identifier::{BoundArgs, CacheKey, CallArgs, CallKey, FunctionIdentifier, Signature};
pub use metrics::{CacheMetrics, CacheStats};
pub use rules::RuleSet;
pub use storage::{DiskBackend, MemoryBackend, StorageBackend};
