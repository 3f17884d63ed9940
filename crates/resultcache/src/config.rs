//! Cache configuration
//!
//! Configuration is an explicit immutable value handed to the orchestrator at
//! construction time, so several differently-configured caches can coexist in
//! one process. An environment loader builds the process-wide value once at
//! startup.

use std::path::{Path, PathBuf};

use crate::rules::RuleSet;

/// Environment variable naming the cache home directory
pub const HOME_ENV: &str = "RESULTCACHE_HOME";
/// Environment variable holding the disable rule set
pub const DISABLE_ENV: &str = "RESULTCACHE_DISABLE";
/// Environment variable holding the cached-only rule set
pub const CACHED_ONLY_ENV: &str = "RESULTCACHE_CACHEDONLY";

/// Directory under the user's home used when no home is configured
const DEFAULT_HOME_DIR: &str = ".resultcache";

/// Immutable cache configuration: home directory plus policy rule sets
#[derive(Debug, Clone)]
pub struct CacheConfig {
    home: PathBuf,
    disable: RuleSet,
    cached_only: RuleSet,
}

impl CacheConfig {
    /// Configuration with the given cache home and no policy rules
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            disable: RuleSet::none(),
            cached_only: RuleSet::none(),
        }
    }

    /// Set the disable rule set: matching functions bypass caching entirely
    pub fn with_disable(mut self, rules: RuleSet) -> Self {
        self.disable = rules;
        self
    }

    /// Set the cached-only rule set: matching functions must hit the cache
    pub fn with_cached_only(mut self, rules: RuleSet) -> Self {
        self.cached_only = rules;
        self
    }

    /// Read the process-wide configuration from the environment.
    ///
    /// `RESULTCACHE_HOME` overrides the cache home (default
    /// `~/.resultcache`); `RESULTCACHE_DISABLE` and
    /// `RESULTCACHE_CACHEDONLY` hold rule sets in the format accepted by
    /// [`RuleSet::parse`]. Intended to be called once at startup.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup; `from_env` binds it to the
    /// real process environment
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let home = lookup(HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_home);
        Self {
            home,
            disable: RuleSet::parse(&lookup(DISABLE_ENV).unwrap_or_default()),
            cached_only: RuleSet::parse(&lookup(CACHED_ONLY_ENV).unwrap_or_default()),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn disable(&self) -> &RuleSet {
        &self.disable
    }

    pub fn cached_only(&self) -> &RuleSet {
        &self.cached_only
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(default_home())
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_HOME_DIR))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HOME_DIR))
}
