//! Function identity and canonical call keys
//!
//! A wrapped function is named by a dotted path derived from its defining
//! module; one invocation is named by the canonical rendering of its bound
//! arguments. Together they form the cache key under which a result is
//! stored and looked up.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CacheError, Result};

/// Stable dotted-path name for a cacheable function.
///
/// Rust module paths use `::` as the separator; identifiers normalize it to
/// `.` so that rule prefixes match per module segment
/// (`my_crate::jobs::run` becomes `my_crate.jobs.run`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionIdentifier(String);

impl FunctionIdentifier {
    /// Build an identifier from a module path and a function name
    pub fn new(module_path: &str, name: &str) -> Self {
        let module = module_path.replace("::", ".");
        if module.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{module}.{name}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dot-separated segments, outermost module first
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for FunctionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build a [`FunctionIdentifier`] for a function defined in the current module
#[macro_export]
macro_rules! function_identifier {
    ($name:expr) => {
        $crate::FunctionIdentifier::new(module_path!(), $name)
    };
}

/// Declared parameters of a wrapped function.
///
/// Rust has no call-site reflection, so the parameter list is declared
/// explicitly once when the function is wrapped. Parameters may carry a
/// default value; a call that omits such a parameter and a call that passes
/// the same value explicitly derive the same call key.
#[derive(Debug, Clone)]
pub struct Signature {
    params: Vec<String>,
    defaults: BTreeMap<String, Value>,
}

impl Signature {
    /// Declare the ordered parameter names
    pub fn new<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            defaults: BTreeMap::new(),
        }
    }

    /// Attach a default value to a declared parameter
    ///
    /// # Errors
    ///
    /// Returns a `KeyDerivation` error if the parameter is unknown or the
    /// value cannot be serialized.
    pub fn with_default(mut self, name: &str, value: impl Serialize) -> Result<Self> {
        if !self.params.iter().any(|p| p == name) {
            return Err(CacheError::key_derivation(format!(
                "default for undeclared parameter `{name}`"
            )));
        }
        let value = serde_json::to_value(value)
            .map_err(|e| CacheError::key_derivation(format!("default for `{name}`: {e}")))?;
        self.defaults.insert(name.to_string(), value);
        Ok(self)
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Bind one invocation's arguments against the declared parameters.
    ///
    /// Positional values fill parameters in declaration order, keyword values
    /// fill by name, and declared defaults cover whatever remains. The result
    /// is a complete name-to-value mapping, independent of how the arguments
    /// were passed.
    ///
    /// # Errors
    ///
    /// Returns a `KeyDerivation` error for excess positional values, unknown
    /// or duplicate keywords, or a missing parameter without a default.
    pub fn bind(&self, args: &CallArgs) -> Result<BoundArgs> {
        if args.positional.len() > self.params.len() {
            return Err(CacheError::key_derivation(format!(
                "{} positional arguments for {} declared parameters",
                args.positional.len(),
                self.params.len()
            )));
        }

        let mut values: BTreeMap<String, Value> = BTreeMap::new();
        for (name, value) in self.params.iter().zip(args.positional.iter()) {
            values.insert(name.clone(), value.clone());
        }

        for (name, value) in &args.keyword {
            if !self.params.iter().any(|p| p == name) {
                return Err(CacheError::key_derivation(format!(
                    "unknown keyword argument `{name}`"
                )));
            }
            if values.insert(name.clone(), value.clone()).is_some() {
                return Err(CacheError::key_derivation(format!(
                    "duplicate value for parameter `{name}`"
                )));
            }
        }

        for name in &self.params {
            if values.contains_key(name) {
                continue;
            }
            match self.defaults.get(name) {
                Some(default) => {
                    values.insert(name.clone(), default.clone());
                }
                None => {
                    return Err(CacheError::key_derivation(format!(
                        "missing value for parameter `{name}`"
                    )));
                }
            }
        }

        Ok(BoundArgs { values })
    }
}

/// Arguments of one invocation, positional and keyword
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    positional: Vec<Value>,
    keyword: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    ///
    /// # Errors
    ///
    /// Returns a `KeyDerivation` error if the value cannot be serialized.
    pub fn arg(mut self, value: impl Serialize) -> Result<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| CacheError::key_derivation(format!("positional argument: {e}")))?;
        self.positional.push(value);
        Ok(self)
    }

    /// Append a keyword argument
    ///
    /// # Errors
    ///
    /// Returns a `KeyDerivation` error if the value cannot be serialized.
    pub fn kwarg(mut self, name: &str, value: impl Serialize) -> Result<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| CacheError::key_derivation(format!("argument `{name}`: {e}")))?;
        self.keyword.push((name.to_string(), value));
        Ok(self)
    }
}

/// Complete parameter-name to value mapping for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundArgs {
    values: BTreeMap<String, Value>,
}

impl BoundArgs {
    /// Raw bound value for a parameter
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Bound value for a parameter, deserialized into a concrete type
    pub fn value<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.values.get(name).ok_or_else(|| {
            CacheError::key_derivation(format!("no bound value for parameter `{name}`"))
        })?;
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy of these bound arguments with one parameter rebound.
    ///
    /// # Errors
    ///
    /// Returns a `KeyDerivation` error if the parameter has no bound value.
    pub fn rebind(&self, name: &str, value: Value) -> Result<BoundArgs> {
        if !self.values.contains_key(name) {
            return Err(CacheError::key_derivation(format!(
                "no bound value for parameter `{name}`"
            )));
        }
        let mut values = self.values.clone();
        values.insert(name.to_string(), value);
        Ok(BoundArgs { values })
    }

    /// Canonical call key for these arguments.
    ///
    /// Pairs are rendered `name=value`, sorted by parameter name and joined
    /// with commas, so positional and keyword forms of the same call agree.
    pub fn call_key(&self) -> CallKey {
        self.call_key_excluding(&[])
    }

    /// Call key over a subset of the parameters, leaving out the named ones.
    ///
    /// Lets a wrapper key its entries on everything except a parameter it
    /// manages itself, such as the element list of a map-valued function.
    pub fn call_key_excluding(&self, ignore: &[&str]) -> CallKey {
        let rendered: Vec<String> = self
            .values
            .iter()
            .filter(|(name, _)| !ignore.contains(&name.as_str()))
            .map(|(name, value)| format!("{name}={}", render_value(value)))
            .collect();
        CallKey(rendered.join(","))
    }
}

/// Values render as compact JSON, except strings which render bare.
/// Path separators are flattened so a call key stays a single path segment.
pub(crate) fn render_value(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    raw.replace(['/', '\\'], "_")
}

/// Canonical encoding of one invocation's bound arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey(String);

impl CallKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for a call that binds no arguments
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique lookup key for a cache entry: function identifier plus call key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    identifier: FunctionIdentifier,
    call_key: CallKey,
}

impl CacheKey {
    pub fn new(identifier: FunctionIdentifier, call_key: CallKey) -> Self {
        Self {
            identifier,
            call_key,
        }
    }

    pub fn identifier(&self) -> &FunctionIdentifier {
        &self.identifier
    }

    pub fn call_key(&self) -> &CallKey {
        &self.call_key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.call_key.is_empty() {
            write!(f, "{}", self.identifier)
        } else {
            write!(f, "{}/{}", self.identifier, self.call_key)
        }
    }
}
