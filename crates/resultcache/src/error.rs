//! Cache-related error types

use std::path::PathBuf;

use thiserror::Error;

/// Cache operation errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Call arguments could not be bound or serialized into a call key
    #[error("Cannot derive call key: {message}")]
    KeyDerivation { message: String },

    /// A durable entry exists but could not be read back.
    ///
    /// The orchestrator treats this as a miss and recomputes; it is only
    /// surfaced directly by the storage backends themselves.
    #[error("Unreadable cache entry at {path}: {message}")]
    StorageRead { path: PathBuf, message: String },

    /// A durable entry could not be committed
    #[error("Failed to write cache entry at {path}: {source}")]
    StorageWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Cached-only policy violated: no entry exists for this call
    #[error("No cached result for {function} (call key `{call_key}`); pre-populate the entry or lift the cached-only rule")]
    NotCached { function: String, call_key: String },

    /// A map-valued function did not produce a requested element
    #[error("{function} did not produce requested element `{element}`")]
    MissingElement { function: String, element: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    /// Create a key derivation error
    pub fn key_derivation(message: impl Into<String>) -> Self {
        CacheError::KeyDerivation {
            message: message.into(),
        }
    }

    /// Create a storage read error
    pub fn storage_read(path: PathBuf, message: impl Into<String>) -> Self {
        CacheError::StorageRead {
            path,
            message: message.into(),
        }
    }

    /// Create a storage write error
    pub fn storage_write(path: PathBuf, source: std::io::Error) -> Self {
        CacheError::StorageWrite { path, source }
    }

    /// Create a cached-only violation error
    pub fn not_cached(function: impl Into<String>, call_key: impl Into<String>) -> Self {
        CacheError::NotCached {
            function: function.into(),
            call_key: call_key.into(),
        }
    }

    /// Create a missing-element error
    pub fn missing_element(function: impl Into<String>, element: impl Into<String>) -> Self {
        CacheError::MissingElement {
            function: function.into(),
            element: element.into(),
        }
    }
}

/// Error returned by a cached call.
///
/// Separates failures of the cache layer itself from errors returned by the
/// wrapped function, which pass through unchanged and are never stored.
#[derive(Error, Debug)]
pub enum CallError<E> {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Function(E),
}

impl<E> CallError<E> {
    /// The wrapped function's own error, if that is what failed
    pub fn into_function(self) -> Option<E> {
        match self {
            CallError::Function(err) => Some(err),
            CallError::Cache(_) => None,
        }
    }
}

/// Re-export commonly used Result type
pub type Result<T> = std::result::Result<T, CacheError>;
