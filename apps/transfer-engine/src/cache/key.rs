//! Deterministic cache keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Create a key from a literal string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derive a key from an operation name and its arguments.
    ///
    /// Arguments are serialized to JSON (object keys sorted) and hashed with
    /// SHA-256, so the same call always maps to the same key. The operation
    /// name is kept as a readable prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments cannot be represented as JSON.
    pub fn for_call<A: Serialize + ?Sized>(
        operation: &str,
        args: &A,
    ) -> Result<Self, serde_json::Error> {
        let canonical = serde_json::json!({
            "op": operation,
            "args": serde_json::to_value(args)?,
        });
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        Ok(Self(format!("{operation}:{}", hex::encode(digest))))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}
