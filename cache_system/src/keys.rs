//! Cache key derivation
//!
//! A derived key has the shape `{operation}:{fingerprint}`; the manager
//! prepends the namespace. The fingerprint is a SHA-256 digest over a
//! canonical JSON rendering of the arguments, so it is stable across
//! processes and builds.

use crate::errors::CacheError;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Keyword argument names that always denote resource handles
const HANDLE_NAMES: &[&str] = &["db", "session"];

/// Builder for a deterministic cache key
///
/// ```
/// use cache_system::CacheKey;
///
/// let a = CacheKey::new("get_user_repositories")
///     .kwarg("sort", "updated")?
///     .kwarg("direction", "desc")?
///     .build();
/// let b = CacheKey::new("get_user_repositories")
///     .kwarg("direction", "desc")?
///     .kwarg("sort", "updated")?
///     .build();
/// assert_eq!(a, b);
/// # Ok::<(), cache_system::CacheError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheKey {
    operation: String,
    positional: Vec<Value>,
    keyword: BTreeMap<String, Value>,
    excluded: BTreeSet<String>,
}

impl CacheKey {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    /// Append a positional argument.
    ///
    /// Fails when the value has no JSON form (e.g. a map with non-string
    /// keys), since a lossy stand-in could collide with other arguments.
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, CacheError> {
        self.positional.push(serde_json::to_value(value)?);
        Ok(self)
    }

    /// Set a keyword argument; call order never affects the key
    pub fn kwarg<T: Serialize + ?Sized>(
        mut self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<Self, CacheError> {
        self.keyword.insert(name.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Declare `name` a pass-through resource handle, excluded from the fingerprint
    pub fn handle(mut self, name: impl Into<String>) -> Self {
        self.excluded.insert(name.into());
        self
    }

    /// Digest of the data arguments only
    pub fn fingerprint(&self) -> String {
        let keyword: BTreeMap<&str, &Value> = self
            .keyword
            .iter()
            .filter(|(name, _)| !self.is_handle(name))
            .map(|(name, value)| (name.as_str(), value))
            .collect();

        // serde_json writes maps in key order, and BTreeMap sorts nested objects too
        let canonical = serde_json::json!({
            "args": self.positional,
            "kwargs": keyword,
        });
        digest(canonical.to_string().as_bytes())
    }

    /// Render `{operation}:{fingerprint}`
    pub fn build(&self) -> String {
        format!("{}:{}", self.operation, self.fingerprint())
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    fn is_handle(&self, name: &str) -> bool {
        self.excluded.contains(name) || HANDLE_NAMES.contains(&name)
    }
}

/// Hex SHA-256 over raw key parts joined with `|`
pub fn hash_parts<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = parts
        .into_iter()
        .map(|part| part.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("|");
    digest(joined.as_bytes())
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
