//! Key and TTL translation
//!
//! Logical keys become store keys by prepending `namespace + separator`
//! (nothing when the namespace is empty). The reverse direction removes
//! exactly that many bytes. TTLs longer than the store's relative limit are
//! turned into absolute timestamps, because the store tells the two apart
//! by magnitude only.

use crate::errors::CacheError;
use config::MAX_NAMESPACE_LENGTH;
use kv_store::RELATIVE_EXPIRY_LIMIT;

/// Longest logical key accepted, in bytes
pub const MAX_KEY_LENGTH: usize = 255;

/// Namespace prefix for one namespace and separator pair
pub fn namespace_prefix(namespace: &str, separator: &str) -> Result<String, CacheError> {
    if namespace.len() > MAX_NAMESPACE_LENGTH {
        return Err(CacheError::InvalidArgument(format!(
            "Namespace must be no longer than {} bytes, got {}",
            MAX_NAMESPACE_LENGTH,
            namespace.len()
        )));
    }
    if namespace.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!("{}{}", namespace, separator))
    }
}

pub fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() {
        return Err(CacheError::InvalidArgument(
            "Key cannot be empty".to_string(),
        ));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidArgument(format!(
            "Key must be no longer than {} bytes, got {}",
            MAX_KEY_LENGTH,
            key.len()
        )));
    }
    Ok(())
}

pub fn to_store_key(namespace: &str, separator: &str, key: &str) -> Result<String, CacheError> {
    KeyTranslator::new(namespace, separator)?.to_store_key(key)
}

/// Logical key of a store key produced by [`to_store_key`]
pub fn from_store_key<'a>(
    namespace: &str,
    separator: &str,
    store_key: &'a str,
) -> Result<&'a str, CacheError> {
    let translator = KeyTranslator::new(namespace, separator)?;
    Ok(translator.to_logical_key(store_key))
}

/// Store expiry for a ttl in seconds
///
/// `0` (no expiry) and ttls up to the relative limit pass through;
/// longer ttls become `now + ttl`.
pub fn resolve_expiry(ttl: u64, now: u64) -> u64 {
    if ttl > RELATIVE_EXPIRY_LIMIT {
        now.saturating_add(ttl)
    } else {
        ttl
    }
}

/// Key translation bound to one namespace
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyTranslator {
    prefix: String,
}

impl KeyTranslator {
    pub fn new(namespace: &str, separator: &str) -> Result<Self, CacheError> {
        Ok(Self {
            prefix: namespace_prefix(namespace, separator)?,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn to_store_key(&self, key: &str) -> Result<String, CacheError> {
        validate_key(key)?;
        let mut store_key = String::with_capacity(self.prefix.len() + key.len());
        store_key.push_str(&self.prefix);
        store_key.push_str(key);
        Ok(store_key)
    }

    pub fn to_store_keys<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<String>, CacheError> {
        keys.iter().map(|k| self.to_store_key(k.as_ref())).collect()
    }

    /// Remove the prefix length from a store key
    pub fn to_logical_key<'a>(&self, store_key: &'a str) -> &'a str {
        debug_assert!(store_key.starts_with(&self.prefix));
        store_key.get(self.prefix.len()..).unwrap_or(store_key)
    }
}
