//! What the adapter supports, for callers that adapt to the backend

use crate::translator::MAX_KEY_LENGTH;
use config::{CacheOptions, MAX_NAMESPACE_LENGTH};
use kv_store::RELATIVE_EXPIRY_LIMIT;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub max_key_length: usize,
    pub max_namespace_length: usize,
    pub namespace_separator: String,
    /// Smallest ttl step the store honours
    pub ttl_precision: Duration,
    /// Longest ttl the store reads as relative; longer ones are sent as timestamps
    pub max_relative_ttl: u64,
    /// Expiry is fixed when an item is written, reads never extend it
    pub static_ttl: bool,
    pub supports_cas: bool,
    pub supports_counters: bool,
    pub supports_flush: bool,
}

impl Capabilities {
    pub fn for_options(options: &CacheOptions) -> Self {
        Self {
            max_key_length: MAX_KEY_LENGTH,
            max_namespace_length: MAX_NAMESPACE_LENGTH,
            namespace_separator: options.namespace_separator.clone(),
            ttl_precision: Duration::from_secs(1),
            max_relative_ttl: RELATIVE_EXPIRY_LIMIT,
            static_ttl: true,
            supports_cas: true,
            supports_counters: true,
            supports_flush: true,
        }
    }
}
