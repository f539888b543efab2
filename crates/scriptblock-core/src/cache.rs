//! Process-wide cache of parsed signatures
//!
//! Keyed by the literal encoding string. Parsing happens outside any lock;
//! when several threads race on the same new encoding, `entry().or_insert`
//! keeps the first insertion and every caller gets that same `Arc`.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::trace;

use crate::encoding::{self, TypeSignature};
use crate::error::SignatureResult;

static GLOBAL_CACHE: Lazy<Arc<SignatureCache>> = Lazy::new(|| Arc::new(SignatureCache::new()));

/// Concurrency-safe map from encoding string to parsed signature.
#[derive(Debug, Default)]
pub struct SignatureCache {
    entries: DashMap<String, Arc<TypeSignature>>,
}

impl SignatureCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// The cache shared by the whole process
    pub fn global() -> Arc<SignatureCache> {
        Arc::clone(&GLOBAL_CACHE)
    }

    /// Return the cached signature for `encoding`, parsing it on first use.
    ///
    /// Parse failures are not cached.
    pub fn get_or_parse(&self, encoding: &str) -> SignatureResult<Arc<TypeSignature>> {
        if let Some(hit) = self.entries.get(encoding) {
            trace!(target: "scriptblock::cache", encoding, "signature cache hit");
            return Ok(Arc::clone(hit.value()));
        }

        let parsed = Arc::new(encoding::parse(encoding)?);
        let entry = self
            .entries
            .entry(encoding.to_string())
            .or_insert(parsed);
        trace!(target: "scriptblock::cache", encoding, "signature cached");
        Ok(Arc::clone(entry.value()))
    }

    /// Look up without parsing
    pub fn get(&self, encoding: &str) -> Option<Arc<TypeSignature>> {
        self.entries.get(encoding).map(|e| Arc::clone(e.value()))
    }

    /// Check if an encoding is cached
    pub fn contains(&self, encoding: &str) -> bool {
        self.entries.contains_key(encoding)
    }

    /// Number of cached signatures
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached signature.
    ///
    /// Bridges already built keep their own `Arc` and are unaffected.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignatureError;
    use std::thread;

    #[test]
    fn test_cache_returns_same_instance() {
        let cache = SignatureCache::new();
        let a = cache.get_or_parse("v@?i").unwrap();
        let b = cache.get_or_parse("v@?i").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_keys_on_literal_string() {
        let cache = SignatureCache::new();
        let plain = cache.get_or_parse("i@:i").unwrap();
        let framed = cache.get_or_parse("i16@0:8i12").unwrap();
        assert!(!Arc::ptr_eq(&plain, &framed));
        assert_eq!(plain.descriptors(), framed.descriptors());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = SignatureCache::new();
        assert_eq!(cache.get_or_parse(""), Err(SignatureError::Empty));
        assert!(cache.get_or_parse("{x").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = SignatureCache::new();
        let sig = cache.get_or_parse("d@?d").unwrap();
        cache.clear();
        assert!(!cache.contains("d@?d"));
        assert!(cache.get("d@?d").is_none());
        assert_eq!(sig.encoding(), "d@?d");
    }

    #[test]
    fn test_concurrent_first_parse() {
        let cache = Arc::new(SignatureCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get_or_parse("{S=i[4d]}@?^v").unwrap())
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for sig in &results[1..] {
            assert!(Arc::ptr_eq(&results[0], sig));
        }
        assert_eq!(cache.len(), 1);
    }
}
