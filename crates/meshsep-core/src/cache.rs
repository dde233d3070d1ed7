//! Diagnostic cache
//!
//! Memoizes classification decisions by shape identity so that a shape
//! reached through several parents is only sent to the kernel once.

use std::collections::HashMap;

use meshsep_kernel::ShapeId;

use crate::diagnostic::FailureReason;

/// Cached decision for one shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub is_meshable: bool,
    pub reason: FailureReason,
    /// The shape failed as a unit and was split into its children
    pub decomposed: bool,
}

impl CacheEntry {
    pub fn accepted() -> Self {
        Self {
            is_meshable: true,
            reason: FailureReason::Success,
            decomposed: false,
        }
    }

    pub fn rejected(reason: FailureReason) -> Self {
        Self {
            is_meshable: false,
            reason,
            decomposed: false,
        }
    }

    pub fn decomposed(reason: FailureReason) -> Self {
        Self {
            is_meshable: false,
            reason,
            decomposed: true,
        }
    }
}

/// Identity-keyed decision cache
#[derive(Debug, Clone)]
pub struct DiagnosticCache {
    entries: HashMap<ShapeId, CacheEntry>,
    enabled: bool,
    hits: usize,
    misses: usize,
}

impl Default for DiagnosticCache {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DiagnosticCache {
    /// Create an empty cache
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: HashMap::new(),
            enabled,
            hits: 0,
            misses: 0,
        }
    }

    /// Whether lookups and inserts are active
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn caching on or off; turning it off drops every entry
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.entries.clear();
        }
    }

    /// Look up a decision
    pub fn lookup(&mut self, shape: ShapeId) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }
        let entry = self.entries.get(&shape).copied();
        if entry.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        entry
    }

    /// Record a decision, keeping the first one seen for a shape
    pub fn insert(&mut self, shape: ShapeId, entry: CacheEntry) {
        if self.enabled {
            self.entries.entry(shape).or_insert(entry);
        }
    }

    /// Drop every entry and reset the counters
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookups answered from the cache since the last clear
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Lookups that missed since the last clear
    pub fn misses(&self) -> usize {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_counters() {
        let mut cache = DiagnosticCache::new(true);
        let id = ShapeId::new(7);

        assert_eq!(cache.lookup(id), None);
        cache.insert(id, CacheEntry::rejected(FailureReason::NoTriangles));
        assert_eq!(
            cache.lookup(id),
            Some(CacheEntry::rejected(FailureReason::NoTriangles))
        );
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn test_first_decision_wins() {
        let mut cache = DiagnosticCache::default();
        let id = ShapeId::new(1);
        cache.insert(id, CacheEntry::accepted());
        cache.insert(id, CacheEntry::decomposed(FailureReason::MeshingFailed));
        assert_eq!(cache.lookup(id), Some(CacheEntry::accepted()));
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let mut cache = DiagnosticCache::new(true);
        let id = ShapeId::new(1);
        cache.insert(id, CacheEntry::accepted());
        assert_eq!(cache.len(), 1);

        cache.set_enabled(false);
        assert!(cache.is_empty());
        cache.insert(id, CacheEntry::accepted());
        assert_eq!(cache.lookup(id), None);
        assert_eq!(cache.misses(), 0);
    }
}
