//! Bounded memo cache for rendered highlight markup.
//!
//! Keyed by document id plus an order-independent hash of the range set.
//! Eviction is pluggable: [`Fifo`] and [`Lru`] ship here, anything else can
//! implement [`EvictionPolicy`].

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use lru::LruCache;
use smol_str::SmolStr;

use crate::config::HighlightConfig;
use crate::render::{self, RenderOutput};
use crate::types::HighlightRange;

/// Stable hash of a range set, independent of input order.
///
/// Changes whenever any range's id, bounds, color or timestamp changes.
pub fn ranges_hash(ranges: &[HighlightRange]) -> u64 {
    let mut sorted: Vec<&HighlightRange> = ranges.iter().collect();
    sorted.sort_by(|a, b| {
        (&a.id, a.start, a.end, &a.color, &a.created_at).cmp(&(
            &b.id,
            b.start,
            b.end,
            &b.color,
            &b.created_at,
        ))
    });

    let mut hasher = DefaultHasher::new();
    sorted.len().hash(&mut hasher);
    for range in sorted {
        range.hash(&mut hasher);
    }
    hasher.finish()
}

/// Cache key: which document, rendered with which ranges.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub document_id: SmolStr,
    pub ranges_hash: u64,
}

impl CacheKey {
    pub fn new(document_id: impl Into<SmolStr>, ranges: &[HighlightRange]) -> Self {
        Self {
            document_id: document_id.into(),
            ranges_hash: ranges_hash(ranges),
        }
    }
}

/// Decides which entry leaves the cache when it is full.
pub trait EvictionPolicy<K> {
    /// A new key was stored.
    fn record_insert(&mut self, key: &K);
    /// An existing key was read.
    fn record_access(&mut self, key: &K);
    /// A key was removed outside of eviction.
    fn remove(&mut self, key: &K);
    /// Pick and forget the next key to evict.
    fn next_victim(&mut self) -> Option<K>;
    fn clear(&mut self);
}

/// First in, first out. Reads do not affect eviction order.
#[derive(Debug)]
pub struct Fifo<K> {
    order: VecDeque<K>,
}

impl<K> Default for Fifo<K> {
    fn default() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }
}

impl<K: Clone + PartialEq> EvictionPolicy<K> for Fifo<K> {
    fn record_insert(&mut self, key: &K) {
        self.order.push_back(key.clone());
    }

    fn record_access(&mut self, _key: &K) {}

    fn remove(&mut self, key: &K) {
        self.order.retain(|k| k != key);
    }

    fn next_victim(&mut self) -> Option<K> {
        self.order.pop_front()
    }

    fn clear(&mut self) {
        self.order.clear();
    }
}

/// Least recently used.
pub struct Lru<K: Hash + Eq> {
    recency: LruCache<K, ()>,
}

impl<K: Hash + Eq> Default for Lru<K> {
    fn default() -> Self {
        Self {
            recency: LruCache::unbounded(),
        }
    }
}

impl<K: Hash + Eq> std::fmt::Debug for Lru<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lru")
            .field("len", &self.recency.len())
            .finish()
    }
}

impl<K: Hash + Eq + Clone> EvictionPolicy<K> for Lru<K> {
    fn record_insert(&mut self, key: &K) {
        self.recency.put(key.clone(), ());
    }

    fn record_access(&mut self, key: &K) {
        self.recency.promote(key);
    }

    fn remove(&mut self, key: &K) {
        self.recency.pop(key);
    }

    fn next_victim(&mut self) -> Option<K> {
        self.recency.pop_lru().map(|(key, ())| key)
    }

    fn clear(&mut self) {
        self.recency.clear();
    }
}

/// Cache statistics for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Current number of entries.
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Hit rate in `[0.0, 1.0]`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded render memo cache.
///
/// Results whose canonical validation failed are returned but never stored,
/// so a later render against corrected markup is not shadowed.
#[derive(Debug)]
pub struct RenderCache<P = Lru<CacheKey>> {
    capacity: usize,
    entries: HashMap<CacheKey, RenderOutput>,
    policy: P,
    hits: u64,
    misses: u64,
}

impl RenderCache<Lru<CacheKey>> {
    /// LRU cache holding at most `capacity` renders.
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, Lru::default())
    }

    /// LRU cache sized by `render_cache_capacity`.
    pub fn from_config(config: &HighlightConfig) -> Self {
        Self::new(config.render_cache_capacity)
    }
}

impl<P: EvictionPolicy<CacheKey>> RenderCache<P> {
    pub fn with_policy(capacity: usize, policy: P) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            policy,
            hits: 0,
            misses: 0,
        }
    }

    /// Return the cached render for `(document_id, ranges)`, rendering on miss.
    pub fn get_or_render(
        &mut self,
        document_id: &str,
        markup: &str,
        canonical_text: &str,
        ranges: &[HighlightRange],
    ) -> RenderOutput {
        let key = CacheKey::new(document_id, ranges);
        if let Some(hit) = self.entries.get(&key) {
            self.hits += 1;
            self.policy.record_access(&key);
            tracing::trace!(
                target: "weaver::highlight::cache",
                document_id,
                hash = key.ranges_hash,
                "render cache hit"
            );
            return hit.clone();
        }

        self.misses += 1;
        let output = render::render(markup, canonical_text, ranges);
        if output.validation_passed {
            self.insert(key, output.clone());
        }
        output
    }

    /// Look up without rendering. Counts toward hit/miss statistics.
    pub fn get(&mut self, key: &CacheKey) -> Option<&RenderOutput> {
        if self.entries.contains_key(key) {
            self.hits += 1;
            self.policy.record_access(key);
        } else {
            self.misses += 1;
        }
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: CacheKey, output: RenderOutput) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.contains_key(&key) {
            self.policy.record_access(&key);
            self.entries.insert(key, output);
            return;
        }
        while self.entries.len() >= self.capacity {
            let Some(victim) = self.policy.next_victim() else {
                break;
            };
            self.entries.remove(&victim);
            tracing::trace!(
                target: "weaver::highlight::cache",
                document_id = %victim.document_id,
                "evicted render"
            );
        }
        self.policy.record_insert(&key);
        self.entries.insert(key, output);
    }

    /// Drop every entry for one document. Returns how many were removed.
    pub fn invalidate_document(&mut self, document_id: &str) -> usize {
        let stale: Vec<CacheKey> = self
            .entries
            .keys()
            .filter(|k| k.document_id == document_id)
            .cloned()
            .collect();
        for key in &stale {
            self.entries.remove(key);
            self.policy.remove(key);
        }
        stale.len()
    }

    /// Empty the cache and reset statistics.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.policy.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            size: self.entries.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::types::HighlightColor;

    const MARKUP: &str = "<p>Hello world</p>";
    const TEXT: &str = "Hello world";

    fn range(id: &str, start: i64, end: i64) -> HighlightRange {
        HighlightRange::new(
            id,
            start,
            end,
            HighlightColor::Yellow,
            DateTime::from_timestamp(100, 0).unwrap(),
        )
    }

    fn key(doc: &str) -> CacheKey {
        CacheKey::new(doc, &[])
    }

    fn output(markup: &str) -> RenderOutput {
        RenderOutput {
            markup: markup.to_string(),
            failed_ids: Vec::new(),
            validation_passed: true,
            segments: Vec::new(),
        }
    }

    #[test]
    fn test_hash_is_order_independent() {
        let a = range("a", 0, 3);
        let b = range("b", 2, 5);
        assert_eq!(
            ranges_hash(&[a.clone(), b.clone()]),
            ranges_hash(&[b, a])
        );
    }

    #[test]
    fn test_hash_changes_with_every_field() {
        let base = range("a", 0, 3);
        let h = ranges_hash(std::slice::from_ref(&base));

        let variants = [
            HighlightRange { id: "b".into(), ..base.clone() },
            HighlightRange { start: 1, ..base.clone() },
            HighlightRange { end: 4, ..base.clone() },
            HighlightRange { color: "green".into(), ..base.clone() },
            HighlightRange { created_at: "2020-01-01T00:00:00+00:00".into(), ..base.clone() },
        ];
        for variant in variants {
            assert_ne!(ranges_hash(&[variant]), h);
        }
        assert_ne!(ranges_hash(&[]), h);
    }

    #[test]
    fn test_get_or_render_hits_second_time() {
        let mut cache = RenderCache::new(4);
        let ranges = [range("a", 0, 5)];

        let first = cache.get_or_render("doc", MARKUP, TEXT, &ranges);
        let second = cache.get_or_render("doc", MARKUP, TEXT, &ranges);

        assert_eq!(first, second);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mismatch_is_not_cached() {
        let mut cache = RenderCache::new(4);
        let ranges = [range("a", 0, 5)];

        let out = cache.get_or_render("doc", MARKUP, "stale text", &ranges);
        assert!(!out.validation_passed);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_fifo_ignores_reads() {
        let mut cache = RenderCache::with_policy(2, Fifo::default());
        cache.insert(key("a"), output("a"));
        cache.insert(key("b"), output("b"));
        assert!(cache.get(&key("a")).is_some());

        cache.insert(key("c"), output("c"));
        assert!(cache.get(&key("a")).is_none());
        assert!(cache.get(&key("b")).is_some());
        assert!(cache.get(&key("c")).is_some());
    }

    #[test]
    fn test_lru_keeps_recent_reads() {
        let mut cache = RenderCache::new(2);
        cache.insert(key("a"), output("a"));
        cache.insert(key("b"), output("b"));
        assert!(cache.get(&key("a")).is_some());

        cache.insert(key("c"), output("c"));
        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("b")).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_from_config_uses_capacity() {
        let config = HighlightConfig {
            render_cache_capacity: 1,
            ..HighlightConfig::default()
        };
        let mut cache = RenderCache::from_config(&config);
        assert_eq!(cache.stats().capacity, 1);

        cache.get_or_render("one", MARKUP, TEXT, &[]);
        cache.get_or_render("two", MARKUP, TEXT, &[]);
        assert_eq!(cache.len(), 1);

        let disabled = HighlightConfig {
            render_cache_capacity: 0,
            ..HighlightConfig::default()
        };
        let mut cache = RenderCache::from_config(&disabled);
        cache.get_or_render("doc", MARKUP, TEXT, &[]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = RenderCache::new(0);
        cache.get_or_render("doc", MARKUP, TEXT, &[]);
        cache.get_or_render("doc", MARKUP, TEXT, &[]);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_invalidate_document() {
        let mut cache = RenderCache::new(8);
        cache.get_or_render("one", MARKUP, TEXT, &[]);
        cache.get_or_render("one", MARKUP, TEXT, &[range("a", 0, 5)]);
        cache.get_or_render("two", MARKUP, TEXT, &[]);

        assert_eq!(cache.invalidate_document("one"), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate_document("one"), 0);
    }

    #[test]
    fn test_clear_resets_stats() {
        let mut cache = RenderCache::new(8);
        cache.get_or_render("doc", MARKUP, TEXT, &[]);
        cache.get_or_render("doc", MARKUP, TEXT, &[]);
        cache.clear();

        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 0,
                misses: 0,
                size: 0,
                capacity: 8
            }
        );
    }
}
