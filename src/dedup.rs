// =============================================================================
// dedup.rs — THE DEDUPLICATION FORTRESS
// =============================================================================
//
// Every scraping pass re-downloads every case's full docket, which means we
// see the same "Upset Bid Filed" entry dozens of times across runs. This
// module implements a hybrid Bloom Filter + LRU Cache suppression engine
// for the ingest path, because inserting the same docket entry twice would
// be like being served the same foreclosure notice twice — once is plenty.
//
// The architecture is intentionally overkill:
//
// 1. First, we check the Bloom filter (O(k) where k is the number of hash
//    functions, which is basically O(1)). If the Bloom filter says "never
//    seen it", we KNOW it's new. Bloom filters never have false negatives.
//
// 2. If the Bloom filter says "maybe seen it" (because Bloom filters DO
//    have false positives), we check the LRU cache for a definitive answer.
//
// 3. The Bloom filter auto-rotates on an interval to prevent saturation.
//    A saturated Bloom filter says "yes" to everything, which is about
//    as useful as a chocolate gavel. Rotation is safe here because the
//    store's append-only insert ALSO suppresses duplicates — this engine
//    just keeps the cheap path cheap.
//
// 4. Everything is thread-safe with parking_lot RwLock, because the whole
//    worker pool funnels ingest through one engine, and data races are not
//    a feature we're looking to implement.
//
// Is this overkill for suppressing re-scraped docket entries? YES.
// Could we just use a HashSet? YES.
// Are we going to use a HashSet? ABSOLUTELY NOT.
// =============================================================================

use bloomfilter::Bloom;
use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// The ingest suppression engine. A monument to over-engineering.
///
/// Keys are CaseEvent::dedup_key() strings — case number + date + type +
/// description — so the same filing seen on consecutive nightly runs gets
/// exactly one row in the store.
pub struct DedupEngine {
    /// First line of defense. Rotated periodically; see maybe_rotate.
    bloom: Arc<RwLock<Bloom<String>>>,

    /// Second line of defense. When the Bloom filter says "maybe",
    /// the LRU cache says "definitely." Bounded so we don't eat all the RAM.
    lru_cache: Arc<RwLock<LruCache<String, bool>>>,

    /// When the Bloom filter was last rotated.
    last_rotation: Arc<RwLock<Instant>>,

    rotation_interval_secs: u64,

    /// Parameters for creating new Bloom filters on rotation.
    bloom_expected_items: u64,
    bloom_fp_rate: f64,

    /// Counters for metrics. Because if we can't measure it,
    /// did the deduplication even happen?
    pub stats: Arc<DedupStats>,
}

/// Statistics about deduplication operations.
/// All counters are atomic because we're allergic to mutexes.
pub struct DedupStats {
    pub checks: portable_atomic::AtomicU64,
    pub unique: portable_atomic::AtomicU64,
    pub duplicates: portable_atomic::AtomicU64,
    pub rotations: portable_atomic::AtomicU64,
    /// How many times the Bloom filter said "maybe" and the LRU had to
    /// break the tie (the "false positive rescue" counter).
    pub bloom_maybe_hits: portable_atomic::AtomicU64,
}

impl DedupStats {
    fn new() -> Self {
        Self {
            checks: portable_atomic::AtomicU64::new(0),
            unique: portable_atomic::AtomicU64::new(0),
            duplicates: portable_atomic::AtomicU64::new(0),
            rotations: portable_atomic::AtomicU64::new(0),
            bloom_maybe_hits: portable_atomic::AtomicU64::new(0),
        }
    }
}

impl DedupEngine {
    /// Create a new DedupEngine.
    ///
    /// # Arguments
    /// * `expected_items` - How many docket entries we expect before rotation
    /// * `fp_rate` - Target false positive rate (0.01 = 1%)
    /// * `lru_capacity` - Maximum items in the LRU cache
    /// * `rotation_interval_secs` - Seconds between Bloom filter rotations
    pub fn new(
        expected_items: u64,
        fp_rate: f64,
        lru_capacity: usize,
        rotation_interval_secs: u64,
    ) -> Self {
        info!(
            expected_items = expected_items,
            fp_rate = fp_rate,
            lru_capacity = lru_capacity,
            rotation_secs = rotation_interval_secs,
            "Initializing ingest dedup engine — repeat docket entries will be ELIMINATED"
        );

        let bloom = Bloom::new_for_fp_rate(expected_items as usize, fp_rate);
        let lru_size = NonZeroUsize::new(lru_capacity).unwrap_or(NonZeroUsize::new(1000).unwrap());
        let lru_cache = LruCache::new(lru_size);

        Self {
            bloom: Arc::new(RwLock::new(bloom)),
            lru_cache: Arc::new(RwLock::new(lru_cache)),
            last_rotation: Arc::new(RwLock::new(Instant::now())),
            rotation_interval_secs,
            bloom_expected_items: expected_items,
            bloom_fp_rate: fp_rate,
            stats: Arc::new(DedupStats::new()),
        }
    }

    /// Check if a docket entry has been seen before, and if not, mark it.
    ///
    /// Returns `true` if the entry is NEW (not a duplicate).
    /// Returns `false` if the entry has been seen before.
    ///
    /// The logic flow:
    /// 1. Check if Bloom filter rotation is needed
    /// 2. Check Bloom filter for fast "definitely new" answer
    /// 3. If Bloom says "maybe seen", check LRU cache
    /// 4. If truly new, add to both Bloom filter and LRU cache
    ///
    /// Thread-safe end to end, which matters because the whole batch loop
    /// races through here at once.
    pub fn check_and_insert(&self, key: &str) -> bool {
        use portable_atomic::Ordering;

        self.stats.checks.fetch_add(1, Ordering::Relaxed);

        // Step 0: Maybe rotate the bloom filter if it's getting stale
        self.maybe_rotate();

        // Step 1: Check the Bloom filter
        // Read lock only — multiple workers can check simultaneously
        let bloom_says_maybe_seen = {
            let bloom = self.bloom.read();
            bloom.check(&key.to_string())
        };

        if bloom_says_maybe_seen {
            // The Bloom filter thinks it's seen this before.
            // But Bloom filters lie (false positives). Let's check the LRU.
            self.stats.bloom_maybe_hits.fetch_add(1, Ordering::Relaxed);

            let mut lru = self.lru_cache.write();
            if lru.get(&key.to_string()).is_some() {
                // LRU confirms: genuine duplicate. Same filing, new pass.
                self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Duplicate docket entry — Bloom + LRU confirmed");
                return false;
            }

            // Bloom said "maybe" but LRU said "nope".
            // A Bloom false positive — the entry is actually new.
            debug!(
                key = key,
                "Bloom false positive rescued by LRU — docket entry is actually new"
            );
        }

        // Step 2: Genuinely new. Add it everywhere.
        {
            let mut bloom = self.bloom.write();
            bloom.set(&key.to_string());
        }
        {
            let mut lru = self.lru_cache.write();
            lru.put(key.to_string(), true);
        }

        self.stats.unique.fetch_add(1, Ordering::Relaxed);
        debug!(key = key, "New docket entry accepted by the dedup engine");
        true
    }

    /// Rotate the Bloom filter if its time has come.
    ///
    /// Rotation installs a fresh, empty filter so the old one can't
    /// saturate into a machine that rejects every filing in the state.
    /// The LRU cache is NOT rotated — it self-evicts naturally.
    fn maybe_rotate(&self) {
        let should_rotate = {
            let last = self.last_rotation.read();
            last.elapsed().as_secs() >= self.rotation_interval_secs
        };

        if should_rotate {
            let mut bloom = self.bloom.write();
            let mut last = self.last_rotation.write();

            // Double-check after acquiring write lock (another worker might
            // have rotated while we were waiting for the lock)
            if last.elapsed().as_secs() >= self.rotation_interval_secs {
                *bloom = Bloom::new_for_fp_rate(
                    self.bloom_expected_items as usize,
                    self.bloom_fp_rate,
                );
                *last = Instant::now();

                self.stats.rotations.fetch_add(1, portable_atomic::Ordering::Relaxed);
                info!("Bloom filter rotated — fresh filter installed, old dockets forgotten");
            }
        }
    }

    /// Get a snapshot of the current dedup statistics.
    /// Useful for the metrics endpoint.
    pub fn snapshot(&self) -> DedupSnapshot {
        use portable_atomic::Ordering;
        DedupSnapshot {
            total_checks: self.stats.checks.load(Ordering::Relaxed),
            unique_items: self.stats.unique.load(Ordering::Relaxed),
            duplicates_caught: self.stats.duplicates.load(Ordering::Relaxed),
            bloom_rotations: self.stats.rotations.load(Ordering::Relaxed),
            bloom_false_positive_rescues: self.stats.bloom_maybe_hits.load(Ordering::Relaxed),
            lru_cache_size: self.lru_cache.read().len(),
        }
    }
}

/// A snapshot of dedup engine statistics at a point in time.
/// Serializable for the metrics endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DedupSnapshot {
    pub total_checks: u64,
    pub unique_items: u64,
    pub duplicates_caught: u64,
    pub bloom_rotations: u64,
    pub bloom_false_positive_rescues: u64,
    pub lru_cache_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entries_are_accepted() {
        let engine = DedupEngine::new(1000, 0.01, 100, 3600);
        assert!(engine.check_and_insert("24SP001234-910:2024-03-12:upset bid filed:bid of $105,000"));
    }

    #[test]
    fn test_duplicate_entries_are_rejected() {
        let engine = DedupEngine::new(1000, 0.01, 100, 3600);
        assert!(engine.check_and_insert("24SP001234-910:2024-03-12:upset bid filed:bid of $105,000"));
        assert!(!engine.check_and_insert("24SP001234-910:2024-03-12:upset bid filed:bid of $105,000"));
    }

    #[test]
    fn test_different_entries_are_accepted() {
        let engine = DedupEngine::new(1000, 0.01, 100, 3600);
        assert!(engine.check_and_insert("24SP001234-910:2024-03-04:report of foreclosure sale:sold"));
        assert!(engine.check_and_insert("24SP001234-910:2024-03-12:upset bid filed:bid of $105,000"));
    }
}
