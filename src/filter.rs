//! Negative-lookup filter (C5) — a per-namespace approximate-membership
//! set used to short-circuit lookups for identifiers never observed as
//! present.
//!
//! Grounded on the beagle-cache example's use of `bloomfilter::Bloom`
//! (`Bloom::new_for_fp_rate(capacity, fp_rate)`, `bloom_capacity`/
//! `bloom_fp_rate` configuration fields).

use bloomfilter::Bloom;
use dashmap::DashMap;
use parking_lot::Mutex;

/// Owns one Bloom filter per logical namespace, created lazily on first
/// reference. A namespace with no filter yet behaves as "might contain
/// everything" — callers create it via [`NegativeLookupFilter::add`] the
/// first time they observe a present key.
pub struct NegativeLookupFilter {
    expected_insertions: usize,
    false_positive_rate: f64,
    namespaces: DashMap<String, Mutex<Bloom<String>>>,
}

impl NegativeLookupFilter {
    #[must_use]
    pub fn new(expected_insertions: usize, false_positive_rate: f64) -> Self {
        Self {
            expected_insertions,
            false_positive_rate,
            namespaces: DashMap::new(),
        }
    }

    fn new_bloom(&self) -> Bloom<String> {
        Bloom::new_for_fp_rate(self.expected_insertions, self.false_positive_rate)
    }

    /// Records `key` as present in `namespace`.
    pub fn add(&self, namespace: &str, key: &str) {
        let entry = self
            .namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| Mutex::new(self.new_bloom()));
        entry.lock().set(&key.to_string());
    }

    /// Returns false only if `key` was definitely never `add`-ed to
    /// `namespace`'s filter since its construction (no false negatives).
    /// A namespace with no filter yet returns true (might contain
    /// everything).
    #[must_use]
    pub fn might_contain(&self, namespace: &str, key: &str) -> bool {
        match self.namespaces.get(namespace) {
            Some(bloom) => bloom.lock().check(&key.to_string()),
            None => true,
        }
    }

    /// Resets the filter for `namespace`, discarding all recorded keys.
    pub fn clear(&self, namespace: &str) {
        self.namespaces
            .insert(namespace.to_string(), Mutex::new(self.new_bloom()));
    }
}
