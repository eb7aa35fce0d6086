//! Adaptive replacement cache.
//!
//! Fixed-capacity store that balances recency against frequency: entries
//! seen once sit in a recency list (`t1`), entries seen again move to a
//! frequency list (`t2`), and ghost lists (`b1`, `b2`) remember recently
//! evicted keys so the target split `p` between the two resident lists can
//! adapt to the workload. A scan of one-shot keys churns through `t1`
//! without displacing the frequently hit entries in `t2`, which plain LRU
//! cannot offer.

use std::hash::Hash;
use std::sync::Mutex;

use lru::LruCache;

pub struct AdaptiveCache<K: Eq + Hash + Clone, V: Clone> {
    capacity: usize,
    state: Mutex<State<K, V>>,
}

struct State<K: Eq + Hash, V> {
    /// Resident entries seen exactly once since admission.
    t1: LruCache<K, V>,
    /// Resident entries seen at least twice.
    t2: LruCache<K, V>,
    /// Ghost keys recently evicted from `t1`.
    b1: LruCache<K, ()>,
    /// Ghost keys recently evicted from `t2`.
    b2: LruCache<K, ()>,
    /// Target size for `t1`.
    p: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> AdaptiveCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        AdaptiveCache {
            capacity: capacity.max(1),
            state: Mutex::new(State {
                t1: LruCache::unbounded(),
                t2: LruCache::unbounded(),
                b1: LruCache::unbounded(),
                b2: LruCache::unbounded(),
                p: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.t1.len() + state.t2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the key is resident, without touching its position.
    pub fn contains(&self, key: &K) -> bool {
        let state = self.state.lock().unwrap();
        state.t1.contains(key) || state.t2.contains(key)
    }

    /// A hit promotes the entry to the frequency list.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock().unwrap();
        if let Some(value) = state.t1.pop(key) {
            state.t2.put(key.clone(), value.clone());
            return Some(value);
        }
        state.t2.get(key).cloned()
    }

    /// Inserts or updates; evicting a colder entry is internal and never
    /// fails.
    pub fn put(&self, key: K, value: V) {
        let capacity = self.capacity;
        let mut state = self.state.lock().unwrap();

        // resident hit: update in place and promote
        if state.t1.pop(&key).is_some() || state.t2.contains(&key) {
            state.t2.put(key, value);
            return;
        }

        if state.b1.contains(&key) {
            // ghost hit in the recency history: grow the recency target
            let delta = (state.b2.len() / state.b1.len()).max(1);
            state.p = (state.p + delta).min(capacity);
            state.evict(false);
            state.b1.pop(&key);
            state.t2.put(key, value);
        } else if state.b2.contains(&key) {
            // ghost hit in the frequency history: shrink the recency target
            let delta = (state.b1.len() / state.b2.len()).max(1);
            state.p = state.p.saturating_sub(delta);
            state.evict(true);
            state.b2.pop(&key);
            state.t2.put(key, value);
        } else {
            let l1 = state.t1.len() + state.b1.len();
            if l1 == capacity {
                if state.t1.len() < capacity {
                    state.b1.pop_lru();
                    state.evict(false);
                } else {
                    // b1 is empty; drop the coldest once-seen entry outright
                    state.t1.pop_lru();
                }
            } else {
                let total = l1 + state.t2.len() + state.b2.len();
                if total >= capacity {
                    if total == 2 * capacity {
                        state.b2.pop_lru();
                    }
                    state.evict(false);
                }
            }
            state.t1.put(key, value);
        }
    }
}

impl<K: Eq + Hash + Clone, V> State<K, V> {
    /// Demotes one resident entry to its ghost list, honoring the adaptive
    /// target `p`. `from_b2_hit` breaks the tie the way the frequency side
    /// expects.
    fn evict(&mut self, from_b2_hit: bool) {
        let t1_len = self.t1.len();
        let prefer_t1 = t1_len >= 1 && (t1_len > self.p || (from_b2_hit && t1_len == self.p));
        if prefer_t1 {
            if let Some((key, _)) = self.t1.pop_lru() {
                self.b1.put(key, ());
                return;
            }
        }
        if let Some((key, _)) = self.t2.pop_lru() {
            self.b2.put(key, ());
        } else if let Some((key, _)) = self.t1.pop_lru() {
            self.b1.put(key, ());
        }
    }
}
