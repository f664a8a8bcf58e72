//! LRU (Least Recently Used) cache with an eviction hook.
//!
//! A fixed-capacity key→value map with strict recency ordering. It knows
//! nothing about pages, transactions or disks: the buffer pool decides what
//! may be evicted, the cache only keeps the order.

use std::collections::HashMap;
use std::hash::Hash;

/// A node in the recency list.
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Fixed-capacity LRU cache.
///
/// Entries live in a slab (`Vec<Option<Node>>`) and are chained into a
/// doubly linked list by index, most recently used at the head. A `HashMap`
/// maps keys to slab indices, giving O(1) `get`, `put` and `remove`.
///
/// # Not Thread-Safe
/// The buffer pool wraps the cache in a `Mutex`.
///
/// # Example
/// ```
/// use heapdb::buffer::LruCache;
///
/// let mut cache = LruCache::new(2);
/// cache.put("a", 1, |_, _| Ok::<_, ()>(())).unwrap();
/// cache.put("b", 2, |_, _| Ok::<_, ()>(())).unwrap();
/// assert_eq!(cache.get(&"a"), Some(&1));
///
/// // "b" is now least recently used and gets evicted
/// let mut evicted = Vec::new();
/// cache
///     .put("c", 3, |k, _| {
///         evicted.push(k);
///         Ok::<_, ()>(())
///     })
///     .unwrap();
/// assert_eq!(evicted, vec!["b"]);
/// ```
pub struct LruCache<K, V> {
    capacity: usize,
    map: HashMap<K, usize>,
    nodes: Vec<Option<Node<K, V>>>,
    /// Slab slots free for reuse.
    free: Vec<usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used.
    tail: Option<usize>,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");

        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up `key` and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.unlink(idx);
        self.push_front(idx);
        Some(&self.node(idx).value)
    }

    /// Look up `key` without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.map.get(key).map(|&idx| &self.node(idx).value)
    }

    /// Membership check without touching recency.
    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Insert `key` as the most recently used entry.
    ///
    /// An existing entry for `key` is dropped first. Then, while the cache
    /// is at capacity, the least recently used entry is removed and handed
    /// to `on_evict`. If `on_evict` fails, `key` is not inserted and the
    /// error is returned; entries already evicted stay evicted.
    pub fn put<E, F>(&mut self, key: K, value: V, mut on_evict: F) -> Result<(), E>
    where
        F: FnMut(K, V) -> Result<(), E>,
    {
        self.remove(&key);

        while self.map.len() >= self.capacity {
            match self.pop_lru() {
                Some((k, v)) => on_evict(k, v)?,
                None => break,
            }
        }

        let idx = self.alloc(Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.push_front(idx);
        self.map.insert(key, idx);
        Ok(())
    }

    /// Remove `key` without invoking any eviction hook.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.release(idx).map(|node| node.value)
    }

    /// Snapshot of the values, most recently used first.
    pub fn values(&self) -> Vec<&V> {
        self.iter().map(|(_, v)| v).collect()
    }

    /// Entries, most recently used first.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        std::iter::successors(self.head, move |&idx| self.node(idx).next).map(move |idx| {
            let node = self.node(idx);
            (&node.key, &node.value)
        })
    }

    /// The least recently used key whose entry satisfies `pred`.
    pub fn least_recent_where<P>(&self, mut pred: P) -> Option<&K>
    where
        P: FnMut(&K, &V) -> bool,
    {
        let mut cursor = self.tail;
        while let Some(idx) = cursor {
            let node = self.node(idx);
            if pred(&node.key, &node.value) {
                return Some(&node.key);
            }
            cursor = node.prev;
        }
        None
    }

    // ========================================================================
    // Internal: list and slab management
    // ========================================================================

    fn node(&self, idx: usize) -> &Node<K, V> {
        self.nodes[idx].as_ref().expect("linked slab slot is occupied")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<K, V> {
        self.nodes[idx].as_mut().expect("linked slab slot is occupied")
    }

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) -> Option<Node<K, V>> {
        let node = self.nodes[idx].take();
        self.free.push(idx);
        node
    }

    fn pop_lru(&mut self) -> Option<(K, V)> {
        let idx = self.tail?;
        self.unlink(idx);
        let node = self.release(idx)?;
        self.map.remove(&node.key);
        Some((node.key, node.value))
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };

        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }

        let node = self.node_mut(idx);
        node.prev = None;
        node.next = None;
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.node_mut(idx);
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.node_mut(h).prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }
}
