//!
//! Incrementally-rehashed open-chaining dictionary.
//!
//! Two sub-tables: at rest only table 0 is populated. A grow moves table 0
//! into table 1 and reallocates table 0 at the next power of two; from then
//! on every lookup migrates one source bucket until table 1 drains, while
//! inserts land directly in table 0. A key lives in at most one table.
//!


use crate::hash::SipKey;
use crate::object::Object;

const INITIAL_SIZE: usize = 4;

/// Grow once the primary table holds three entries for every four buckets.
const GROW_LOAD_NUM: usize = 3;
const GROW_LOAD_DEN: usize = 4;

struct Entry {
    hash: u64,
    key: Vec<u8>,
    obj: Object,
    next: Option<Box<Entry>>,
}

struct Table {
    buckets: Vec<Option<Box<Entry>>>,
    used: usize,
}

impl Table {
    fn empty() -> Self {
        Table {
            buckets: Vec::new(),
            used: 0,
        }
    }

    fn with_size(size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        let mut buckets = Vec::with_capacity(size);
        buckets.resize_with(size, || None);
        Table { buckets, used: 0 }
    }

    #[inline(always)]
    fn mask(&self) -> usize {
        self.buckets.len() - 1
    }

    fn find(&self, h: u64, key: &[u8]) -> Option<&Entry> {
        if self.buckets.is_empty() {
            return None;
        }
        let mut cur = self.buckets[h as usize & self.mask()].as_deref();
        while let Some(e) = cur {
            if e.hash == h && e.key == key {
                return Some(e);
            }
            cur = e.next.as_deref();
        }
        None
    }

    fn find_mut(&mut self, h: u64, key: &[u8]) -> Option<&mut Entry> {
        if self.buckets.is_empty() {
            return None;
        }
        let idx = h as usize & self.mask();
        let mut cur = self.buckets[idx].as_deref_mut();
        while let Some(e) = cur {
            if e.hash == h && e.key == key {
                return Some(e);
            }
            cur = e.next.as_deref_mut();
        }
        None
    }

    /// Unlink and return the matching entry, if any.
    fn remove(&mut self, h: u64, key: &[u8]) -> Option<Box<Entry>> {
        if self.buckets.is_empty() {
            return None;
        }
        let idx = h as usize & self.mask();
        let mut slot = &mut self.buckets[idx];
        loop {
            let hit = match slot.as_deref() {
                None => return None,
                Some(e) => e.hash == h && e.key == key,
            };
            if hit {
                let mut e = slot.take()?;
                *slot = e.next.take();
                self.used -= 1;
                return Some(e);
            }
            let cur = slot.as_mut()?;
            slot = &mut cur.next;
        }
    }

    /// Head insertion into the bucket computed from the cached hash.
    fn push_front(&mut self, mut e: Box<Entry>) {
        let idx = e.hash as usize & self.mask();
        e.next = self.buckets[idx].take();
        self.buckets[idx] = Some(e);
        self.used += 1;
    }
}

pub struct Dict {
    tables: [Table; 2],
    rehash_idx: Option<usize>,
    key: SipKey,
}

impl Dict {
    pub fn new() -> Self {
        Dict {
            tables: [Table::empty(), Table::empty()],
            rehash_idx: None,
            key: SipKey::random(),
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.tables[0].used + self.tables[1].used
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up without side effects.
    pub fn peek(&self, key: &[u8]) -> Option<&Object> {
        if self.is_empty() {
            return None;
        }
        let h = self.key.hash(key);
        if let Some(e) = self.tables[0].find(h, key) {
            return Some(&e.obj);
        }
        self.tables[1].find(h, key).map(|e| &e.obj)
    }

    /// Look up for mutation; performs one rehash step as a side effect when
    /// a rehash is in progress.
    pub fn get(&mut self, key: &[u8]) -> Option<&mut Object> {
        if self.is_empty() {
            return None;
        }
        self.rehash_step(1);
        let h = self.key.hash(key);
        let (t0, t1) = self.tables.split_at_mut(1);
        if let Some(e) = t0[0].find_mut(h, key) {
            return Some(&mut e.obj);
        }
        t1[0].find_mut(h, key).map(|e| &mut e.obj)
    }

    /// Insert a fresh entry. Duplicate keys are the caller's concern: look
    /// up first and mutate in place, or delete before inserting.
    pub fn insert(&mut self, key: Vec<u8>, obj: Object) {
        self.expand_if_needed();
        let hash = self.key.hash(&key);
        self.tables[0].push_front(Box::new(Entry {
            hash,
            key,
            obj,
            next: None,
        }));
    }

    pub fn delete(&mut self, key: &[u8]) -> bool {
        if self.is_empty() {
            return false;
        }
        let h = self.key.hash(key);
        if self.tables[0].remove(h, key).is_some() {
            return true;
        }
        self.tables[1].remove(h, key).is_some()
    }

    /// Migrate up to `n` source buckets from table 1 into table 0.
    pub fn rehash_step(&mut self, mut n: usize) {
        while n > 0 {
            let Some(idx) = self.rehash_idx else {
                return;
            };
            if idx >= self.tables[1].buckets.len() {
                break;
            }

            let mut chain = self.tables[1].buckets[idx].take();
            while let Some(mut e) = chain {
                chain = e.next.take();
                self.tables[1].used -= 1;
                self.tables[0].push_front(e);
            }

            self.rehash_idx = Some(idx + 1);
            n -= 1;
            if self.tables[1].used == 0 {
                break;
            }
        }

        if self.rehash_idx.is_some() && self.tables[1].used == 0 {
            self.tables[1] = Table::empty();
            self.rehash_idx = None;
        }
    }

    fn expand_if_needed(&mut self) {
        if self.rehash_idx.is_some() || !self.tables[1].buckets.is_empty() {
            return;
        }
        let size = self.tables[0].buckets.len();
        if size == 0 {
            self.tables[0] = Table::with_size(INITIAL_SIZE);
            return;
        }
        if self.tables[0].used * GROW_LOAD_DEN < size * GROW_LOAD_NUM {
            return;
        }

        let newsize = (size * 2).next_power_of_two().max(INITIAL_SIZE);
        let old = std::mem::replace(&mut self.tables[0], Table::with_size(newsize));
        if old.used > 0 {
            self.tables[1] = old;
            self.rehash_idx = Some(0);
        }
    }

    #[cfg(test)]
    pub(crate) fn rehashing(&self) -> bool {
        self.rehash_idx.is_some()
    }

    #[cfg(test)]
    pub(crate) fn table_stats(&self) -> (usize, usize, usize, usize) {
        (
            self.tables[0].buckets.len(),
            self.tables[0].used,
            self.tables[1].buckets.len(),
            self.tables[1].used,
        )
    }
}

impl Default for Dict {
    fn default() -> Self {
        Self::new()
    }
}
