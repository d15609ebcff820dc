//!
//! Per-shard in-memory database: 16 independent dictionaries selected by
//! the connection's DB index.
//!

use crate::common::{now_ms, DB_NUM};
use crate::dict::Dict;
use crate::object::{Object, Payload};

pub struct MemDb {
    dics: Vec<Dict>,
}

impl MemDb {
    pub fn new() -> Self {
        MemDb {
            dics: (0..DB_NUM).map(|_| Dict::new()).collect(),
        }
    }

    #[inline(always)]
    fn dic(&mut self, index: usize) -> &mut Dict {
        &mut self.dics[if index < DB_NUM { index } else { 0 }]
    }

    /// Look up a live object. Expired objects are dropped on the way and
    /// reported as absent.
    pub fn get(&mut self, index: usize, key: &[u8]) -> Option<&mut Object> {
        let expired = match self.dic(index).peek(key) {
            None => return None,
            Some(o) => o.is_expired(now_ms()),
        };
        if expired {
            self.dic(index).delete(key);
            return None;
        }
        self.dic(index).get(key)
    }

    /// Full overwrite. A live object keeps its slot but is logically
    /// recreated: version bumps and any expiry is cleared. Returns the new
    /// version.
    pub fn set(&mut self, index: usize, key: &[u8], payload: Payload) -> u16 {
        let now = now_ms();
        let dic = self.dic(index);
        if let Some(o) = dic.get(key) {
            if !o.is_expired(now) {
                o.payload = payload;
                o.version = o.version.wrapping_add(1);
                o.expire_ms = 0;
                return o.version;
            }
        }
        dic.delete(key);
        dic.insert(key.to_vec(), Object::string(payload));
        0
    }

    /// Install an object loaded from disk, unless something newer got there
    /// first.
    pub fn install(&mut self, index: usize, key: &[u8], obj: Object) {
        let dic = self.dic(index);
        if dic.peek(key).is_none() {
            dic.insert(key.to_vec(), obj);
        }
    }

    pub fn delete(&mut self, index: usize, key: &[u8]) -> bool {
        self.dic(index).delete(key)
    }

    /// Replace the selected dictionary with a fresh empty one.
    pub fn flush_db(&mut self, index: usize) {
        if index < DB_NUM {
            self.dics[index] = Dict::new();
        }
    }

    pub fn key_count(&self, index: usize) -> usize {
        if index < DB_NUM {
            self.dics[index].len()
        } else {
            0
        }
    }
}

impl Default for MemDb {
    fn default() -> Self {
        Self::new()
    }
}
