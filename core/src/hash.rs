//!
//! Keyed SipHash-2-4 over byte slices.
//!
//! Dictionaries and the shard router take a random key at construction,
//! which keeps bucket and shard placement unpredictable to clients. Disk
//! partition placement must survive restarts, so it uses [`SipKey::FIXED`].
//!

use siphasher::sip::SipHasher24;
use std::hash::Hasher;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SipKey {
    k0: u64,
    k1: u64,
}

impl SipKey {
    /// Stable key for placements that must outlive the process.
    pub const FIXED: SipKey = SipKey::new(0x7368_6f61_6c5f_6b76, 0x7061_7274_6974_696f);

    #[inline(always)]
    pub const fn new(k0: u64, k1: u64) -> Self {
        SipKey { k0, k1 }
    }

    pub fn random() -> Self {
        let seed: u128 = rand::random();
        SipKey {
            k0: seed as u64,
            k1: (seed >> 64) as u64,
        }
    }

    #[inline(always)]
    pub fn hash(&self, data: &[u8]) -> u64 {
        let mut h = SipHasher24::new_with_keys(self.k0, self.k1);
        h.write(data);
        h.finish()
    }
}
