//!
//! Growable byte region with separate read and write cursors.
//!
//! Connections read from the socket into the writable tail and the RESP
//! parser consumes from the readable head, so network progress and parse
//! progress advance independently.
//!

use crate::common::KB;

const GROW_LIMIT: usize = 64 * KB;

pub struct ByteBuf {
    buf: Vec<u8>,
    rpos: usize,
    wpos: usize,
}

impl ByteBuf {
    pub fn new() -> Self {
        Self::with_capacity(4 * KB)
    }

    pub fn with_capacity(cap: usize) -> Self {
        ByteBuf {
            buf: vec![0; cap.max(1)],
            rpos: 0,
            wpos: 0,
        }
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline(always)]
    pub fn readable(&self) -> usize {
        self.wpos - self.rpos
    }

    #[inline(always)]
    pub fn writable(&self) -> usize {
        self.buf.len() - self.wpos
    }

    #[inline(always)]
    pub fn readable_slice(&self) -> &[u8] {
        &self.buf[self.rpos..self.wpos]
    }

    #[inline(always)]
    pub fn writable_slice(&mut self) -> &mut [u8] {
        &mut self.buf[self.wpos..]
    }

    /// Consume `n` readable bytes. Cursors rewind to the front once the
    /// region drains so the buffer does not creep forever.
    pub fn advance_read(&mut self, n: usize) {
        debug_assert!(n <= self.readable());
        self.rpos += n;
        if self.rpos == self.wpos {
            self.rpos = 0;
            self.wpos = 0;
        }
    }

    pub fn advance_write(&mut self, n: usize) {
        debug_assert!(n <= self.writable());
        self.wpos += n;
    }

    /// Doubles capacity up to 64 KiB, then grows by 64 KiB increments.
    pub fn expand(&mut self) {
        let cap = self.buf.len();
        let newcap = if cap < GROW_LIMIT {
            cap * 2
        } else {
            cap + GROW_LIMIT
        };
        self.buf.resize(newcap, 0);
    }

    /// Make at least one writable byte available, compacting the consumed
    /// head before growing.
    pub fn ensure_writable(&mut self) {
        if self.writable() > 0 {
            return;
        }
        if self.rpos > 0 {
            self.buf.copy_within(self.rpos..self.wpos, 0);
            self.wpos -= self.rpos;
            self.rpos = 0;
            if self.writable() > 0 {
                return;
            }
        }
        self.expand();
    }

    /// Append bytes, growing as needed.
    pub fn write_bytes(&mut self, data: &[u8]) {
        while self.writable() < data.len() {
            self.ensure_writable();
            if self.writable() >= data.len() {
                break;
            }
            self.expand();
        }
        self.buf[self.wpos..self.wpos + data.len()].copy_from_slice(data);
        self.wpos += data.len();
    }
}

impl Default for ByteBuf {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursors_track_reads_and_writes() {
        let mut b = ByteBuf::with_capacity(8);
        assert_eq!(b.readable(), 0);
        b.write_bytes(b"hello");
        assert_eq!(b.readable(), 5);
        assert_eq!(b.readable_slice(), b"hello");

        b.advance_read(2);
        assert_eq!(b.readable_slice(), b"llo");

        // draining rewinds both cursors
        b.advance_read(3);
        assert_eq!(b.readable(), 0);
        b.write_bytes(b"x");
        assert_eq!(b.readable_slice(), b"x");
    }

    #[test]
    fn expand_doubles_then_steps() {
        let mut b = ByteBuf::with_capacity(4 * KB);
        b.expand();
        assert_eq!(b.capacity(), 8 * KB);
        b.expand();
        b.expand();
        b.expand();
        assert_eq!(b.capacity(), 64 * KB);
        b.expand();
        assert_eq!(b.capacity(), 128 * KB);
        b.expand();
        assert_eq!(b.capacity(), 192 * KB);
    }

    #[test]
    fn ensure_writable_compacts_before_growing() {
        let mut b = ByteBuf::with_capacity(4);
        b.write_bytes(b"abcd");
        b.advance_read(3);
        assert_eq!(b.writable(), 0);
        b.ensure_writable();
        assert_eq!(b.readable_slice(), b"d");
        assert!(b.writable() > 0);
        assert_eq!(b.capacity(), 4);
    }

    #[test]
    fn write_bytes_grows_past_capacity() {
        let mut b = ByteBuf::with_capacity(2);
        b.write_bytes(&[7u8; 1000]);
        assert_eq!(b.readable(), 1000);
        assert!(b.readable_slice().iter().all(|&x| x == 7));
    }
}
