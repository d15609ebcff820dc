//!
//! Client connection state.
//!
//! [`Conn`] is the shared reply half: shard tasks and disk completions hold
//! it to write frames back. The inbound half ([`ConnDriver`]) owns the read
//! buffer and parser exclusively and lives with whatever drives the socket.
//! Once a connection closes its sink, reply calls become no-ops, so late
//! completions never resurrect a dead client.
//!

use crate::cmd;
use crate::ctx::Ctx;
use crate::buffer::ByteBuf;
use crate::resp::{self, Parsed, Parser};
use bytes::Bytes;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

/// Outbound contract consumed by the core: a connection-owned writer that
/// accepts RESP frames. The network front-end provides the implementation.
pub trait Sink: Send + Sync {
    fn send(&self, frames: Vec<Bytes>);
    fn close(&self);
}

pub struct Conn {
    id: u64,
    /// Currently SELECTed DB index.
    index: AtomicUsize,
    closed: AtomicBool,
    sink: Box<dyn Sink>,
}

impl Conn {
    pub fn new(id: u64, sink: Box<dyn Sink>) -> Arc<Conn> {
        Arc::new(Conn {
            id,
            index: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            sink,
        })
    }

    #[inline(always)]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline(always)]
    pub fn index(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn set_index(&self, index: usize) {
        self.index.store(index, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.sink.close();
        }
    }

    #[inline]
    fn write(&self, frames: Vec<Bytes>) {
        if !self.is_closed() {
            self.sink.send(frames);
        }
    }

    pub fn reply_ok(&self) {
        self.write(resp::ok());
    }

    pub fn reply_nil(&self) {
        self.write(resp::nil());
    }

    pub fn reply_simple(&self, s: Bytes) {
        self.write(resp::simple(s));
    }

    pub fn reply_integer(&self, v: i64) {
        self.write(resp::integer(v));
    }

    pub fn reply_bulk(&self, b: Bytes) {
        self.write(resp::bulk(b));
    }

    pub fn reply_array(&self, items: Vec<Option<Bytes>>) {
        self.write(resp::array(items));
    }

    pub fn reply_error(&self, msg: &str) {
        self.write(resp::error(msg));
    }

    /// Prebuilt single-frame replies, e.g. [`resp::ERR_WRONG_TYPE`].
    pub fn reply_frame(&self, frame: Bytes) {
        self.write(vec![frame]);
    }
}

/////////////////////////////////////////////////////////////////////////////
/////////////////////////////////////////////////////////////////////////////

pub struct ConnDriver {
    conn: Arc<Conn>,
    buf: ByteBuf,
    parser: Parser,
}

impl ConnDriver {
    pub fn new(conn: Arc<Conn>) -> Self {
        ConnDriver {
            conn,
            buf: ByteBuf::new(),
            parser: Parser::new(),
        }
    }

    #[inline(always)]
    pub fn conn(&self) -> &Arc<Conn> {
        &self.conn
    }

    #[inline(always)]
    pub fn buf_mut(&mut self) -> &mut ByteBuf {
        &mut self.buf
    }

    /// Append raw wire bytes and dispatch every complete request.
    pub fn feed(&mut self, ctx: &Arc<Ctx>, bytes: &[u8]) -> bool {
        self.buf.write_bytes(bytes);
        self.on_read(ctx)
    }

    /// Parse and dispatch everything buffered so far. Returns false when
    /// the connection must be closed.
    pub fn on_read(&mut self, ctx: &Arc<Ctx>) -> bool {
        loop {
            match self.parser.parse(&mut self.buf) {
                Parsed::More => return !self.conn.is_closed(),
                Parsed::Error(e) => {
                    self.conn.reply_error(&e);
                    self.conn.close();
                    return false;
                }
                Parsed::Ready(args) => {
                    if args.is_empty() {
                        continue;
                    }
                    if args[0].as_ref() == b"quit" {
                        self.conn.reply_ok();
                        self.conn.close();
                        return false;
                    }
                    cmd::dispatch(ctx, &self.conn, args);
                    if self.conn.is_closed() {
                        return false;
                    }
                }
            }
        }
    }
}
