//!
//! Wire-level command tests: raw RESP bytes in, raw RESP bytes out,
//! running the full dispatch and shard machinery with an in-process sink.
//!

use bytes::Bytes;
use parking_lot::Mutex;
use ruc::*;
use shoal_core::{Conn, ConnDriver, CoreOpts, Ctx, Sink};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

struct TestSink {
    out: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl Sink for TestSink {
    fn send(&self, frames: Vec<Bytes>) {
        let mut out = self.out.lock();
        for f in frames {
            out.extend_from_slice(&f);
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

struct Client {
    driver: ConnDriver,
    out: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl Client {
    fn new() -> Client {
        let out = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let conn = Conn::new(
            NEXT_ID.fetch_add(1, Ordering::Relaxed),
            Box::new(TestSink {
                out: Arc::clone(&out),
                closed: Arc::clone(&closed),
            }),
        );
        Client {
            driver: ConnDriver::new(conn),
            out,
            closed,
        }
    }

    /// Feed wire bytes, wait for every scheduled hop to settle, return the
    /// accumulated reply bytes.
    fn exec(&mut self, ctx: &Arc<Ctx>, wire: &[u8]) -> Vec<u8> {
        self.driver.feed(ctx, wire);
        drain(ctx);
        std::mem::take(&mut *self.out.lock())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn ctx() -> Arc<Ctx> {
    pnk!(Ctx::start(CoreOpts {
        shards: 2,
        queue_capacity: 4096,
        disk: None,
    }))
}

/// Barrier every shard loop a few times so multi-hop commands (fan-out plus
/// a destination store) fully settle.
fn drain(ctx: &Arc<Ctx>) {
    for _ in 0..3 {
        for el in ctx.shards.all() {
            el.schedule_wait(|| ());
        }
    }
}

fn req(args: &[&[u8]]) -> Vec<u8> {
    shoal_core::resp::request(args)
}

/////////////////////////////////////////////////////////////////////////////
// end-to-end scenarios
/////////////////////////////////////////////////////////////////////////////

#[test]
fn ping_pongs() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(c.exec(&ctx, b"*1\r\n$4\r\nPING\r\n"), b"+PONG\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn set_then_get() {
    let ctx = ctx();
    let mut c = Client::new();
    let mut wire = Vec::new();
    wire.extend(req(&[b"SET", b"k", b"hello"]));
    wire.extend(req(&[b"GET", b"k"]));
    assert_eq!(c.exec(&ctx, &wire), b"+OK\r\n$5\r\nhello\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn incr_three_times() {
    let ctx = ctx();
    let mut c = Client::new();
    let one = req(&[b"INCR", b"n"]);
    let mut wire = Vec::new();
    wire.extend_from_slice(&one);
    wire.extend_from_slice(&one);
    wire.extend_from_slice(&one);
    assert_eq!(c.exec(&ctx, &wire), b":1\r\n:2\r\n:3\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn setbit_then_bitcount() {
    let ctx = ctx();
    let mut c = Client::new();
    let mut wire = Vec::new();
    wire.extend(req(&[b"SETBIT", b"b", b"7", b"1"]));
    wire.extend(req(&[b"BITCOUNT", b"b"]));
    assert_eq!(c.exec(&ctx, &wire), b":0\r\n:1\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn append_to_missing_key_creates_it() {
    let ctx = ctx();
    let mut c = Client::new();
    let mut wire = Vec::new();
    wire.extend(req(&[b"APPEND", b"k", b"foo"]));
    wire.extend(req(&[b"GET", b"k"]));
    assert_eq!(c.exec(&ctx, &wire), b":3\r\n$3\r\nfoo\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn bitop_xor_self_zeroes() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(
        c.exec(&ctx, &req(&[b"SET", b"a", b"\xff\xff"])),
        b"+OK\r\n".to_vec()
    );
    assert_eq!(
        c.exec(&ctx, &req(&[b"BITOP", b"XOR", b"d", b"a", b"a"])),
        b":2\r\n".to_vec()
    );
    assert_eq!(
        c.exec(&ctx, &req(&[b"GET", b"d"])),
        b"$2\r\n\x00\x00\r\n".to_vec()
    );
    ctx.shutdown();
}

/////////////////////////////////////////////////////////////////////////////
// command semantics
/////////////////////////////////////////////////////////////////////////////

#[test]
fn get_missing_is_nil() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"nope"])), b"$-1\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn getset_returns_previous() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(
        c.exec(&ctx, &req(&[b"GETSET", b"k", b"one"])),
        b"$-1\r\n".to_vec()
    );
    assert_eq!(
        c.exec(&ctx, &req(&[b"GETSET", b"k", b"two"])),
        b"$3\r\none\r\n".to_vec()
    );
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"k"])), b"$3\r\ntwo\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn mset_then_mget_with_missing_slot() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(
        c.exec(&ctx, &req(&[b"MSET", b"a", b"1", b"b", b"2"])),
        b"+OK\r\n".to_vec()
    );
    assert_eq!(
        c.exec(&ctx, &req(&[b"MGET", b"a", b"missing", b"b"])),
        b"*3\r\n$1\r\n1\r\n$-1\r\n$1\r\n2\r\n".to_vec()
    );
    ctx.shutdown();
}

#[test]
fn mset_rejects_uneven_pairs() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(
        c.exec(&ctx, &req(&[b"MSET", b"a", b"1", b"b"])),
        b"-ERR wrong number of arguments for MSET\r\n".to_vec()
    );
    ctx.shutdown();
}

#[test]
fn del_counts_removed_keys() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"MSET", b"a", b"1", b"b", b"2", b"c", b"3"]));
    assert_eq!(
        c.exec(&ctx, &req(&[b"DEL", b"a", b"b", b"nope"])),
        b":2\r\n".to_vec()
    );
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"a"])), b"$-1\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn incr_decr_round_trips() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(c.exec(&ctx, &req(&[b"INCRBY", b"n", b"41"])), b":41\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"INCRBY", b"n", b"-41"])), b":0\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"DECRBY", b"n", b"5"])), b":-5\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"DECR", b"n"])), b":-6\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn incr_on_raw_decimal_rewrites_in_place() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"n", b"99"]));
    assert_eq!(c.exec(&ctx, &req(&[b"INCR", b"n"])), b":100\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"n"])), b"$3\r\n100\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn incr_on_garbage_is_an_integer_error() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"s", b"not-a-number"]));
    assert_eq!(
        c.exec(&ctx, &req(&[b"INCR", b"s"])),
        b"-ERR value is not an integer or out of range\r\n".to_vec()
    );
    ctx.shutdown();
}

#[test]
fn incr_overflow_is_detected() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"n", b"9223372036854775807"]));
    assert_eq!(
        c.exec(&ctx, &req(&[b"INCR", b"n"])),
        b"-ERR value is not an integer or out of range\r\n".to_vec()
    );
    // the value is untouched
    assert_eq!(
        c.exec(&ctx, &req(&[b"GET", b"n"])),
        b"$19\r\n9223372036854775807\r\n".to_vec()
    );
    ctx.shutdown();
}

#[test]
fn append_concatenates_and_reports_length() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"k", b"abc"]));
    assert_eq!(c.exec(&ctx, &req(&[b"APPEND", b"k", b"def"])), b":6\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"k"])), b"$6\r\nabcdef\r\n".to_vec());

    // appending to an int-encoded value materializes the decimal first
    c.exec(&ctx, &req(&[b"INCRBY", b"n", b"12"]));
    assert_eq!(c.exec(&ctx, &req(&[b"APPEND", b"n", b"34"])), b":4\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"n"])), b"$4\r\n1234\r\n".to_vec());
    ctx.shutdown();
}

/////////////////////////////////////////////////////////////////////////////
// bits
/////////////////////////////////////////////////////////////////////////////

#[test]
fn setbit_reports_previous_bit_and_getbit_reads_it() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(c.exec(&ctx, &req(&[b"SETBIT", b"b", b"10", b"1"])), b":0\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"GETBIT", b"b", b"10"])), b":1\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"SETBIT", b"b", b"10", b"0"])), b":1\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"GETBIT", b"b", b"10"])), b":0\r\n".to_vec());
    // out-of-buffer reads are zero
    assert_eq!(c.exec(&ctx, &req(&[b"GETBIT", b"b", b"4095"])), b":0\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn setbit_clear_restores_bitcount() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"b", b"\x0f\x0f"]));
    assert_eq!(c.exec(&ctx, &req(&[b"BITCOUNT", b"b"])), b":8\r\n".to_vec());
    c.exec(&ctx, &req(&[b"SETBIT", b"b", b"0", b"1"]));
    c.exec(&ctx, &req(&[b"SETBIT", b"b", b"0", b"0"]));
    assert_eq!(c.exec(&ctx, &req(&[b"BITCOUNT", b"b"])), b":8\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn bit_offset_out_of_range_is_rejected() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(
        c.exec(&ctx, &req(&[b"SETBIT", b"b", b"4294967296", b"1"])),
        b"-bit offset is not an integer or out of range\r\n".to_vec()
    );
    assert_eq!(
        c.exec(&ctx, &req(&[b"SETBIT", b"b", b"x", b"1"])),
        b"-bit offset is not an integer or out of range\r\n".to_vec()
    );
    assert_eq!(
        c.exec(&ctx, &req(&[b"SETBIT", b"b", b"1", b"2"])),
        b"-bit offset is not an integer or out of range\r\n".to_vec()
    );
    ctx.shutdown();
}

#[test]
fn bitcount_ranges_use_negative_indexing() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"b", b"foobar"]));
    assert_eq!(c.exec(&ctx, &req(&[b"BITCOUNT", b"b"])), b":26\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"BITCOUNT", b"b", b"0", b"0"])), b":4\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"BITCOUNT", b"b", b"1", b"1"])), b":6\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"BITCOUNT", b"b", b"-2", b"-1"])), b":7\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"BITCOUNT", b"b", b"3", b"1"])), b":0\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn bitop_and_of_one_source_copies_it() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"k", b"xyz"]));
    assert_eq!(
        c.exec(&ctx, &req(&[b"BITOP", b"AND", b"d", b"k"])),
        b":3\r\n".to_vec()
    );
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"d"])), b"$3\r\nxyz\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn bitop_not_requires_one_source() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(
        c.exec(&ctx, &req(&[b"BITOP", b"NOT", b"d", b"a", b"b"])),
        b"-ERR syntax error\r\n".to_vec()
    );
    c.exec(&ctx, &req(&[b"SET", b"a", b"\x00\xff"]));
    assert_eq!(
        c.exec(&ctx, &req(&[b"BITOP", b"not", b"d", b"a"])),
        b":2\r\n".to_vec()
    );
    assert_eq!(
        c.exec(&ctx, &req(&[b"GET", b"d"])),
        b"$2\r\n\xff\x00\r\n".to_vec()
    );
    ctx.shutdown();
}

#[test]
fn bitop_or_pads_short_sources_with_zeroes() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"a", b"\xf0"]));
    c.exec(&ctx, &req(&[b"SET", b"b", b"\x00\x0f"]));
    assert_eq!(
        c.exec(&ctx, &req(&[b"BITOP", b"OR", b"d", b"a", b"b", b"missing"])),
        b":2\r\n".to_vec()
    );
    assert_eq!(
        c.exec(&ctx, &req(&[b"GET", b"d"])),
        b"$2\r\n\xf0\x0f\r\n".to_vec()
    );
    ctx.shutdown();
}

#[test]
fn bitop_on_all_missing_stores_nothing() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(
        c.exec(&ctx, &req(&[b"BITOP", b"XOR", b"d", b"m1", b"m2"])),
        b":0\r\n".to_vec()
    );
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"d"])), b"$-1\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn bitpos_finds_first_matching_bit() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"b", b"\x00\x10"]));
    assert_eq!(c.exec(&ctx, &req(&[b"BITPOS", b"b", b"1"])), b":11\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"BITPOS", b"b", b"0"])), b":0\r\n".to_vec());

    // missing keys
    assert_eq!(c.exec(&ctx, &req(&[b"BITPOS", b"nope", b"0"])), b":0\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"BITPOS", b"nope", b"1"])), b":-1\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn bitpos_all_ones_depends_on_explicit_end() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"b", b"\xff\xff"]));
    assert_eq!(c.exec(&ctx, &req(&[b"BITPOS", b"b", b"0"])), b":16\r\n".to_vec());
    assert_eq!(
        c.exec(&ctx, &req(&[b"BITPOS", b"b", b"0", b"0", b"1"])),
        b":-1\r\n".to_vec()
    );
    ctx.shutdown();
}

/////////////////////////////////////////////////////////////////////////////
// namespaces, types, errors, lifecycle
/////////////////////////////////////////////////////////////////////////////

#[test]
fn select_scopes_keys_per_index() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"k", b"zero"]));
    assert_eq!(c.exec(&ctx, &req(&[b"SELECT", b"1"])), b"+OK\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"k"])), b"$-1\r\n".to_vec());
    c.exec(&ctx, &req(&[b"SET", b"k", b"one"]));

    // flushing index 1 leaves index 0 untouched
    assert_eq!(c.exec(&ctx, &req(&[b"FLUSHDB"])), b"+OK\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"k"])), b"$-1\r\n".to_vec());
    c.exec(&ctx, &req(&[b"SELECT", b"0"]));
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"k"])), b"$4\r\nzero\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn select_validates_the_index() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(
        c.exec(&ctx, &req(&[b"SELECT", b"abc"])),
        b"-ERR invalid DB index\r\n".to_vec()
    );
    assert_eq!(
        c.exec(&ctx, &req(&[b"SELECT", b"16"])),
        b"-ERR DB index is out of range\r\n".to_vec()
    );
    ctx.shutdown();
}

#[test]
fn flushall_clears_every_index() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"k", b"zero"]));
    c.exec(&ctx, &req(&[b"SELECT", b"2"]));
    c.exec(&ctx, &req(&[b"SET", b"k", b"two"]));
    assert_eq!(c.exec(&ctx, &req(&[b"FLUSHALL"])), b"+OK\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"k"])), b"$-1\r\n".to_vec());
    c.exec(&ctx, &req(&[b"SELECT", b"0"]));
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"k"])), b"$-1\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn unknown_command_and_arity_errors() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(
        c.exec(&ctx, &req(&[b"NOSUCH", b"x"])),
        b"-ERR unknown command 'nosuch'\r\n".to_vec()
    );
    assert_eq!(
        c.exec(&ctx, &req(&[b"GET"])),
        b"-ERR wrong number of arguments for 'get' command\r\n".to_vec()
    );
    assert_eq!(
        c.exec(&ctx, &req(&[b"GET", b"a", b"b"])),
        b"-ERR wrong number of arguments for 'get' command\r\n".to_vec()
    );
    ctx.shutdown();
}

#[test]
fn protocol_error_closes_the_connection() {
    let ctx = ctx();
    let mut c = Client::new();
    let out = c.exec(&ctx, b"*1\r\n#4\r\nPING\r\n");
    assert!(out.starts_with(b"-ERR Protocol error"));
    assert!(c.is_closed());
    ctx.shutdown();
}

#[test]
fn quit_replies_ok_and_closes() {
    let ctx = ctx();
    let mut c = Client::new();
    let out = c.exec(&ctx, &req(&[b"quit"]));
    assert_eq!(out, b"+OK\r\n".to_vec());
    assert!(c.is_closed());

    // late replies to a closed connection are dropped
    let out = c.exec(&ctx, &req(&[b"PING"]));
    assert!(out.is_empty());
    ctx.shutdown();
}

#[test]
fn inline_commands_dispatch_too() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(c.exec(&ctx, b"PING\r\n"), b"+PONG\r\n".to_vec());
    assert_eq!(c.exec(&ctx, b"set k \"a b\"\r\nget k\r\n"), b"+OK\r\n$3\r\na b\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn wrongtype_guard_protects_reserved_types() {
    // only strings exist today, so the guard is exercised through bitop's
    // per-source checks with a clean slate
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"s", b"v"]));
    // a plain string passes the guard everywhere
    assert_eq!(c.exec(&ctx, &req(&[b"APPEND", b"s", b"!"])), b":2\r\n".to_vec());
    ctx.shutdown();
}

/////////////////////////////////////////////////////////////////////////////
// expiry commands
/////////////////////////////////////////////////////////////////////////////

#[test]
fn ttl_reports_missing_and_persistent_keys() {
    let ctx = ctx();
    let mut c = Client::new();
    assert_eq!(c.exec(&ctx, &req(&[b"TTL", b"nope"])), b":-2\r\n".to_vec());
    c.exec(&ctx, &req(&[b"SET", b"k", b"v"]));
    assert_eq!(c.exec(&ctx, &req(&[b"TTL", b"k"])), b":-1\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn expire_sets_a_deadline_and_pttl_sees_it() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"k", b"v"]));
    assert_eq!(c.exec(&ctx, &req(&[b"EXPIRE", b"k", b"100"])), b":1\r\n".to_vec());

    let out = c.exec(&ctx, &req(&[b"PTTL", b"k"]));
    let s = String::from_utf8(out).unwrap();
    let ms: i64 = s.trim_start_matches(':').trim_end().parse().unwrap();
    assert!(ms > 90_000 && ms <= 100_000, "pttl out of range: {ms}");

    assert_eq!(c.exec(&ctx, &req(&[b"TTL", b"k"])), b":100\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn expire_in_the_past_deletes() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"k", b"v"]));
    assert_eq!(c.exec(&ctx, &req(&[b"EXPIRE", b"k", b"-1"])), b":1\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"k"])), b"$-1\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"EXPIRE", b"nope", b"10"])), b":0\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn pexpireat_expired_keys_read_as_absent() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"SET", b"k", b"v"]));
    assert_eq!(
        c.exec(&ctx, &req(&[b"PEXPIREAT", b"k", b"1"])),
        b":1\r\n".to_vec()
    );
    assert_eq!(c.exec(&ctx, &req(&[b"GET", b"k"])), b"$-1\r\n".to_vec());
    assert_eq!(c.exec(&ctx, &req(&[b"TTL", b"k"])), b":-2\r\n".to_vec());
    ctx.shutdown();
}

#[test]
fn info_lists_keyspace_counts() {
    let ctx = ctx();
    let mut c = Client::new();
    c.exec(&ctx, &req(&[b"MSET", b"a", b"1", b"b", b"2"]));
    let out = c.exec(&ctx, &req(&[b"INFO"]));
    let s = String::from_utf8_lossy(&out).into_owned();
    assert!(s.starts_with('$'));
    assert!(s.contains("shards:2"));
    assert!(s.contains("db0:keys=2"));
    ctx.shutdown();
}

#[test]
fn separate_connections_share_the_store() {
    let ctx = ctx();
    let mut c1 = Client::new();
    let mut c2 = Client::new();
    c1.exec(&ctx, &req(&[b"SET", b"shared", b"v"]));
    assert_eq!(
        c2.exec(&ctx, &req(&[b"GET", b"shared"])),
        b"$1\r\nv\r\n".to_vec()
    );
    ctx.shutdown();
}
