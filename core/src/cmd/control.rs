//!
//! Control-plane commands: liveness, namespace selection, flushes, expiry
//! bookkeeping and manual compaction.
//!

use super::{persist, persist_delete, with_key, MultiResult};
use crate::common::{now_ms, parse_i64, DB_NUM};
use crate::conn::Conn;
use crate::ctx::Ctx;
use crate::resp;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

pub fn command(_ctx: &Arc<Ctx>, conn: &Arc<Conn>, _args: Vec<Bytes>) {
    conn.reply_ok();
}

pub fn ping(_ctx: &Arc<Ctx>, conn: &Arc<Conn>, _args: Vec<Bytes>) {
    conn.reply_simple(resp::PONG.clone());
}

/// Aggregates key counts from every shard before replying.
pub fn info(ctx: &Arc<Ctx>, conn: &Arc<Conn>, _args: Vec<Bytes>) {
    let shards = ctx.shards.len();
    let partitions = ctx.saver.as_ref().map(|s| s.partitions()).unwrap_or(0);

    let counts = Arc::new(Mutex::new(vec![0usize; DB_NUM]));
    let rets = MultiResult::new(shards);

    for el in ctx.shards.all() {
        let counts = Arc::clone(&counts);
        let rets = Arc::clone(&rets);
        let conn = Arc::clone(conn);
        el.schedule_nowait(move |db| {
            {
                let mut c = counts.lock();
                for (i, slot) in c.iter_mut().enumerate() {
                    *slot += db.key_count(i);
                }
            }
            if rets.finish_one() {
                let mut out = String::new();
                out.push_str("# Server\r\n");
                out.push_str(concat!("shoal_version:", env!("CARGO_PKG_VERSION"), "\r\n"));
                out.push_str(&format!("shards:{shards}\r\n"));
                out.push_str(&format!("partitions:{partitions}\r\n"));
                out.push_str("# Keyspace\r\n");
                for (i, n) in counts.lock().iter().enumerate() {
                    if *n > 0 {
                        out.push_str(&format!("db{i}:keys={n}\r\n"));
                    }
                }
                conn.reply_bulk(Bytes::from(out.into_bytes()));
            }
        });
    }
}

pub fn select(_ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    let Some(n) = parse_i64(&args[1]) else {
        conn.reply_frame(resp::ERR_DB_INDEX.clone());
        return;
    };
    if n < 0 || n >= DB_NUM as i64 {
        conn.reply_frame(resp::ERR_DB_RANGE.clone());
        return;
    }
    conn.set_index(n as usize);
    conn.reply_ok();
}

pub fn flushdb(ctx: &Arc<Ctx>, conn: &Arc<Conn>, _args: Vec<Bytes>) {
    flush(ctx, conn, false);
}

pub fn flushall(ctx: &Arc<Ctx>, conn: &Arc<Conn>, _args: Vec<Bytes>) {
    flush(ctx, conn, true);
}

fn flush(ctx: &Arc<Ctx>, conn: &Arc<Conn>, all: bool) {
    let index = conn.index();
    let rets = MultiResult::new(ctx.shards.len());
    for el in ctx.shards.all() {
        let rets = Arc::clone(&rets);
        let conn = Arc::clone(conn);
        el.schedule_nowait(move |db| {
            if all {
                for i in 0..DB_NUM {
                    db.flush_db(i);
                }
            } else {
                db.flush_db(index);
            }
            if rets.finish_one() {
                conn.reply_ok();
            }
        });
    }
}

/// Fan-out: one deletion task per key, joined on an atomic counter.
pub fn del(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    let index = conn.index();
    let cnt = args.len() - 1;
    let rets = MultiResult::new(cnt);

    for i in 0..cnt {
        let key = args[i + 1].clone();
        let rets = Arc::clone(&rets);
        let conn = Arc::clone(conn);
        let ctx2 = Arc::clone(ctx);
        let el = ctx.shards.route(&key).clone();
        el.schedule_nowait(move |db| {
            if db.delete(index, &key) {
                rets.int_value.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
            }
            persist_delete(&ctx2, index, &key);
            if rets.finish_one() {
                conn.reply_integer(rets.int_value.load(std::sync::atomic::Ordering::Acquire));
            }
        });
    }
}

/////////////////////////////////////////////////////////////////////////////
// expiry
/////////////////////////////////////////////////////////////////////////////

pub fn ttl(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    ttl_common(ctx, conn, args, 1000);
}

pub fn pttl(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    ttl_common(ctx, conn, args, 1);
}

fn ttl_common(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>, unit_ms: u64) {
    let index = conn.index();
    let key = args[1].clone();
    let conn = Arc::clone(conn);
    with_key(ctx, index, key.clone(), move |db| {
        match db.get(index, &key) {
            None => conn.reply_integer(-2),
            Some(o) if o.expire_ms == 0 => conn.reply_integer(-1),
            Some(o) => {
                let left = o.expire_ms.saturating_sub(now_ms());
                // round up so a freshly-set ttl reads back whole
                conn.reply_integer(((left + unit_ms - 1) / unit_ms) as i64);
            }
        }
    });
}

pub fn expire(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    expire_common(ctx, conn, args, Deadline::RelativeSecs);
}

pub fn pexpire(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    expire_common(ctx, conn, args, Deadline::RelativeMs);
}

pub fn expireat(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    expire_common(ctx, conn, args, Deadline::AbsoluteSecs);
}

pub fn pexpireat(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    expire_common(ctx, conn, args, Deadline::AbsoluteMs);
}

#[derive(Clone, Copy)]
enum Deadline {
    RelativeSecs,
    RelativeMs,
    AbsoluteSecs,
    AbsoluteMs,
}

fn expire_common(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>, kind: Deadline) {
    let Some(v) = parse_i64(&args[2]) else {
        conn.reply_frame(resp::ERR_INTEGER.clone());
        return;
    };

    let deadline_ms: i64 = match kind {
        Deadline::RelativeSecs => v
            .saturating_mul(1000)
            .saturating_add(now_ms() as i64),
        Deadline::RelativeMs => v.saturating_add(now_ms() as i64),
        Deadline::AbsoluteSecs => v.saturating_mul(1000),
        Deadline::AbsoluteMs => v,
    };

    let index = conn.index();
    let key = args[1].clone();
    let conn = Arc::clone(conn);
    let ctx2 = Arc::clone(ctx);
    with_key(ctx, index, key.clone(), move |db| {
        if db.get(index, &key).is_none() {
            conn.reply_integer(0);
            return;
        }

        if deadline_ms <= now_ms() as i64 {
            // a deadline in the past deletes immediately
            db.delete(index, &key);
            persist_delete(&ctx2, index, &key);
            conn.reply_integer(1);
            return;
        }

        if let Some(o) = db.get(index, &key) {
            o.expire_ms = deadline_ms as u64;
        }
        persist(&ctx2, db, index, &key);
        conn.reply_integer(1);
    });
}

/// Manual compaction across every partition; runs the expiry and
/// generation filters.
pub fn compact(ctx: &Arc<Ctx>, conn: &Arc<Conn>, _args: Vec<Bytes>) {
    match &ctx.saver {
        None => conn.reply_ok(),
        Some(saver) => {
            let conn = Arc::clone(conn);
            saver.compact(move || conn.reply_ok());
        }
    }
}
