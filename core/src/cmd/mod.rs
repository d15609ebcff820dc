//!
//! Command table and dispatcher.
//!
//! Handlers are free functions registered under lowercased names with a
//! signed arity: positive means exact, negative means at-least. A handler
//! never runs shard logic inline; it schedules closures on the owning
//! loops and the closures write the reply.
//!

pub mod control;
pub mod string;

use crate::common::now_ms;
use crate::conn::Conn;
use crate::ctx::Ctx;
use crate::db::MemDb;
use crate::disk::codec;
use crate::object::{Object, ObjType};
use bytes::Bytes;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
        Arc,
    },
};

pub type Handler = fn(&Arc<Ctx>, &Arc<Conn>, Vec<Bytes>);

struct CmdEntry {
    name: &'static str,
    arity: i32,
    handler: Handler,
}

pub struct CmdTable {
    map: HashMap<&'static str, CmdEntry>,
}

impl CmdTable {
    fn build() -> CmdTable {
        let mut t = CmdTable {
            map: HashMap::new(),
        };

        t.add("command", -1, control::command);
        t.add("ping", -1, control::ping);
        t.add("info", -1, control::info);
        t.add("select", 2, control::select);
        t.add("flushdb", 1, control::flushdb);
        t.add("flushall", 1, control::flushall);
        t.add("del", -2, control::del);
        t.add("ttl", 2, control::ttl);
        t.add("pttl", 2, control::pttl);
        t.add("expire", 3, control::expire);
        t.add("pexpire", 3, control::pexpire);
        t.add("expireat", 3, control::expireat);
        t.add("pexpireat", 3, control::pexpireat);
        t.add("compact", 1, control::compact);

        t.add("get", 2, string::get);
        t.add("set", -3, string::set);
        t.add("append", 3, string::append);
        t.add("getset", 3, string::getset);
        t.add("mget", -2, string::mget);
        t.add("mset", -3, string::mset);
        t.add("incr", 2, string::incr);
        t.add("incrby", 3, string::incrby);
        t.add("decr", 2, string::decr);
        t.add("decrby", 3, string::decrby);
        t.add("setbit", 4, string::setbit);
        t.add("getbit", 3, string::getbit);
        t.add("bitcount", -2, string::bitcount);
        t.add("bitop", -4, string::bitop);
        t.add("bitpos", -3, string::bitpos);

        t
    }

    fn add(&mut self, name: &'static str, arity: i32, handler: Handler) {
        self.map.insert(
            name,
            CmdEntry {
                name,
                arity,
                handler,
            },
        );
    }
}

/// Read-only after startup.
static CMDS: Lazy<CmdTable> = Lazy::new(CmdTable::build);

pub fn dispatch(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    let name = String::from_utf8_lossy(&args[0]).to_ascii_lowercase();

    let Some(entry) = CMDS.map.get(name.as_str()) else {
        conn.reply_error(&format!("ERR unknown command '{name}'"));
        return;
    };

    let n = args.len() as i32;
    if (entry.arity > 0 && entry.arity != n) || n < -entry.arity {
        conn.reply_error(&format!(
            "ERR wrong number of arguments for '{}' command",
            entry.name
        ));
        return;
    }

    (entry.handler)(ctx, conn, args);
}

/////////////////////////////////////////////////////////////////////////////
// shared handler plumbing
/////////////////////////////////////////////////////////////////////////////

/// Join state for fan-out commands: one sub-task per key, the last one to
/// complete writes the reply.
pub(crate) struct MultiResult {
    remaining: AtomicUsize,
    pub int_value: AtomicI64,
    pub error: AtomicBool,
    slots: Mutex<Vec<Option<Bytes>>>,
}

impl MultiResult {
    pub fn new(cnt: usize) -> Arc<MultiResult> {
        Arc::new(MultiResult {
            remaining: AtomicUsize::new(cnt),
            int_value: AtomicI64::new(0),
            error: AtomicBool::new(false),
            slots: Mutex::new(vec![None; cnt]),
        })
    }

    pub fn set_slot(&self, i: usize, v: Option<Bytes>) {
        self.slots.lock()[i] = v;
    }

    /// True for exactly one caller: the last partial to complete.
    pub fn finish_one(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub fn take_slots(&self) -> Vec<Option<Bytes>> {
        std::mem::take(&mut *self.slots.lock())
    }
}

/// Schedule `f` on the shard owning `key`, loading the key from disk first
/// when memory misses. The closure always runs on the owning loop, after
/// any disk round-trip, with the object installed if one was found.
pub(crate) fn with_key<F>(ctx: &Arc<Ctx>, index: usize, key: Bytes, f: F)
where
    F: FnOnce(&mut MemDb) + Send + 'static,
{
    let el = ctx.shards.route(&key).clone();
    let ctx2 = Arc::clone(ctx);
    el.schedule_nowait(move |db| {
        let Some(saver) = ctx2.saver.clone() else {
            f(db);
            return;
        };
        if db.get(index, &key).is_some() {
            f(db);
            return;
        }

        // memory miss: read the meta row, then resume on the owning loop
        let ctx3 = Arc::clone(&ctx2);
        let key2 = key.clone();
        saver.get_meta(codec::meta_key(index, &key), move |row| {
            let obj = row
                .as_deref()
                .and_then(codec::decode_object)
                .filter(|o| !o.is_expired(now_ms()));
            let el2 = ctx3.shards.route(&key2).clone();
            el2.schedule_nowait(move |db| {
                if let Some(o) = obj {
                    db.install(index, &key2, o);
                }
                f(db);
            });
        });
    });
}

/// Enqueue the current meta row of `key` to disk. Call after any mutation
/// of a persisted string.
pub(crate) fn persist(ctx: &Arc<Ctx>, db: &mut MemDb, index: usize, key: &[u8]) {
    let Some(saver) = &ctx.saver else {
        return;
    };
    if let Some(o) = db.get(index, key) {
        let row = codec::meta_row(o);
        saver.put_meta(codec::meta_key(index, key), row);
    }
}

pub(crate) fn persist_delete(ctx: &Arc<Ctx>, index: usize, key: &[u8]) {
    if let Some(saver) = &ctx.saver {
        saver.del_meta(codec::meta_key(index, key));
    }
}

/// Type guard: replies WRONGTYPE and returns false unless the object is a
/// string.
pub(crate) fn check_string(o: &Object, conn: &Conn) -> bool {
    if o.typ == ObjType::String {
        return true;
    }
    conn.reply_frame(crate::resp::ERR_WRONG_TYPE.clone());
    false
}
