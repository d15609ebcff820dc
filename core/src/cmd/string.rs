//!
//! String and bitmap commands.
//!
//! Single-key handlers schedule one closure on the owning shard (with disk
//! read-through) and reply from there. Multi-key handlers fan out one task
//! per key and join on a [`MultiResult`].
//!

use super::{check_string, persist, with_key, MultiResult};
use crate::common::{parse_i64, MAX_VALUE_LEN};
use crate::conn::Conn;
use crate::ctx::Ctx;
use crate::object::Payload;
use crate::resp;
use bytes::Bytes;
use std::sync::{atomic::Ordering, Arc};

pub fn get(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    let index = conn.index();
    let key = args[1].clone();
    let conn = Arc::clone(conn);
    with_key(ctx, index, key.clone(), move |db| {
        match db.get(index, &key) {
            None => conn.reply_nil(),
            Some(o) => {
                if check_string(o, &conn) {
                    conn.reply_bulk(Bytes::from(o.to_bytes()));
                }
            }
        }
    });
}

pub fn set(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    if args.len() != 3 {
        // SET options are not supported
        conn.reply_frame(resp::ERR_SYNTAX.clone());
        return;
    }
    let index = conn.index();
    let key = args[1].clone();
    let value = args[2].clone();
    let conn = Arc::clone(conn);
    let ctx2 = Arc::clone(ctx);
    with_key(ctx, index, key.clone(), move |db| {
        db.set(index, &key, Payload::Raw(value.to_vec()));
        persist(&ctx2, db, index, &key);
        conn.reply_ok();
    });
}

pub fn append(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    let index = conn.index();
    let key = args[1].clone();
    let value = args[2].clone();
    let conn = Arc::clone(conn);
    let ctx2 = Arc::clone(ctx);
    with_key(ctx, index, key.clone(), move |db| {
        let mut newlen = None;
        match db.get(index, &key) {
            None => {}
            Some(o) => {
                if !check_string(o, &conn) {
                    return;
                }
                // int-encoded values materialize to decimal before growing
                let mut bytes = o.to_bytes();
                bytes.extend_from_slice(&value);
                newlen = Some(bytes.len() as i64);
                o.payload = Payload::Raw(bytes);
            }
        }
        let newlen = match newlen {
            Some(l) => l,
            None => {
                db.set(index, &key, Payload::Raw(value.to_vec()));
                value.len() as i64
            }
        };
        persist(&ctx2, db, index, &key);
        conn.reply_integer(newlen);
    });
}

pub fn getset(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    let index = conn.index();
    let key = args[1].clone();
    let value = args[2].clone();
    let conn = Arc::clone(conn);
    let ctx2 = Arc::clone(ctx);
    with_key(ctx, index, key.clone(), move |db| {
        let prev = match db.get(index, &key) {
            None => None,
            Some(o) => {
                if !check_string(o, &conn) {
                    return;
                }
                Some(Bytes::from(o.to_bytes()))
            }
        };

        db.set(index, &key, Payload::Raw(value.to_vec()));
        persist(&ctx2, db, index, &key);

        match prev {
            None => conn.reply_nil(),
            Some(b) => conn.reply_bulk(b),
        }
    });
}

/// Per-key fan-out; missing or wrong-type entries reply as nil slots.
pub fn mget(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    let index = conn.index();
    let cnt = args.len() - 1;
    let rets = MultiResult::new(cnt);

    for i in 0..cnt {
        let key = args[i + 1].clone();
        let rets = Arc::clone(&rets);
        let conn = Arc::clone(conn);
        with_key(ctx, index, key.clone(), move |db| {
            let v = db
                .get(index, &key)
                .filter(|o| o.typ == crate::object::ObjType::String)
                .map(|o| Bytes::from(o.to_bytes()));
            rets.set_slot(i, v);
            if rets.finish_one() {
                conn.reply_array(rets.take_slots());
            }
        });
    }
}

pub fn mset(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    if args.len() % 2 != 1 {
        conn.reply_frame(resp::ERR_MSET_ARGS.clone());
        return;
    }

    let index = conn.index();
    let cnt = args.len() / 2;
    let rets = MultiResult::new(cnt);

    for i in 0..cnt {
        let key = args[i * 2 + 1].clone();
        let value = args[i * 2 + 2].clone();
        let rets = Arc::clone(&rets);
        let conn = Arc::clone(conn);
        let ctx2 = Arc::clone(ctx);
        with_key(ctx, index, key.clone(), move |db| {
            db.set(index, &key, Payload::Raw(value.to_vec()));
            persist(&ctx2, db, index, &key);
            if rets.finish_one() {
                conn.reply_ok();
            }
        });
    }
}

/////////////////////////////////////////////////////////////////////////////
// counters
/////////////////////////////////////////////////////////////////////////////

pub fn incr(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    incr_decr(ctx, conn, args, 1);
}

pub fn decr(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    incr_decr(ctx, conn, args, -1);
}

pub fn incrby(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    let Some(delta) = parse_i64(&args[2]) else {
        conn.reply_frame(resp::ERR_INTEGER.clone());
        return;
    };
    incr_decr(ctx, conn, args, delta);
}

pub fn decrby(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    let Some(delta) = parse_i64(&args[2]) else {
        conn.reply_frame(resp::ERR_INTEGER.clone());
        return;
    };
    incr_decr(ctx, conn, args, delta.wrapping_neg());
}

fn incr_decr(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>, delta: i64) {
    let index = conn.index();
    let key = args[1].clone();
    let conn = Arc::clone(conn);
    let ctx2 = Arc::clone(ctx);
    with_key(ctx, index, key.clone(), move |db| {
        let mut result = None;
        match db.get(index, &key) {
            None => {}
            Some(o) => {
                if !check_string(o, &conn) {
                    return;
                }
                let Some(old) = o.as_i64() else {
                    conn.reply_frame(resp::ERR_INTEGER.clone());
                    return;
                };
                let Some(new) = old.checked_add(delta) else {
                    conn.reply_frame(resp::ERR_INTEGER.clone());
                    return;
                };
                // raw decimals are rewritten int-encoded on first arithmetic
                o.payload = Payload::Int(new);
                result = Some(new);
            }
        }
        let new = match result {
            Some(n) => n,
            None => {
                db.set(index, &key, Payload::Int(delta));
                delta
            }
        };
        persist(&ctx2, db, index, &key);
        conn.reply_integer(new);
    });
}

/////////////////////////////////////////////////////////////////////////////
// bitmaps
/////////////////////////////////////////////////////////////////////////////

/// Bit offsets must address bytes below the 512 MiB payload cap.
fn parse_bit_offset(arg: &[u8]) -> Option<u64> {
    let v = parse_i64(arg)?;
    if v < 0 || (v as u64) >> 3 >= MAX_VALUE_LEN {
        return None;
    }
    Some(v as u64)
}

pub fn setbit(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    let Some(offset) = parse_bit_offset(&args[2]) else {
        conn.reply_frame(resp::ERR_BIT.clone());
        return;
    };
    let on = match parse_i64(&args[3]) {
        Some(0) => false,
        Some(1) => true,
        _ => {
            conn.reply_frame(resp::ERR_BIT.clone());
            return;
        }
    };

    let index = conn.index();
    let key = args[1].clone();
    let conn = Arc::clone(conn);
    let ctx2 = Arc::clone(ctx);
    with_key(ctx, index, key.clone(), move |db| {
        let byte = (offset >> 3) as usize;
        let bit = 7 - (offset & 0x7) as u32;

        let mut prev = None;
        match db.get(index, &key) {
            None => {}
            Some(o) => {
                if !check_string(o, &conn) {
                    return;
                }
                let mut bytes = o.to_bytes();
                if bytes.len() < byte + 1 {
                    bytes.resize(byte + 1, 0);
                }
                prev = Some((bytes[byte] >> bit) & 1);
                bytes[byte] &= !(1 << bit);
                bytes[byte] |= (on as u8) << bit;
                o.payload = Payload::Raw(bytes);
            }
        }
        let prev = match prev {
            Some(p) => p,
            None => {
                let mut bytes = vec![0u8; byte + 1];
                bytes[byte] |= (on as u8) << bit;
                db.set(index, &key, Payload::Raw(bytes));
                0
            }
        };
        persist(&ctx2, db, index, &key);
        conn.reply_integer(prev as i64);
    });
}

pub fn getbit(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    let Some(offset) = parse_bit_offset(&args[2]) else {
        conn.reply_frame(resp::ERR_BIT.clone());
        return;
    };

    let index = conn.index();
    let key = args[1].clone();
    let conn = Arc::clone(conn);
    with_key(ctx, index, key.clone(), move |db| {
        match db.get(index, &key) {
            None => conn.reply_integer(0),
            Some(o) => {
                if !check_string(o, &conn) {
                    return;
                }
                let bytes = o.to_bytes();
                let byte = (offset >> 3) as usize;
                if bytes.len() < byte + 1 {
                    conn.reply_integer(0);
                    return;
                }
                let bit = 7 - (offset & 0x7) as u32;
                conn.reply_integer(((bytes[byte] >> bit) & 1) as i64);
            }
        }
    });
}

/// Inclusive byte range with python-style negative indexing.
fn normalize_range(len: i64, mut start: i64, mut end: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    if start < 0 {
        start += len;
    }
    if end < 0 {
        end += len;
    }
    if start < 0 {
        start = 0;
    }
    if end < 0 {
        end = 0;
    }
    if end >= len {
        end = len - 1;
    }
    if start > end {
        return None;
    }
    Some((start as usize, end as usize))
}

pub fn bitcount(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    let range = match args.len() {
        2 => None,
        4 => {
            let (Some(s), Some(e)) = (parse_i64(&args[2]), parse_i64(&args[3])) else {
                conn.reply_frame(resp::ERR_INTEGER.clone());
                return;
            };
            Some((s, e))
        }
        _ => {
            conn.reply_frame(resp::ERR_SYNTAX.clone());
            return;
        }
    };

    let index = conn.index();
    let key = args[1].clone();
    let conn = Arc::clone(conn);
    with_key(ctx, index, key.clone(), move |db| {
        match db.get(index, &key) {
            None => conn.reply_integer(0),
            Some(o) => {
                if !check_string(o, &conn) {
                    return;
                }
                let bytes = o.to_bytes();
                let slice = match range {
                    None => &bytes[..],
                    Some((s, e)) => match normalize_range(bytes.len() as i64, s, e) {
                        None => {
                            conn.reply_integer(0);
                            return;
                        }
                        Some((s, e)) => &bytes[s..=e],
                    },
                };
                let ones: u64 = slice.iter().map(|b| u64::from(b.count_ones())).sum();
                conn.reply_integer(ones as i64);
            }
        }
    });
}

pub fn bitpos(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    let target = match parse_i64(&args[2]) {
        Some(0) => 0u8,
        Some(1) => 1u8,
        _ => {
            conn.reply_frame(resp::ERR_SYNTAX.clone());
            return;
        }
    };
    if args.len() > 5 {
        conn.reply_frame(resp::ERR_SYNTAX.clone());
        return;
    }
    let mut start = 0i64;
    let mut end = -1i64;
    let end_given = args.len() == 5;
    if args.len() >= 4 {
        let Some(s) = parse_i64(&args[3]) else {
            conn.reply_frame(resp::ERR_INTEGER.clone());
            return;
        };
        start = s;
    }
    if end_given {
        let Some(e) = parse_i64(&args[4]) else {
            conn.reply_frame(resp::ERR_INTEGER.clone());
            return;
        };
        end = e;
    }

    let index = conn.index();
    let key = args[1].clone();
    let conn = Arc::clone(conn);
    with_key(ctx, index, key.clone(), move |db| {
        match db.get(index, &key) {
            None => {
                // a missing key reads as an all-zero buffer
                conn.reply_integer(if target == 0 { 0 } else { -1 });
            }
            Some(o) => {
                if !check_string(o, &conn) {
                    return;
                }
                let bytes = o.to_bytes();
                let Some((s, e)) = normalize_range(bytes.len() as i64, start, end) else {
                    conn.reply_integer(-1);
                    return;
                };

                let skip = if target == 0 { 0xffu8 } else { 0x00u8 };
                for (i, b) in bytes[s..=e].iter().enumerate() {
                    if *b != skip {
                        for bit in 0..8 {
                            if (b >> (7 - bit)) & 1 == target {
                                conn.reply_integer(((s + i) as i64) * 8 + bit as i64);
                                return;
                            }
                        }
                    }
                }

                // searching for a zero past an all-ones buffer succeeds at
                // the first bit after the end, unless the caller pinned end
                if target == 0 && !end_given {
                    conn.reply_integer(bytes.len() as i64 * 8);
                } else {
                    conn.reply_integer(-1);
                }
            }
        }
    });
}

/////////////////////////////////////////////////////////////////////////////
// bitop
/////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, PartialEq)]
enum BitOp {
    And,
    Or,
    Xor,
    Not,
}

pub fn bitop(ctx: &Arc<Ctx>, conn: &Arc<Conn>, args: Vec<Bytes>) {
    let op = if args[1].eq_ignore_ascii_case(b"and") {
        BitOp::And
    } else if args[1].eq_ignore_ascii_case(b"or") {
        BitOp::Or
    } else if args[1].eq_ignore_ascii_case(b"xor") {
        BitOp::Xor
    } else if args[1].eq_ignore_ascii_case(b"not") {
        BitOp::Not
    } else {
        conn.reply_frame(resp::ERR_SYNTAX.clone());
        return;
    };

    if op == BitOp::Not && args.len() != 4 {
        conn.reply_frame(resp::ERR_SYNTAX.clone());
        return;
    }

    let index = conn.index();
    let dst = args[2].clone();
    let srcs: Vec<Bytes> = args[3..].to_vec();
    let rets = MultiResult::new(srcs.len());

    for (i, src) in srcs.iter().enumerate() {
        let key = src.clone();
        let rets = Arc::clone(&rets);
        let conn = Arc::clone(conn);
        let ctx2 = Arc::clone(ctx);
        let dst = dst.clone();
        with_key(ctx, index, key.clone(), move |db| {
            match db.get(index, &key) {
                None => rets.set_slot(i, None),
                Some(o) => {
                    if o.typ != crate::object::ObjType::String {
                        rets.error.store(true, Ordering::Release);
                    } else {
                        rets.set_slot(i, Some(Bytes::from(o.to_bytes())));
                    }
                }
            }
            if rets.finish_one() {
                finish_bitop(&ctx2, &conn, op, index, dst, rets.take_slots(), rets.error.load(Ordering::Acquire));
            }
        });
    }
}

/// Runs once, on whichever shard finished last. Combines the collected
/// source values and stores the result at the destination key's shard.
fn finish_bitop(
    ctx: &Arc<Ctx>,
    conn: &Arc<Conn>,
    op: BitOp,
    index: usize,
    dst: Bytes,
    values: Vec<Option<Bytes>>,
    type_error: bool,
) {
    if type_error {
        conn.reply_frame(resp::ERR_WRONG_TYPE.clone());
        return;
    }

    let maxlen = values
        .iter()
        .map(|v| v.as_ref().map(|b| b.len()).unwrap_or(0))
        .max()
        .unwrap_or(0);

    if maxlen == 0 {
        conn.reply_integer(0);
        return;
    }

    let byte_at = |v: &Option<Bytes>, j: usize| -> u8 {
        v.as_ref().and_then(|b| b.get(j).copied()).unwrap_or(0)
    };

    let mut out = vec![0u8; maxlen];
    for (j, slot) in out.iter_mut().enumerate() {
        let mut acc = byte_at(&values[0], j);
        if op == BitOp::Not {
            acc = !acc;
        }
        for v in &values[1..] {
            let b = byte_at(v, j);
            acc = match op {
                BitOp::And => acc & b,
                BitOp::Or => acc | b,
                BitOp::Xor => acc ^ b,
                BitOp::Not => acc,
            };
        }
        *slot = acc;
    }

    let conn = Arc::clone(conn);
    let ctx2 = Arc::clone(ctx);
    let el = ctx.shards.route(&dst).clone();
    el.schedule_nowait(move |db| {
        db.set(index, &dst, Payload::Raw(out));
        persist(&ctx2, db, index, &dst);
        conn.reply_integer(maxlen as i64);
    });
}
