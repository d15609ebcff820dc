//!
//! On-disk record layouts, all little-endian.
//!
//! Meta row: `version u16 | expire_ms u64 | type u8 | encoding u8` followed
//! by the inline payload for plain strings. Container types (reserved) keep
//! their payloads in the data column family under
//! `len u32 | meta_key | version u32 | field`.
//!

use crate::common::{RawBytes, RawKey};
use crate::object::{Encoding, Object, ObjType, Payload, TYPE_NONE};

pub const META_HEADER_SIZE: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetaRec {
    pub version: u16,
    pub expire_ms: u64,
    pub typ: u8,
    pub encoding: u8,
}

impl MetaRec {
    /// Zeroed record that supersedes every data row of older generations.
    pub fn tombstone(version: u16) -> MetaRec {
        MetaRec {
            version,
            expire_ms: 0,
            typ: TYPE_NONE,
            encoding: 0,
        }
    }

    pub fn decode(b: &[u8]) -> Option<MetaRec> {
        if b.len() < META_HEADER_SIZE {
            return None;
        }
        Some(MetaRec {
            version: u16::from_le_bytes([b[0], b[1]]),
            expire_ms: u64::from_le_bytes([
                b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9],
            ]),
            typ: b[10],
            encoding: b[11],
        })
    }

    pub fn encode_into(&self, out: &mut RawBytes) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.expire_ms.to_le_bytes());
        out.push(self.typ);
        out.push(self.encoding);
    }

    pub fn encode(&self) -> RawBytes {
        let mut out = Vec::with_capacity(META_HEADER_SIZE);
        self.encode_into(&mut out);
        out
    }
}

/// Meta key: the DB index byte scopes the 16 logical namespaces inside the
/// shared meta column family.
pub fn meta_key(index: usize, key: &[u8]) -> RawKey {
    let mut out = Vec::with_capacity(1 + key.len());
    out.push(index as u8);
    out.extend_from_slice(key);
    out
}

/// Full meta row for a live string object: header plus inline payload.
pub fn meta_row(o: &Object) -> RawBytes {
    let rec = MetaRec {
        version: o.version,
        expire_ms: o.expire_ms,
        typ: o.typ as u8,
        encoding: o.encoding() as u8,
    };
    let mut out = Vec::with_capacity(META_HEADER_SIZE + 8);
    rec.encode_into(&mut out);
    match &o.payload {
        Payload::Raw(b) => out.extend_from_slice(b),
        Payload::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
    }
    out
}

/// Rebuild a string object from a meta row. Tombstones, container types and
/// malformed rows come back as `None`.
pub fn decode_object(row: &[u8]) -> Option<Object> {
    let rec = MetaRec::decode(row)?;
    if ObjType::from_u8(rec.typ) != Some(ObjType::String) {
        return None;
    }
    let body = &row[META_HEADER_SIZE..];
    let payload = match rec.encoding {
        e if e == Encoding::Raw as u8 => Payload::Raw(body.to_vec()),
        e if e == Encoding::Int as u8 => {
            let arr: [u8; 8] = body.try_into().ok()?;
            Payload::Int(i64::from_le_bytes(arr))
        }
        _ => return None,
    };
    Some(Object {
        typ: ObjType::String,
        payload,
        version: rec.version,
        expire_ms: rec.expire_ms,
    })
}

/// Data row key for container fields (reserved).
pub fn data_key(mkey: &[u8], version: u32, field: &[u8]) -> RawKey {
    let mut out = Vec::with_capacity(4 + mkey.len() + 4 + field.len());
    out.extend_from_slice(&(mkey.len() as u32).to_le_bytes());
    out.extend_from_slice(mkey);
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(field);
    out
}

/// Split a data row key back into its meta key and version.
pub fn parse_data_key(k: &[u8]) -> Option<(&[u8], u32)> {
    if k.len() < 4 {
        return None;
    }
    let klen = u32::from_le_bytes([k[0], k[1], k[2], k[3]]) as usize;
    if k.len() < 4 + klen + 4 {
        return None;
    }
    let mkey = &k[4..4 + klen];
    let v = &k[4 + klen..4 + klen + 4];
    let version = u32::from_le_bytes([v[0], v[1], v[2], v[3]]);
    Some((mkey, version))
}
