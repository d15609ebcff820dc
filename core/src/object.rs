//!
//! The tagged value model.
//!
//! Only strings are implemented; the other type tags are reserved so that
//! the on-disk metadata layout does not change when containers land.
//!

use crate::common::{format_i64, parse_i64, RawBytes};

/// Disk tombstone marker, never held by a live object.
pub const TYPE_NONE: u8 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjType {
    String = 1,
    List = 2,
    Hash = 4,
    Set = 8,
    ZSet = 16,
}

impl ObjType {
    pub fn from_u8(v: u8) -> Option<ObjType> {
        match v {
            1 => Some(ObjType::String),
            2 => Some(ObjType::List),
            4 => Some(ObjType::Hash),
            8 => Some(ObjType::Set),
            16 => Some(ObjType::ZSet),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Encoding {
    Raw = 1,
    Int = 2,
}

/// String payload. `Int` carries the value that the wire renders as decimal
/// and the disk stores as 8 little-endian bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Raw(RawBytes),
    Int(i64),
}

#[derive(Clone, Debug)]
pub struct Object {
    pub typ: ObjType,
    pub payload: Payload,
    /// Bumped on logical recreation; the data compaction filter uses it to
    /// drop rows of dead generations.
    pub version: u16,
    /// Absolute epoch-ms deadline, 0 = no expiry.
    pub expire_ms: u64,
}

impl Object {
    pub fn string(payload: Payload) -> Self {
        Object {
            typ: ObjType::String,
            payload,
            version: 0,
            expire_ms: 0,
        }
    }

    #[inline(always)]
    pub fn encoding(&self) -> Encoding {
        match self.payload {
            Payload::Raw(_) => Encoding::Raw,
            Payload::Int(_) => Encoding::Int,
        }
    }

    #[inline(always)]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expire_ms > 0 && now_ms >= self.expire_ms
    }

    /// Materialize the payload as bytes; int-encoded values render as
    /// decimal ASCII.
    pub fn to_bytes(&self) -> RawBytes {
        match &self.payload {
            Payload::Raw(b) => b.clone(),
            Payload::Int(v) => format_i64(*v),
        }
    }

    /// Interpret the payload as an integer, parsing raw bytes as decimal.
    pub fn as_i64(&self) -> Option<i64> {
        match &self.payload {
            Payload::Int(v) => Some(*v),
            Payload::Raw(b) => parse_i64(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_payload_renders_decimal() {
        let o = Object::string(Payload::Int(-42));
        assert_eq!(o.to_bytes(), b"-42".to_vec());
        assert_eq!(o.as_i64(), Some(-42));
        assert_eq!(o.encoding(), Encoding::Int);
    }

    #[test]
    fn raw_payload_parses_decimal() {
        let o = Object::string(Payload::Raw(b"1234".to_vec()));
        assert_eq!(o.as_i64(), Some(1234));
        let o = Object::string(Payload::Raw(b"12x".to_vec()));
        assert_eq!(o.as_i64(), None);
    }

    #[test]
    fn expiry_is_a_deadline() {
        let mut o = Object::string(Payload::Raw(vec![]));
        assert!(!o.is_expired(u64::MAX));
        o.expire_ms = 100;
        assert!(!o.is_expired(99));
        assert!(o.is_expired(100));
    }
}
