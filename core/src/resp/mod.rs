//!
//! RESP wire codec.
//!
//! The inbound side is an incremental, resumable parser for the multi-bulk
//! and inline request forms. The outbound side builds replies as vectors of
//! cheaply-cloned frames so constant frames are shared rather than copied.
//!

#[cfg(test)]
mod test;

use crate::buffer::ByteBuf;
use crate::common::{format_i64, parse_i64, MAX_BULK_LEN, MAX_MULTI_BULK};
use bytes::Bytes;

/////////////////////////////////////////////////////////////////////////////
// shared constant frames
/////////////////////////////////////////////////////////////////////////////

pub static NIL: Bytes = Bytes::from_static(b"$-1\r\n");
pub static OK: Bytes = Bytes::from_static(b"+OK\r\n");
pub static PONG: Bytes = Bytes::from_static(b"PONG");
pub static CRLF: Bytes = Bytes::from_static(b"\r\n");

pub static SIGIL_ERR: Bytes = Bytes::from_static(b"-");
pub static SIGIL_STR: Bytes = Bytes::from_static(b"+");
pub static SIGIL_INT: Bytes = Bytes::from_static(b":");
pub static SIGIL_ARRAY: Bytes = Bytes::from_static(b"*");
pub static SIGIL_BULK: Bytes = Bytes::from_static(b"$");

pub static ERR_WRONG_TYPE: Bytes =
    Bytes::from_static(b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n");
pub static ERR_DB_INDEX: Bytes = Bytes::from_static(b"-ERR invalid DB index\r\n");
pub static ERR_DB_RANGE: Bytes = Bytes::from_static(b"-ERR DB index is out of range\r\n");
pub static ERR_SYNTAX: Bytes = Bytes::from_static(b"-ERR syntax error\r\n");
pub static ERR_MSET_ARGS: Bytes =
    Bytes::from_static(b"-ERR wrong number of arguments for MSET\r\n");
pub static ERR_INTEGER: Bytes =
    Bytes::from_static(b"-ERR value is not an integer or out of range\r\n");
pub static ERR_NAN: Bytes = Bytes::from_static(b"-ERR would produce NaN or Infinity\r\n");
pub static ERR_BIT: Bytes = Bytes::from_static(b"-bit offset is not an integer or out of range\r\n");

/////////////////////////////////////////////////////////////////////////////
// reply builders
/////////////////////////////////////////////////////////////////////////////

pub fn ok() -> Vec<Bytes> {
    vec![OK.clone()]
}

pub fn nil() -> Vec<Bytes> {
    vec![NIL.clone()]
}

pub fn simple(s: Bytes) -> Vec<Bytes> {
    vec![SIGIL_STR.clone(), s, CRLF.clone()]
}

pub fn error(msg: &str) -> Vec<Bytes> {
    vec![
        SIGIL_ERR.clone(),
        Bytes::copy_from_slice(msg.as_bytes()),
        CRLF.clone(),
    ]
}

pub fn integer(v: i64) -> Vec<Bytes> {
    vec![
        SIGIL_INT.clone(),
        Bytes::from(format_i64(v)),
        CRLF.clone(),
    ]
}

pub fn bulk(b: Bytes) -> Vec<Bytes> {
    vec![
        SIGIL_BULK.clone(),
        Bytes::from(format_i64(b.len() as i64)),
        CRLF.clone(),
        b,
        CRLF.clone(),
    ]
}

/// Array of bulk strings; `None` slots render as nil.
pub fn array(items: Vec<Option<Bytes>>) -> Vec<Bytes> {
    let mut frames = Vec::with_capacity(3 + items.len() * 5);
    frames.push(SIGIL_ARRAY.clone());
    frames.push(Bytes::from(format_i64(items.len() as i64)));
    frames.push(CRLF.clone());
    for it in items {
        match it {
            None => frames.push(NIL.clone()),
            Some(b) => frames.extend(bulk(b)),
        }
    }
    frames
}

/// Canonical multi-bulk request encoding, mainly for tests and tooling.
pub fn request(args: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for a in args {
        out.extend_from_slice(format!("${}\r\n", a.len()).as_bytes());
        out.extend_from_slice(a);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/////////////////////////////////////////////////////////////////////////////
// inbound parser
/////////////////////////////////////////////////////////////////////////////

pub enum Parsed {
    /// Not enough buffered bytes for a complete request.
    More,
    /// One complete request; the parser has reset for the next one.
    Ready(Vec<Bytes>),
    /// Protocol violation. The connection must be closed after replying.
    Error(String),
}

pub struct Parser {
    args: Vec<Bytes>,
    /// Declared argument count of the request in progress, -1 when idle.
    mbulk: i64,
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            args: Vec::new(),
            mbulk: -1,
        }
    }

    /// Consume as much of one request as the buffer allows. Callable
    /// repeatedly; partial state is kept across calls.
    pub fn parse(&mut self, buf: &mut ByteBuf) -> Parsed {
        if buf.readable() == 0 {
            return Parsed::More;
        }

        let r = if self.mbulk >= 0 || buf.readable_slice()[0] == b'*' {
            self.parse_multi(buf)
        } else {
            self.parse_inline(buf)
        };

        match r {
            Err(e) => Parsed::Error(e),
            Ok(()) => {
                if self.mbulk >= 0 && self.args.len() as i64 == self.mbulk {
                    self.mbulk = -1;
                    Parsed::Ready(std::mem::take(&mut self.args))
                } else {
                    Parsed::More
                }
            }
        }
    }

    fn parse_multi(&mut self, buf: &mut ByteBuf) -> Result<(), String> {
        if self.mbulk < 0 {
            let data = buf.readable_slice();
            let Some(eol) = find_crlf(data) else {
                return Ok(());
            };
            let n = parse_i64(&data[1..eol]).unwrap_or(0);
            if n <= 0 || n > MAX_MULTI_BULK {
                return Err(format!(
                    "ERR Protocol error: invalid multibulk length '{}'",
                    String::from_utf8_lossy(&data[1..eol])
                ));
            }
            self.mbulk = n;
            buf.advance_read(eol + 2);
        }

        while (self.args.len() as i64) < self.mbulk {
            let data = buf.readable_slice();
            let Some(eol) = find_crlf(data) else {
                return Ok(());
            };
            if data[0] != b'$' {
                return Err(format!(
                    "ERR Protocol error: expected '$', got '{}'",
                    data[0] as char
                ));
            }
            let Some(blen) = parse_i64(&data[1..eol]) else {
                return Err("ERR Protocol error: invalid bulk length".to_owned());
            };
            if !(0..=MAX_BULK_LEN).contains(&blen) {
                return Err("ERR Protocol error: invalid bulk length".to_owned());
            }

            let blen = blen as usize;
            let body = eol + 2;
            if data.len() < body + blen + 2 {
                return Ok(());
            }
            if &data[body + blen..body + blen + 2] != b"\r\n" {
                return Err("ERR Protocol error: invalid bulk length".to_owned());
            }

            self.args
                .push(Bytes::copy_from_slice(&data[body..body + blen]));
            buf.advance_read(body + blen + 2);
        }

        Ok(())
    }

    fn parse_inline(&mut self, buf: &mut ByteBuf) -> Result<(), String> {
        let data = buf.readable_slice();
        let Some(eol) = find_crlf(data) else {
            return Ok(());
        };

        let line = &data[..eol];
        let mut args = Vec::new();
        let mut i = 0usize;

        while i < line.len() {
            while i < line.len() && line[i] == b' ' {
                i += 1;
            }
            if i >= line.len() {
                break;
            }

            let mut arg = Vec::new();
            if line[i] == b'"' {
                i += 1;
                while i < line.len() {
                    if line.len() - i >= 4
                        && line[i] == b'\\'
                        && line[i + 1] == b'x'
                        && line[i + 2].is_ascii_hexdigit()
                        && line[i + 3].is_ascii_hexdigit()
                    {
                        let hi = (line[i + 2] as char).to_digit(16).unwrap_or(0) as u8;
                        let lo = (line[i + 3] as char).to_digit(16).unwrap_or(0) as u8;
                        arg.push(hi * 16 + lo);
                        i += 4;
                    } else if line.len() - i >= 2 && line[i] == b'\\' {
                        arg.push(match line[i + 1] {
                            b'n' => b'\n',
                            b'r' => b'\r',
                            b't' => b'\t',
                            b'b' => 0x08,
                            b'a' => 0x07,
                            c => c,
                        });
                        i += 2;
                    } else if line[i] == b'"' {
                        i += 1;
                        break;
                    } else {
                        arg.push(line[i]);
                        i += 1;
                    }
                }
            } else if line[i] == b'\'' {
                i += 1;
                while i < line.len() {
                    if line.len() - i >= 2 && line[i] == b'\\' && line[i + 1] == b'\'' {
                        arg.push(b'\'');
                        i += 2;
                    } else if line[i] == b'\'' {
                        i += 1;
                        break;
                    } else {
                        arg.push(line[i]);
                        i += 1;
                    }
                }
            } else {
                let start = i;
                while i < line.len() && line[i] != b' ' {
                    i += 1;
                }
                arg.extend_from_slice(&line[start..i]);
            }
            args.push(Bytes::from(arg));
        }

        self.mbulk = args.len() as i64;
        self.args = args;
        buf.advance_read(eol + 2);
        Ok(())
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
