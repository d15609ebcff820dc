use super::*;

fn feed_all(bytes: &[u8]) -> Vec<Parsed> {
    let mut buf = ByteBuf::new();
    buf.write_bytes(bytes);
    let mut p = Parser::new();
    let mut out = Vec::new();
    loop {
        match p.parse(&mut buf) {
            Parsed::More => {
                out.push(Parsed::More);
                return out;
            }
            r @ Parsed::Error(_) => {
                out.push(r);
                return out;
            }
            r @ Parsed::Ready(_) => out.push(r),
        }
    }
}

fn ready_args(bytes: &[u8]) -> Vec<Vec<u8>> {
    for r in feed_all(bytes) {
        match r {
            Parsed::Ready(args) => return args.iter().map(|a| a.to_vec()).collect(),
            Parsed::Error(e) => panic!("unexpected protocol error: {e}"),
            Parsed::More => break,
        }
    }
    panic!("request did not complete");
}

#[test]
fn multibulk_basic() {
    let args = ready_args(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\nhello\r\n");
    assert_eq!(args, vec![b"SET".to_vec(), b"k".to_vec(), b"hello".to_vec()]);
}

#[test]
fn multibulk_empty_bulk_allowed() {
    let args = ready_args(b"*2\r\n$3\r\nGET\r\n$0\r\n\r\n");
    assert_eq!(args, vec![b"GET".to_vec(), b"".to_vec()]);
}

#[test]
fn multibulk_binary_payload() {
    let args = ready_args(b"*2\r\n$3\r\nGET\r\n$3\r\n\x00\xff\r\r\n");
    assert_eq!(args[1], vec![0u8, 0xff, b'\r']);
}

#[test]
fn byte_by_byte_matches_one_shot() {
    let wire = request(&[b"SET", b"some-key", b"some value with spaces"]);

    let oneshot = ready_args(&wire);

    let mut buf = ByteBuf::new();
    let mut p = Parser::new();
    let mut trickled = None;
    for b in &wire {
        buf.write_bytes(&[*b]);
        match p.parse(&mut buf) {
            Parsed::More => {}
            Parsed::Ready(args) => trickled = Some(args),
            Parsed::Error(e) => panic!("trickle parse failed: {e}"),
        }
    }
    let trickled: Vec<Vec<u8>> = trickled
        .expect("trickle parse did not complete")
        .iter()
        .map(|a| a.to_vec())
        .collect();
    assert_eq!(oneshot, trickled);
}

#[test]
fn writer_output_reparses_to_same_args() {
    let cases: Vec<Vec<&[u8]>> = vec![
        vec![b"PING"],
        vec![b"SET", b"k", b"v"],
        vec![b"MSET", b"a", b"1", b"b", b"2"],
        vec![b"SET", b"bin", b"\x00\x01\x02\xff"],
    ];
    for args in cases {
        let wire = request(&args);
        let parsed = ready_args(&wire);
        let want: Vec<Vec<u8>> = args.iter().map(|a| a.to_vec()).collect();
        assert_eq!(parsed, want);
    }
}

#[test]
fn pipelined_requests_come_out_in_order() {
    let mut wire = request(&[b"PING"]);
    wire.extend(request(&[b"GET", b"k"]));

    let results = feed_all(&wire);
    let ready: Vec<Vec<Vec<u8>>> = results
        .iter()
        .filter_map(|r| match r {
            Parsed::Ready(a) => Some(a.iter().map(|x| x.to_vec()).collect()),
            _ => None,
        })
        .collect();
    assert_eq!(ready.len(), 2);
    assert_eq!(ready[0], vec![b"PING".to_vec()]);
    assert_eq!(ready[1], vec![b"GET".to_vec(), b"k".to_vec()]);
}

#[test]
fn bad_sigil_is_a_protocol_error() {
    let r = feed_all(b"*1\r\n#4\r\nPING\r\n");
    assert!(matches!(
        r.last(),
        Some(Parsed::Error(e)) if e.contains("expected '$'")
    ));
}

#[test]
fn bad_multibulk_count_is_a_protocol_error() {
    for wire in [&b"*0\r\n"[..], b"*-3\r\n", b"*abc\r\n", b"*65537\r\n"] {
        let r = feed_all(wire);
        assert!(
            matches!(r.last(), Some(Parsed::Error(e)) if e.contains("invalid multibulk length")),
            "wire {:?} should fail",
            String::from_utf8_lossy(wire)
        );
    }
}

#[test]
fn bad_bulk_length_is_a_protocol_error() {
    let r = feed_all(b"*1\r\n$-1\r\nx\r\n");
    assert!(matches!(r.last(), Some(Parsed::Error(_))));

    // body longer than declared
    let r = feed_all(b"*1\r\n$2\r\nabc\r\n");
    assert!(matches!(r.last(), Some(Parsed::Error(_))));
}

#[test]
fn inline_splits_on_whitespace() {
    let args = ready_args(b"set  k   v\r\n");
    assert_eq!(args, vec![b"set".to_vec(), b"k".to_vec(), b"v".to_vec()]);
}

#[test]
fn inline_double_quotes_with_escapes() {
    let args = ready_args(b"set k \"a\\x41\\n\\t\\\\b\"\r\n");
    assert_eq!(args[2], b"aA\n\t\\b".to_vec());
}

#[test]
fn inline_single_quotes() {
    let args = ready_args(b"set k 'it\\'s here'\r\n");
    assert_eq!(args[2], b"it's here".to_vec());
}

#[test]
fn inline_empty_line_yields_empty_request() {
    let r = feed_all(b"\r\n");
    assert!(matches!(r.first(), Some(Parsed::Ready(args)) if args.is_empty()));
}

#[test]
fn reply_builders_render_expected_wire() {
    let flat = |frames: Vec<Bytes>| -> Vec<u8> {
        frames.iter().flat_map(|f| f.to_vec()).collect()
    };

    assert_eq!(flat(ok()), b"+OK\r\n".to_vec());
    assert_eq!(flat(nil()), b"$-1\r\n".to_vec());
    assert_eq!(flat(integer(-7)), b":-7\r\n".to_vec());
    assert_eq!(flat(error("ERR boom")), b"-ERR boom\r\n".to_vec());
    assert_eq!(
        flat(bulk(Bytes::from_static(b"hello"))),
        b"$5\r\nhello\r\n".to_vec()
    );
    assert_eq!(
        flat(array(vec![Some(Bytes::from_static(b"a")), None])),
        b"*2\r\n$1\r\na\r\n$-1\r\n".to_vec()
    );
}
