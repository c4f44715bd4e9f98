//! Cross-module scenario tests, mirroring spec.md §8's concrete scenarios
//! and testable properties.

use g3_icap_decode::{DecodeError, Decoded, Decoder, IcapMessage, IcapMessageBuilder};
use g3_icap_proto::IcapMethod;

fn new_decoder() -> Decoder<IcapMessage> {
    Decoder::new(8192, 65536, 65536, true, IcapMessage::from_tokens).unwrap()
}

/// Feed the whole buffer in one call, then keep draining with empty
/// slices until `NeedMore` (or a fixed cap, to avoid an infinite loop on
/// a bug) is reached. Returns every event observed, in order.
fn drain_all(decoder: &mut Decoder<IcapMessage>, wire: &[u8]) -> Vec<String> {
    let mut events = Vec::new();
    let mut fed = wire;
    for _ in 0..64 {
        match decoder.decode(fed).unwrap() {
            Decoded::NeedMore(_) => break,
            Decoded::MessageHead(msg) => events.push(format!("head:{:?}", msg.get_method())),
            Decoded::BodyChunk(bytes) => events.push(format!("chunk:{}", String::from_utf8_lossy(&bytes))),
            Decoded::PreviewComplete => events.push("preview-complete".to_string()),
            Decoded::EndOfMessage => events.push("end".to_string()),
        }
        fed = &[];
    }
    events
}

#[test]
fn options_with_null_body_completes_with_no_embedded_sections() {
    let wire = b"\
OPTIONS icap://s/e ICAP/1.0\r\n\
Host: s\r\n\
Encapsulated: null-body=0\r\n\
\r\n";
    let mut decoder = new_decoder();
    let events = drain_all(&mut decoder, wire);
    assert_eq!(events, vec!["head:Some(Options)", "end"]);
}

#[test]
fn reqmod_attaches_embedded_request_head_before_end() {
    let wire = b"\
REQMOD icap://s/e ICAP/1.0\r\n\
Host: s\r\n\
Encapsulated: req-hdr=0, null-body=33\r\n\
\r\n\
GET /x HTTP/1.1\r\n\
Host: origin\r\n\
\r\n";
    let mut decoder = new_decoder();
    let mut request_head_uri = None;
    let mut fed: &[u8] = wire;
    let mut saw_end = false;
    for _ in 0..8 {
        match decoder.decode(fed).unwrap() {
            Decoded::NeedMore(_) => break,
            Decoded::MessageHead(msg) => {
                assert_eq!(msg.get_method(), Some(IcapMethod::Reqmod));
                request_head_uri = msg.request_head.as_ref().map(|h| h.start_line.1.clone());
            }
            Decoded::EndOfMessage => {
                saw_end = true;
                break;
            }
            other => panic!("unexpected event in this scenario: {other:?}"),
        }
        fed = &[];
    }
    assert_eq!(request_head_uri.as_deref(), Some("/x"));
    assert!(saw_end);
}

#[test]
fn preview_ieof_yields_chunk_then_preview_complete_then_end() {
    let wire = b"\
RESPMOD icap://s/e ICAP/1.0\r\n\
Host: s\r\n\
Preview: 4\r\n\
Encapsulated: res-hdr=0, res-body=19\r\n\
\r\n\
HTTP/1.1 200 OK\r\n\
\r\n\
4\r\n\
ABCD\r\n\
0; ieof\r\n\
\r\n";
    let mut decoder = new_decoder();
    let events = drain_all(&mut decoder, wire);
    assert_eq!(
        events,
        vec!["head:Some(Respmod)", "chunk:ABCD", "preview-complete", "end"]
    );
}

#[test]
fn fragmented_byte_at_a_time_feeding_matches_whole_buffer_feeding() {
    let wire: &[u8] = b"\
OPTIONS icap://s/e ICAP/1.0\r\n\
Host: s\r\n\
Encapsulated: null-body=0\r\n\
\r\n";

    let mut whole = new_decoder();
    let whole_events = drain_all(&mut whole, wire);

    let mut fragmented = new_decoder();
    let mut events = Vec::new();
    for byte in wire {
        match fragmented.decode(&[*byte]).unwrap() {
            Decoded::NeedMore(_) => {}
            Decoded::MessageHead(msg) => events.push(format!("head:{:?}", msg.get_method())),
            Decoded::EndOfMessage => events.push("end".to_string()),
            other => panic!("unexpected event: {other:?}"),
        }
        // Drain any further buffered events without feeding new bytes.
        loop {
            match fragmented.decode(&[]).unwrap() {
                Decoded::NeedMore(_) => break,
                Decoded::MessageHead(msg) => events.push(format!("head:{:?}", msg.get_method())),
                Decoded::EndOfMessage => {
                    events.push("end".to_string());
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    assert_eq!(events, whole_events);
}

#[test]
fn duplicate_headers_preserve_insertion_order() {
    let wire = b"\
OPTIONS icap://s/e ICAP/1.0\r\n\
Host: s\r\n\
X-Tag: one\r\n\
X-Tag: two\r\n\
Encapsulated: null-body=0\r\n\
\r\n";
    let mut decoder = new_decoder();
    let mut tags = Vec::new();
    let mut fed: &[u8] = wire;
    for _ in 0..4 {
        match decoder.decode(fed).unwrap() {
            Decoded::MessageHead(msg) => {
                tags = msg.headers.get_all("x-tag").map(str::to_string).collect();
            }
            Decoded::EndOfMessage => break,
            Decoded::NeedMore(_) => break,
            _ => {}
        }
        fed = &[];
    }
    assert_eq!(tags, vec!["one", "two"]);
}

#[test]
fn oversized_header_block_is_rejected() {
    let mut decoder: Decoder<IcapMessage> = Decoder::new(8192, 32, 65536, true, IcapMessage::from_tokens).unwrap();
    let mut wire = b"OPTIONS icap://s/e ICAP/1.0\r\nHost: s\r\n".to_vec();
    wire.extend_from_slice(b"X-Filler: 0123456789012345678901234567890123456789\r\n\r\n");

    let err = decoder.decode(&wire).unwrap_err();
    assert!(matches!(err, DecodeError::FrameTooLong(_)));

    // A fatal error is sticky: the same decoder keeps returning it.
    let err_again = decoder.decode(&[]).unwrap_err();
    assert_eq!(err, err_again);
}

#[test]
fn duplicate_encapsulated_header_is_rejected() {
    let wire = b"\
OPTIONS icap://s/e ICAP/1.0\r\n\
Host: s\r\n\
Encapsulated: null-body=0\r\n\
Encapsulated: null-body=0\r\n\
\r\n";
    let mut decoder = new_decoder();
    let err = decoder.decode(wire).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidEncapsulatedHeader(_)));
}

#[test]
fn missing_host_header_is_rejected() {
    let wire = b"\
OPTIONS icap://s/e ICAP/1.0\r\n\
Encapsulated: null-body=0\r\n\
\r\n";
    let mut decoder = new_decoder();
    let err = decoder.decode(wire).unwrap_err();
    assert!(matches!(err, DecodeError::MissingMandatoryHeader(_)));
}

#[test]
fn oversized_initial_line_is_rejected() {
    // Default `maxInitialLineLength` is 4096; a 5000-byte line must fail.
    let mut decoder: Decoder<IcapMessage> =
        Decoder::new(4096, 65536, 65536, true, IcapMessage::from_tokens).unwrap();
    let mut wire = b"OPTIONS icap://".to_vec();
    wire.extend(std::iter::repeat(b's').take(5000));
    wire.extend_from_slice(b"/e ICAP/1.0\r\n");

    let err = decoder.decode(&wire).unwrap_err();
    assert!(matches!(err, DecodeError::FrameTooLong(_)));
}

#[test]
fn leading_garbage_resyncs_before_a_valid_message() {
    let mut wire = b"\r\n\r\n".to_vec();
    wire.extend_from_slice(
        b"\
OPTIONS icap://s/e ICAP/1.0\r\n\
Host: s\r\n\
Encapsulated: null-body=0\r\n\
\r\n",
    );
    let mut decoder = new_decoder();
    let events = drain_all(&mut decoder, &wire);
    assert_eq!(events, vec!["head:Some(Options)", "end"]);
}
