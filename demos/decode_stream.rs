//! Feeds an ICAP REQMOD message into [`g3_icap_decode::Decoder`] a few
//! bytes at a time, logging every `Decoded` event it yields.
//!
//! Run with `RUST_LOG=trace cargo run --example decode_stream` to see the
//! state-transition/ICAP-headers-complete/message-head trace lines.

use g3_icap_decode::{Decoded, Decoder, IcapMessage, IcapMessageBuilder};

const WIRE: &[u8] = b"\
REQMOD icap://icap.example.org/reqmod ICAP/1.0\r\n\
Host: icap.example.org\r\n\
Encapsulated: req-hdr=0, req-body=54\r\n\
\r\n\
GET /index.html HTTP/1.1\r\n\
Host: origin.example.org\r\n\
\r\n\
4\r\n\
ABCD\r\n\
0\r\n\
\r\n";

fn main() {
    env_logger::init();

    let mut decoder: Decoder<IcapMessage> =
        Decoder::new(8192, 65536, 65536, true, |tokens| IcapMessage::from_tokens(tokens)).expect("valid decoder arguments");

    // Feed the wire bytes in small, arbitrary-sized slices to exercise the
    // resumable parsing path rather than handing over the whole buffer.
    for chunk in WIRE.chunks(7) {
        let mut fed = chunk;
        loop {
            match decoder.decode(fed).expect("well-formed demo input") {
                Decoded::NeedMore(_) => break,
                Decoded::MessageHead(msg) => {
                    println!(
                        "message head: method={:?} uri={} headers={}",
                        msg.get_method(),
                        msg.uri,
                        msg.headers.iter().count(),
                    );
                }
                Decoded::BodyChunk(bytes) => {
                    println!("body chunk: {} bytes", bytes.len());
                }
                Decoded::PreviewComplete => println!("preview complete"),
                Decoded::EndOfMessage => println!("end of message"),
            }
            // Only the first decode() call in this inner loop should carry
            // new bytes; subsequent calls just drain already-buffered events.
            fed = &[];
        }
    }
}
