//! The resumable decoder state machine (components E and F).
//!
//! Grounded on the retrieved `rama-icap::parser::MessageParser` fragment
//! for the overall "accumulate into an owned buffer, re-enter the state
//! machine, return `NeedMore` rather than erroring on short input" shape,
//! and on the teacher's `g3icap::protocol::parser` module for the
//! ICAP-specific grammar each state implements. The checkpoint/replay
//! layer (component F) is `Checkpoint`, a `(State, usize)` pair restored
//! whenever a primitive reports [`Progress::Incomplete`].

use crate::chunked::{ChunkEvent, ChunkedBodyReader};
use crate::encapsulated::{self, EncapsulatedDescriptor};
use crate::error::DecodeError;
use crate::http_head;
use crate::message::IcapMessageBuilder;
use crate::reader::{
    is_header_line_continuation, read_line, read_single_header_line, skip_control_characters,
    split_header, split_initial_line, Progress, SizeDelimiter,
};
use bytes::{Buf, Bytes, BytesMut};
use g3_icap_proto::SectionKind;

/// The decoder's state, mirroring spec.md §3's named state set exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SkipControlChars,
    ReadIcapInitial,
    ReadIcapHeader,
    ReadHttpRequestHeader,
    ReadHttpResponseHeader,
    ReadHttpBody,
}

/// `(state, position)` to roll back to when a primitive reports
/// `Incomplete`. Updated only immediately after a primitive commits.
type Checkpoint = (State, usize);

enum AfterHead {
    EndOfMessage,
    Body,
}

/// One unit of decoded progress, returned from a single [`Decoder::decode`] call.
#[derive(Debug)]
pub enum Decoded<B> {
    /// Not enough bytes yet to make progress; `0` when no more-precise
    /// estimate is available, otherwise a lower bound on how many more
    /// bytes are needed.
    NeedMore(usize),
    /// The ICAP initial line, ICAP headers, `Encapsulated` descriptor, and
    /// any embedded HTTP head(s) have all been parsed and attached.
    /// Ownership of `B` transfers to the caller; the decoder does not
    /// touch it again.
    MessageHead(B),
    /// One complete chunk of the encapsulated body.
    BodyChunk(Bytes),
    /// The Preview window has ended; more chunks may follow.
    PreviewComplete,
    /// The message is fully decoded.
    EndOfMessage,
}

/// A resumable, streaming ICAP message decoder.
///
/// Feed it arbitrary prefixes of the wire stream via repeated calls to
/// [`Decoder::decode`]; it never requires the full message to be
/// buffered up front, and it is safe to call again with an empty slice
/// to drain any events already fully parsed from previously-supplied
/// bytes.
pub struct Decoder<B: IcapMessageBuilder> {
    max_initial_line_length: usize,
    max_icap_header_size: usize,
    max_chunk_size: usize,
    is_request: bool,
    create_message: Box<dyn Fn(&[String]) -> Result<B, DecodeError> + Send>,

    buffer: BytesMut,
    pos: usize,
    checkpoint: Checkpoint,
    state: State,

    message: Option<B>,
    header_delim: Option<SizeDelimiter>,
    header_accum: Option<(String, String)>,
    body_region_start: usize,
    encapsulated: Option<EncapsulatedDescriptor>,
    req_head_attached: bool,
    res_head_attached: bool,
    chunk_reader: Option<ChunkedBodyReader>,
    preview_requested: bool,

    after_head: Option<AfterHead>,
    ready_to_emit_head: bool,
    pending_end_of_message: bool,
    fatal: Option<DecodeError>,
}

impl<B: IcapMessageBuilder> Decoder<B> {
    pub fn new(
        max_initial_line_length: usize,
        max_icap_header_size: usize,
        max_chunk_size: usize,
        is_request: bool,
        create_message: impl Fn(&[String]) -> Result<B, DecodeError> + Send + 'static,
    ) -> Result<Self, DecodeError> {
        if max_initial_line_length == 0 {
            return Err(DecodeError::InvalidArgument(
                "max_initial_line_length must be positive".into(),
            ));
        }
        if max_icap_header_size == 0 {
            return Err(DecodeError::InvalidArgument(
                "max_icap_header_size must be positive".into(),
            ));
        }
        Ok(Self {
            max_initial_line_length,
            max_icap_header_size,
            max_chunk_size,
            is_request,
            create_message: Box::new(create_message),
            buffer: BytesMut::new(),
            pos: 0,
            checkpoint: (State::SkipControlChars, 0),
            state: State::SkipControlChars,
            message: None,
            header_delim: None,
            header_accum: None,
            body_region_start: 0,
            encapsulated: None,
            req_head_attached: false,
            res_head_attached: false,
            chunk_reader: None,
            preview_requested: false,
            after_head: None,
            ready_to_emit_head: false,
            pending_end_of_message: false,
            fatal: None,
        })
    }

    pub fn is_decoding_request(&self) -> bool {
        self.is_request
    }

    pub fn decode(&mut self, buf: &[u8]) -> Result<Decoded<B>, DecodeError> {
        if let Some(e) = &self.fatal {
            return Err(e.clone());
        }
        if self.pending_end_of_message {
            self.pending_end_of_message = false;
            log::debug!("icap decode: end of message");
            self.reset_for_next_message();
            return Ok(Decoded::EndOfMessage);
        }

        self.buffer.extend_from_slice(buf);

        loop {
            let step_result = match self.state {
                State::SkipControlChars => self.step_skip_control_chars(),
                State::ReadIcapInitial => self.step_read_icap_initial(),
                State::ReadIcapHeader => self.step_read_icap_header(),
                State::ReadHttpRequestHeader => self.step_read_http_section(SectionKind::ReqHdr),
                State::ReadHttpResponseHeader => self.step_read_http_section(SectionKind::ResHdr),
                State::ReadHttpBody => self.step_read_http_body(),
            };

            match step_result {
                Ok(Some(decoded)) => return Ok(decoded),
                Ok(None) => {
                    if self.ready_to_emit_head {
                        return Ok(self.do_emit_head());
                    }
                    continue;
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    fn fail(&mut self, e: DecodeError) -> DecodeError {
        log::debug!("icap decode: fatal error: {e}");
        self.fatal = Some(e.clone());
        e
    }

    fn rewind_to_checkpoint(&mut self) {
        self.state = self.checkpoint.0;
        self.pos = self.checkpoint.1;
    }

    fn compact(&mut self) {
        let keep_from = self.checkpoint.1;
        if keep_from > 0 {
            self.buffer.advance(keep_from);
            self.pos -= keep_from;
            self.checkpoint.1 = 0;
        }
    }

    fn need_more(&mut self, hint: usize) -> Decoded<B> {
        self.rewind_to_checkpoint();
        self.compact();
        Decoded::NeedMore(hint)
    }

    fn reset_for_next_message(&mut self) {
        self.state = State::SkipControlChars;
        self.message = None;
        self.header_delim = None;
        self.header_accum = None;
        self.body_region_start = 0;
        self.encapsulated = None;
        self.req_head_attached = false;
        self.res_head_attached = false;
        self.chunk_reader = None;
        self.preview_requested = false;
        self.after_head = None;
        self.ready_to_emit_head = false;
        self.checkpoint = (self.state, self.pos);
        self.compact();
    }

    // --- SkipControlChars -------------------------------------------------

    fn step_skip_control_chars(&mut self) -> Result<Option<Decoded<B>>, DecodeError> {
        let window = &self.buffer[self.pos..];
        let skip = skip_control_characters(window);
        self.pos += skip;
        self.checkpoint = (self.state, self.pos);
        if skip == window.len() {
            return Ok(Some(self.need_more(0)));
        }
        self.state = State::ReadIcapInitial;
        self.checkpoint = (self.state, self.pos);
        Ok(None)
    }

    // --- ReadIcapInitial ---------------------------------------------------

    fn step_read_icap_initial(&mut self) -> Result<Option<Decoded<B>>, DecodeError> {
        let progress = read_line(&self.buffer[self.pos..], self.max_initial_line_length)?;
        let (line, consumed) = match progress {
            Progress::Complete(line, consumed) => (line.to_vec(), consumed),
            Progress::Incomplete => return Ok(Some(self.need_more(0))),
        };
        self.pos += consumed;

        let tokens = if self.is_request {
            split_initial_line(&line)
        } else {
            // Response-direction status line: VERSION SP CODE SP REASON.
            // Reason may contain embedded spaces, so this is a distinct
            // split from a request/ICAP initial line's exact-3-token rule.
            std::str::from_utf8(&line).ok().and_then(|s| {
                let mut parts = s.splitn(3, ' ');
                let a = parts.next()?.to_string();
                let b = parts.next()?.to_string();
                let c = parts.next().unwrap_or("").to_string();
                Some((a, b, c))
            })
        };

        let Some((first, second, third)) = tokens else {
            // Fewer than three tokens: tolerant re-sync, no error surfaced
            // (spec.md §7: stray bytes before a message exists never kill
            // the stream).
            log::trace!("icap decode: discarding malformed initial line, resyncing");
            self.state = State::SkipControlChars;
            self.checkpoint = (self.state, self.pos);
            return Ok(None);
        };

        let owned_tokens = [first, second, third];
        match (self.create_message)(&owned_tokens) {
            Ok(mut msg) => {
                msg.clear_headers();
                self.message = Some(msg);
                self.header_delim = Some(SizeDelimiter::new(self.max_icap_header_size));
                self.header_accum = None;
                self.state = State::ReadIcapHeader;
                self.checkpoint = (self.state, self.pos);
                log::trace!("icap decode: initial line parsed, reading headers");
            }
            Err(_rejected) => {
                log::trace!("icap decode: builder rejected initial line, resyncing");
                self.state = State::SkipControlChars;
                self.checkpoint = (self.state, self.pos);
            }
        }
        Ok(None)
    }

    // --- ReadIcapHeader ------------------------------------------------------

    fn step_read_icap_header(&mut self) -> Result<Option<Decoded<B>>, DecodeError> {
        let mut delim = self.header_delim.expect("header delimiter set in ReadIcapHeader");
        let progress = read_single_header_line(&self.buffer[self.pos..], &mut delim)?;
        self.header_delim = Some(delim);

        let (line, consumed) = match progress {
            Progress::Complete(line, consumed) => (line.to_vec(), consumed),
            Progress::Incomplete => return Ok(Some(self.need_more(0))),
        };
        self.pos += consumed;

        if line.is_empty() {
            if let Some((name, value)) = self.header_accum.take() {
                self.commit_header(&name, &value)?;
            }
            self.header_delim = None;
            self.body_region_start = self.pos;
            self.finish_icap_headers()?;
        } else if is_header_line_continuation(&line) {
            let (_, value) = self
                .header_accum
                .as_mut()
                .ok_or_else(|| DecodeError::MalformedHeader("continuation line with no preceding header".into()))?;
            let cont = std::str::from_utf8(&line)
                .map_err(|e| DecodeError::MalformedHeader(format!("continuation line is not valid UTF-8: {e}")))?
                .trim();
            value.push(' ');
            value.push_str(cont);
        } else {
            if let Some((name, value)) = self.header_accum.take() {
                self.commit_header(&name, &value)?;
            }
            self.header_accum = Some(split_header(&line)?);
        }

        self.checkpoint = (self.state, self.pos);
        Ok(None)
    }

    /// Add one fully-assembled header to the in-progress message, rejecting
    /// a second `Encapsulated` header (spec.md §4.E: duplicates are a
    /// fatal error, not a last-one-wins or first-one-wins tie-break).
    fn commit_header(&mut self, name: &str, value: &str) -> Result<(), DecodeError> {
        let msg = self.message.as_mut().expect("message present while committing a header");
        if name.eq_ignore_ascii_case("Encapsulated") && msg.contains_header(name) {
            return Err(DecodeError::InvalidEncapsulatedHeader(
                "duplicate Encapsulated header".into(),
            ));
        }
        msg.add_header(name, value);
        Ok(())
    }

    /// Validate mandatory headers, parse `Encapsulated`, and route to the
    /// next state (or queue emission of the message head).
    fn finish_icap_headers(&mut self) -> Result<(), DecodeError> {
        let msg = self.message.as_ref().expect("message present at end of ICAP headers");

        if !msg.contains_header("Host") {
            return Err(DecodeError::MissingMandatoryHeader("Host".into()));
        }
        let encapsulated_value = msg
            .get_header("Encapsulated")
            .ok_or_else(|| DecodeError::MissingMandatoryHeader("Encapsulated".into()))?
            .to_string();

        let descriptor = encapsulated::parse_encapsulated(&encapsulated_value, msg.get_method())?;
        self.preview_requested = msg.contains_header("Preview");
        self.encapsulated = Some(descriptor.clone());
        self.message.as_mut().unwrap().set_encapsulated_header(descriptor);

        log::trace!("icap decode: ICAP headers complete, encapsulated = {encapsulated_value}");
        self.route_after_headers();
        Ok(())
    }

    // --- ReadHttpRequestHeader / ReadHttpResponseHeader -----------------------

    fn step_read_http_section(&mut self, kind: SectionKind) -> Result<Option<Decoded<B>>, DecodeError> {
        let enc = self.encapsulated.as_ref().expect("encapsulated set before reading an HTTP section");
        let offset = enc
            .offset_of(kind)
            .expect("route_after_headers only enters this state when the section is present");
        let next = enc.next_offset(kind).ok_or_else(|| {
            DecodeError::InvalidEncapsulatedHeader(format!("{kind} has no following section"))
        })?;
        let start_abs = self.body_region_start + offset;
        let end_abs = self.body_region_start + next;

        if self.buffer.len() < end_abs {
            let hint = end_abs - self.buffer.len();
            return Ok(Some(self.need_more(hint)));
        }

        let section = self.buffer[start_abs..end_abs].to_vec();
        match kind {
            SectionKind::ReqHdr => {
                let head = http_head::parse_http_request_head(&section)?;
                self.message.as_mut().unwrap().set_request_head(head);
                self.req_head_attached = true;
            }
            SectionKind::ResHdr => {
                let head = http_head::parse_http_response_head(&section)?;
                self.message.as_mut().unwrap().set_response_head(head);
                self.res_head_attached = true;
            }
            other => unreachable!("step_read_http_section only handles req-hdr/res-hdr, got {other}"),
        }

        self.pos = end_abs;
        log::trace!("icap decode: embedded {kind} section attached");
        self.route_after_headers();
        self.checkpoint = (self.state, self.pos);
        Ok(None)
    }

    fn route_after_headers(&mut self) {
        let enc = self.encapsulated.clone().expect("encapsulated set");
        if enc.contains(SectionKind::ReqHdr) && !self.req_head_attached {
            self.state = State::ReadHttpRequestHeader;
        } else if enc.contains(SectionKind::ResHdr) && !self.res_head_attached {
            self.state = State::ReadHttpResponseHeader;
        } else {
            match enc.body_kind() {
                Some(SectionKind::NullBody) | None => {
                    self.after_head = Some(AfterHead::EndOfMessage);
                    self.ready_to_emit_head = true;
                }
                Some(_) => {
                    self.after_head = Some(AfterHead::Body);
                    self.ready_to_emit_head = true;
                }
            }
        }
        self.checkpoint = (self.state, self.pos);
    }

    fn do_emit_head(&mut self) -> Decoded<B> {
        self.ready_to_emit_head = false;
        let msg = self.message.take().expect("message present when emitting head");
        match self.after_head.take().expect("after_head set before emitting") {
            AfterHead::EndOfMessage => {
                self.pending_end_of_message = true;
            }
            AfterHead::Body => {
                self.chunk_reader = Some(ChunkedBodyReader::new(self.max_chunk_size, self.preview_requested));
                self.state = State::ReadHttpBody;
                self.checkpoint = (self.state, self.pos);
            }
        }
        log::debug!("icap decode: message head emitted");
        Decoded::MessageHead(msg)
    }

    // --- ReadHttpBody --------------------------------------------------------

    fn step_read_http_body(&mut self) -> Result<Option<Decoded<B>>, DecodeError> {
        let mut reader = self.chunk_reader.take().expect("chunk reader present in ReadHttpBody");
        let progress = reader.next_event(&self.buffer[self.pos..]);
        let progress = match progress {
            Ok(p) => p,
            Err(e) => {
                self.chunk_reader = Some(reader);
                return Err(e);
            }
        };

        match progress {
            Progress::Complete(event, consumed) => {
                self.pos += consumed;
                self.chunk_reader = Some(reader);
                self.checkpoint = (self.state, self.pos);
                match event {
                    ChunkEvent::Chunk(bytes) => Ok(Some(Decoded::BodyChunk(bytes))),
                    ChunkEvent::PreviewComplete => Ok(Some(Decoded::PreviewComplete)),
                    ChunkEvent::PreviewThenEnd => {
                        self.pending_end_of_message = true;
                        Ok(Some(Decoded::PreviewComplete))
                    }
                    ChunkEvent::End => {
                        self.pending_end_of_message = false;
                        self.reset_for_next_message();
                        Ok(Some(Decoded::EndOfMessage))
                    }
                }
            }
            Progress::Incomplete => {
                self.chunk_reader = Some(reader);
                Ok(Some(self.need_more(0)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::IcapMessage;

    fn new_decoder() -> Decoder<IcapMessage> {
        Decoder::new(8192, 65536, 65536, true, IcapMessage::from_tokens).unwrap()
    }

    #[test]
    fn new_rejects_zero_size_budgets() {
        assert!(matches!(
            Decoder::new(0, 65536, 65536, true, IcapMessage::from_tokens),
            Err(DecodeError::InvalidArgument(_))
        ));
        assert!(matches!(
            Decoder::new(4096, 0, 65536, true, IcapMessage::from_tokens),
            Err(DecodeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn duplicate_encapsulated_header_is_fatal() {
        let mut decoder = new_decoder();
        let wire = b"\
OPTIONS icap://s/e ICAP/1.0\r\n\
Host: s\r\n\
Encapsulated: null-body=0\r\n\
Encapsulated: null-body=0\r\n\
\r\n";
        let err = decoder.decode(wire).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidEncapsulatedHeader(_)));
    }

    #[test]
    fn decode_after_fatal_error_returns_same_error() {
        let mut decoder: Decoder<IcapMessage> =
            Decoder::new(8192, 8, 65536, true, IcapMessage::from_tokens).unwrap();
        let wire = b"OPTIONS icap://s/e ICAP/1.0\r\nHost: s\r\nX-Long: 0123456789\r\n\r\n";
        let first = decoder.decode(wire).unwrap_err();
        let second = decoder.decode(b"more bytes").unwrap_err();
        assert_eq!(first, second);
    }
}
