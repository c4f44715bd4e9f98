//! The `IcapMessage` builder contract (component D).
//!
//! spec.md §9 calls out that the original design used subclassing
//! (`createMessage` as a virtual factory method overridden per message
//! direction). Re-expressed here as a trait object supplied once at
//! [`crate::Decoder::new`] time, the same shape the teacher uses for
//! `g3icap::protocol::parser`'s pluggable body-size limits: a plain
//! `Fn` closure captured by the decoder rather than an inheritance
//! hierarchy.

use crate::encapsulated::EncapsulatedDescriptor;
use crate::http_head::HttpHead;
use g3_icap_proto::IcapMethod;
use smallvec::SmallVec;

/// An order-preserving, case-insensitive header multimap.
///
/// Deliberately not `http::HeaderMap`: ICAP header values are not
/// guaranteed to be valid `http` crate `HeaderValue` bytes, and
/// `http::HeaderMap` does not promise to preserve duplicate-header
/// insertion order on retrieval, which spec.md §8 requires. Backed by a
/// `SmallVec` rather than a plain `Vec`, on the same reasoning the
/// teacher applies to its own per-message header storage: most ICAP
/// messages carry a handful of headers, so a few inline slots avoid a
/// heap allocation for the common case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: SmallVec<[(String, String); 8]>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// The first value stored under `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values stored under `name`, case-insensitively, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The contract the decoder needs from whatever message type the caller
/// wants filled in. Implementing this trait is the only thing a caller
/// needs to do to receive decoded messages in their own representation.
pub trait IcapMessageBuilder {
    fn clear_headers(&mut self);
    fn add_header(&mut self, name: &str, value: &str);
    fn contains_header(&self, name: &str) -> bool;
    fn get_header(&self, name: &str) -> Option<&str>;
    fn get_method(&self) -> Option<IcapMethod>;
    fn set_encapsulated_header(&mut self, descriptor: EncapsulatedDescriptor);
    fn get_encapsulated_header(&self) -> Option<&EncapsulatedDescriptor>;

    /// Attach the embedded HTTP request head once `req-hdr` has been fully
    /// parsed. Default no-op so builders that don't care about the
    /// embedded heads (e.g. a body-only pass-through) need not implement it.
    fn set_request_head(&mut self, _head: HttpHead) {}

    /// Attach the embedded HTTP response head once `res-hdr` has been
    /// fully parsed.
    fn set_response_head(&mut self, _head: HttpHead) {}
}

/// The default, direction-agnostic builder. Good enough for tests, demos,
/// and any caller that just wants the parsed structure without a
/// custom representation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IcapMessage {
    pub method: Option<IcapMethod>,
    pub raw_method: String,
    pub uri: String,
    pub version: String,
    pub headers: HeaderList,
    pub encapsulated: Option<EncapsulatedDescriptor>,
    pub request_head: Option<HttpHead>,
    pub response_head: Option<HttpHead>,
}

impl IcapMessage {
    /// The default `create_message` factory: parses the ICAP method from
    /// the initial line's first token, accepting an unrecognised token as
    /// `method: None` (spec.md §4.C: unknown methods accept any
    /// well-formed `Encapsulated` descriptor later on).
    pub fn from_tokens(tokens: &[String]) -> Result<Self, crate::error::DecodeError> {
        let (first, second, third) = (
            tokens.first().cloned().unwrap_or_default(),
            tokens.get(1).cloned().unwrap_or_default(),
            tokens.get(2).cloned().unwrap_or_default(),
        );
        Ok(IcapMessage {
            method: first.parse().ok(),
            raw_method: first,
            uri: second,
            version: third,
            ..Default::default()
        })
    }
}

impl IcapMessageBuilder for IcapMessage {
    fn clear_headers(&mut self) {
        self.headers.clear();
    }

    fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push(name, value);
    }

    fn contains_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    fn get_method(&self) -> Option<IcapMethod> {
        self.method
    }

    fn set_encapsulated_header(&mut self, descriptor: EncapsulatedDescriptor) {
        self.encapsulated = Some(descriptor);
    }

    fn get_encapsulated_header(&self) -> Option<&EncapsulatedDescriptor> {
        self.encapsulated.as_ref()
    }

    fn set_request_head(&mut self, head: HttpHead) {
        self.request_head = Some(head);
    }

    fn set_response_head(&mut self, head: HttpHead) {
        self.response_head = Some(head);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_list_is_case_insensitive_and_order_preserving() {
        let mut h = HeaderList::new();
        h.push("X-Tag", "1");
        h.push("x-tag", "2");
        h.push("X-TAG", "3");
        assert_eq!(h.get("X-TAG"), Some("1"));
        assert_eq!(h.get_all("x-tag").collect::<Vec<_>>(), vec!["1", "2", "3"]);
    }

    #[test]
    fn from_tokens_accepts_unknown_method() {
        let tokens = vec!["FROB".to_string(), "icap://s/e".to_string(), "ICAP/1.0".to_string()];
        let msg = IcapMessage::from_tokens(&tokens).unwrap();
        assert_eq!(msg.get_method(), None);
        assert_eq!(msg.raw_method, "FROB");
    }

    #[test]
    fn from_tokens_parses_known_method() {
        let tokens = vec!["REQMOD".to_string(), "icap://s/e".to_string(), "ICAP/1.0".to_string()];
        let msg = IcapMessage::from_tokens(&tokens).unwrap();
        assert_eq!(msg.get_method(), Some(g3_icap_proto::IcapMethod::Reqmod));
    }
}
