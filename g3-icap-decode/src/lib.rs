/*
 * SPDX-License-Identifier: Apache-2.0
 */

//! A resumable, streaming decoder for the Internet Content Adaptation
//! Protocol (ICAP, RFC 3507).
//!
//! The decoder accepts arbitrary byte prefixes of an ICAP message across
//! any number of [`Decoder::decode`] calls and never requires a whole
//! message, or even a whole header line, to be buffered up front. It
//! parses the ICAP initial line and headers, the `Encapsulated` header,
//! and any embedded HTTP request/response head and chunked body the
//! `Encapsulated` header describes.
//!
//! This crate covers decoding only: building an ICAP server, client, or
//! response encoder is out of scope, as is TLS and any content-adaptation
//! policy.

mod chunked;
mod encapsulated;
mod error;
mod http_head;
mod message;
mod reader;

mod decoder;

pub use encapsulated::EncapsulatedDescriptor;
pub use error::{DecodeError, DecodeResult};
pub use http_head::HttpHead;
pub use message::{HeaderList, IcapMessage, IcapMessageBuilder};

pub use decoder::{Decoded, Decoder};
