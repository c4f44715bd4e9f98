/*
 * SPDX-License-Identifier: Apache-2.0
 */

//! Error taxonomy for the ICAP decoder.
//!
//! Trimmed from the teacher's `g3icap::error::IcapError` down to the closed
//! set of kinds the decoder itself can produce (no audit/auth/antivirus
//! variants here — those belong to a server, which is out of scope). Every
//! variant here is fatal for the message currently in progress; an
//! under-run is never represented as a `DecodeError` (see [`crate::Decoded::NeedMore`]).

use thiserror::Error;

pub type DecodeResult<T> = Result<T, DecodeError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A decoder constructor argument violated its contract (e.g. a zero
    /// or negative size budget where one is required to be positive).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A size budget (initial line, header block, or chunk) was exceeded.
    #[error("frame too long: {0}")]
    FrameTooLong(String),

    /// The ICAP initial line did not split into exactly three tokens, or
    /// the caller-supplied builder rejected the parsed tokens.
    #[error("invalid initial line: {0}")]
    InvalidInitialLine(String),

    /// A header line was neither a valid `name: value` pair nor a valid
    /// continuation line.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// `Host` or `Encapsulated` was absent from the ICAP header block.
    #[error("missing mandatory header: {0}")]
    MissingMandatoryHeader(String),

    /// The `Encapsulated` header value failed to parse or violated one of
    /// its structural invariants (offsets, body-kind placement, method fit).
    #[error("invalid Encapsulated header: {0}")]
    InvalidEncapsulatedHeader(String),

    /// A chunked-body frame (size line, payload, trailer) was malformed.
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),
}
