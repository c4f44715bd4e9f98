/*
 * SPDX-License-Identifier: Apache-2.0
 */

//! Wire-level ICAP vocabulary (RFC 3507).
//!
//! This crate holds the types that both sides of an ICAP conversation need
//! to agree on, but no parsing and no I/O: the method set, the protocol
//! version, and the `Encapsulated` section kinds. Decoders and (future)
//! encoders depend on this crate rather than on each other.

use std::fmt;
use std::str::FromStr;

/// ICAP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcapMethod {
    Options,
    Reqmod,
    Respmod,
}

impl IcapMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            IcapMethod::Options => "OPTIONS",
            IcapMethod::Reqmod => "REQMOD",
            IcapMethod::Respmod => "RESPMOD",
        }
    }
}

impl fmt::Display for IcapMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IcapMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPTIONS" => Ok(IcapMethod::Options),
            "REQMOD" => Ok(IcapMethod::Reqmod),
            "RESPMOD" => Ok(IcapMethod::Respmod),
            _ => Err(()),
        }
    }
}

/// ICAP protocol version, e.g. `ICAP/1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcapVersion {
    pub major: u8,
    pub minor: u8,
}

impl Default for IcapVersion {
    fn default() -> Self {
        Self { major: 1, minor: 0 }
    }
}

impl fmt::Display for IcapVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ICAP/{}.{}", self.major, self.minor)
    }
}

impl FromStr for IcapVersion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("ICAP/").ok_or(())?;
        let (major, minor) = rest.split_once('.').ok_or(())?;
        Ok(Self {
            major: major.parse().map_err(|_| ())?,
            minor: minor.parse().map_err(|_| ())?,
        })
    }
}

/// A section named in an `Encapsulated:` header value.
///
/// Order matters here: the offsets attached to these in an
/// [`EncapsulatedDescriptor`] must be non-decreasing, and at most one
/// body-kind variant ([`SectionKind::is_body`]) may appear, always last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    ReqHdr,
    ResHdr,
    ReqBody,
    ResBody,
    OptBody,
    NullBody,
}

impl SectionKind {
    pub fn as_token(&self) -> &'static str {
        match self {
            SectionKind::ReqHdr => "req-hdr",
            SectionKind::ResHdr => "res-hdr",
            SectionKind::ReqBody => "req-body",
            SectionKind::ResBody => "res-body",
            SectionKind::OptBody => "opt-body",
            SectionKind::NullBody => "null-body",
        }
    }

    /// True for the four section kinds that describe a body rather than an
    /// embedded HTTP header block.
    pub fn is_body(&self) -> bool {
        matches!(
            self,
            SectionKind::ReqBody | SectionKind::ResBody | SectionKind::OptBody | SectionKind::NullBody
        )
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

impl FromStr for SectionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "req-hdr" => Ok(SectionKind::ReqHdr),
            "res-hdr" => Ok(SectionKind::ResHdr),
            "req-body" => Ok(SectionKind::ReqBody),
            "res-body" => Ok(SectionKind::ResBody),
            "opt-body" => Ok(SectionKind::OptBody),
            "null-body" => Ok(SectionKind::NullBody),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_round_trips_through_display() {
        for m in [IcapMethod::Options, IcapMethod::Reqmod, IcapMethod::Respmod] {
            assert_eq!(m.to_string().parse::<IcapMethod>().unwrap(), m);
        }
    }

    #[test]
    fn version_parses_and_displays() {
        let v: IcapVersion = "ICAP/1.0".parse().unwrap();
        assert_eq!(v, IcapVersion { major: 1, minor: 0 });
        assert_eq!(v.to_string(), "ICAP/1.0");
    }

    #[test]
    fn section_kind_body_classification() {
        assert!(SectionKind::NullBody.is_body());
        assert!(SectionKind::OptBody.is_body());
        assert!(!SectionKind::ReqHdr.is_body());
        assert!(!SectionKind::ResHdr.is_body());
    }
}
