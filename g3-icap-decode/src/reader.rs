//! Buffer reader primitives (component A) and the shared size delimiter
//! (component B).
//!
//! Every primitive here operates on a borrowed window into the decoder's
//! accumulation buffer and reports either [`Progress::Complete`] (the
//! parsed value plus how many bytes of the window it consumed) or
//! [`Progress::Incomplete`] ("need more bytes"). `Incomplete` is never an
//! error: the caller is expected to feed more bytes and re-call with a
//! larger window starting at the same checkpoint.

use crate::error::DecodeError;

/// Outcome of a buffer primitive: either it made progress and consumed a
/// known number of bytes, or the window was exhausted before it could.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<T> {
    Complete(T, usize),
    Incomplete,
}

/// A monotonic byte counter that fails once a cap would be exceeded.
///
/// One instance spans the entire ICAP header block so the cap applies to
/// the aggregate of all header lines, not to each line individually.
#[derive(Debug, Clone, Copy)]
pub struct SizeDelimiter {
    cap: usize,
    used: usize,
}

impl SizeDelimiter {
    pub fn new(cap: usize) -> Self {
        Self { cap, used: 0 }
    }

    /// Charge `n` more bytes against the cap.
    pub fn add(&mut self, n: usize) -> Result<(), DecodeError> {
        let next = self.used.saturating_add(n);
        if next > self.cap {
            return Err(DecodeError::FrameTooLong(format!(
                "header block of at least {next} bytes exceeds cap of {}",
                self.cap
            )));
        }
        self.used = next;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.cap - self.used
    }

    pub fn used(&self) -> usize {
        self.used
    }
}

/// Advance past leading control bytes (anything `<= 0x20`), stopping at the
/// first byte `> 0x20`. Tolerates stray CR/LF left over between messages on
/// a persistent connection. Always safe to commit immediately: bytes this
/// skips are never part of a real message regardless of what follows.
pub fn skip_control_characters(buf: &[u8]) -> usize {
    buf.iter().take_while(|&&b| b <= 0x20).count()
}

/// Read one line terminated by CRLF (or bare LF) out of `buf`, capped at
/// `cap` bytes excluding the terminator. Returns the line without its
/// terminator and the total number of bytes consumed (including it).
pub fn read_line(buf: &[u8], cap: usize) -> Result<Progress<&[u8]>, DecodeError> {
    match memchr::memchr(b'\n', buf) {
        Some(nl) => {
            let consumed = nl + 1;
            let line_end = if nl > 0 && buf[nl - 1] == b'\r' { nl - 1 } else { nl };
            if line_end > cap {
                Err(DecodeError::FrameTooLong(format!(
                    "line of {line_end} bytes exceeds cap of {cap}"
                )))
            } else {
                Ok(Progress::Complete(&buf[..line_end], consumed))
            }
        }
        None => {
            if buf.len() > cap {
                Err(DecodeError::FrameTooLong(format!(
                    "no line terminator within {cap} bytes"
                )))
            } else {
                Ok(Progress::Incomplete)
            }
        }
    }
}

/// Like [`read_line`], but the byte budget is a shared [`SizeDelimiter`]
/// spanning the whole header block. Charges the delimiter only once a full
/// line (including its terminator) has actually been read.
pub fn read_single_header_line<'a>(
    buf: &'a [u8],
    delim: &mut SizeDelimiter,
) -> Result<Progress<&'a [u8]>, DecodeError> {
    match read_line(buf, delim.remaining())? {
        Progress::Complete(line, consumed) => {
            delim.add(consumed)?;
            Ok(Progress::Complete(line, consumed))
        }
        Progress::Incomplete => Ok(Progress::Incomplete),
    }
}

/// True when `line` is a header continuation: it starts with a space or
/// horizontal tab, so its content belongs to the previous header's value.
pub fn is_header_line_continuation(line: &[u8]) -> bool {
    matches!(line.first(), Some(b' ') | Some(b'\t'))
}

/// Split an ICAP/HTTP initial line into exactly three whitespace-separated
/// tokens. Tolerates runs of multiple spaces but not embedded tabs (a tab
/// is not whitespace for this purpose and will end up glued to a token,
/// which then fails to produce exactly three tokens).
pub fn split_initial_line(line: &[u8]) -> Option<(String, String, String)> {
    let s = std::str::from_utf8(line).ok()?;
    let mut tokens = s.split(' ').filter(|t| !t.is_empty());
    let first = tokens.next()?;
    let second = tokens.next()?;
    let third = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }
    Some((first.to_string(), second.to_string(), third.to_string()))
}

/// Split a header line on the first `:` into `(name, value)`, trimming
/// surrounding linear whitespace off the value. The name must be
/// non-empty and free of whitespace and `:`.
pub fn split_header(line: &[u8]) -> Result<(String, String), DecodeError> {
    let s = std::str::from_utf8(line)
        .map_err(|e| DecodeError::MalformedHeader(format!("header line is not valid UTF-8: {e}")))?;
    let idx = s
        .find(':')
        .ok_or_else(|| DecodeError::MalformedHeader(format!("no ':' in header line {s:?}")))?;
    let (name, rest) = s.split_at(idx);
    let value = &rest[1..];
    let name = name.trim();
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == ':') {
        return Err(DecodeError::MalformedHeader(format!(
            "invalid header name {name:?}"
        )));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
