//! Embedded HTTP request/response head parsing.
//!
//! An embedded HTTP head's extent is known in advance from the
//! `Encapsulated` offsets, so unlike the ICAP header block (which is
//! read line-by-line against a running [`crate::reader::SizeDelimiter`]),
//! an embedded head is parsed in one shot once its whole byte window has
//! arrived. It reuses the same line/fold primitives as the ICAP header
//! block (component A), since RFC 2616 header folding is identical in
//! both places.

use crate::error::DecodeError;
use crate::message::HeaderList;
use crate::reader::{is_header_line_continuation, read_line, split_header, split_initial_line, Progress};

/// A fully parsed embedded HTTP request or response head.
///
/// `start_line` is `(method, uri, version)` for a request head or
/// `(version, status, reason)` for a response head; which one applies is
/// determined by which of [`parse_http_request_head`] /
/// [`parse_http_response_head`] produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHead {
    pub start_line: (String, String, String),
    pub headers: HeaderList,
}

pub fn parse_http_request_head(data: &[u8]) -> Result<HttpHead, DecodeError> {
    parse_head(data, true)
}

pub fn parse_http_response_head(data: &[u8]) -> Result<HttpHead, DecodeError> {
    parse_head(data, false)
}

fn parse_head(data: &[u8], is_request: bool) -> Result<HttpHead, DecodeError> {
    let mut pos = 0usize;

    let start_line = match read_line(&data[pos..], data.len())? {
        Progress::Complete(line, consumed) => {
            pos += consumed;
            if is_request {
                split_initial_line(line).ok_or_else(|| {
                    DecodeError::InvalidInitialLine(
                        "embedded HTTP request line must have exactly 3 tokens".into(),
                    )
                })?
            } else {
                parse_status_line(line)?
            }
        }
        Progress::Incomplete => {
            return Err(DecodeError::MalformedHeader(
                "embedded HTTP head's start line never terminated within its byte window".into(),
            ))
        }
    };

    let mut headers = HeaderList::new();
    let mut pending: Option<(String, String)> = None;
    let mut saw_blank_line = false;

    loop {
        match read_line(&data[pos..], data.len())? {
            Progress::Complete(line, consumed) => {
                pos += consumed;
                if line.is_empty() {
                    saw_blank_line = true;
                    break;
                }
                if is_header_line_continuation(line) {
                    let (_, value) = pending.as_mut().ok_or_else(|| {
                        DecodeError::MalformedHeader(
                            "continuation line with no preceding header".into(),
                        )
                    })?;
                    let cont = std::str::from_utf8(line)
                        .map_err(|e| {
                            DecodeError::MalformedHeader(format!(
                                "continuation line is not valid UTF-8: {e}"
                            ))
                        })?
                        .trim();
                    value.push(' ');
                    value.push_str(cont);
                } else {
                    if let Some((name, value)) = pending.take() {
                        headers.push(name, value);
                    }
                    pending = Some(split_header(line)?);
                }
            }
            Progress::Incomplete => {
                return Err(DecodeError::MalformedHeader(
                    "embedded HTTP head has no trailing blank line within its byte window".into(),
                ));
            }
        }
    }
    if let Some((name, value)) = pending.take() {
        headers.push(name, value);
    }
    if !saw_blank_line {
        return Err(DecodeError::MalformedHeader(
            "embedded HTTP head missing terminating blank line".into(),
        ));
    }

    Ok(HttpHead { start_line, headers })
}

fn parse_status_line(line: &[u8]) -> Result<(String, String, String), DecodeError> {
    let s = std::str::from_utf8(line)
        .map_err(|e| DecodeError::InvalidInitialLine(format!("status line is not valid UTF-8: {e}")))?;
    let mut parts = s.splitn(3, ' ');
    let version = parts
        .next()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| DecodeError::InvalidInitialLine("empty embedded HTTP status line".into()))?;
    let code = parts
        .next()
        .ok_or_else(|| DecodeError::InvalidInitialLine("status line missing status code".into()))?;
    let reason = parts.next().unwrap_or("");
    Ok((version.to_string(), code.to_string(), reason.to_string()))
}
