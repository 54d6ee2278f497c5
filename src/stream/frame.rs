//! SSE frame reassembly over an arbitrarily chunked byte stream.
use std::borrow::Cow;

use bytes::{Bytes, BytesMut};
use memchr::memchr_iter;

const DATA_FIELD: &[u8] = b"data:";
const DONE_PAYLOAD: &[u8] = b"[DONE]";
pub(crate) const LF_TERMINATOR: &[u8] = b"\n\n";

/// Bytes kept from the previous scan so a terminator split across two
/// chunks is still found.
const SCAN_OVERLAP: usize = 3;

/// One complete SSE frame as received, terminator included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Bytes,
    terminator_len: usize,
}

impl RawFrame {
    /// Wrap an unterminated tail left at end of stream, giving it a `\n\n`
    /// terminator.
    #[must_use]
    pub fn from_tail(tail: &[u8]) -> Self {
        let body = tail.trim_ascii_end();
        let mut bytes = BytesMut::with_capacity(body.len() + LF_TERMINATOR.len());
        bytes.extend_from_slice(body);
        bytes.extend_from_slice(LF_TERMINATOR);
        Self {
            bytes: bytes.freeze(),
            terminator_len: LF_TERMINATOR.len(),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    #[must_use]
    pub fn terminator(&self) -> &[u8] {
        &self.bytes[self.bytes.len() - self.terminator_len..]
    }

    /// The `data:` payload with the single optional leading space removed
    /// and surrounding whitespace trimmed. Several `data:` lines are joined
    /// with `\n`. `None` when the frame carries no `data:` field.
    #[must_use]
    pub fn data(&self) -> Option<Cow<'_, [u8]>> {
        let body = &self.bytes[..self.bytes.len() - self.terminator_len];
        let mut joined: Option<Cow<'_, [u8]>> = None;
        let mut line_start = 0usize;
        let line_ends = memchr_iter(b'\n', body).chain(std::iter::once(body.len()));
        for line_end in line_ends {
            let line = &body[line_start..line_end];
            line_start = line_end + 1;
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let Some(value) = line.trim_ascii_start().strip_prefix(DATA_FIELD) else {
                continue;
            };
            let value = value.strip_prefix(b" ").unwrap_or(value);
            joined = Some(match joined {
                None => Cow::Borrowed(value),
                Some(previous) => {
                    let mut merged = previous.into_owned();
                    merged.push(b'\n');
                    merged.extend_from_slice(value);
                    Cow::Owned(merged)
                }
            });
        }
        joined.map(|data| match data {
            Cow::Borrowed(value) => Cow::Borrowed(value.trim_ascii()),
            Cow::Owned(value) => Cow::Owned(value.trim_ascii().to_vec()),
        })
    }
}

/// Whether a `data:` payload is the end-of-stream sentinel.
#[must_use]
pub fn is_done_payload(data: &[u8]) -> bool {
    data == DONE_PAYLOAD
}

/// Encode a JSON payload as a `data:` frame with the given terminator.
#[must_use]
pub fn encode_data_frame(json: &[u8], terminator: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(6 + json.len() + terminator.len());
    out.extend_from_slice(b"data: ");
    out.extend_from_slice(json);
    out.extend_from_slice(terminator);
    out.freeze()
}

/// Incremental splitter: push bytes in, pull complete frames out.
///
/// Only bytes appended since the last unsuccessful scan (plus a small
/// overlap) are searched again.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    buffer: BytesMut,
    scan_from: usize,
}

impl FrameReassembler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            scan_from: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete frame, or `None` once only an incomplete tail remains.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        let Some((frame_start, terminator_len)) =
            find_frame_terminator_from(&self.buffer, self.scan_from)
        else {
            self.scan_from = self.buffer.len().saturating_sub(SCAN_OVERLAP);
            return None;
        };
        let bytes = self.buffer.split_to(frame_start + terminator_len).freeze();
        self.scan_from = 0;
        Some(RawFrame {
            bytes,
            terminator_len,
        })
    }

    #[must_use]
    pub fn residual_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drain the incomplete tail, if any.
    pub fn take_residual(&mut self) -> Option<Bytes> {
        self.scan_from = 0;
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.buffer.split().freeze())
    }
}

/// Find the first blank line: a line feed followed by `\n` or `\r\n`. A
/// carriage return right before the first line feed belongs to the
/// terminator, so `\n\n`, `\r\n\r\n`, `\n\r\n` and `\r\n\n` all end a frame.
/// Returns `(terminator_start, terminator_len)`.
fn find_frame_terminator_from(buffer: &[u8], scan_from: usize) -> Option<(usize, usize)> {
    let scan_from = scan_from.min(buffer.len());
    for rel in memchr_iter(b'\n', &buffer[scan_from..]) {
        let lf = scan_from + rel;
        let end = match &buffer[lf + 1..] {
            [b'\n', ..] => lf + 2,
            [b'\r', b'\n', ..] => lf + 3,
            _ => continue,
        };
        let start = if lf > 0 && buffer[lf - 1] == b'\r' {
            lf - 1
        } else {
            lf
        };
        return Some((start, end - start));
    }
    None
}
