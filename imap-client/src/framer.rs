//! Splits an inbound TCP byte stream into command units (C1, §4.1).
//!
//! IMAP literals (`{N}`/`{N+}`) can contain arbitrary bytes, including
//! embedded CRLFs, so a naive line reader would misinterpret literal
//! payload as framing. The framer separates "finding message boundaries"
//! from "parsing IMAP grammar": it hands the parser (§4.2) a self-contained
//! [`CommandUnit`] — one logical server line with every embedded literal
//! already sliced out — and the parser never has to think about partial
//! reads again.

use std::collections::VecDeque;

use thiserror::Error;

/// One fully-framed server line, literals included.
///
/// `payload` still contains the literal-length markers (`{13}`, `{13+}`)
/// verbatim; the parser pairs each marker with the next entry of
/// `literals` in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandUnit {
    pub payload: Vec<u8>,
    pub literals: Vec<Vec<u8>>,
    /// Count of stray NUL bytes stripped from non-literal regions.
    /// Diagnostics only; never fed back into parsing.
    pub null_bytes_removed: usize,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FramerError {
    #[error("malformed literal marker")]
    BadLiteral,
    #[error("unexpected end of stream while reading a literal")]
    UnexpectedEof,
}

#[derive(Debug, Clone)]
enum Mode {
    /// Scanning for the next CRLF, accumulating into `payload`.
    Line,
    /// Reading exactly `remaining` more literal bytes.
    Literal { remaining: u32 },
}

/// Incremental framer.
///
/// Feed it bytes as they arrive with [`Framer::enqueue_bytes`], then drain
/// complete units with [`Framer::next_unit`]. A unit emitted by
/// `next_unit` must be acknowledged with [`Framer::ack`] before the next
/// one will be produced — this is the inbound backpressure valve described
/// in §4.1 and §5: it throttles the socket-read loop against a slow
/// consumer instead of buffering unboundedly.
#[derive(Debug)]
pub struct Framer {
    buffer: VecDeque<u8>,
    mode: Mode,
    payload: Vec<u8>,
    literals: Vec<Vec<u8>>,
    pending_literal: Vec<u8>,
    null_bytes_removed: usize,
    awaiting_ack: bool,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub fn new() -> Self {
        Framer {
            buffer: VecDeque::new(),
            mode: Mode::Line,
            payload: Vec::new(),
            literals: Vec::new(),
            pending_literal: Vec::new(),
            null_bytes_removed: 0,
            awaiting_ack: false,
        }
    }

    pub fn enqueue_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes.iter().copied());
    }

    /// Acknowledges the last unit returned by [`Framer::next_unit`],
    /// allowing the next one to be produced.
    pub fn ack(&mut self) {
        self.awaiting_ack = false;
    }

    /// Attempts to produce the next complete command unit.
    ///
    /// Returns `Ok(None)` when more bytes are needed (or while a previous
    /// unit is unacknowledged). A malformed literal marker or EOF mid-read
    /// is a hard stream error: the framer cannot recover byte alignment
    /// and the connection must be torn down.
    pub fn next_unit(&mut self) -> Result<Option<CommandUnit>, FramerError> {
        if self.awaiting_ack {
            return Ok(None);
        }

        loop {
            match self.mode {
                Mode::Line => {
                    let Some(pos) = find_crlf(&self.buffer) else {
                        return Ok(None);
                    };
                    for _ in 0..pos {
                        let b = self.buffer.pop_front().unwrap();
                        if b == 0 {
                            self.null_bytes_removed += 1;
                        } else {
                            self.payload.push(b);
                        }
                    }
                    // consume CRLF
                    self.buffer.pop_front();
                    self.buffer.pop_front();

                    match trailing_literal_marker(&self.payload)? {
                        Some((start, len, _nonsync)) => {
                            self.payload.push(b'\r');
                            self.payload.push(b'\n');
                            let _ = start;
                            self.mode = Mode::Literal { remaining: len };
                            self.pending_literal = Vec::with_capacity(len as usize);
                        }
                        None => {
                            let unit = CommandUnit {
                                payload: std::mem::take(&mut self.payload),
                                literals: std::mem::take(&mut self.literals),
                                null_bytes_removed: std::mem::take(&mut self.null_bytes_removed),
                            };
                            self.mode = Mode::Line;
                            self.awaiting_ack = true;
                            return Ok(Some(unit));
                        }
                    }
                }
                Mode::Literal { remaining } => {
                    if remaining == 0 {
                        self.literals.push(std::mem::take(&mut self.pending_literal));
                        self.mode = Mode::Line;
                        continue;
                    }
                    if self.buffer.is_empty() {
                        return Ok(None);
                    }
                    let take = remaining.min(self.buffer.len() as u32);
                    for _ in 0..take {
                        self.pending_literal.push(self.buffer.pop_front().unwrap());
                    }
                    self.mode = Mode::Literal {
                        remaining: remaining - take,
                    };
                }
            }
        }
    }

    /// Signals that the stream ended. Returns an error if a literal was
    /// still being read (truncated mid-literal is unrecoverable; a
    /// truncated line is just an incomplete unit and is silently dropped).
    pub fn finish(&self) -> Result<(), FramerError> {
        match self.mode {
            Mode::Literal { remaining } if remaining > 0 => Err(FramerError::UnexpectedEof),
            _ => Ok(()),
        }
    }
}

fn find_crlf(buf: &VecDeque<u8>) -> Option<usize> {
    let mut prev_cr = false;
    for (i, b) in buf.iter().enumerate() {
        if prev_cr && *b == b'\n' {
            return Some(i - 1);
        }
        prev_cr = *b == b'\r';
    }
    None
}

/// Detects a `{N}` or `{N+}` literal marker that ends the just-scanned
/// line, returning `(marker_start_offset, N, is_nonsync)`.
///
/// A line ending in `}` with a matching `{` is *always* interpreted as a
/// literal-length attempt (that is where RFC 3501 places them); if the
/// bracketed content isn't `1*DIGIT ["+"]`, that is a malformed marker and
/// a hard framing error, not a line that happens to end in braces.
fn trailing_literal_marker(line: &[u8]) -> Result<Option<(usize, u32, bool)>, FramerError> {
    if line.last() != Some(&b'}') {
        return Ok(None);
    }
    let Some(open) = line.iter().rposition(|&b| b == b'{') else {
        return Ok(None);
    };
    let mut digits = &line[open + 1..line.len() - 1];
    let nonsync = digits.last() == Some(&b'+');
    if nonsync {
        digits = &digits[..digits.len() - 1];
    }
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(FramerError::BadLiteral);
    }
    let n: u32 = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(FramerError::BadLiteral)?;
    Ok(Some((open, n, nonsync)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(framer: &mut Framer) -> Vec<CommandUnit> {
        let mut units = Vec::new();
        while let Some(unit) = framer.next_unit().unwrap() {
            framer.ack();
            units.push(unit);
        }
        units
    }

    #[test]
    fn frames_a_plain_tagged_ok() {
        let mut framer = Framer::new();
        framer.enqueue_bytes(b"A1 OK done\r\n");
        let units = drain(&mut framer);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].payload, b"A1 OK done");
        assert!(units[0].literals.is_empty());
    }

    #[test]
    fn frames_a_literal_embedded_in_a_line() {
        let mut framer = Framer::new();
        framer.enqueue_bytes(b"A2 LOGIN user {11+}\r\npass\rword\r\n\r\n");
        let units = drain(&mut framer);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].payload, b"A2 LOGIN user {11+}\r\n");
        assert_eq!(units[0].literals, vec![b"pass\rword\r\n".to_vec()]);
    }

    #[test]
    fn framing_is_independent_of_chunk_boundaries() {
        let whole = b"A3 OK {3}\r\nfoo\r\n".to_vec();
        for split in 0..whole.len() {
            let mut framer = Framer::new();
            framer.enqueue_bytes(&whole[..split]);
            assert!(framer.next_unit().unwrap().is_none() || split == whole.len());
            framer.enqueue_bytes(&whole[split..]);
            let units = drain(&mut framer);
            assert_eq!(units.len(), 1, "split at {split}");
            assert_eq!(units[0].literals, vec![b"foo".to_vec()]);
        }
    }

    #[test]
    fn strips_stray_nul_bytes_and_counts_them() {
        let mut framer = Framer::new();
        framer.enqueue_bytes(b"A4\x00 OK\x00\r\n");
        let units = drain(&mut framer);
        assert_eq!(units[0].payload, b"A4 OK");
        assert_eq!(units[0].null_bytes_removed, 2);
    }

    #[test]
    fn non_numeric_literal_marker_is_a_hard_error() {
        let mut framer = Framer::new();
        framer.enqueue_bytes(b"A5 OK {abc}\r\n");
        assert_eq!(framer.next_unit(), Err(FramerError::BadLiteral));
    }

    #[test]
    fn backpressure_holds_the_next_unit_until_acked() {
        let mut framer = Framer::new();
        framer.enqueue_bytes(b"A6 OK one\r\nA7 OK two\r\n");
        let first = framer.next_unit().unwrap().unwrap();
        assert_eq!(first.payload, b"A6 OK one");
        assert!(framer.next_unit().unwrap().is_none());
        framer.ack();
        let second = framer.next_unit().unwrap().unwrap();
        assert_eq!(second.payload, b"A7 OK two");
    }
}
