//! `COMPRESS=DEFLATE` stream wrappers (§4.11, §6).
//!
//! Once negotiated, an inflate stream is inserted into the read path and a
//! deflate stream into the write path. Writes are flushed after every
//! application-level chunk (`Compressor::flush_chunk`) so the server sees
//! complete deflate frames rather than relying on internal buffering,
//! which would stall the handshake.

use std::io;

use flate2::write::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;

/// Wraps the write half: deflates each chunk and flushes it as a
/// synchronization point, matching RFC 4978's requirement that each
/// written unit be immediately decompressible by the peer.
pub struct Compressor {
    inner: DeflateEncoder<Vec<u8>>,
}

impl Compressor {
    pub fn new() -> Self {
        Compressor {
            inner: DeflateEncoder::new(Vec::new(), Compression::default()),
        }
    }

    /// Compresses `chunk` and returns the bytes ready to write to the
    /// socket. Must be called once per application-level write so the
    /// peer's inflate stream can make progress without buffering forever.
    pub fn flush_chunk(&mut self, chunk: &[u8]) -> io::Result<Vec<u8>> {
        use std::io::Write;
        self.inner.write_all(chunk)?;
        self.inner.flush()?;
        Ok(std::mem::take(self.inner.get_mut()))
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps the read half: inflates bytes as they arrive from the socket.
pub struct Decompressor {
    inner: DeflateDecoder<Vec<u8>>,
}

impl Decompressor {
    pub fn new() -> Self {
        Decompressor {
            inner: DeflateDecoder::new(Vec::new()),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> io::Result<Vec<u8>> {
        use std::io::Write;
        self.inner.write_all(chunk)?;
        self.inner.flush()?;
        Ok(std::mem::take(self.inner.get_mut()))
    }
}

impl Default for Decompressor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_compressor_and_decompressor() {
        let mut compressor = Compressor::new();
        let mut decompressor = Decompressor::new();

        let original = b"A1 NOOP\r\n* 1 EXISTS\r\n";
        let compressed = compressor.flush_chunk(original).unwrap();
        let decompressed = decompressor.push(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }
}
