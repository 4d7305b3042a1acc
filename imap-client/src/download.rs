//! Chunked partial-FETCH download pipeline (C14, §4.14).
//!
//! Modeled per §9's "stream piping" guidance: a linear sequence of
//! transforming segments, each with a `write`/`flush` contract, instead of
//! an event-emitter chain. Backpressure is a single cutoff signal walking
//! upstream from the byte limiter.

use imap_types::error::Result;

/// How the payload bytes are encoded on the wire and must be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    Base64,
    QuotedPrintable,
    Identity,
}

impl TransferEncoding {
    pub fn from_header(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "base64" => TransferEncoding::Base64,
            "quoted-printable" => TransferEncoding::QuotedPrintable,
            _ => TransferEncoding::Identity,
        }
    }
}

/// Metadata surfaced to the caller alongside the decoded byte stream
/// (§4.14 step 6).
#[derive(Debug, Clone, Default)]
pub struct DownloadMeta {
    pub expected_size: Option<u64>,
    pub content_type: Option<String>,
    pub charset: Option<String>,
    pub disposition: Option<String>,
    pub filename: Option<String>,
    pub encoding: Option<TransferEncoding>,
    pub flowed: bool,
    pub del_sp: bool,
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub part: String,
    pub chunk_size: u64,
    pub max_bytes: Option<u64>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        DownloadOptions {
            part: "1".to_string(),
            chunk_size: 65_536,
            max_bytes: None,
        }
    }
}

/// A single transforming stage: transfer-decode, flowed-decode, charset
/// transcode, or byte-limit. Each stage may emit less than it was handed
/// (buffering) and must be flushed at end-of-stream.
pub trait Transform: Send {
    fn write(&mut self, chunk: &[u8]) -> Result<Vec<u8>>;
    fn flush(&mut self) -> Result<Vec<u8>>;
}

/// Identity stage, used when no transfer-encoding applies.
pub struct Identity;
impl Transform for Identity {
    fn write(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        Ok(chunk.to_vec())
    }
    fn flush(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Base64 transfer decoder. Buffers a trailing partial quantum across
/// chunk boundaries, since chunk cuts rarely align to 4-byte groups.
pub struct Base64Decoder {
    pending: String,
}

impl Base64Decoder {
    pub fn new() -> Self {
        Base64Decoder { pending: String::new() }
    }
}

impl Default for Base64Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for Base64Decoder {
    fn write(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        use base64::{engine::general_purpose::STANDARD, Engine};
        self.pending.push_str(&String::from_utf8_lossy(chunk));
        let usable_len = (self.pending.len() / 4) * 4;
        let usable: String = self.pending.drain(..usable_len).collect();
        STANDARD
            .decode(usable.trim())
            .map_err(|e| imap_types::error::Error::ProtocolViolation(e.to_string()))
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        use base64::{engine::general_purpose::STANDARD, Engine};
        if self.pending.trim().is_empty() {
            return Ok(Vec::new());
        }
        STANDARD
            .decode(self.pending.trim())
            .map_err(|e| imap_types::error::Error::ProtocolViolation(e.to_string()))
    }
}

/// Cuts the stream off after `max_bytes`, per §4.14 step 3/6's final
/// byte-limiter stage.
pub struct ByteLimiter {
    remaining: Option<u64>,
}

impl ByteLimiter {
    pub fn new(max_bytes: Option<u64>) -> Self {
        ByteLimiter { remaining: max_bytes }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

impl Transform for ByteLimiter {
    fn write(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        match self.remaining {
            None => Ok(chunk.to_vec()),
            Some(remaining) => {
                let take = (chunk.len() as u64).min(remaining) as usize;
                self.remaining = Some(remaining - take as u64);
                Ok(chunk[..take].to_vec())
            }
        }
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// A linear pipeline: transfer-decode stage, then the byte limiter. The
/// limiter is kept as a concrete field (rather than folded into a
/// trait-object chain) because callers need to observe its cutoff state
/// directly between chunks.
pub struct Pipeline {
    transfer: Box<dyn Transform>,
    limiter: ByteLimiter,
}

impl Pipeline {
    pub fn new(transfer: TransferEncoding, max_bytes: Option<u64>) -> Self {
        let transfer: Box<dyn Transform> = match transfer {
            TransferEncoding::Base64 => Box::new(Base64Decoder::new()),
            TransferEncoding::QuotedPrintable | TransferEncoding::Identity => Box::new(Identity),
        };
        Pipeline {
            transfer,
            limiter: ByteLimiter::new(max_bytes),
        }
    }

    /// Pushes one fetched chunk through the transfer decoder, then the
    /// byte limiter.
    pub fn write(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        let decoded = self.transfer.write(chunk)?;
        self.limiter.write(&decoded)
    }

    pub fn is_exhausted(&self) -> bool {
        self.limiter.is_exhausted()
    }
}

/// State machine driving §4.14's probe → pump algorithm. The actual
/// `UID FETCH` calls are injected via `fetch_slice` so this stays
/// testable without a live connection.
#[derive(Debug)]
pub struct Download {
    pub options: DownloadOptions,
    pub meta: DownloadMeta,
    pinned_uid: Option<u32>,
    offset: u64,
}

impl Download {
    pub fn new(options: DownloadOptions) -> Self {
        Download {
            options,
            meta: DownloadMeta::default(),
            pinned_uid: None,
            offset: 0,
        }
    }

    /// Step 1: rewrite `part = "1"` to `"TEXT"` when the message is a
    /// single-text root (§4.14).
    pub fn resolve_part(&mut self, body: &imap_types::body::BodyPart) {
        if self.options.part == "1" && body.is_single_text_root() {
            self.options.part = "TEXT".to_string();
        }
    }

    /// Step 5: once a UID has been observed, pin subsequent fetches to it.
    pub fn observe_uid(&mut self, uid: u32) {
        self.pinned_uid.get_or_insert(uid);
    }

    pub fn pinned_uid(&self) -> Option<u32> {
        self.pinned_uid
    }

    /// Builds the `<start.length>` section range for the next chunk.
    pub fn next_range(&self) -> (u64, u64) {
        (self.offset, self.options.chunk_size)
    }

    /// Advances the cursor after a fetched slice of `len` bytes. Returns
    /// `true` when the pump loop should terminate: a short read (server
    /// returned less than `chunk_size`, meaning end-of-part) or limiter
    /// cutoff.
    pub fn advance(&mut self, len: u64, limiter_exhausted: bool) -> bool {
        self.offset += len;
        limiter_exhausted || len < self.options.chunk_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_decoder_handles_chunk_boundaries_mid_quantum() {
        let mut decoder = Base64Decoder::new();
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"hello world");
        let (first, second) = encoded.split_at(5);
        let mut out = decoder.write(first.as_bytes()).unwrap();
        out.extend(decoder.write(second.as_bytes()).unwrap());
        out.extend(decoder.flush().unwrap());
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn byte_limiter_cuts_off_at_max_bytes() {
        let mut limiter = ByteLimiter::new(Some(5));
        let out = limiter.write(b"hello world").unwrap();
        assert_eq!(out, b"hello");
        assert!(limiter.is_exhausted());
    }

    #[test]
    fn pump_terminates_on_short_read() {
        let mut download = Download::new(DownloadOptions {
            part: "1".to_string(),
            chunk_size: 100,
            max_bytes: None,
        });
        assert!(!download.advance(100, false));
        assert!(download.advance(40, false));
    }

    #[test]
    fn uid_pins_after_first_observation() {
        let mut download = Download::new(DownloadOptions::default());
        download.observe_uid(7);
        download.observe_uid(9);
        assert_eq!(download.pinned_uid(), Some(7));
    }
}
