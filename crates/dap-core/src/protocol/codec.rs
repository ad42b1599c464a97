//! Content-Length framing codec for Debug Adapter Protocol streams.
//!
//! Wire format:
//! ```text
//! Content-Length: <N>\r\n
//! \r\n
//! <N bytes of body>
//! ```
//! There is no trailing terminator after the body; the next frame's header
//! begins immediately.  The body is opaque to the codec.
//!
//! # Decoding (for beginners)
//!
//! A socket or pipe does not deliver "messages", it delivers chunks of bytes
//! whose boundaries are arbitrary.  One `read` may return half a header line,
//! the next may return the rest of the header, a whole body, and the first
//! few bytes of the following frame.  [`FrameDecoder`] therefore keeps its
//! position between calls: feed it every chunk in order and it hands back
//! each complete frame exactly once.

use thiserror::Error;
use tracing::trace;

/// Longest header line the decoder accepts, excluding the line terminator.
pub const MAX_HEADER_LINE: usize = 8 * 1024;

/// Default upper bound for a single frame body (64 MiB).
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

/// Name of the only header the decoder interprets.
const CONTENT_LENGTH: &str = "Content-Length";

/// Body buffers are grown incrementally past this size instead of being
/// allocated up front from the (untrusted) declared length.
const BODY_PREALLOC_LIMIT: usize = 64 * 1024;

/// Errors produced while decoding a framed byte stream.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum FramingError {
    /// A `Content-Length` header carried a value that is not a non-negative
    /// decimal integer.
    #[error("invalid Content-Length value: {0:?}")]
    InvalidContentLength(String),

    /// The header block ended without any `Content-Length` header.
    #[error("header block ended without a Content-Length header")]
    MissingContentLength,

    /// A single header line exceeded [`MAX_HEADER_LINE`] bytes.
    #[error("header line exceeds {MAX_HEADER_LINE} bytes")]
    HeaderLineTooLong,

    /// The declared body length is larger than the decoder's configured limit.
    #[error("declared frame length {declared} exceeds the limit of {max} bytes")]
    FrameTooLarge { declared: usize, max: usize },

    /// The stream ended in the middle of a header block.
    #[error("stream ended inside a frame header")]
    TruncatedHeader,

    /// The stream ended before the full body had arrived.
    #[error("stream ended after {received} of {expected} body bytes")]
    TruncatedBody { expected: usize, received: usize },

    /// The decoder was used again after it had already reported an error.
    #[error("decoder is unusable after a previous framing error")]
    DecoderFailed,
}

// ── Frame ────────────────────────────────────────────────────────────────────

/// One decoded message body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    body: Vec<u8>,
}

impl Frame {
    /// Wraps an owned body.
    pub fn new(body: Vec<u8>) -> Self {
        Self { body }
    }

    /// Number of body bytes, equal to the `Content-Length` the frame was
    /// decoded from.
    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    /// Borrows the body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consumes the frame, returning the body.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Returns the header block (header line plus blank line) for a body of
/// `len` bytes.
pub fn frame_header(len: usize) -> String {
    format!("{CONTENT_LENGTH}: {len}\r\n\r\n")
}

/// Encodes `body` into its complete wire representation.
///
/// A zero-length body still produces the header and the blank line.
///
/// # Examples
///
/// ```rust
/// use dap_core::protocol::encode_frame;
///
/// assert_eq!(encode_frame(b"ping"), b"Content-Length: 4\r\n\r\nping".to_vec());
/// assert_eq!(encode_frame(b""), b"Content-Length: 0\r\n\r\n".to_vec());
/// ```
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    let header = frame_header(body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(body);
    buf
}

// ── Decoding ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum DecodeState {
    /// At the start of a frame; no header line has been completed yet.
    ReadingHeaderLine,
    /// At least one header line has been completed; an empty line ends the
    /// header block.
    AwaitingBlankLine,
    /// Copying body bytes until `remaining` reaches zero.
    ReadingBody { remaining: usize, body: Vec<u8> },
    /// A previous call returned an error.
    Failed,
}

/// Incremental decoder turning arbitrarily chunked bytes into [`Frame`]s.
///
/// Call [`FrameDecoder::feed`] with every chunk in arrival order and
/// [`FrameDecoder::finish`] once the stream has ended.
///
/// # Examples
///
/// ```rust
/// use dap_core::protocol::FrameDecoder;
///
/// let mut decoder = FrameDecoder::default();
/// let mut frames = Vec::new();
/// decoder.feed(b"Content-Len", &mut frames).unwrap();
/// decoder.feed(b"gth: 4\r\n\r\npo", &mut frames).unwrap();
/// assert!(frames.is_empty());
/// decoder.feed(b"ng", &mut frames).unwrap();
/// assert_eq!(frames[0].body(), b"pong");
/// decoder.finish().unwrap();
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    /// Bytes of the header line currently being accumulated, CR removed.
    line: Vec<u8>,
    /// Last `Content-Length` parsed in the current header block.
    content_length: Option<usize>,
    max_content_length: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTENT_LENGTH)
    }
}

impl FrameDecoder {
    /// Creates a decoder that rejects bodies longer than `max_content_length`.
    pub fn new(max_content_length: usize) -> Self {
        Self {
            state: DecodeState::ReadingHeaderLine,
            line: Vec::new(),
            content_length: None,
            max_content_length,
        }
    }

    /// Consumes `chunk`, appending every frame it completes to `out`.
    ///
    /// Frames completed before an error in the same chunk are still appended.
    /// After an error the decoder is permanently failed and every further call
    /// returns [`FramingError::DecoderFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`FramingError`] for a malformed header or an oversized frame.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<Frame>) -> Result<(), FramingError> {
        let result = self.feed_inner(chunk, out);
        if result.is_err() {
            self.state = DecodeState::Failed;
        }
        result
    }

    /// Signals end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::TruncatedHeader`] or
    /// [`FramingError::TruncatedBody`] when the stream stopped mid-frame.
    pub fn finish(&mut self) -> Result<(), FramingError> {
        let result = match &self.state {
            DecodeState::ReadingHeaderLine if self.line.is_empty() => Ok(()),
            DecodeState::ReadingHeaderLine | DecodeState::AwaitingBlankLine => {
                Err(FramingError::TruncatedHeader)
            }
            DecodeState::ReadingBody { remaining, body } => Err(FramingError::TruncatedBody {
                expected: body.len() + remaining,
                received: body.len(),
            }),
            DecodeState::Failed => Err(FramingError::DecoderFailed),
        };
        if result.is_err() {
            self.state = DecodeState::Failed;
        }
        result
    }

    /// Returns `true` when the decoder sits exactly on a frame boundary.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, DecodeState::ReadingHeaderLine) && self.line.is_empty()
    }

    fn feed_inner(&mut self, mut chunk: &[u8], out: &mut Vec<Frame>) -> Result<(), FramingError> {
        if matches!(self.state, DecodeState::Failed) {
            return Err(FramingError::DecoderFailed);
        }
        while !chunk.is_empty() {
            if let DecodeState::ReadingBody { remaining, body } = &mut self.state {
                let take = (*remaining).min(chunk.len());
                body.extend_from_slice(&chunk[..take]);
                *remaining -= take;
                chunk = &chunk[take..];
                if *remaining == 0 {
                    let body = std::mem::take(body);
                    out.push(Frame::new(body));
                    self.state = DecodeState::ReadingHeaderLine;
                }
                continue;
            }

            match chunk.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.append_to_line(&chunk[..pos])?;
                    chunk = &chunk[pos + 1..];
                    self.complete_line(out)?;
                }
                None => {
                    self.append_to_line(chunk)?;
                    chunk = &[];
                }
            }
        }
        Ok(())
    }

    fn append_to_line(&mut self, bytes: &[u8]) -> Result<(), FramingError> {
        self.line.extend(bytes.iter().copied().filter(|&b| b != b'\r'));
        if self.line.len() > MAX_HEADER_LINE {
            return Err(FramingError::HeaderLineTooLong);
        }
        Ok(())
    }

    fn complete_line(&mut self, out: &mut Vec<Frame>) -> Result<(), FramingError> {
        let line = std::mem::take(&mut self.line);

        if !line.is_empty() {
            self.state = DecodeState::AwaitingBlankLine;
            if let Some(len) = parse_content_length(&line)? {
                self.content_length = Some(len);
            }
            return Ok(());
        }

        match self.state {
            // An empty line ends the header block, even one with no headers.
            DecodeState::ReadingHeaderLine => Err(FramingError::MissingContentLength),
            DecodeState::AwaitingBlankLine => {
                let len = self
                    .content_length
                    .take()
                    .ok_or(FramingError::MissingContentLength)?;
                if len > self.max_content_length {
                    return Err(FramingError::FrameTooLarge {
                        declared: len,
                        max: self.max_content_length,
                    });
                }
                if len == 0 {
                    out.push(Frame::default());
                    self.state = DecodeState::ReadingHeaderLine;
                } else {
                    self.state = DecodeState::ReadingBody {
                        remaining: len,
                        body: Vec::with_capacity(len.min(BODY_PREALLOC_LIMIT)),
                    };
                }
                Ok(())
            }
            DecodeState::ReadingBody { .. } | DecodeState::Failed => Ok(()),
        }
    }
}

/// Convenience wrapper decoding a complete byte buffer.
///
/// # Errors
///
/// Returns the first [`FramingError`] encountered, including truncation at
/// the end of `bytes`.
pub fn decode_all(bytes: &[u8], max_content_length: usize) -> Result<Vec<Frame>, FramingError> {
    let mut decoder = FrameDecoder::new(max_content_length);
    let mut frames = Vec::new();
    decoder.feed(bytes, &mut frames)?;
    decoder.finish()?;
    Ok(frames)
}

/// Parses one header line.  Returns `Ok(None)` for headers other than
/// `Content-Length`.
fn parse_content_length(line: &[u8]) -> Result<Option<usize>, FramingError> {
    let Some(colon) = line.iter().position(|&b| b == b':') else {
        trace!(len = line.len(), "ignoring header line without a colon");
        return Ok(None);
    };
    let name = trim_ascii_whitespace(&line[..colon]);
    if !name.eq_ignore_ascii_case(CONTENT_LENGTH.as_bytes()) {
        trace!(
            header = %String::from_utf8_lossy(name),
            "ignoring unrecognised header"
        );
        return Ok(None);
    }

    let value = trim_ascii_whitespace(&line[colon + 1..]);
    let invalid = || FramingError::InvalidContentLength(String::from_utf8_lossy(value).into_owned());
    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .map(Some)
        .ok_or_else(invalid)
}

fn trim_ascii_whitespace(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

// ── Tests ────────────────────────────────────────────────────────────────────
