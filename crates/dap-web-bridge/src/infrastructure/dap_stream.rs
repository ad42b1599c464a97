//! Async framing over the backend byte stream.
//!
//! [`FrameReader`] turns an `AsyncRead` into a lazy sequence of DAP message
//! bodies using the [`FrameDecoder`] state machine from `dap-core`.
//! [`write_frame`] is the write-side counterpart.
//!
//! # Streaming protocol
//!
//! A single `read()` may return part of a header, several whole frames, or
//! anything in between.  `FrameReader` reads into a fixed buffer, hands each
//! chunk to the decoder, and queues the frames it completes so that
//! `next_frame` returns them one at a time, in order.

use std::collections::VecDeque;

use dap_core::protocol::frame_header;
use dap_core::{Frame, FrameDecoder, FramingError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::infrastructure::error::SessionError;

/// Size of each read from the backend.
const READ_CHUNK: usize = 16 * 1024;

/// Lazily decodes frames from an async reader.
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
    ready: VecDeque<Frame>,
    scratch: Vec<Frame>,
    /// Error reported by the decoder after the queued frames.
    pending_error: Option<FramingError>,
    eof: bool,
    buf: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Creates a reader that rejects bodies larger than `max_content_length`.
    pub fn new(reader: R, max_content_length: usize) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(max_content_length),
            ready: VecDeque::new(),
            scratch: Vec::new(),
            pending_error: None,
            eof: false,
            buf: vec![0u8; READ_CHUNK].into_boxed_slice(),
        }
    }

    /// Returns the next frame body, or `Ok(None)` at a clean end of stream.
    ///
    /// Frames decoded before a framing error are returned first; the error
    /// follows on the next call.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Framing`] for malformed or truncated input and
    /// [`SessionError::BackendIo`] when the read itself fails.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, SessionError> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame.into_body()));
            }
            if let Some(err) = self.pending_error.take() {
                return Err(err.into());
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                self.eof = true;
                self.decoder.finish()?;
                continue;
            }
            trace!(bytes = n, "read from backend");

            if let Err(err) = self.decoder.feed(&self.buf[..n], &mut self.scratch) {
                self.pending_error = Some(err);
            }
            self.ready.extend(self.scratch.drain(..));
        }
    }
}

/// Writes `body` as one framed DAP message and flushes.
///
/// # Errors
///
/// Returns the underlying I/O error if the backend is gone.
pub async fn write_frame<W: AsyncWrite + Unpin + ?Sized>(
    writer: &mut W,
    body: &[u8],
) -> std::io::Result<()> {
    writer.write_all(frame_header(body.len()).as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
