//! # NDJSON Parser
//!
//! Line-delimited JSON decoding for the driven CLI's stdout.
//!
//! [`NdjsonCodec`] is a `tokio_util` [`Decoder`] that:
//! - buffers partial data until a `\n` arrives (lines may span reads)
//! - strips a trailing `\r` and surrounding whitespace
//! - skips blank lines silently
//! - flushes an unterminated final line at end of stream
//!
//! A line that fails to parse is yielded as an `Err` item rather than ending
//! the stream, so callers can skip it and keep reading.

use std::fmt::Display;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use crate::errors::StreamError;

/// Cap on collected diagnostic output. Later bytes are logged but not kept.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// One decoded line: a JSON value, or the reason the line was rejected.
pub type LineResult = Result<Value, StreamError>;

/// Decoder yielding one JSON value per non-blank line.
#[derive(Debug, Default)]
pub struct NdjsonCodec {
    /// Bytes already scanned for a newline, so a long line is not rescanned
    /// on every read.
    scanned: usize,
}

impl NdjsonCodec {
    /// Create a fresh codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for NdjsonCodec {
    type Item = LineResult;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> std::io::Result<Option<LineResult>> {
        loop {
            let Some(offset) = buf[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = buf.len();
                return Ok(None);
            };
            let line = buf.split_to(self.scanned + offset + 1);
            self.scanned = 0;
            if let Some(item) = parse_line(&line[..line.len() - 1]) {
                return Ok(Some(item));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> std::io::Result<Option<LineResult>> {
        if let Some(item) = self.decode(buf)? {
            return Ok(Some(item));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split();
        self.scanned = 0;
        Ok(parse_line(&rest))
    }
}

fn parse_line(bytes: &[u8]) -> Option<LineResult> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        serde_json::from_str(trimmed).map_err(|e| StreamError::Json {
            message: e.to_string(),
            line: trimmed.to_string(),
        }),
    )
}

fn flatten(item: std::io::Result<LineResult>) -> LineResult {
    item.map_err(StreamError::Io).and_then(|line| line)
}

/// Parse NDJSON from any async reader.
pub fn parse_ndjson_reader<R>(reader: R) -> impl Stream<Item = LineResult>
where
    R: tokio::io::AsyncRead,
{
    FramedRead::new(reader, NdjsonCodec::new()).map(flatten)
}

/// Parse NDJSON from a stream of byte chunks.
///
/// A read error is yielded once as [`StreamError::Io`] and ends the stream.
pub fn parse_ndjson_stream<S, B, E>(chunks: S) -> impl Stream<Item = LineResult>
where
    S: Stream<Item = Result<B, E>>,
    B: Buf,
    E: Into<std::io::Error>,
{
    parse_ndjson_reader(StreamReader::new(chunks))
}

/// Parse NDJSON held in memory.
pub fn parse_ndjson_str(input: &str) -> impl Iterator<Item = LineResult> + '_ {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from(input.as_bytes());
    std::iter::from_fn(move || codec.decode_eof(&mut buf).ok().flatten())
}

/// Parse a process's stdout while draining its stderr on a separate task.
///
/// Must be called inside a Tokio runtime.
pub fn parse_process_output<S, E, B, Err>(
    stdout: S,
    stderr: E,
) -> (impl Stream<Item = LineResult>, StderrDrain)
where
    S: Stream<Item = Result<B, Err>>,
    B: Buf,
    Err: Into<std::io::Error>,
    E: Stream<Item = Result<B, Err>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    Err: Display + Send,
{
    (parse_ndjson_stream(stdout), StderrDrain::spawn(stderr))
}

// ─────────────────────────────────────────────────────────────────────────────
// Stderr drain
// ─────────────────────────────────────────────────────────────────────────────

/// Background collector for a diagnostic byte stream.
///
/// Reading happens on its own task, so a chatty stderr never stalls stdout
/// consumption and vice versa.
#[derive(Debug)]
pub struct StderrDrain {
    collected: Arc<Mutex<String>>,
    handle: JoinHandle<()>,
}

impl StderrDrain {
    /// Start draining `stream` on a new task.
    pub fn spawn<E, B, Err>(mut stream: E) -> Self
    where
        E: Stream<Item = Result<B, Err>> + Send + Unpin + 'static,
        B: AsRef<[u8]> + Send,
        Err: Display + Send,
    {
        let collected = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&collected);
        let handle = tokio::spawn(async move {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        let text = String::from_utf8_lossy(bytes.as_ref());
                        debug!(stderr = %text.trim_end(), "process stderr");
                        let mut buf = sink.lock();
                        let room = MAX_STDERR_BYTES.saturating_sub(buf.len());
                        if room > 0 {
                            buf.push_str(harbor_core::text::truncate_str(&text, room));
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "stderr read failed");
                        break;
                    }
                }
            }
        });
        Self { collected, handle }
    }

    /// Diagnostics collected so far.
    #[must_use]
    pub fn collected(&self) -> String {
        self.collected.lock().clone()
    }

    /// Wait for the stream to end and return everything collected.
    pub async fn finish(self) -> String {
        if let Err(e) = self.handle.await {
            warn!(error = %e, "stderr drain task failed");
        }
        std::mem::take(&mut *self.collected.lock())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
