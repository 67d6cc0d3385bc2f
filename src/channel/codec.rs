use serde::Serialize;
use serde_json::Value;
use sync_protocol::RequestId;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::ChannelError;

/// Largest accepted frame, newline excluded.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Bytes of an oversized frame retained for id recovery.
const OVERSIZED_HEAD_BYTES: usize = 256;

/// One newline-terminated unit read from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundLine {
    Frame(String),
    /// The frame exceeded [`MAX_FRAME_BYTES`]; only its first bytes are kept.
    Oversized { head: String, len: usize },
}

/// Splits a byte stream into newline-delimited frames.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
    discarded: usize,
    max_frame_bytes: usize,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self::with_limit(reader, MAX_FRAME_BYTES)
    }

    pub fn with_limit(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::new(),
            discarded: 0,
            max_frame_bytes,
        }
    }

    /// Next non-blank line, or `None` once the peer closed its side.
    ///
    /// A trailing line without a newline is still returned at end of stream.
    pub async fn next_line(&mut self) -> Result<Option<InboundLine>, ChannelError> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.buffer.is_empty() && self.discarded == 0 {
                    return Ok(None);
                }
                if let Some(line) = self.finish_line() {
                    return Ok(Some(line));
                }
                continue;
            }

            let (chunk_len, complete) = match available.iter().position(|byte| *byte == b'\n') {
                Some(newline) => (newline, true),
                None => (available.len(), false),
            };
            let room = self.max_frame_bytes.saturating_sub(self.buffer.len());
            let kept = chunk_len.min(room);
            self.buffer.extend_from_slice(&available[..kept]);
            self.discarded += chunk_len - kept;

            let consumed = if complete { chunk_len + 1 } else { chunk_len };
            self.reader.consume(consumed);

            if complete {
                if let Some(line) = self.finish_line() {
                    return Ok(Some(line));
                }
            }
        }
    }

    fn finish_line(&mut self) -> Option<InboundLine> {
        let bytes = std::mem::take(&mut self.buffer);
        let discarded = std::mem::take(&mut self.discarded);

        if discarded > 0 {
            let head_len = bytes.len().min(OVERSIZED_HEAD_BYTES);
            return Some(InboundLine::Oversized {
                head: String::from_utf8_lossy(&bytes[..head_len]).into_owned(),
                len: bytes.len() + discarded,
            });
        }

        let text = String::from_utf8_lossy(&bytes);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(InboundLine::Frame(trimmed.to_string()))
        }
    }
}

/// Serializes `frame` as one JSON line and flushes it.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Best-effort recovery of the `id` of a frame that failed to decode.
#[must_use]
pub fn recover_request_id(line: &InboundLine) -> Option<RequestId> {
    match line {
        InboundLine::Frame(text) => serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|value| value.get("id").and_then(Value::as_u64))
            .or_else(|| scan_id(text)),
        InboundLine::Oversized { head, .. } => scan_id(head),
    }
}

fn scan_id(text: &str) -> Option<RequestId> {
    let start = text.find("\"id\"")? + 4;
    let rest = text[start..].trim_start().strip_prefix(':')?.trim_start();
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}
