use serde::Deserialize;

use crate::types::TurnRecord;

/// Prefix marking an event line; every other line is transport noise.
pub const DATA_PREFIX: &str = "data: ";

/// One decoded frame of a chat turn stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Replaces the whole scenario text of the arc being streamed.
    Scenario(String),
    /// Appends one dialog line to the arc being streamed.
    Dialog(String),
    /// Authoritative record of the finished turn; nothing after it is read.
    Complete(TurnRecord),
}

impl StreamEvent {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// Incremental newline-framed decoder.
///
/// Chunks are appended to a byte buffer and only newline-terminated lines are parsed, so a
/// frame (or a multi-byte character) split across chunks is held until it is whole. Once a
/// `complete` frame is decoded every remaining and future byte is discarded.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline.
    scanned: usize,
    completed: bool,
    malformed_frames: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Count of `data:` lines skipped because their payload did not parse.
    pub fn malformed_frames(&self) -> usize {
        self.malformed_frames
    }

    /// Feeds one chunk and returns the events completed by it, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.completed {
            return Vec::new();
        }

        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..]
            .iter()
            .position(|byte| *byte == b'\n')
        {
            let newline = self.scanned + offset;
            let line = self.buffer.drain(..=newline).collect::<Vec<_>>();
            self.scanned = 0;
            if let Some(event) = self.decode_line(&line[..line.len() - 1]) {
                let complete = event.is_complete();
                events.push(event);
                if complete {
                    self.finish_after_complete();
                    break;
                }
            }
        }
        self.scanned = self.buffer.len();

        events
    }

    /// Flushes a residual unterminated line at natural end-of-stream.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        self.scanned = 0;
        if self.completed || self.buffer.is_empty() {
            self.buffer.clear();
            return None;
        }

        let line = std::mem::take(&mut self.buffer);
        let event = self.decode_line(&line)?;
        if event.is_complete() {
            self.finish_after_complete();
        }
        Some(event)
    }

    fn finish_after_complete(&mut self) {
        self.completed = true;
        self.buffer.clear();
        self.scanned = 0;
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<StreamEvent> {
        let text = String::from_utf8_lossy(raw);
        let line = text.strip_suffix('\r').unwrap_or(text.as_ref());
        let payload = line.strip_prefix(DATA_PREFIX)?;

        match serde_json::from_str::<StreamEvent>(payload) {
            Ok(event) => Some(event),
            Err(error) => {
                self.malformed_frames += 1;
                tracing::warn!(
                    stage = "decode-stream-frame",
                    error = %error,
                    payload_len = payload.len(),
                    "skipping malformed stream frame"
                );
                None
            }
        }
    }
}
