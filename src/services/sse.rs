//! Incremental decoder for `text/event-stream` bodies.

use crate::error::ModelError;

/// Upper bound for a single buffered event.
pub const MAX_EVENT_BYTES: usize = 1024 * 1024;

/// Buffers raw bytes and yields the `data` payload of each complete event.
///
/// Events end at a blank line. Multi-line `data:` fields are joined with `\n`;
/// comments and other fields are ignored. Bytes are buffered until an event is
/// complete, so multi-byte characters split across chunks survive.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    // Bytes of `buffer` already searched for an event boundary
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the payloads of the events it completed.
    ///
    /// Fails once a single event grows past [`MAX_EVENT_BYTES`].
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, ModelError> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        loop {
            // Step back one byte so a boundary split across pushes is found
            let from = self.scanned.saturating_sub(1);
            match find_event_end(&self.buffer[from..]) {
                Some(offset) => {
                    let end = from + offset;
                    let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
                    self.scanned = 0;
                    if let Some(data) = parse_event(&raw[..end]) {
                        events.push(data);
                    }
                }
                None => {
                    self.scanned = self.buffer.len();
                    break;
                }
            }
        }

        if self.buffer.len() > MAX_EVENT_BYTES {
            return Err(ModelError::Decode(format!(
                "stream event exceeds {} bytes",
                MAX_EVENT_BYTES
            )));
        }
        Ok(events)
    }

    /// Flushes a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        let raw = std::mem::take(&mut self.buffer);
        parse_event(&raw)
    }
}

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_event(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let mut data_lines = Vec::new();

    for line in text.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
