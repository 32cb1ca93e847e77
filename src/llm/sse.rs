//! Minimal server-sent-events framing for the upstream completion stream.
//!
//! Network chunks do not align with SSE frame boundaries; the buffer
//! reassembles complete `\n\n`-terminated event blocks before parsing.

#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: String,
}

impl SseBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        self.buffer.push_str(&text);
    }

    pub fn next_event_block(&mut self) -> Option<String> {
        let boundary = self.buffer.find("\n\n")?;
        let remaining = self.buffer.split_off(boundary + 2);
        let event_block = std::mem::take(&mut self.buffer);
        self.buffer = remaining;
        Some(event_block)
    }
}

/// Payloads of `data: ` lines within one event block.
pub fn parse_data_lines(event_block: &str) -> Vec<&str> {
    event_block
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect()
}

/// Sentinel the chat-completions stream sends after its last chunk.
pub const DONE_SENTINEL: &str = "[DONE]";
