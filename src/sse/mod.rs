//! Server-sent-event decoding and streaming response aggregation.
//!
//! The decoder is a push-based state machine with no suspension point of
//! its own: the transport's chunk callback calls [`SseDecoder::feed`] and
//! then drains whatever complete events the buffer holds. Partial events
//! stay buffered across chunks.

pub mod aggregate;

pub use aggregate::StreamAggregator;

/// One decoded SSE event: the joined `data:` payload plus the terminal
/// marker flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub data: String,
    pub done: bool,
}

/// Terminal payload closing a streaming chat response.
pub const DONE_SIGNAL: &str = "[DONE]";

/// Incremental SSE decoder: `feed` raw bytes, `drain` complete events.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes to the internal buffer. Invalid UTF-8 is replaced
    /// lossily; this is the runtime's only byte-to-text boundary.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
    }

    /// Extract every complete event currently buffered.
    ///
    /// An event ends at a blank line (two consecutive newlines, tolerant of
    /// carriage returns). All `data:` lines of one event are joined with
    /// `\n`. Events without any `data:` line (comments, keep-alives) are
    /// dropped. Trailing bytes after the last separator remain buffered.
    pub fn drain(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        while let Some((event_end, rest_start)) = find_separator(&self.buf) {
            let raw = self.buf[..event_end].to_string();
            self.buf.drain(..rest_start);
            if let Some(data) = extract_data(&raw) {
                let done = data == DONE_SIGNAL;
                events.push(SseEvent { data, done });
            }
        }
        events
    }

    /// Bytes still waiting for a separator.
    pub fn pending(&self) -> &str {
        &self.buf
    }
}

/// Find the first blank-line separator: `\n` followed by an optional `\r`
/// and another `\n`. Returns (end of event text, start of remainder).
fn find_separator(buf: &str) -> Option<(usize, usize)> {
    let bytes = buf.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            let mut j = i + 1;
            if j < bytes.len() && bytes[j] == b'\r' {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'\n' {
                return Some((i, j + 1));
            }
        }
        i += 1;
    }
    None
}

fn extract_data(raw: &str) -> Option<String> {
    let mut payloads = Vec::new();
    for line in raw.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(rest) = line.strip_prefix("data:") {
            payloads.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if payloads.is_empty() {
        None
    } else {
        Some(payloads.join("\n"))
    }
}
