//! Server-sent events codec for report notification streams
//!
//! The backend pushes snapshots as `text/event-stream`:
//! ```text
//! event: report\n
//! id: 3\n
//! data: {"executionId":12,...}\n
//! \n
//! ```
//! Bytes arrive in arbitrary chunks; [`SseDecoder`] buffers them and yields
//! complete events only.

/// One decoded event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// `event:` field, `None` for the default `message` type
    pub event: Option<String>,
    pub id: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Incremental decoder over raw response bytes
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_blank_line(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_block(&block[..end]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event not followed by a blank line
    pub fn finish(&mut self) -> Option<SseEvent> {
        let block = std::mem::take(&mut self.buffer);
        parse_block(&block)
    }
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_block(block: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(block);
    let mut event = SseEvent::default();
    let mut data: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => data.push(value),
            "event" => event.event = Some(value.to_string()),
            "id" => event.id = Some(value.to_string()),
            // retry and unknown fields
            _ => {}
        }
    }

    if data.is_empty() {
        return None;
    }
    event.data = data.join("\n");
    Some(event)
}
