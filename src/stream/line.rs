//! Incremental splitter for newline-delimited upstream payloads.
//!
//! Upstream responses arrive as a byte stream of JSON records separated by
//! `\n`. Chunk boundaries fall anywhere, including inside a record, so the
//! parser buffers partial lines across `feed` calls.

/// Incremental line parser. Feed bytes as they arrive, then drain complete
/// lines with [`LineParser::next_line`].
#[derive(Default)]
pub struct LineParser {
    buffer: Vec<u8>,
}

impl LineParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of bytes to the internal buffer.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Extract the next complete line, without its terminator. Returns
    /// `None` when no full line is buffered.
    pub fn next_line(&mut self) -> Option<String> {
        let end = memchr::memchr(b'\n', &self.buffer)?;
        let line = trimmed_line(&self.buffer[..end]);
        self.buffer.drain(..=end);
        Some(line)
    }

    /// Drain whatever remains after the stream ends. A final record without
    /// a trailing newline is still a record.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = trimmed_line(&self.buffer);
        self.buffer.clear();
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }
}

fn trimmed_line(bytes: &[u8]) -> String {
    let bytes = match bytes {
        [rest @ .., b'\r'] => rest,
        other => other,
    };
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decode one buffered line as `T`. Blank lines and lines that do not parse
/// are skipped silently, per the tolerant-record policy.
pub fn decode_record_line<T>(line: &str) -> Option<T>
where
    T: serde::de::DeserializeOwned,
{
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(error = %err, "skipping malformed upstream record");
            None
        }
    }
}
