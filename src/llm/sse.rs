//! Incremental decoder for SSE `data:` payloads.
//!
//! The Gemini streaming endpoint (`alt=sse`) emits one JSON document per
//! `data:` line. This decoder turns an arbitrary byte-chunked stream into
//! complete payload strings, tolerating payloads split across network
//! chunks, CRLF line endings, comment lines, and the `[DONE]` sentinel
//! some gateways append.

/// Incremental `data:` line decoder.
///
/// Feed raw bytes via [`push`](Self::push); each complete `data:` line
/// yields its payload. Call [`flush`](Self::flush) at end-of-stream to
/// recover a trailing payload without a final newline.
#[derive(Debug, Default)]
pub struct DataLineDecoder {
    line_buffer: String,
}

impl DataLineDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes, returning any complete payloads.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(chunk);
        let mut payloads = Vec::new();

        for ch in text.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut self.line_buffer);
                if let Some(payload) = payload_from_line(&line) {
                    payloads.push(payload);
                }
            } else {
                self.line_buffer.push(ch);
            }
        }

        payloads
    }

    /// Flush a trailing payload buffered without a final newline.
    pub fn flush(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.line_buffer);
        payload_from_line(&line)
    }
}

/// Extract the payload from one SSE line, if it carries one.
///
/// Non-`data:` fields, comments, blank lines, and the `[DONE]` sentinel
/// yield `None`.
fn payload_from_line(line: &str) -> Option<String> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let value = line.strip_prefix("data:")?;
    // Strip the single leading space after the colon per SSE spec.
    let value = value.strip_prefix(' ').unwrap_or(value);
    if value.trim() == "[DONE]" {
        return None;
    }
    Some(value.to_string())
}
