//! Incremental server-sent-events framing.
//!
//! Providers stream JSON payloads in `data:` lines separated by blank lines.
//! [`SseParser`] buffers raw bytes across network chunk boundaries and yields
//! each complete frame's payload; decoding the JSON is left to the adapters.

/// Incremental parser for SSE byte streams.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    /// Bytes of a UTF-8 sequence split across chunks.
    pending: Vec<u8>,
}

impl SseParser {
    /// Feed arbitrary bytes and drain the payloads of every completed frame.
    ///
    /// `[DONE]` sentinels and frames without data are dropped.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(s) => s.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let chunk: Vec<u8> = self.pending.drain(..valid).collect();
        self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut payloads = Vec::new();
        while let Some(split) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..split + 2).collect();
            if let Some(payload) = extract_data_payload(&frame) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing frame the server did not terminate with a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        extract_data_payload(&rest)
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    let payload = data_lines.join("\n");
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        None
    } else {
        Some(payload.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_split_across_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"event: x\ndata: {\"a\":").is_empty());
        let out = parser.feed(b"1}\n\ndata: {\"b\":2}\n\n");
        assert_eq!(out, vec![r#"{"a":1}"#.to_string(), r#"{"b":2}"#.to_string()]);
    }

    #[test]
    fn test_crlf_and_done_sentinel() {
        let mut parser = SseParser::default();
        let out = parser.feed(b"data: {\"x\":1}\r\n\r\ndata: [DONE]\r\n\r\n");
        assert_eq!(out, vec![r#"{"x":1}"#.to_string()]);
    }

    #[test]
    fn test_multibyte_char_split() {
        let text = "data: {\"t\":\"héllo\"}\n\n".as_bytes();
        let cut = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut parser = SseParser::default();
        assert!(parser.feed(&text[..cut]).is_empty());
        let out = parser.feed(&text[cut..]);
        assert_eq!(out, vec![r#"{"t":"héllo"}"#.to_string()]);
    }

    #[test]
    fn test_finish_flushes_unterminated_frame() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"data: {\"end\":true}").is_empty());
        assert_eq!(parser.finish().as_deref(), Some(r#"{"end":true}"#));
        assert_eq!(parser.finish(), None);
    }
}
