/// Line-oriented SSE decoding and the record encoders of the relay.
///
/// The provider writes one `data: <payload>` line per frame. Only `data:`
/// lines are surfaced; comments, `event:`/`id:`/`retry:` fields and blank
/// separators are dropped.
use bytes::Bytes;
use futures_util::Stream;
use memchr::memchr_iter;
use smallvec::SmallVec;

use crate::util::push_json_string_escaped;

/// Terminal record sent to event-stream clients after a clean completion.
pub const DONE_RECORD: &str = "data: [DONE]\n\n";

struct PendingPayloads {
    payloads: SmallVec<[String; 8]>,
    head: usize,
}

impl PendingPayloads {
    #[inline]
    fn new() -> Self {
        Self {
            payloads: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<String> {
        if self.head >= self.payloads.len() {
            return None;
        }
        let payload = std::mem::take(&mut self.payloads[self.head]);
        self.head += 1;
        if self.head == self.payloads.len() {
            self.payloads.clear();
            self.head = 0;
        }
        Some(payload)
    }

    #[inline]
    fn extend_from_vec(&mut self, parsed: &mut Vec<String>) {
        if parsed.is_empty() {
            return;
        }
        self.payloads.reserve(parsed.len());
        self.payloads.extend(parsed.drain(..));
    }
}

/// Incremental decoder from raw body bytes to `data:` payloads.
///
/// Bytes may be split anywhere, including inside a UTF-8 sequence or a
/// `\r\n` pair. Invalid UTF-8 is replaced with U+FFFD rather than failing
/// the session.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: String,
    read_offset: usize,
    utf8_tail: Vec<u8>,
}

impl SseLineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed decoded text and collect complete payloads.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed decoded text, appending complete payloads into `out`.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<String>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &self.buffer.as_bytes()[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let line = &self.buffer[processed_up_to..line_end];
            push_data_line(line, out);
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Feed raw body bytes, appending complete payloads into `out`.
    pub fn feed_bytes_into(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        if self.utf8_tail.is_empty() {
            self.decode_into(chunk, out);
        } else {
            let mut joined = std::mem::take(&mut self.utf8_tail);
            joined.extend_from_slice(chunk);
            self.decode_into(&joined, out);
        }
    }

    /// End of body: an incomplete UTF-8 sequence becomes U+FFFD and the
    /// unterminated last line is processed like any other.
    pub fn finish_into(&mut self, out: &mut Vec<String>) {
        if !self.utf8_tail.is_empty() {
            self.utf8_tail.clear();
            self.buffer.push(char::REPLACEMENT_CHARACTER);
        }
        if self.read_offset < self.buffer.len() {
            push_data_line(&self.buffer[self.read_offset..], out);
        }
        self.buffer.clear();
        self.read_offset = 0;
    }

    fn decode_into(&mut self, mut bytes: &[u8], out: &mut Vec<String>) {
        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    self.feed_into(text, out);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = bytes.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.feed_into(text, out);
                    }
                    match err.error_len() {
                        Some(len) => {
                            self.feed_into("\u{FFFD}", out);
                            bytes = &rest[len..];
                        }
                        None => {
                            self.utf8_tail.extend_from_slice(rest);
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[inline]
fn push_data_line(line: &str, out: &mut Vec<String>) {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(value) = line.strip_prefix("data:") else {
        return;
    };
    let value = value.strip_prefix(' ').unwrap_or(value);
    if !value.trim().is_empty() {
        out.push(value.to_string());
    }
}

/// Split a response body into `data:` payloads.
///
/// A transport error is yielded once and ends the stream. At a clean end of
/// body the trailing partial line is flushed.
pub fn data_frame_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            SseLineDecoder::new(),
            Vec::<String>::with_capacity(8),
            PendingPayloads::new(),
            false,
        ),
        |(mut stream, mut decoder, mut parsed, mut pending, mut exhausted)| async move {
            loop {
                if let Some(payload) = pending.pop_front() {
                    return Some((Ok(payload), (stream, decoder, parsed, pending, exhausted)));
                }
                if exhausted {
                    return None;
                }
                match stream.as_mut().next().await {
                    Some(Ok(bytes)) => decoder.feed_bytes_into(&bytes, &mut parsed),
                    Some(Err(err)) => {
                        return Some((Err(err), (stream, decoder, parsed, pending, true)));
                    }
                    None => {
                        decoder.finish_into(&mut parsed);
                        exhausted = true;
                    }
                }
                pending.extend_from_vec(&mut parsed);
            }
        },
    )
}

/// `data: {"content": <text>}\n\n`
#[must_use]
pub fn content_record(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 24);
    out.push_str("data: {\"content\": ");
    push_json_string_escaped(&mut out, text);
    out.push_str("}\n\n");
    out
}

/// `data: {"error": <message>}\n\n`
#[must_use]
pub fn error_record(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 22);
    out.push_str("data: {\"error\": ");
    push_json_string_escaped(&mut out, message);
    out.push_str("}\n\n");
    out
}
