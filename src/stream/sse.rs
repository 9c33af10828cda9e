//! SSE (Server-Sent Events) reassembly.
//!
//! Splits the upstream byte stream into discrete records, buffering the
//! last, possibly-incomplete line across chunk boundaries so that chunking
//! is invisible in the output.

use std::collections::VecDeque;

use futures_util::Stream;
use memchr::memchr_iter;

use super::is_done_record;

/// One reassembled SSE record: optional event type plus data payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseRecord {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE line parser.
///
/// Feed it text chunks split at arbitrary byte boundaries and it yields
/// fully-assembled [`SseRecord`]s:
/// - `event:` lines set the event type for the record being assembled
/// - `data:` lines contribute their trimmed remainder to the payload
///   (multiple `data:` lines are joined with `\n`)
/// - a blank line dispatches the record and resets the event type
/// - comment lines (`:`) and lines matching no known field are ignored
pub struct SseParser {
    buffer: String,
    read_offset: usize,
    event_type: Option<String>,
    data_buffer: String,
    has_data: bool,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
            event_type: None,
            data_buffer: String::new(),
            has_data: false,
        }
    }

    /// Feed raw text and return any complete records parsed.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseRecord> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete records into a caller-provided buffer.
    ///
    /// The trailing incomplete line, if any, stays buffered until a later
    /// chunk completes it; a record is never emitted from a partial line.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseRecord>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let bytes = self.buffer.as_bytes();
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            Self::process_line(
                line,
                &mut self.event_type,
                &mut self.data_buffer,
                &mut self.has_data,
                out,
            );
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

    fn process_line(
        line: &str,
        event_type: &mut Option<String>,
        data_buffer: &mut String,
        has_data: &mut bool,
        records: &mut Vec<SseRecord>,
    ) {
        if line.is_empty() {
            // Blank line = dispatch the assembled record
            if *has_data {
                records.push(SseRecord {
                    event: event_type.take(),
                    data: std::mem::take(data_buffer),
                });
                *has_data = false;
            } else {
                *event_type = None;
            }
            return;
        }

        // Comment line — ignore
        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.trim();
            if *has_data {
                data_buffer.push('\n');
            } else {
                *has_data = true;
            }
            data_buffer.push_str(value);
        } else if let Some(value) = line.strip_prefix("event:") {
            *event_type = Some(value.trim().to_string());
        }
        // Anything else is neither `event:` nor `data:` — ignored, not an error
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a byte stream into SSE records using [`SseParser`].
///
/// Bytes arriving from an HTTP response body are decoded as UTF-8 (with
/// multi-byte sequences carried across chunk boundaries), fed into the
/// parser, and complete records are yielded in input order. A `[DONE]`
/// payload terminates the stream without yielding a further record.
///
/// Transport errors from the underlying stream also terminate the record
/// sequence; the caller decides whether an unterminated stream is an error.
pub fn sse_record_stream<S, E>(byte_stream: S) -> impl Stream<Item = SseRecord> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Debug + Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            SseParser::new(),
            Vec::<u8>::new(),
            Vec::<SseRecord>::with_capacity(8),
            VecDeque::<SseRecord>::with_capacity(8),
            false,
        ),
        |(mut stream, mut parser, mut remainder, mut parsed, mut pending, mut terminated)| async move {
            loop {
                if terminated {
                    return None;
                }
                if let Some(record) = pending.pop_front() {
                    if is_done_record(&record) {
                        return None;
                    }
                    return Some((
                        record,
                        (stream, parser, remainder, parsed, pending, terminated),
                    ));
                }

                let chunk = stream.as_mut().next().await?;
                let Ok(bytes) = chunk else {
                    // Transport error mid-stream: drop the buffered partial
                    // line and end the record sequence.
                    terminated = true;
                    continue;
                };

                if remainder.is_empty() {
                    match std::str::from_utf8(&bytes) {
                        Ok(text) => parser.feed_into(text, &mut parsed),
                        Err(e) => {
                            let valid_up_to = e.valid_up_to();
                            // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
                            let text =
                                unsafe { std::str::from_utf8_unchecked(&bytes[..valid_up_to]) };
                            parser.feed_into(text, &mut parsed);
                            remainder.extend_from_slice(&bytes[valid_up_to..]);
                        }
                    }
                } else {
                    remainder.extend_from_slice(&bytes);
                    match std::str::from_utf8(remainder.as_slice()) {
                        Ok(text) => {
                            parser.feed_into(text, &mut parsed);
                            remainder.clear();
                        }
                        Err(e) => {
                            let valid_up_to = e.valid_up_to();
                            // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
                            let text = unsafe {
                                std::str::from_utf8_unchecked(&remainder[..valid_up_to])
                            };
                            parser.feed_into(text, &mut parsed);
                            if valid_up_to > 0 {
                                let remain_len = remainder.len() - valid_up_to;
                                remainder.copy_within(valid_up_to.., 0);
                                remainder.truncate(remain_len);
                            }
                        }
                    }
                }
                pending.extend(parsed.drain(..));
            }
        },
    )
}
