pub mod sse;

pub use sse::{sse_record_stream, SseParser, SseRecord};

/// Check whether a record is the `[DONE]` terminator.
#[must_use]
pub fn is_done_record(record: &SseRecord) -> bool {
    record.data.trim() == "[DONE]"
}
